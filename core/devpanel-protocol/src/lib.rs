//! Captured-event data model and persisted state layout for devpanel.
//!
//! This crate is shared by the agent core and its operator tooling so the
//! on-storage shape cannot drift between writer and reader. Everything here is
//! plain data: no capture logic, no redaction, no I/O.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker prepended to every security audit line.
pub const SECURITY_TAG: &str = "[SECURITY]";

/// Ephemeral storage keys owned by the agent.
pub mod keys {
    pub const LOGS: &str = "logs";
    pub const API_REQUESTS: &str = "apiRequests";
    pub const ROUTE_CHANGES: &str = "routeChanges";
    pub const USER_INTERACTIONS: &str = "userInteractions";
    pub const PANEL_STATE: &str = "debugPanelState";
    pub const SESSION: &str = "debugSession";

    /// Keys holding captured history (cleared by a purge).
    pub const HISTORY: [&str; 4] = [LOGS, API_REQUESTS, ROUTE_CHANGES, USER_INTERACTIONS];

    /// Every key the agent writes. Anything else in storage belongs to the host page.
    pub const ALL: [&str; 6] = [
        LOGS,
        API_REQUESTS,
        ROUTE_CHANGES,
        USER_INTERACTIONS,
        PANEL_STATE,
        SESSION,
    ];

    pub fn is_agent_key(key: &str) -> bool {
        ALL.contains(&key)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Captured Events
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Log,
    Network,
    Interaction,
    Route,
    Render,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Log => "log",
            EventCategory::Network => "network",
            EventCategory::Interaction => "interaction",
            EventCategory::Route => "route",
            EventCategory::Render => "render",
        }
    }
}

/// Common surface of everything the agent stores.
pub trait CapturedEvent {
    fn timestamp(&self) -> DateTime<Utc>;
    fn category(&self) -> EventCategory;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Accepts the console method names too (`log`, `debug`, `warning`).
impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "info" | "log" | "debug" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Unknown log level: {}", value)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub message: String,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
}

impl CapturedEvent for LogEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn category(&self) -> EventCategory {
        EventCategory::Log
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub id: String,
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Transport failure message; set when the request never produced a status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NetworkRequest {
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.status.is_some_and(|status| status >= 400)
    }
}

impl CapturedEvent for NetworkRequest {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn category(&self) -> EventCategory {
        EventCategory::Network
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteChange {
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
}

impl CapturedEvent for RouteChange {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn category(&self) -> EventCategory {
        EventCategory::Route
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Click,
    Submit,
    Keydown,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Click => "click",
            InteractionKind::Submit => "submit",
            InteractionKind::Keydown => "keydown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInteraction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    pub target_descriptor: String,
    pub timestamp: DateTime<Utc>,
}

impl CapturedEvent for UserInteraction {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn category(&self) -> EventCategory {
        EventCategory::Interaction
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderPhase {
    Mount,
    Update,
    NestedUpdate,
}

impl RenderPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderPhase::Mount => "mount",
            RenderPhase::Update => "update",
            RenderPhase::NestedUpdate => "nested-update",
        }
    }
}

/// Aggregated render cost for one component. Updated in place on every render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRenderStat {
    pub name: String,
    pub render_time_ms: f64,
    pub render_count: u64,
    pub phase: RenderPhase,
    pub last_rendered_at: DateTime<Utc>,
    #[serde(default)]
    pub slow_renders: u64,
}

impl ComponentRenderStat {
    pub fn average_ms(&self) -> f64 {
        if self.render_count == 0 {
            0.0
        } else {
            self.render_time_ms / self.render_count as f64
        }
    }
}

impl CapturedEvent for ComponentRenderStat {
    fn timestamp(&self) -> DateTime<Utc> {
        self.last_rendered_at
    }

    fn category(&self) -> EventCategory {
        EventCategory::Render
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Session + Panel State
// ═══════════════════════════════════════════════════════════════════════════════

/// Persisted operator session. Timestamps travel as epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PanelTab {
    #[default]
    General,
    Console,
    Network,
    Tools,
}

impl PanelTab {
    pub const ALL: [PanelTab; 4] = [
        PanelTab::General,
        PanelTab::Console,
        PanelTab::Network,
        PanelTab::Tools,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            PanelTab::General => "General",
            PanelTab::Console => "Console",
            PanelTab::Network => "Network",
            PanelTab::Tools => "Tools",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PanelSide {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Panel chrome persisted across reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelState {
    #[serde(default = "default_collapsed")]
    pub collapsed: bool,
    #[serde(default)]
    pub active_tab: PanelTab,
    #[serde(default)]
    pub side: PanelSide,
    #[serde(default)]
    pub theme: Theme,
}

fn default_collapsed() -> bool {
    true
}

impl Default for PanelState {
    fn default() -> Self {
        Self {
            collapsed: default_collapsed(),
            active_tab: PanelTab::default(),
            side: PanelSide::default(),
            theme: Theme::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Encoding helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Serializes a history category as a JSON array.
pub fn encode_entries<'a, T, I>(entries: I) -> serde_json::Result<String>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let items: Vec<&T> = entries.into_iter().collect();
    serde_json::to_string(&items)
}

/// Parses a history category written by [`encode_entries`].
pub fn decode_entries<T: DeserializeOwned>(raw: &str) -> serde_json::Result<Vec<T>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn log_entry_uses_iso_timestamps() {
        let entry = LogEntry {
            id: "01HZX".to_string(),
            message: "hello".to_string(),
            level: LogLevel::Warn,
            timestamp: at(1_700_000_000),
        };
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["level"], "warn");
        assert_eq!(json["timestamp"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn log_level_parses_console_names() {
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("error".parse::<LogLevel>(), Ok(LogLevel::Error));
        assert!("fatal".parse::<LogLevel>().is_err());
    }

    #[test]
    fn session_record_uses_epoch_millis() {
        let record = SessionRecord {
            started_at: at(1_700_000_000),
            last_activity_at: at(1_700_000_060),
        };
        let json = serde_json::to_value(record).expect("serialize");
        assert_eq!(json["startedAt"], 1_700_000_000_000i64);
        assert_eq!(json["lastActivityAt"], 1_700_000_060_000i64);
    }

    #[test]
    fn network_request_omits_absent_fields() {
        let request = NetworkRequest {
            id: "r1".to_string(),
            url: "/api/items".to_string(),
            method: "GET".to_string(),
            status: None,
            duration_ms: 12.5,
            payload: None,
            response: None,
            error: Some("connection reset".to_string()),
            timestamp: at(0),
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert!(json.get("status").is_none());
        assert!(json.get("payload").is_none());
        assert_eq!(json["durationMs"], 12.5);
        assert!(request.is_failure());
    }

    #[test]
    fn interaction_kind_serializes_as_type() {
        let interaction = UserInteraction {
            id: "i1".to_string(),
            kind: InteractionKind::Submit,
            target_descriptor: "form#login".to_string(),
            timestamp: at(0),
        };
        let json = serde_json::to_value(&interaction).expect("serialize");
        assert_eq!(json["type"], "submit");
        assert_eq!(json["targetDescriptor"], "form#login");
    }

    #[test]
    fn panel_state_fills_missing_fields() {
        let state: PanelState = serde_json::from_str(r#"{"activeTab":"network"}"#).expect("parse");
        assert!(state.collapsed);
        assert_eq!(state.active_tab, PanelTab::Network);
        assert_eq!(state.side, PanelSide::Right);
        assert_eq!(state.theme, Theme::Light);
    }

    #[test]
    fn decode_entries_treats_blank_as_empty() {
        let entries: Vec<RouteChange> = decode_entries("  ").expect("decode");
        assert!(entries.is_empty());
    }

    #[test]
    fn agent_keys_exclude_host_keys() {
        assert!(keys::is_agent_key("logs"));
        assert!(keys::is_agent_key("debugSession"));
        assert!(!keys::is_agent_key("cart"));
    }

    #[test]
    fn average_ms_handles_zero_renders() {
        let stat = ComponentRenderStat {
            name: "Chart".to_string(),
            render_time_ms: 0.0,
            render_count: 0,
            phase: RenderPhase::Mount,
            last_rendered_at: at(0),
            slow_renders: 0,
        };
        assert_eq!(stat.average_ms(), 0.0);
    }
}
