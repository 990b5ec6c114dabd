//! Operator panel controller.
//!
//! The panel keeps only its own chrome (collapsed flag, active tab, side,
//! theme) plus transient UI state such as an armed purge. Everything else is
//! read from or delegated to the [`Agent`] passed into each call.
//!
//! Every action answers with an [`ActionFeedback`] shown inline next to the
//! button. Destructive actions never open a blocking dialog: "purge all" is
//! armed by the first press and carried out by the second.

use std::fmt::Write as _;
use std::rc::Rc;

use devpanel_protocol::{
    keys, LogEntry, LogLevel, NetworkRequest, PanelSide, PanelState, PanelTab, Theme,
};
use serde::Serialize;
use tracing::warn;

use crate::agent::Agent;
use crate::diagnostics::DebugSnapshot;
use crate::storage::EphemeralStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Success,
    Info,
    Warning,
    Error,
}

/// Inline confirmation text for one operator action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFeedback {
    pub kind: FeedbackKind,
    pub message: String,
}

impl ActionFeedback {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FeedbackKind::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: FeedbackKind::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: FeedbackKind::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FeedbackKind::Error,
            message: message.into(),
        }
    }
}

const NOT_MOUNTED: &str = "Agent is not active";

pub struct Panel {
    state: PanelState,
    storage: Rc<dyn EphemeralStorage>,
    purge_armed: bool,
}

impl Panel {
    /// Restores persisted chrome. Missing or unreadable state falls back to defaults.
    pub fn load(storage: Rc<dyn EphemeralStorage>) -> Self {
        let state = match storage.get_item(keys::PANEL_STATE) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(error = %err, "Discarding unreadable panel state");
                PanelState::default()
            }),
            Ok(None) => PanelState::default(),
            Err(err) => {
                warn!(error = %err, "Failed to read panel state");
                PanelState::default()
            }
        };
        Self {
            state,
            storage,
            purge_armed: false,
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn is_purge_armed(&self) -> bool {
        self.purge_armed
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Chrome
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn toggle_collapsed(&mut self) -> bool {
        self.state.collapsed = !self.state.collapsed;
        self.persist();
        self.state.collapsed
    }

    pub fn select_tab(&mut self, tab: PanelTab) {
        self.state.active_tab = tab;
        self.purge_armed = false;
        self.persist();
    }

    pub fn set_side(&mut self, side: PanelSide) {
        self.state.side = side;
        self.persist();
    }

    pub fn toggle_theme(&mut self) -> ActionFeedback {
        self.state.theme = self.state.theme.toggled();
        self.persist();
        let name = match self.state.theme {
            Theme::Light => "light",
            Theme::Dark => "dark",
        };
        ActionFeedback::success(format!("Switched to {} theme", name))
    }

    fn persist(&self) {
        let result = serde_json::to_string(&self.state)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                self.storage
                    .set_item(keys::PANEL_STATE, &raw)
                    .map_err(String::from)
            });
        if let Err(err) = result {
            warn!(error = %err, "Failed to persist panel state");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Views
    // ─────────────────────────────────────────────────────────────────────────────

    /// Warning banner for an unsupported host framework.
    pub fn banner(&self, agent: &Agent) -> Option<String> {
        agent.compatibility().warning()
    }

    pub fn general(&self, agent: &Agent) -> Option<DebugSnapshot> {
        agent.snapshot()
    }

    /// Captured logs, oldest first, optionally limited to one level.
    pub fn console_entries(&self, agent: &Agent, level: Option<LogLevel>) -> Vec<LogEntry> {
        let Some(capture) = agent.capture() else {
            return Vec::new();
        };
        let history = capture.history().borrow();
        history
            .logs()
            .iter()
            .filter(|entry| level.map_or(true, |l| entry.level == l))
            .cloned()
            .collect()
    }

    pub fn network_entries(&self, agent: &Agent) -> Vec<NetworkRequest> {
        agent
            .capture()
            .map(|c| c.history().borrow().requests().to_vec())
            .unwrap_or_default()
    }

    pub fn request_detail(&self, agent: &Agent, id: &str) -> Option<NetworkRequest> {
        let capture = agent.capture()?;
        let history = capture.history().borrow();
        history.request(id).cloned()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Tools
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn run_diagnostics(&self, agent: &Agent) -> ActionFeedback {
        match agent.diagnostics() {
            Some(report) if report.warnings() == 0 => ActionFeedback::success(report.to_text()),
            Some(report) => ActionFeedback::warning(report.to_text()),
            None => ActionFeedback::error(NOT_MOUNTED),
        }
    }

    pub fn inspect_storage(&self, agent: &Agent) -> ActionFeedback {
        match agent.inspect_storage() {
            Ok(entries) if entries.is_empty() => ActionFeedback::info("Storage is empty"),
            Ok(entries) => {
                let mut text = String::new();
                for entry in &entries {
                    let owner = if entry.agent_owned { " (agent)" } else { "" };
                    let _ = writeln!(text, "{}: {} bytes{}", entry.key, entry.bytes, owner);
                }
                let total: usize = entries.iter().map(|e| e.bytes).sum();
                let _ = write!(text, "{} key(s), {} bytes", entries.len(), total);
                ActionFeedback::info(text)
            }
            Err(err) => ActionFeedback::error(format!("Storage inspection failed: {}", err)),
        }
    }

    pub fn clear_site_storage(&self, agent: &Agent) -> ActionFeedback {
        match agent.clear_site_storage() {
            Ok(0) => ActionFeedback::info("No site storage to clear"),
            Ok(removed) => ActionFeedback::success(format!("Cleared {} site key(s)", removed)),
            Err(err) => ActionFeedback::error(format!("Could not clear site storage: {}", err)),
        }
    }

    pub fn toggle_profiling(&self, agent: &Agent) -> ActionFeedback {
        let Some(capture) = agent.capture() else {
            return ActionFeedback::error(NOT_MOUNTED);
        };
        if !capture.profiler().is_enabled() {
            agent.start_profiling();
            return ActionFeedback::info("Recording component renders");
        }
        match agent.stop_profiling() {
            Some(report) if report.top.is_empty() => {
                ActionFeedback::info("No renders recorded")
            }
            Some(report) => {
                let mut text = String::new();
                for (rank, stat) in report.top.iter().enumerate() {
                    let _ = writeln!(
                        text,
                        "{}. {} {:.1}ms over {} render(s), avg {:.2}ms, {} slow",
                        rank + 1,
                        stat.name,
                        stat.render_time_ms,
                        stat.render_count,
                        stat.average_ms(),
                        stat.slow_renders
                    );
                }
                let _ = write!(
                    text,
                    "{} component(s), {} render(s), {} mutation(s)",
                    report.component_count, report.total_renders, report.mutations
                );
                ActionFeedback::success(text)
            }
            None => ActionFeedback::info("Profiler was not running"),
        }
    }

    pub fn toggle_interactions(&self, agent: &Agent) -> ActionFeedback {
        if !agent.is_mounted() {
            return ActionFeedback::error(NOT_MOUNTED);
        }
        if agent.toggle_interaction_tracking() {
            ActionFeedback::success("Interaction tracking on")
        } else {
            ActionFeedback::info("Interaction tracking off")
        }
    }

    pub fn toggle_monitoring(&self, agent: &Agent) -> ActionFeedback {
        let Some(capture) = agent.capture() else {
            return ActionFeedback::error(NOT_MOUNTED);
        };
        if agent.set_monitoring(!capture.network().is_monitoring()) {
            ActionFeedback::success("Network monitoring on")
        } else {
            ActionFeedback::info("Network monitoring off")
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Security
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn end_session(&mut self, agent: &mut Agent) -> ActionFeedback {
        self.purge_armed = false;
        agent.end_session();
        ActionFeedback::success("Session ended")
    }

    /// First press arms the purge; the second one runs it.
    pub fn request_purge(&mut self, agent: &Agent) -> ActionFeedback {
        if !agent.is_mounted() {
            return ActionFeedback::error(NOT_MOUNTED);
        }
        if !self.purge_armed {
            self.purge_armed = true;
            return ActionFeedback::warning("Press again to delete all captured data");
        }
        self.purge_armed = false;
        let removed = agent.purge_all();
        ActionFeedback::success(format!("Purged {} captured entr(ies)", removed))
    }

    pub fn cancel_purge(&mut self) {
        self.purge_armed = false;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Text rendering
    // ─────────────────────────────────────────────────────────────────────────────

    /// Plain-text rendering of the active tab.
    pub fn render(&self, agent: &Agent) -> String {
        let mut out = String::new();
        if let Some(banner) = self.banner(agent) {
            let _ = writeln!(out, "! {}", banner);
        }
        let tabs: Vec<String> = PanelTab::ALL
            .iter()
            .map(|tab| {
                if *tab == self.state.active_tab {
                    format!("[{}]", tab.title())
                } else {
                    tab.title().to_string()
                }
            })
            .collect();
        let _ = writeln!(out, "{}", tabs.join(" | "));

        match self.state.active_tab {
            PanelTab::General => match self.general(agent) {
                Some(snapshot) => render_general(&mut out, &snapshot),
                None => {
                    let _ = writeln!(out, "{}", NOT_MOUNTED);
                }
            },
            PanelTab::Console => {
                for entry in self.console_entries(agent, None) {
                    let _ = writeln!(
                        out,
                        "{} {:5} {}",
                        entry.timestamp.format("%H:%M:%S"),
                        entry.level.as_str(),
                        entry.message
                    );
                }
            }
            PanelTab::Network => {
                for request in self.network_entries(agent) {
                    let status = request
                        .status
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "ERR".to_string());
                    let _ = writeln!(
                        out,
                        "{} {} {} {:.0}ms",
                        request.method, request.url, status, request.duration_ms
                    );
                }
            }
            PanelTab::Tools => {
                let _ = writeln!(
                    out,
                    "diagnostics · storage · clear site storage · theme · profiler · interactions · network"
                );
            }
        }
        out
    }
}

fn render_general(out: &mut String, snapshot: &DebugSnapshot) {
    let counts = &snapshot.counts;
    let _ = writeln!(
        out,
        "build {} · route {}",
        snapshot.build_id.as_deref().unwrap_or("unknown"),
        snapshot.current_route.as_deref().unwrap_or("/")
    );
    let _ = writeln!(
        out,
        "viewport {}x{} · document {}x{} · {} elements · {} images · framework {}",
        snapshot.viewport.width,
        snapshot.viewport.height,
        snapshot.document_width,
        snapshot.document_height,
        snapshot.element_count,
        snapshot.image_count,
        snapshot.framework_version.as_deref().unwrap_or("unknown")
    );
    if !snapshot.storage_available {
        let _ = writeln!(out, "storage unavailable; history is memory-only");
    }
    let _ = writeln!(
        out,
        "logs {} ({} errors, {} warnings) · requests {} ({} failed) · routes {} · interactions {}",
        counts.logs,
        counts.errors,
        counts.warnings,
        counts.requests,
        counts.failed_requests,
        counts.routes,
        counts.interactions
    );
    match snapshot.session_remaining_secs {
        Some(secs) => {
            let _ = writeln!(
                out,
                "session {} · {}m {:02}s left",
                snapshot.session_state,
                secs / 60,
                secs % 60
            );
        }
        None => {
            let _ = writeln!(out, "session {}", snapshot.session_state);
        }
    }
}
