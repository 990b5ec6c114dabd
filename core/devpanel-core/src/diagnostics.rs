//! Read-only views for the General and Tools tabs.
//!
//! Nothing here mutates page, history or storage state: a diagnostics run
//! only reads the current [`PageFacts`] and history counts and turns them into
//! a short text report.

use chrono::{DateTime, Utc};
use devpanel_protocol::keys;
use serde::Serialize;

use crate::error::Result;
use crate::history::{HistoryCounts, HistoryStore};
use crate::host::{PageFacts, Viewport};
use crate::storage::EphemeralStorage;

/// Past this many elements the page is flagged as heavy.
pub const LARGE_DOM_ELEMENTS: usize = 1500;

/// Everything the General tab shows in one read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub captured_at: DateTime<Utc>,
    pub build_id: Option<String>,
    pub user_agent: Option<String>,
    pub framework_version: Option<String>,
    pub viewport: Viewport,
    pub document_width: u32,
    pub document_height: u32,
    pub element_count: usize,
    pub image_count: usize,
    pub storage_available: bool,
    pub current_route: Option<String>,
    pub session_state: &'static str,
    pub session_remaining_secs: Option<i64>,
    pub monitoring: bool,
    pub tracking_interactions: bool,
    pub profiling: bool,
    pub counts: HistoryCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Info,
    Warning,
}

impl Severity {
    fn icon(&self) -> &'static str {
        match self {
            Severity::Ok => "✓",
            Severity::Info => "•",
            Severity::Warning => "!",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub check: &'static str,
    pub message: String,
}

impl Finding {
    fn new(severity: Severity, check: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity,
            check,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsReport {
    pub findings: Vec<Finding>,
}

impl DiagnosticsReport {
    pub fn warnings(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
            .count()
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for finding in &self.findings {
            out.push_str(&format!(
                "{} {}: {}\n",
                finding.severity.icon(),
                finding.check,
                finding.message
            ));
        }
        out.push_str(&format!(
            "{} check(s), {} warning(s)",
            self.findings.len(),
            self.warnings()
        ));
        out
    }
}

/// Sweeps the page facts and history for common problems.
pub fn run_diagnostics(facts: &PageFacts, history: &HistoryStore) -> DiagnosticsReport {
    let mut findings = Vec::new();

    let width = facts.viewport.width;
    if width > 0 && facts.document_width > width {
        findings.push(Finding::new(
            Severity::Warning,
            "layout",
            format!(
                "Horizontal overflow: document is {}px wide in a {}px viewport",
                facts.document_width, width
            ),
        ));
    } else {
        findings.push(Finding::new(Severity::Ok, "layout", "No horizontal overflow"));
    }

    let unresolved: Vec<&str> = facts
        .images
        .iter()
        .filter(|img| img.is_unresolved())
        .map(|img| img.src.as_str())
        .collect();
    if unresolved.is_empty() {
        findings.push(Finding::new(
            Severity::Ok,
            "images",
            format!("{} image(s) loaded", facts.images.len()),
        ));
    } else {
        findings.push(Finding::new(
            Severity::Warning,
            "images",
            format!(
                "{} unresolved image(s): {}",
                unresolved.len(),
                unresolved.join(", ")
            ),
        ));
    }

    let counts = history.counts();
    if counts.errors > 0 {
        findings.push(Finding::new(
            Severity::Warning,
            "console",
            format!("{} error-level log entr(ies) captured", counts.errors),
        ));
    } else {
        findings.push(Finding::new(Severity::Ok, "console", "No errors captured"));
    }
    if counts.failed_requests > 0 {
        findings.push(Finding::new(
            Severity::Warning,
            "network",
            format!(
                "{} of {} request(s) failed",
                counts.failed_requests, counts.requests
            ),
        ));
    }

    if facts.element_count > LARGE_DOM_ELEMENTS {
        findings.push(Finding::new(
            Severity::Warning,
            "dom",
            format!("{} elements on the page", facts.element_count),
        ));
    }

    let timing = &facts.timing;
    match (timing.dom_content_loaded_ms, timing.load_ms) {
        (None, None) => findings.push(Finding::new(
            Severity::Info,
            "timing",
            "No navigation timing reported",
        )),
        (dcl, load) => findings.push(Finding::new(
            Severity::Info,
            "timing",
            format!(
                "DOMContentLoaded {}, load {}",
                format_ms(dcl),
                format_ms(load)
            ),
        )),
    }

    DiagnosticsReport { findings }
}

fn format_ms(value: Option<f64>) -> String {
    match value {
        Some(ms) => format!("{:.0}ms", ms),
        None => "n/a".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEntry {
    pub key: String,
    pub bytes: usize,
    pub agent_owned: bool,
}

/// Lists every storage key with its value size.
pub fn inspect_storage(storage: &dyn EphemeralStorage) -> Result<Vec<StorageEntry>> {
    let mut entries = Vec::new();
    for key in storage.keys()? {
        let bytes = storage.get_item(&key)?.map(|v| v.len()).unwrap_or(0);
        entries.push(StorageEntry {
            agent_owned: keys::is_agent_key(&key),
            key,
            bytes,
        });
    }
    Ok(entries)
}
