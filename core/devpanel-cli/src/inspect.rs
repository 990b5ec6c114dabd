//! Read-only view of the history a page left in the state directory.
//!
//! Nothing is wrapped or mounted here; the buffers are rehydrated straight
//! from storage and printed the way the matching panel tab shows them.

use std::path::Path;
use std::rc::Rc;

use devpanel_core::diagnostics::inspect_storage;
use devpanel_core::{AgentConfig, EphemeralStorage, FileStorage, HistoryStore};
use devpanel_protocol::{keys, LogLevel, PanelTab, SessionRecord};
use serde_json::json;

pub fn run(
    config: &AgentConfig,
    state_dir: &Path,
    tab: PanelTab,
    level: Option<LogLevel>,
    as_json: bool,
) -> Result<(), String> {
    if !state_dir.is_dir() {
        return Err(format!("No captured state at {}", state_dir.display()));
    }
    let storage: Rc<dyn EphemeralStorage> = Rc::new(FileStorage::open(state_dir)?);
    let history = HistoryStore::rehydrate(&config.buffers, Rc::clone(&storage));
    tracing::debug!(dir = %state_dir.display(), tab = tab.title(), "Inspecting captured state");

    let output = match tab {
        PanelTab::General => general(&history, storage.as_ref(), as_json)?,
        PanelTab::Console => console(&history, level, as_json)?,
        PanelTab::Network => network(&history, as_json)?,
        PanelTab::Tools => tools(storage.as_ref(), as_json)?,
    };
    println!("{}", output);
    Ok(())
}

fn to_json(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Failed to encode output: {}", e))
}

fn persisted_session(storage: &dyn EphemeralStorage) -> Option<SessionRecord> {
    let raw = storage.get_item(keys::SESSION).ok()??;
    serde_json::from_str(&raw).ok()
}

fn general(
    history: &HistoryStore,
    storage: &dyn EphemeralStorage,
    as_json: bool,
) -> Result<String, String> {
    let counts = history.counts();
    let session = persisted_session(storage);
    if as_json {
        return to_json(&json!({
            "currentRoute": history.current_route(),
            "session": session,
            "counts": counts,
        }));
    }

    let mut lines = vec![
        format!("Route:        {}", history.current_route().unwrap_or("-")),
        match session {
            Some(record) => format!(
                "Session:      started {} / last activity {}",
                record.started_at.to_rfc3339(),
                record.last_activity_at.to_rfc3339()
            ),
            None => "Session:      none".to_string(),
        },
        format!(
            "Logs:         {} ({} errors, {} warnings)",
            counts.logs, counts.errors, counts.warnings
        ),
        format!(
            "Requests:     {} ({} failed)",
            counts.requests, counts.failed_requests
        ),
        format!("Routes:       {}", counts.routes),
        format!("Interactions: {}", counts.interactions),
    ];
    if let Some(last) = history.interactions().latest() {
        lines.push(format!(
            "Last input:   {} on {}",
            last.kind.as_str(),
            last.target_descriptor
        ));
    }
    Ok(lines.join("\n"))
}

fn console(
    history: &HistoryStore,
    level: Option<LogLevel>,
    as_json: bool,
) -> Result<String, String> {
    let entries: Vec<_> = history
        .logs()
        .iter()
        .rev()
        .filter(|entry| level.map_or(true, |wanted| entry.level == wanted))
        .collect();
    if as_json {
        return to_json(&entries);
    }
    if entries.is_empty() {
        return Ok("No console entries".to_string());
    }
    Ok(entries
        .iter()
        .map(|entry| {
            format!(
                "{} {:>5}  {}",
                entry.timestamp.format("%H:%M:%S"),
                entry.level,
                entry.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

fn network(history: &HistoryStore, as_json: bool) -> Result<String, String> {
    let requests: Vec<_> = history.requests().iter().rev().collect();
    if as_json {
        return to_json(&requests);
    }
    if requests.is_empty() {
        return Ok("No requests".to_string());
    }
    Ok(requests
        .iter()
        .map(|request| {
            let status = match (&request.error, request.status) {
                (Some(error), _) => format!("ERR {}", error),
                (None, Some(status)) => status.to_string(),
                (None, None) => "-".to_string(),
            };
            format!(
                "{:<6} {:<40} {:>8} {:>8.1}ms",
                request.method, request.url, status, request.duration_ms
            )
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

fn tools(storage: &dyn EphemeralStorage, as_json: bool) -> Result<String, String> {
    let entries = inspect_storage(storage)?;
    if as_json {
        return to_json(&entries);
    }
    if entries.is_empty() {
        return Ok("Storage is empty".to_string());
    }
    Ok(entries
        .iter()
        .map(|entry| {
            let owner = if entry.agent_owned { "agent" } else { "site" };
            format!("{:<20} {:>8} bytes  {}", entry.key, entry.bytes, owner)
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use devpanel_core::MemoryStorage;

    #[test]
    fn general_reports_empty_storage() {
        let storage: Rc<dyn EphemeralStorage> = Rc::new(MemoryStorage::new());
        let history = HistoryStore::rehydrate(&AgentConfig::default().buffers, Rc::clone(&storage));
        let text = general(&history, storage.as_ref(), false).unwrap();
        assert!(text.contains("Route:        -"));
        assert!(text.contains("Session:      none"));
    }

    #[test]
    fn console_filters_by_level() {
        let storage: Rc<dyn EphemeralStorage> = Rc::new(MemoryStorage::new());
        storage
            .set_item(
                keys::LOGS,
                r#"[{"id":"a","message":"fine","level":"info","timestamp":"2024-01-01T00:00:00Z"},
                    {"id":"b","message":"broken","level":"error","timestamp":"2024-01-01T00:00:01Z"}]"#,
            )
            .unwrap();
        let history = HistoryStore::rehydrate(&AgentConfig::default().buffers, storage);
        let text = console(&history, Some(LogLevel::Error), false).unwrap();
        assert!(text.contains("broken"));
        assert!(!text.contains("fine"));
    }

    #[test]
    fn missing_state_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let result = run(&AgentConfig::default(), &missing, PanelTab::General, None, false);
        assert!(result.unwrap_err().contains("No captured state"));
    }
}
