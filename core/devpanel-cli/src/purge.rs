//! Offline purge of captured history.
//!
//! Same two-step shape as the panel's purge button: without `--yes` it only
//! reports what would go. Host keys, panel state and the session record are
//! left alone.

use std::path::Path;
use std::rc::Rc;

use devpanel_core::{
    AgentConfig, AuditEvent, AuditLog, EphemeralStorage, FileStorage, HistoryStore, SystemClock,
};
use serde_json::json;

pub fn run(config: &AgentConfig, state_dir: &Path, confirmed: bool) -> Result<(), String> {
    if !state_dir.is_dir() {
        println!("Nothing to purge at {}", state_dir.display());
        return Ok(());
    }
    let storage: Rc<dyn EphemeralStorage> = Rc::new(FileStorage::open(state_dir)?);
    let mut history = HistoryStore::rehydrate(&config.buffers, storage);
    let counts = history.counts();
    let total = counts.logs + counts.requests + counts.routes + counts.interactions;

    if !confirmed {
        println!(
            "{} captured entries in {}. Run again with --yes to delete them.",
            total,
            state_dir.display()
        );
        return Ok(());
    }

    history.clear_all();
    if history.persistence_failures() > 0 {
        return Err(format!(
            "Purge incomplete: {} key(s) could not be removed",
            history.persistence_failures()
        ));
    }

    let audit = AuditLog::new(Rc::new(config.build_redactor()?), Rc::new(SystemClock));
    let line = audit.format(
        AuditEvent::DataPurged,
        json!({ "entries": total, "source": "cli" }),
    );
    tracing::info!(target: "devpanel::audit", event = AuditEvent::DataPurged.as_str(), "{}", line);
    println!("{}", line);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use devpanel_protocol::keys;

    fn seeded_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage
            .set_item(
                keys::ROUTE_CHANGES,
                r#"[{"from":"","to":"/home","timestamp":"2024-01-01T00:00:00Z"}]"#,
            )
            .unwrap();
        storage.set_item("hostPrefs", "{}").unwrap();
        dir
    }

    #[test]
    fn unconfirmed_purge_deletes_nothing() {
        let dir = seeded_dir();
        run(&AgentConfig::default(), dir.path(), false).unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        assert!(storage.get_item(keys::ROUTE_CHANGES).unwrap().is_some());
    }

    #[test]
    fn confirmed_purge_keeps_host_keys() {
        let dir = seeded_dir();
        run(&AgentConfig::default(), dir.path(), true).unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get_item(keys::ROUTE_CHANGES).unwrap(), None);
        assert_eq!(storage.get_item("hostPrefs").unwrap().as_deref(), Some("{}"));
    }
}
