//! Captured history: one bounded buffer per event category, mirrored into
//! ephemeral storage so it survives a reload of the same tab.
//!
//! # Persistence
//!
//! Each mutation re-serializes the touched category under its storage key
//! (`logs`, `apiRequests`, `routeChanges`, `userInteractions`) as a JSON array.
//! Write failures (storage unavailable, quota exceeded) are logged and counted;
//! the in-memory buffers keep working regardless.
//!
//! # Loading
//!
//! [`HistoryStore::rehydrate`] treats a missing key, an unreadable storage or
//! corrupt JSON as an empty category. Persisted entries beyond the configured
//! capacity are trimmed to the newest ones.

use std::cell::RefCell;
use std::rc::Rc;

use devpanel_protocol::{
    decode_entries, encode_entries, keys, LogEntry, LogLevel, NetworkRequest, RouteChange,
    UserInteraction,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::buffer::BoundedBuffer;
use crate::config::BufferConfig;
use crate::storage::EphemeralStorage;

/// Shared handle used by every capture component on the UI thread.
pub type SharedHistory = Rc<RefCell<HistoryStore>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryCounts {
    pub logs: usize,
    pub errors: usize,
    pub warnings: usize,
    pub requests: usize,
    pub failed_requests: usize,
    pub routes: usize,
    pub interactions: usize,
}

pub struct HistoryStore {
    logs: BoundedBuffer<LogEntry>,
    network: BoundedBuffer<NetworkRequest>,
    routes: BoundedBuffer<RouteChange>,
    interactions: BoundedBuffer<UserInteraction>,
    storage: Rc<dyn EphemeralStorage>,
    persistence_failures: u64,
}

impl HistoryStore {
    /// Empty store; nothing is read from storage.
    pub fn new(capacities: &BufferConfig, storage: Rc<dyn EphemeralStorage>) -> Self {
        Self {
            logs: BoundedBuffer::new(capacities.logs),
            network: BoundedBuffer::new(capacities.network),
            routes: BoundedBuffer::new(capacities.routes),
            interactions: BoundedBuffer::new(capacities.interactions),
            storage,
            persistence_failures: 0,
        }
    }

    /// Rebuilds the store from what a previous page load persisted.
    pub fn rehydrate(capacities: &BufferConfig, storage: Rc<dyn EphemeralStorage>) -> Self {
        let logs = load_category::<LogEntry>(storage.as_ref(), keys::LOGS);
        let network = load_category::<NetworkRequest>(storage.as_ref(), keys::API_REQUESTS);
        let routes = load_category::<RouteChange>(storage.as_ref(), keys::ROUTE_CHANGES);
        let interactions =
            load_category::<UserInteraction>(storage.as_ref(), keys::USER_INTERACTIONS);

        debug!(
            logs = logs.len(),
            requests = network.len(),
            routes = routes.len(),
            interactions = interactions.len(),
            "Rehydrated capture history"
        );

        Self {
            logs: BoundedBuffer::from_items(capacities.logs, logs),
            network: BoundedBuffer::from_items(capacities.network, network),
            routes: BoundedBuffer::from_items(capacities.routes, routes),
            interactions: BoundedBuffer::from_items(capacities.interactions, interactions),
            storage,
            persistence_failures: 0,
        }
    }

    pub fn into_shared(self) -> SharedHistory {
        Rc::new(RefCell::new(self))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Inserts
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn push_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
        self.persist_logs();
    }

    pub fn push_request(&mut self, request: NetworkRequest) {
        self.network.push(request);
        let result = persist_category(self.storage.as_ref(), keys::API_REQUESTS, &self.network);
        self.record_persist(keys::API_REQUESTS, result);
    }

    /// Appends a navigation unless it repeats the current destination.
    pub fn push_route(&mut self, route: RouteChange) -> bool {
        if self
            .routes
            .latest()
            .is_some_and(|last| last.to == route.to)
        {
            return false;
        }
        self.routes.push(route);
        let result = persist_category(self.storage.as_ref(), keys::ROUTE_CHANGES, &self.routes);
        self.record_persist(keys::ROUTE_CHANGES, result);
        true
    }

    pub fn push_interaction(&mut self, interaction: UserInteraction) {
        self.interactions.push(interaction);
        let result = persist_category(
            self.storage.as_ref(),
            keys::USER_INTERACTIONS,
            &self.interactions,
        );
        self.record_persist(keys::USER_INTERACTIONS, result);
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn logs(&self) -> &BoundedBuffer<LogEntry> {
        &self.logs
    }

    pub fn requests(&self) -> &BoundedBuffer<NetworkRequest> {
        &self.network
    }

    pub fn routes(&self) -> &BoundedBuffer<RouteChange> {
        &self.routes
    }

    pub fn interactions(&self) -> &BoundedBuffer<UserInteraction> {
        &self.interactions
    }

    pub fn request(&self, id: &str) -> Option<&NetworkRequest> {
        self.network.find(|r| r.id == id)
    }

    pub fn current_route(&self) -> Option<&str> {
        self.routes.latest().map(|r| r.to.as_str())
    }

    pub fn has_errors(&self) -> bool {
        self.logs.iter().any(|l| l.level == LogLevel::Error)
    }

    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures
    }

    pub fn counts(&self) -> HistoryCounts {
        HistoryCounts {
            logs: self.logs.len(),
            errors: self
                .logs
                .iter()
                .filter(|l| l.level == LogLevel::Error)
                .count(),
            warnings: self
                .logs
                .iter()
                .filter(|l| l.level == LogLevel::Warn)
                .count(),
            requests: self.network.len(),
            failed_requests: self.network.iter().filter(|r| r.is_failure()).count(),
            routes: self.routes.len(),
            interactions: self.interactions.len(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Purge
    // ─────────────────────────────────────────────────────────────────────────────

    /// Empties every buffer and removes every persisted category.
    pub fn clear_all(&mut self) {
        self.logs.clear();
        self.network.clear();
        self.routes.clear();
        self.interactions.clear();
        for key in keys::HISTORY {
            if let Err(err) = self.storage.remove_item(key) {
                self.persistence_failures += 1;
                warn!(key, error = %err, "Failed to remove persisted history");
            }
        }
    }

    fn persist_logs(&mut self) {
        let result = persist_category(self.storage.as_ref(), keys::LOGS, &self.logs);
        self.record_persist(keys::LOGS, result);
    }

    fn record_persist(&mut self, key: &str, result: Result<(), String>) {
        if let Err(err) = result {
            self.persistence_failures += 1;
            warn!(key, error = %err, "Failed to persist history; keeping in-memory copy");
        }
    }
}

fn persist_category<T: Serialize>(
    storage: &dyn EphemeralStorage,
    key: &str,
    buffer: &BoundedBuffer<T>,
) -> Result<(), String> {
    let payload = encode_entries(buffer.iter())
        .map_err(|e| format!("Failed to serialize {}: {}", key, e))?;
    storage.set_item(key, &payload).map_err(String::from)
}

fn load_category<T: DeserializeOwned>(storage: &dyn EphemeralStorage, key: &str) -> Vec<T> {
    let raw = match storage.get_item(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(err) => {
            warn!(key, error = %err, "Failed to read persisted history");
            return Vec::new();
        }
    };

    match decode_entries(&raw) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(key, error = %err, "Corrupt persisted history, starting empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::{TimeZone, Utc};

    fn log(n: usize, level: LogLevel) -> LogEntry {
        LogEntry {
            id: format!("log-{}", n),
            message: format!("message {}", n),
            level,
            timestamp: Utc.timestamp_opt(1_700_000_000 + n as i64, 0).unwrap(),
        }
    }

    fn route(from: &str, to: &str) -> RouteChange {
        RouteChange {
            from: from.to_string(),
            to: to.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn small() -> BufferConfig {
        BufferConfig {
            logs: 5,
            network: 5,
            routes: 5,
            interactions: 5,
        }
    }

    #[test]
    fn pushes_are_persisted_and_rehydrated() {
        let storage: Rc<dyn EphemeralStorage> = Rc::new(MemoryStorage::new());
        let mut store = HistoryStore::new(&small(), Rc::clone(&storage));
        for n in 1..=10 {
            store.push_log(log(n, LogLevel::Info));
        }

        let reloaded = HistoryStore::rehydrate(&small(), storage);
        let ids: Vec<String> = reloaded.logs().iter().map(|l| l.id.clone()).collect();
        assert_eq!(ids, vec!["log-6", "log-7", "log-8", "log-9", "log-10"]);
        assert_eq!(
            reloaded.logs().latest().unwrap().timestamp,
            Utc.timestamp_opt(1_700_000_010, 0).unwrap()
        );
    }

    #[test]
    fn rehydrate_trims_to_smaller_capacity() {
        let storage: Rc<dyn EphemeralStorage> = Rc::new(MemoryStorage::new());
        let mut store = HistoryStore::new(&BufferConfig::default(), Rc::clone(&storage));
        for n in 1..=8 {
            store.push_log(log(n, LogLevel::Info));
        }
        let reloaded = HistoryStore::rehydrate(&small(), storage);
        assert_eq!(reloaded.logs().len(), 5);
        assert_eq!(reloaded.logs().iter().next().unwrap().id, "log-4");
    }

    #[test]
    fn corrupt_storage_degrades_to_empty() {
        let storage = Rc::new(MemoryStorage::new());
        storage.set_item(keys::LOGS, "{not json").unwrap();
        let store = HistoryStore::rehydrate(&small(), storage);
        assert!(store.logs().is_empty());
    }

    #[test]
    fn unavailable_storage_keeps_buffers_working() {
        let storage = Rc::new(MemoryStorage::new());
        storage.set_available(false);
        let mut store = HistoryStore::new(&small(), storage);
        store.push_log(log(1, LogLevel::Error));
        assert_eq!(store.logs().len(), 1);
        assert_eq!(store.persistence_failures(), 1);
        assert!(store.has_errors());
    }

    #[test]
    fn quota_exceeded_keeps_buffers_working() {
        let storage = Rc::new(MemoryStorage::with_quota(200));
        let mut store = HistoryStore::new(&small(), storage.clone());
        for n in 0..5 {
            store.push_log(log(n, LogLevel::Info));
        }
        assert!(store.push_route(route("/", "/checkout")));

        assert_eq!(store.logs().len(), 5);
        assert_eq!(store.current_route(), Some("/checkout"));
        assert!(store.persistence_failures() > 0);
        assert!(storage.used_bytes() <= 200);
    }

    #[test]
    fn consecutive_duplicate_routes_are_skipped() {
        let storage = Rc::new(MemoryStorage::new());
        let mut store = HistoryStore::new(&small(), storage);
        assert!(store.push_route(route("/", "/inventory")));
        assert!(!store.push_route(route("/inventory", "/inventory")));
        assert!(store.push_route(route("/inventory", "/sessions")));
        assert!(store.push_route(route("/sessions", "/inventory")));
        assert_eq!(store.routes().len(), 3);
        assert_eq!(store.current_route(), Some("/inventory"));
    }

    #[test]
    fn clear_all_removes_persisted_categories() {
        let storage = Rc::new(MemoryStorage::new());
        storage.set_item("hostCart", "[1,2]").unwrap();
        let mut store = HistoryStore::new(&small(), storage.clone());
        store.push_log(log(1, LogLevel::Warn));
        store.push_route(route("/", "/a"));

        store.clear_all();

        assert_eq!(store.counts(), HistoryCounts::default());
        assert_eq!(storage.get_item(keys::LOGS).unwrap(), None);
        assert_eq!(storage.get_item(keys::ROUTE_CHANGES).unwrap(), None);
        assert_eq!(storage.get_item("hostCart").unwrap().as_deref(), Some("[1,2]"));
    }

    #[test]
    fn counts_split_levels() {
        let storage = Rc::new(MemoryStorage::new());
        let mut store = HistoryStore::new(&small(), storage);
        store.push_log(log(1, LogLevel::Info));
        store.push_log(log(2, LogLevel::Warn));
        store.push_log(log(3, LogLevel::Error));
        let counts = store.counts();
        assert_eq!(counts.logs, 3);
        assert_eq!(counts.warnings, 1);
        assert_eq!(counts.errors, 1);
    }
}
