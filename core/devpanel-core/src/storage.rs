//! Ephemeral, tab-scoped key/value storage.
//!
//! The agent persists its history, panel chrome and session record here so
//! they survive one page reload. Hosts provide the backend:
//!
//! - [`MemoryStorage`]: in-process map, optional byte quota and an
//!   availability switch (private browsing, disabled storage).
//! - [`FileStorage`]: one JSON file per key inside a directory, written
//!   atomically (temp file + rename). Used by the CLI so a second invocation
//!   sees what the first one captured.
//!
//! All methods take `&self`; implementations use interior mutability because a
//! single storage handle is shared by several components on one thread.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{PanelError, Result};

const FILE_EXTENSION: &str = "json";

pub trait EphemeralStorage {
    fn is_available(&self) -> bool;
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;

    fn clear(&self) -> Result<()> {
        for key in self.keys()? {
            self.remove_item(&key)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory backend
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct MemoryStorage {
    entries: RefCell<BTreeMap<String, String>>,
    /// Total bytes (keys + values) the store may hold.
    quota: Option<usize>,
    available: Cell<bool>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(BTreeMap::new()),
            quota: None,
            available: Cell::new(true),
        }
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::new()
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    pub fn used_bytes(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.get() {
            Ok(())
        } else {
            Err(PanelError::StorageUnavailable)
        }
    }
}

impl EphemeralStorage for MemoryStorage {
    fn is_available(&self) -> bool {
        self.available.get()
    }

    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.ensure_available()?;
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_available()?;
        if let Some(quota) = self.quota {
            let existing = self
                .entries
                .borrow()
                .get(key)
                .map(|v| key.len() + v.len())
                .unwrap_or(0);
            let needed = self.used_bytes() - existing + key.len() + value.len();
            if needed > quota {
                return Err(PanelError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.ensure_available()?;
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.ensure_available()?;
        Ok(self.entries.borrow().keys().cloned().collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Directory backend
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Opens (and creates if needed) a storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs_err::create_dir_all(&dir).map_err(|e| PanelError::io("creating storage dir", e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(PanelError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.{}", key, FILE_EXTENSION)))
    }
}

impl EphemeralStorage for FileStorage {
    fn is_available(&self) -> bool {
        self.dir.is_dir()
    }

    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs_err::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PanelError::io(format!("reading storage key {}", key), err)),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let mut temp_file = NamedTempFile::new_in(&self.dir)
            .map_err(|e| PanelError::io("creating temp storage file", e))?;
        temp_file
            .write_all(value.as_bytes())
            .map_err(|e| PanelError::io("writing temp storage file", e))?;
        temp_file
            .flush()
            .map_err(|e| PanelError::io("flushing temp storage file", e))?;
        temp_file
            .persist(&path)
            .map_err(|e| PanelError::io(format!("committing storage key {}", key), e.error))?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs_err::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PanelError::io(format!("removing storage key {}", key), err)),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries =
            fs_err::read_dir(&self.dir).map_err(|e| PanelError::io("listing storage dir", e))?;
        let mut keys: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                    return None;
                }
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(|stem| stem.to_string())
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_storage_round_trips_items() {
        let storage = MemoryStorage::new();
        storage.set_item("logs", "[]").unwrap();
        assert_eq!(storage.get_item("logs").unwrap().as_deref(), Some("[]"));
        storage.remove_item("logs").unwrap();
        assert_eq!(storage.get_item("logs").unwrap(), None);
    }

    #[test]
    fn memory_storage_enforces_quota() {
        let storage = MemoryStorage::with_quota(16);
        storage.set_item("a", "1234").unwrap();
        let err = storage.set_item("b", "0123456789abcdef").unwrap_err();
        assert!(matches!(err, PanelError::QuotaExceeded { .. }));
        // Overwriting an existing key only counts the delta.
        storage.set_item("a", "12345678").unwrap();
    }

    #[test]
    fn unavailable_memory_storage_fails_every_call() {
        let storage = MemoryStorage::new();
        storage.set_available(false);
        assert!(!storage.is_available());
        assert!(matches!(
            storage.get_item("logs"),
            Err(PanelError::StorageUnavailable)
        ));
        assert!(storage.set_item("logs", "[]").is_err());
    }

    #[test]
    fn clear_removes_everything() {
        let storage = MemoryStorage::new();
        storage.set_item("a", "1").unwrap();
        storage.set_item("b", "2").unwrap();
        storage.clear().unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn file_storage_persists_across_handles() {
        let temp = TempDir::new().unwrap();
        let first = FileStorage::open(temp.path().join("tab")).unwrap();
        first.set_item("debugSession", r#"{"startedAt":1}"#).unwrap();

        let second = FileStorage::open(temp.path().join("tab")).unwrap();
        assert_eq!(
            second.get_item("debugSession").unwrap().as_deref(),
            Some(r#"{"startedAt":1}"#)
        );
        assert_eq!(second.keys().unwrap(), vec!["debugSession".to_string()]);
    }

    #[test]
    fn file_storage_rejects_path_like_keys() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        assert!(matches!(
            storage.set_item("../escape", "x"),
            Err(PanelError::InvalidKey(_))
        ));
    }

    #[test]
    fn file_storage_remove_missing_is_ok() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        storage.remove_item("logs").unwrap();
        assert_eq!(storage.get_item("logs").unwrap(), None);
    }
}
