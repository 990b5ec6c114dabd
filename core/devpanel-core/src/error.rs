//! Error types for devpanel-core operations.
//!
//! Capture paths never surface these to the host page; they are logged and
//! degraded locally. Only configuration loading and explicit operator
//! actions (storage inspection, file-backed storage setup) return them.

use std::path::PathBuf;

/// All errors that can occur in devpanel-core operations.
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid redaction pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Ephemeral storage unavailable")]
    StorageUnavailable,

    #[error("Storage quota exceeded writing {key}: {needed} bytes over a {quota} byte quota")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using PanelError.
pub type Result<T> = std::result::Result<T, PanelError>;

impl PanelError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PanelError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<PanelError> for String {
    fn from(err: PanelError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_error_names_the_key() {
        let err = PanelError::QuotaExceeded {
            key: "logs".to_string(),
            needed: 120,
            quota: 100,
        };
        assert!(err.to_string().contains("logs"));
        assert!(err.to_string().contains("100 byte quota"));
    }

    #[test]
    fn converts_into_string() {
        let message: String = PanelError::StorageUnavailable.into();
        assert_eq!(message, "Ephemeral storage unavailable");
    }
}
