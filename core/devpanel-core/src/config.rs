//! Agent configuration.
//!
//! Loaded from TOML; every field has a default so a missing file or a partial
//! file is fine. Only a file that exists but does not parse is an error.
//!
//! ```toml
//! allowed_user_id = "user_2abc"
//!
//! [session]
//! timeout_secs = 1800
//!
//! [redaction]
//! extra_patterns = ['acct-(\d+)']
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PanelError, Result};
use crate::redaction::Redactor;

pub const DEFAULT_LOG_CAPACITY: usize = 100;
pub const DEFAULT_NETWORK_CAPACITY: usize = 50;
pub const DEFAULT_ROUTE_CAPACITY: usize = 50;
pub const DEFAULT_INTERACTION_CAPACITY: usize = 100;

pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 30 * 60; // 30 minutes
pub const DEFAULT_SESSION_CHECK_INTERVAL_SECS: i64 = 60;

pub const DEFAULT_RESPONSE_PREVIEW_CHARS: usize = 1000;

pub const DEFAULT_PROFILER_TOP_K: usize = 10;
/// One frame at 60Hz.
pub const DEFAULT_SLOW_RENDER_MS: f64 = 16.0;
pub const DEFAULT_MIN_FRAMEWORK_VERSION: &str = "16.5";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// The one identity allowed to mount the agent. Empty denies everyone.
    pub allowed_user_id: String,
    pub buffers: BufferConfig,
    pub session: SessionConfig,
    pub network: NetworkConfig,
    pub redaction: RedactionConfig,
    pub profiler: ProfilerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub logs: usize,
    pub network: usize,
    pub routes: usize,
    pub interactions: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            logs: DEFAULT_LOG_CAPACITY,
            network: DEFAULT_NETWORK_CAPACITY,
            routes: DEFAULT_ROUTE_CAPACITY,
            interactions: DEFAULT_INTERACTION_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub timeout_secs: i64,
    pub check_interval_secs: i64,
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::seconds(self.timeout_secs.max(1))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::seconds(self.check_interval_secs.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            check_interval_secs: DEFAULT_SESSION_CHECK_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub response_preview_chars: usize,
    /// Start network monitoring as soon as the agent mounts.
    pub monitor_on_mount: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            response_preview_chars: DEFAULT_RESPONSE_PREVIEW_CHARS,
            monitor_on_mount: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RedactionConfig {
    pub extra_patterns: Vec<String>,
    pub extra_sensitive_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    pub top_k: usize,
    pub slow_render_ms: f64,
    pub min_framework_version: String,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_PROFILER_TOP_K,
            slow_render_ms: DEFAULT_SLOW_RENDER_MS,
            min_framework_version: DEFAULT_MIN_FRAMEWORK_VERSION.to_string(),
        }
    }
}

impl AgentConfig {
    pub fn for_user(allowed_user_id: impl Into<String>) -> Self {
        Self {
            allowed_user_id: allowed_user_id.into(),
            ..Self::default()
        }
    }

    /// Loads configuration, returning defaults if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs_err::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default())
            }
            Err(err) => return Err(PanelError::io("reading agent config", err)),
        };
        Self::from_toml(&content).map_err(|details| PanelError::ConfigMalformed {
            path: path.to_path_buf(),
            details,
        })
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Compiles the redaction rules; fails on an invalid extra pattern.
    pub fn build_redactor(&self) -> Result<Redactor> {
        Redactor::with_rules(
            &self.redaction.extra_patterns,
            &self.redaction.extra_sensitive_keys,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = AgentConfig::load(&temp.path().join("nope.toml")).unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.session.timeout(), Duration::minutes(30));
        assert!(config.network.monitor_on_mount);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AgentConfig::from_toml(
            r#"
allowed_user_id = "user_42"

[buffers]
logs = 5

[session]
timeout_secs = 120
"#,
        )
        .unwrap();
        assert_eq!(config.allowed_user_id, "user_42");
        assert_eq!(config.buffers.logs, 5);
        assert_eq!(config.buffers.network, DEFAULT_NETWORK_CAPACITY);
        assert_eq!(config.session.timeout_secs, 120);
        assert_eq!(
            config.session.check_interval_secs,
            DEFAULT_SESSION_CHECK_INTERVAL_SECS
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "allowed_user_id = [").unwrap();
        let err = AgentConfig::load(&path).unwrap_err();
        assert!(matches!(err, PanelError::ConfigMalformed { .. }));
    }

    #[test]
    fn invalid_extra_pattern_fails_redactor_build() {
        let mut config = AgentConfig::default();
        config.redaction.extra_patterns.push("[".to_string());
        assert!(config.build_redactor().is_err());
    }
}
