//! Compiled regex patterns shared across the agent.
//!
//! These are compiled once on first use. The redaction defaults mark the
//! sensitive part with `secret*` capture groups so only that span is replaced.

use once_cell::sync::Lazy;
use regex::Regex;

// ═══════════════════════════════════════════════════════════════════════════════
// Default Redaction Patterns
// ═══════════════════════════════════════════════════════════════════════════════

/// `token=abc`, `password: hunter2`, `api_key="..."` in query strings and free text.
///
/// A quoted value is captured up to its closing quote; a bare one up to the
/// next delimiter. Every value group is named `secret*`.
pub static RE_SECRET_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?:access[_-]?token|refresh[_-]?token|id[_-]?token|api[_-]?key|apikey|token|password|passwd|pwd|secret|session[_-]?id|auth)\s*[=:]\s*(?:"(?P<secret>[^"]*)"|'(?P<secret_single>[^']*)'|(?P<secret_bare>[^&\s"',;]+))"#,
    )
    .unwrap()
});

/// `Authorization: Bearer eyJ...`
pub static RE_BEARER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bbearer\s+(?P<secret>[A-Za-z0-9\-._~+/]+=*)").unwrap()
});

/// Any `"key": "value"` or `"key": 123` pair inside already-stringified JSON.
///
/// Matches every pair; the redactor decides from `key` whether the value is
/// sensitive, using the same rules it applies to parsed objects.
pub static RE_JSON_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#""(?P<key>(?:[^"\\]|\\.)*)"\s*:\s*(?:"(?P<secret>(?:[^"\\]|\\.)*)"|(?P<secret_number>-?\d[0-9.eE+-]*))"#,
    )
    .unwrap()
});

/// Default pattern set, applied in order after the JSON pair pass.
pub fn default_redaction_patterns() -> Vec<Regex> {
    vec![RE_BEARER.clone(), RE_SECRET_ASSIGNMENT.clone()]
}

// ═══════════════════════════════════════════════════════════════════════════════
// Host Metadata
// ═══════════════════════════════════════════════════════════════════════════════

/// Leading `major.minor` of a framework version string (`18.2.0`, `v16.14.0`).
pub static RE_VERSION_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*v?(\d+)\.(\d+)").unwrap());
