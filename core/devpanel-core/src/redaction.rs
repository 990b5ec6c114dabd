//! Redaction engine.
//!
//! Every string the agent stores passes through a [`Redactor`] first. Two rule
//! families apply:
//!
//! - **Pattern rules** replace the sensitive capture group of each regex match
//!   (the first `secret*` group that took part, else group 1, else the whole
//!   match) and keep the surrounding text.
//! - **Key rules** replace the entire value of any object key whose name
//!   holds a sensitive keyword, whatever that value is. Keys are split into
//!   words on `_`, `-`, `.` and camelCase, so `apiKey` and `x-auth-token` are
//!   sensitive while `monkey`, `author` and `shipping` are not. Key rules also
//!   apply to `"key": value` pairs found inside plain strings.
//!
//! Redaction is pure, total and idempotent: `redact(redact(x)) == redact(x)`.

use regex::{Captures, Match, Regex};
use serde_json::{Map, Value};

use crate::error::{PanelError, Result};
use crate::patterns::{default_redaction_patterns, RE_JSON_PAIR};

pub const REDACTION_MARKER: &str = "***REDACTED***";

/// Containers nested deeper than this are replaced wholesale.
pub const MAX_REDACTION_DEPTH: usize = 32;

pub const DEPTH_PLACEHOLDER: &str = "[Max depth exceeded]";

/// Matched against the words of an object key, case-insensitively.
pub const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "token",
    "secret",
    "auth",
    "authorization",
    "session",
    "key",
    "apikey",
    "credential",
    "pin",
    "ssn",
    "cookie",
    "cvv",
];

#[derive(Debug, Clone)]
pub struct Redactor {
    patterns: Vec<Regex>,
    sensitive_keys: Vec<String>,
    marker: String,
}

impl Default for Redactor {
    fn default() -> Self {
        Self {
            patterns: default_redaction_patterns(),
            sensitive_keys: SENSITIVE_KEYS.iter().map(|k| k.to_string()).collect(),
            marker: REDACTION_MARKER.to_string(),
        }
    }
}

impl Redactor {
    /// Builds a redactor from the defaults plus operator-supplied rules.
    pub fn with_rules(extra_patterns: &[String], extra_keys: &[String]) -> Result<Self> {
        let mut redactor = Self::default();
        for pattern in extra_patterns {
            let regex = Regex::new(pattern).map_err(|source| PanelError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            redactor.patterns.push(regex);
        }
        for key in extra_keys {
            let key = normalize_keyword(key);
            if !key.is_empty() && !redactor.sensitive_keys.contains(&key) {
                redactor.sensitive_keys.push(key);
            }
        }
        Ok(redactor)
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// True when any word, or run of adjacent words, of `key` is a sensitive keyword.
    pub fn is_sensitive_key(&self, key: &str) -> bool {
        let words = key_words(key);
        (0..words.len()).any(|start| {
            let mut run = String::new();
            words[start..].iter().any(|word| {
                run.push_str(word);
                self.sensitive_keys
                    .iter()
                    .any(|keyword| keyword_matches(&run, keyword))
            })
        })
    }

    /// Applies the key rules to inline JSON pairs, then every pattern rule.
    pub fn redact_str(&self, input: &str) -> String {
        let mut output = if RE_JSON_PAIR.is_match(input) {
            RE_JSON_PAIR
                .replace_all(input, |caps: &Captures| self.replace_pair(caps))
                .into_owned()
        } else {
            input.to_string()
        };
        for pattern in &self.patterns {
            if !pattern.is_match(&output) {
                continue;
            }
            output = pattern
                .replace_all(&output, |caps: &Captures| self.replace_secret(pattern, caps))
                .into_owned();
        }
        output
    }

    /// Sanitizes a structured value: key rules on objects, pattern rules on strings.
    pub fn redact_value(&self, value: &Value) -> Value {
        self.redact_at_depth(value, 0)
    }

    /// Redacts text that may hold JSON (request payloads, response bodies).
    ///
    /// Parsable JSON goes through [`Redactor::redact_value`] and is re-serialized
    /// compactly; anything else gets the pattern pass only.
    pub fn redact_json_text(&self, input: &str) -> String {
        let trimmed = input.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str::<Value>(input) {
                let redacted = self.redact_value(&value);
                if let Ok(text) = serde_json::to_string(&redacted) {
                    return text;
                }
            }
        }
        self.redact_str(input)
    }

    fn redact_at_depth(&self, value: &Value, depth: usize) -> Value {
        match value {
            Value::String(s) => Value::String(self.redact_str(s)),
            Value::Array(_) | Value::Object(_) if depth >= MAX_REDACTION_DEPTH => {
                Value::String(DEPTH_PLACEHOLDER.to_string())
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.redact_at_depth(item, depth + 1))
                    .collect(),
            ),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, item) in map {
                    let redacted = if self.is_sensitive_key(key) {
                        Value::String(self.marker.clone())
                    } else {
                        self.redact_at_depth(item, depth + 1)
                    };
                    out.insert(key.clone(), redacted);
                }
                Value::Object(out)
            }
            other => other.clone(),
        }
    }

    /// Replaces the first participating `secret*` group, else group 1, else the match.
    fn replace_secret(&self, pattern: &Regex, caps: &Captures) -> String {
        let Some(whole) = caps.get(0) else {
            return String::new();
        };
        let secret = pattern
            .capture_names()
            .flatten()
            .filter(|name| name.starts_with("secret"))
            .find_map(|name| caps.name(name))
            .or_else(|| caps.get(1));
        match secret {
            Some(group) => splice(whole, group, &self.marker),
            None => self.marker.clone(),
        }
    }

    fn replace_pair(&self, caps: &Captures) -> String {
        let Some(whole) = caps.get(0) else {
            return String::new();
        };
        let sensitive = caps
            .name("key")
            .is_some_and(|key| self.is_sensitive_key(key.as_str()));
        if !sensitive {
            return whole.as_str().to_string();
        }
        if let Some(value) = caps.name("secret") {
            return splice(whole, value, &self.marker);
        }
        match caps.name("secret_number") {
            Some(value) => splice(whole, value, &format!("\"{}\"", self.marker)),
            None => whole.as_str().to_string(),
        }
    }
}

/// `whole` with the `group` span swapped for `replacement`.
fn splice(whole: Match<'_>, group: Match<'_>, replacement: &str) -> String {
    if group.start() < whole.start() || group.end() > whole.end() {
        return replacement.to_string();
    }
    let text = whole.as_str();
    let start = group.start() - whole.start();
    let end = group.end() - whole.start();
    format!("{}{}{}", &text[..start], replacement, &text[end..])
}

/// Lowercase alphanumerics only, so `bank_account` and `bankAccount` agree.
fn normalize_keyword(keyword: &str) -> String {
    keyword
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Splits a key into lowercase words on punctuation and lower-to-upper case changes.
fn key_words(key: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut after_lower = false;
    for c in key.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            after_lower = false;
            continue;
        }
        if c.is_uppercase() && after_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.extend(c.to_lowercase());
        after_lower = c.is_lowercase() || c.is_numeric();
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Keywords that also match as the tail of a word (`accesstoken`, `newpassword`).
const SUFFIX_KEYWORDS: &[&str] = &["token", "password", "secret"];

fn keyword_matches(candidate: &str, keyword: &str) -> bool {
    candidate == keyword
        || candidate.strip_suffix('s') == Some(keyword)
        || (SUFFIX_KEYWORDS.contains(&keyword) && candidate.ends_with(keyword))
}
