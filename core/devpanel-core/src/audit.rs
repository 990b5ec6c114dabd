//! Security audit trail.
//!
//! Audit lines go out through the host console as
//! `[SECURITY] <event> <redacted JSON>`, so a mounted agent also captures them
//! in its own log view. They are mirrored to `tracing` under the
//! `devpanel::audit` target.

use std::rc::Rc;

use devpanel_protocol::SECURITY_TAG;
use serde_json::{json, Value};
use tracing::info;

use crate::clock::Clock;
use crate::host::{ConsoleMethod, HostPage};
use crate::redaction::Redactor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    AgentInitialized,
    AccessGranted,
    AccessDenied,
    SessionStarted,
    SessionResumed,
    SessionEnded,
    SessionExpired,
    DataPurged,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::AgentInitialized => "agent_initialized",
            AuditEvent::AccessGranted => "access_granted",
            AuditEvent::AccessDenied => "access_denied",
            AuditEvent::SessionStarted => "session_started",
            AuditEvent::SessionResumed => "session_resumed",
            AuditEvent::SessionEnded => "session_ended",
            AuditEvent::SessionExpired => "session_expired",
            AuditEvent::DataPurged => "data_purged",
        }
    }

    fn console_method(&self) -> ConsoleMethod {
        match self {
            AuditEvent::AccessDenied => ConsoleMethod::Warn,
            _ => ConsoleMethod::Info,
        }
    }
}

#[derive(Clone)]
pub struct AuditLog {
    redactor: Rc<Redactor>,
    clock: Rc<dyn Clock>,
}

impl AuditLog {
    pub fn new(redactor: Rc<Redactor>, clock: Rc<dyn Clock>) -> Self {
        Self { redactor, clock }
    }

    /// Writes one audit line to the page console and returns it.
    pub fn emit(&self, page: &HostPage, event: AuditEvent, details: Value) -> String {
        let line = self.format(event, details);
        info!(target: "devpanel::audit", event = event.as_str(), "{}", line);
        page.console(event.console_method(), &[&line]);
        line
    }

    pub fn format(&self, event: AuditEvent, details: Value) -> String {
        let mut payload = match details {
            Value::Object(map) => Value::Object(map),
            Value::Null => json!({}),
            other => json!({ "details": other }),
        };
        if let Value::Object(map) = &mut payload {
            map.insert("at".to_string(), json!(self.clock.now().to_rfc3339()));
        }
        let redacted = self.redactor.redact_value(&payload);
        format!("{} {} {}", SECURITY_TAG, event.as_str(), redacted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::host::{HttpRequest, HttpResponse, MemoryConsole, Transport, TransportError};
    use crate::storage::MemoryStorage;

    struct NoNetwork;

    impl Transport for NoNetwork {
        fn send(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::new("offline"))
        }
    }

    #[test]
    fn audit_line_is_tagged_and_redacted() {
        let console = Rc::new(MemoryConsole::new());
        let page = HostPage::new(
            Rc::new(NoNetwork),
            console.clone(),
            Rc::new(MemoryStorage::new()),
        );
        let audit = AuditLog::new(Rc::new(Redactor::default()), Rc::new(ManualClock::default()));

        let line = audit.emit(
            &page,
            AuditEvent::AccessDenied,
            json!({ "userId": "user_9", "sessionToken": "abc" }),
        );

        assert!(line.starts_with("[SECURITY] access_denied {"));
        assert!(line.contains("user_9"));
        assert!(!line.contains("abc\""));
        let lines = console.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, ConsoleMethod::Warn);
        assert_eq!(lines[0].1, line);
    }

    #[test]
    fn non_object_details_are_wrapped() {
        let audit = AuditLog::new(Rc::new(Redactor::default()), Rc::new(ManualClock::default()));
        let line = audit.format(AuditEvent::DataPurged, json!(4));
        assert!(line.contains(r#""details":4"#));
    }
}
