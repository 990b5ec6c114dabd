//! Network capture.
//!
//! [`NetworkRecorder::begin`] stamps the start of a request and returns a
//! [`PendingRequest`]; [`PendingRequest::finish`] builds the redacted
//! [`NetworkRequest`] once the call settles. Hosts whose transport completes
//! asynchronously call the pair directly from their completion callback;
//! [`InterceptedTransport`] is the synchronous decorator built on top.
//!
//! Events land in completion order. A request that settles after monitoring
//! was switched off is not recorded.

use std::cell::Cell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use devpanel_protocol::NetworkRequest;
use tracing::debug;
use ulid::Ulid;

use super::truncate_chars;
use crate::clock::{elapsed_ms, Clock};
use crate::history::SharedHistory;
use crate::host::{HostPage, HttpRequest, HttpResponse, Transport, TransportError};
use crate::redaction::Redactor;

/// Bytes of a response body decoded for the preview.
pub const RESPONSE_READ_LIMIT_BYTES: usize = 64 * 1024;

pub const UNREADABLE_BODY_PLACEHOLDER: &str = "[Unable to read response body]";
pub const TRUNCATION_SUFFIX: &str = "... (truncated)";

#[derive(Clone)]
pub struct NetworkRecorder {
    history: SharedHistory,
    redactor: Rc<Redactor>,
    clock: Rc<dyn Clock>,
    preview_chars: usize,
    monitoring: Rc<Cell<bool>>,
}

impl NetworkRecorder {
    pub fn new(
        history: SharedHistory,
        redactor: Rc<Redactor>,
        clock: Rc<dyn Clock>,
        preview_chars: usize,
    ) -> Self {
        Self {
            history,
            redactor,
            clock,
            preview_chars,
            monitoring: Rc::new(Cell::new(false)),
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.get()
    }

    pub fn begin(&self, request: &HttpRequest) -> PendingRequest {
        PendingRequest {
            recorder: self.clone(),
            method: request.method.clone(),
            url: request.url.clone(),
            body: request.body.clone(),
            started_at: self.clock.now(),
        }
    }

    fn response_preview(&self, body: &[u8]) -> String {
        let text = match decode_prefix(body) {
            Some(text) => text,
            None => return UNREADABLE_BODY_PLACEHOLDER.to_string(),
        };
        let redacted = if body.len() <= RESPONSE_READ_LIMIT_BYTES {
            self.redactor.redact_json_text(text)
        } else {
            self.redactor.redact_str(text)
        };
        truncate_chars(&redacted, self.preview_chars, TRUNCATION_SUFFIX)
    }
}

/// A request that has started but not settled.
pub struct PendingRequest {
    recorder: NetworkRecorder,
    method: String,
    url: String,
    body: Option<String>,
    started_at: DateTime<Utc>,
}

impl PendingRequest {
    /// Records the outcome. Returns the stored entry, or `None` when monitoring
    /// is off or the history was busy.
    pub fn finish(
        self,
        outcome: Result<&HttpResponse, &TransportError>,
    ) -> Option<NetworkRequest> {
        let recorder = self.recorder;
        if !recorder.is_monitoring() {
            return None;
        }

        let completed_at = recorder.clock.now();
        let redactor = &recorder.redactor;
        let (status, response, error) = match outcome {
            Ok(response) => (
                Some(response.status),
                Some(recorder.response_preview(&response.body)),
                None,
            ),
            Err(err) => (None, None, Some(redactor.redact_str(&err.message))),
        };

        let entry = NetworkRequest {
            id: Ulid::new().to_string(),
            url: redactor.redact_str(&self.url),
            method: self.method,
            status,
            duration_ms: elapsed_ms(self.started_at, completed_at),
            payload: self.body.as_deref().map(|b| redactor.redact_json_text(b)),
            response,
            error,
            timestamp: completed_at,
        };

        let stored = match recorder.history.try_borrow_mut() {
            Ok(mut history) => {
                history.push_request(entry.clone());
                Some(entry)
            }
            Err(_) => {
                debug!(url = %entry.url, "History busy; dropping network event");
                None
            }
        };
        stored
    }
}

/// Decodes the readable prefix of a body; `None` when it is not text.
fn decode_prefix(body: &[u8]) -> Option<&str> {
    let prefix = &body[..body.len().min(RESPONSE_READ_LIMIT_BYTES)];
    match std::str::from_utf8(prefix) {
        Ok(text) => Some(text),
        // Cut mid-character at the read limit: keep the complete part.
        Err(err) if err.error_len().is_none() && prefix.len() < body.len() => {
            std::str::from_utf8(&prefix[..err.valid_up_to()]).ok()
        }
        Err(_) => None,
    }
}

/// Synchronous decorator around the page's transport.
pub struct InterceptedTransport {
    inner: Rc<dyn Transport>,
    recorder: NetworkRecorder,
}

impl InterceptedTransport {
    pub fn new(inner: Rc<dyn Transport>, recorder: NetworkRecorder) -> Self {
        Self { inner, recorder }
    }
}

impl Transport for InterceptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let pending = self.recorder.begin(request);
        let result = self.inner.send(request);
        pending.finish(result.as_ref());
        result
    }
}

/// Owns the monitoring flag and the transport slot wrap.
pub struct NetworkMonitor {
    recorder: NetworkRecorder,
}

impl NetworkMonitor {
    pub fn new(recorder: NetworkRecorder) -> Self {
        Self { recorder }
    }

    pub fn recorder(&self) -> &NetworkRecorder {
        &self.recorder
    }

    pub fn is_monitoring(&self) -> bool {
        self.recorder.is_monitoring()
    }

    /// Wraps the page transport and turns recording on.
    pub fn start(&self, page: &HostPage) {
        self.recorder.monitoring.set(true);
        let recorder = self.recorder.clone();
        page.transport_slot().borrow_mut().wrap(|inner| {
            Rc::new(InterceptedTransport::new(inner, recorder)) as Rc<dyn Transport>
        });
    }

    /// Turns recording off and puts the original transport back.
    pub fn stop(&self, page: &HostPage) {
        self.recorder.monitoring.set(false);
        page.transport_slot().borrow_mut().restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::BufferConfig;
    use crate::history::HistoryStore;
    use crate::host::MemoryConsole;
    use crate::storage::MemoryStorage;

    struct Scripted {
        clock: Rc<ManualClock>,
        latency_ms: i64,
        result: Result<HttpResponse, TransportError>,
    }

    impl Transport for Scripted {
        fn send(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.clock.advance_ms(self.latency_ms);
            self.result.clone()
        }
    }

    fn setup(
        result: Result<HttpResponse, TransportError>,
    ) -> (HostPage, NetworkMonitor, SharedHistory, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::default());
        let storage = Rc::new(MemoryStorage::new());
        let transport = Rc::new(Scripted {
            clock: Rc::clone(&clock),
            latency_ms: 42,
            result,
        });
        let page = HostPage::new(transport, Rc::new(MemoryConsole::new()), storage.clone());
        let history = HistoryStore::new(&BufferConfig::default(), storage).into_shared();
        let recorder = NetworkRecorder::new(
            Rc::clone(&history),
            Rc::new(Redactor::default()),
            clock.clone(),
            20,
        );
        (page, NetworkMonitor::new(recorder), history, clock)
    }

    #[test]
    fn records_login_with_redacted_payload() {
        let (page, monitor, history, _) = setup(Ok(HttpResponse::ok(r#"{"ok":true}"#)));
        monitor.start(&page);

        let response = page
            .fetch(&HttpRequest::post("/api/login", r#"{"password":"hunter2"}"#))
            .unwrap();
        assert_eq!(response.status, 200);

        let history = history.borrow();
        let entry = history.requests().latest().expect("recorded");
        assert_eq!(entry.url, "/api/login");
        assert_eq!(entry.method, "POST");
        assert_eq!(entry.status, Some(200));
        assert_eq!(entry.duration_ms, 42.0);
        assert_eq!(
            entry.payload.as_deref(),
            Some(r#"{"password":"***REDACTED***"}"#)
        );
        assert_eq!(entry.response.as_deref(), Some(r#"{"ok":true}"#));
    }

    #[test]
    fn failure_propagates_unchanged_and_is_recorded() {
        let (page, monitor, history, _) =
            setup(Err(TransportError::new("network down token=abc")));
        monitor.start(&page);

        let err = page.fetch(&HttpRequest::get("/api/items")).unwrap_err();
        assert_eq!(err, TransportError::new("network down token=abc"));

        let history = history.borrow();
        let entry = history.requests().latest().expect("recorded");
        assert_eq!(entry.status, None);
        assert_eq!(entry.error.as_deref(), Some("network down token=***REDACTED***"));
        assert!(entry.is_failure());
    }

    #[test]
    fn oversized_body_still_redacts_sensitive_pairs() {
        let storage = Rc::new(MemoryStorage::new());
        let history = HistoryStore::new(&BufferConfig::default(), storage).into_shared();
        let recorder = NetworkRecorder::new(
            history,
            Rc::new(Redactor::default()),
            Rc::new(ManualClock::default()),
            200,
        );
        let body = format!(
            r#"{{"session":"abc123","cvv":987,"blob":"{}"}}"#,
            "x".repeat(70_000)
        );
        assert!(body.len() > RESPONSE_READ_LIMIT_BYTES);

        let preview = recorder.response_preview(body.as_bytes());
        assert!(!preview.contains("abc123"));
        assert!(!preview.contains("987"));
        assert!(preview.starts_with(r#"{"session":"***REDACTED***","cvv":"***REDACTED***""#));
        assert!(preview.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn long_response_is_truncated() {
        let body = "x".repeat(100);
        let (page, monitor, history, _) = setup(Ok(HttpResponse::ok(body)));
        monitor.start(&page);
        page.fetch(&HttpRequest::get("/big")).unwrap();

        let history = history.borrow();
        let response = history.requests().latest().unwrap().response.clone().unwrap();
        assert_eq!(response, format!("{}{}", "x".repeat(20), TRUNCATION_SUFFIX));
    }

    #[test]
    fn binary_body_becomes_placeholder() {
        let (page, monitor, history, _) =
            setup(Ok(HttpResponse::ok(vec![0xff, 0xfe, 0x00, 0x81])));
        monitor.start(&page);
        let response = page.fetch(&HttpRequest::get("/logo.png")).unwrap();
        assert_eq!(response.body, vec![0xff, 0xfe, 0x00, 0x81]);

        let history = history.borrow();
        assert_eq!(
            history.requests().latest().unwrap().response.as_deref(),
            Some(UNREADABLE_BODY_PLACEHOLDER)
        );
    }

    #[test]
    fn stop_restores_original_and_stops_recording() {
        let (page, monitor, history, _) = setup(Ok(HttpResponse::ok("fine")));
        monitor.start(&page);
        assert!(page.is_transport_wrapped());
        monitor.stop(&page);
        assert!(!page.is_transport_wrapped());

        page.fetch(&HttpRequest::get("/after-stop")).unwrap();
        assert!(history.borrow().requests().is_empty());
    }

    #[test]
    fn pending_request_settling_after_stop_is_dropped() {
        let (page, monitor, history, clock) = setup(Ok(HttpResponse::ok("late")));
        monitor.start(&page);

        let first = monitor.recorder().begin(&HttpRequest::get("/slow"));
        let second = monitor.recorder().begin(&HttpRequest::get("/fast"));
        clock.advance_ms(5);
        second.finish(Ok(&HttpResponse::ok("fast"))).expect("recorded");
        monitor.stop(&page);
        assert!(first.finish(Ok(&HttpResponse::ok("slow"))).is_none());

        let history = history.borrow();
        let urls: Vec<&str> = history.requests().iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["/fast"]);
    }

    #[test]
    fn query_secrets_in_url_are_redacted() {
        let (page, monitor, history, _) = setup(Ok(HttpResponse::ok("")));
        monitor.start(&page);
        page.fetch(&HttpRequest::get("/api/export?token=s3cr3t&format=csv"))
            .unwrap();
        assert_eq!(
            history.borrow().requests().latest().unwrap().url,
            "/api/export?token=***REDACTED***&format=csv"
        );
    }
}
