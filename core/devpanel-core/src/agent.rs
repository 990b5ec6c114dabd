//! Agent - the explicit context object that owns every capture component.
//!
//! Lifecycle:
//!
//! ```text
//! create ──► authorize(identity) ──Granted──► mount ──► tick … ──► teardown
//!                  │
//!                  └──Pending / Denied──► nothing mounted, nothing observed
//! ```
//!
//! Mounting rehydrates history, wraps the console, attaches the route watcher
//! and activity listeners, resumes or starts the session and (by default)
//! starts network monitoring. Teardown restores every wrapped primitive and
//! detaches every listener. The [`crate::panel::Panel`] receives the agent as
//! an argument; there is no process-wide instance.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let mut agent = Agent::create(AgentConfig::for_user("user_owner"), page)?;
//! agent.authorize(&Identity::user("user_owner", None));
//! // on the host's interval timer:
//! agent.tick();
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditLog};
use crate::clock::{Clock, SystemClock};
use crate::config::AgentConfig;
use crate::diagnostics::{self, DebugSnapshot, DiagnosticsReport, StorageEntry};
use crate::error::Result;
use crate::gate::{AccessDecision, AccessGate, Identity};
use crate::history::{HistoryCounts, HistoryStore, SharedHistory};
use crate::host::{HostPage, ListenerSet, PageEventKind};
use crate::intercept::{ConsoleCapture, ConsoleRecorder, NetworkMonitor, NetworkRecorder};
use crate::profiler::{Compatibility, RenderHub, RenderInstrumentation, RenderProfiler, RenderReport};
use crate::redaction::Redactor;
use crate::session::{SessionManager, SessionOrigin, SessionState, SharedSession};
use crate::watchers::{InteractionTracker, RouteWatcher};
use devpanel_protocol::keys;

/// Page events that count as operator activity for the session timeout.
pub const ACTIVITY_EVENTS: [PageEventKind; 4] = [
    PageEventKind::PointerDown,
    PageEventKind::KeyDown,
    PageEventKind::TouchStart,
    PageEventKind::Scroll,
];

/// Components that exist only while the agent is mounted.
pub struct Capture {
    history: SharedHistory,
    network: NetworkMonitor,
    console: ConsoleCapture,
    routes: RouteWatcher,
    interactions: InteractionTracker,
    profiler: RenderProfiler,
    activity: RefCell<ListenerSet>,
}

impl Capture {
    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub fn console(&self) -> &ConsoleCapture {
        &self.console
    }

    pub fn interactions(&self) -> &InteractionTracker {
        &self.interactions
    }

    pub fn profiler(&self) -> &RenderProfiler {
        &self.profiler
    }
}

pub struct Agent {
    config: AgentConfig,
    page: Rc<HostPage>,
    clock: Rc<dyn Clock>,
    redactor: Rc<Redactor>,
    audit: AuditLog,
    gate: AccessGate,
    instrumentation: Rc<dyn RenderInstrumentation>,
    session: SharedSession,
    decision: Option<AccessDecision>,
    capture: Option<Capture>,
}

impl Agent {
    /// Builds an unmounted agent. Fails only if the configured redaction rules do not compile.
    pub fn create(config: AgentConfig, page: Rc<HostPage>) -> Result<Self> {
        let redactor = Rc::new(config.build_redactor()?);
        let clock: Rc<dyn Clock> = Rc::new(SystemClock);
        let session =
            SessionManager::new(&config.session, page.storage(), Rc::clone(&clock)).into_shared();
        Ok(Self {
            audit: AuditLog::new(Rc::clone(&redactor), Rc::clone(&clock)),
            gate: AccessGate::new(config.allowed_user_id.clone()),
            instrumentation: Rc::new(RenderHub::new(None)),
            config,
            page,
            clock,
            redactor,
            session,
            decision: None,
            capture: None,
        })
    }

    /// Replaces the time source. Call before mounting.
    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.audit = AuditLog::new(Rc::clone(&self.redactor), Rc::clone(&clock));
        self.session = SessionManager::new(
            &self.config.session,
            self.page.storage(),
            Rc::clone(&clock),
        )
        .into_shared();
        self.clock = clock;
        self
    }

    /// Supplies the host framework's render instrumentation. Call before mounting.
    pub fn with_instrumentation(mut self, instrumentation: Rc<dyn RenderInstrumentation>) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Runs the access gate and mounts or tears down to match its decision.
    ///
    /// A pending identity leaves everything as it is.
    pub fn authorize(&mut self, identity: &Identity) -> AccessDecision {
        let decision = self.gate.authorize(identity, &self.audit, &self.page);
        match decision {
            AccessDecision::Pending => return decision,
            AccessDecision::Granted => {
                self.decision = Some(decision);
                self.mount();
            }
            AccessDecision::Denied(reason) => {
                self.decision = Some(decision);
                debug!(reason = reason.as_str(), "Access denied; agent stays unmounted");
                self.teardown();
            }
        }
        decision
    }

    /// Starts capturing. Refused unless the last gate decision granted access.
    pub fn mount(&mut self) -> bool {
        if self.capture.is_some() {
            return true;
        }
        if self.decision != Some(AccessDecision::Granted) {
            warn!("Mount refused without a granted access decision");
            return false;
        }

        let history = HistoryStore::rehydrate(&self.config.buffers, self.page.storage()).into_shared();

        let console = ConsoleCapture::new(ConsoleRecorder::new(
            Rc::clone(&history),
            Rc::clone(&self.redactor),
            Rc::clone(&self.clock),
        ));
        console.install(&self.page);

        let routes = RouteWatcher::new(
            Rc::clone(&history),
            Rc::clone(&self.redactor),
            Rc::clone(&self.clock),
        );
        routes.attach(&self.page);

        let origin = self.session.borrow_mut().resume_or_start();
        let record = origin.record();
        let event = match origin {
            SessionOrigin::Resumed(_) => AuditEvent::SessionResumed,
            SessionOrigin::Started(_) => AuditEvent::SessionStarted,
        };
        self.audit.emit(
            &self.page,
            event,
            json!({ "startedAt": record.started_at.to_rfc3339() }),
        );

        let mut activity = ListenerSet::default();
        for kind in ACTIVITY_EVENTS {
            let session = Rc::clone(&self.session);
            activity.push(self.page.events().add_listener(kind, move |_| {
                if let Ok(mut session) = session.try_borrow_mut() {
                    session.touch();
                }
            }));
        }

        let network = NetworkMonitor::new(NetworkRecorder::new(
            Rc::clone(&history),
            Rc::clone(&self.redactor),
            Rc::clone(&self.clock),
            self.config.network.response_preview_chars,
        ));
        if self.config.network.monitor_on_mount {
            network.start(&self.page);
        }

        let interactions = InteractionTracker::new(
            Rc::clone(&history),
            Rc::clone(&self.redactor),
            Rc::clone(&self.clock),
        );
        let profiler = RenderProfiler::new(
            Rc::clone(&self.instrumentation),
            self.config.profiler.clone(),
        );

        self.capture = Some(Capture {
            history,
            network,
            console,
            routes,
            interactions,
            profiler,
            activity: RefCell::new(activity),
        });

        let facts = self.page.facts();
        self.audit.emit(
            &self.page,
            AuditEvent::AgentInitialized,
            json!({
                "buildId": facts.build_id,
                "monitoring": self.config.network.monitor_on_mount,
            }),
        );
        info!("Debug agent mounted");
        true
    }

    /// Drives the periodic session check. Returns true when the session expired,
    /// in which case the agent has been torn down.
    pub fn tick(&mut self) -> bool {
        if self.capture.is_none() {
            return false;
        }
        let expired = self.session.borrow_mut().tick();
        if expired {
            self.audit
                .emit(&self.page, AuditEvent::SessionExpired, json!({}));
            self.teardown();
        }
        expired
    }

    /// Restores every wrapped primitive and detaches every listener.
    pub fn teardown(&mut self) {
        let Some(capture) = self.capture.take() else {
            return;
        };
        capture.network.stop(&self.page);
        capture.console.uninstall(&self.page);
        capture.routes.detach(&self.page);
        capture.interactions.disable(&self.page);
        if capture.profiler.is_enabled() {
            capture.profiler.stop();
        }
        capture.activity.borrow_mut().detach_all(self.page.events());
        info!("Debug agent torn down");
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn is_mounted(&self) -> bool {
        self.capture.is_some()
    }

    pub fn capture(&self) -> Option<&Capture> {
        self.capture.as_ref()
    }

    pub fn decision(&self) -> Option<AccessDecision> {
        self.decision
    }

    pub fn page(&self) -> &Rc<HostPage> {
        &self.page
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn session_state(&self) -> SessionState {
        self.session.borrow().state()
    }

    pub fn take_expiry_notice(&self) -> Option<&'static str> {
        self.session.borrow_mut().take_expiry_notice()
    }

    pub fn counts(&self) -> HistoryCounts {
        self.capture
            .as_ref()
            .map(|c| c.history.borrow().counts())
            .unwrap_or_default()
    }

    pub fn compatibility(&self) -> Compatibility {
        Compatibility::check(
            self.instrumentation.framework_version().as_deref(),
            &self.config.profiler.min_framework_version,
        )
    }

    pub fn snapshot(&self) -> Option<DebugSnapshot> {
        let capture = self.capture.as_ref()?;
        let facts = self.page.facts();
        let session = self.session.borrow();
        let history = capture.history.borrow();
        Some(DebugSnapshot {
            captured_at: self.clock.now(),
            build_id: facts.build_id,
            user_agent: facts.user_agent,
            framework_version: self.instrumentation.framework_version(),
            viewport: facts.viewport,
            document_width: facts.document_width,
            document_height: facts.document_height,
            element_count: facts.element_count,
            image_count: facts.images.len(),
            storage_available: self.page.storage().is_available(),
            current_route: history.current_route().map(str::to_string),
            session_state: session.state().label(),
            session_remaining_secs: session.remaining().map(|d| d.num_seconds()),
            monitoring: capture.network.is_monitoring(),
            tracking_interactions: capture.interactions.is_enabled(),
            profiling: capture.profiler.is_enabled(),
            counts: history.counts(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Operator Actions
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn set_monitoring(&self, enabled: bool) -> bool {
        let Some(capture) = &self.capture else {
            return false;
        };
        if enabled {
            capture.network.start(&self.page);
        } else {
            capture.network.stop(&self.page);
        }
        capture.network.is_monitoring()
    }

    /// Flips interaction tracking. Returns the new state.
    pub fn toggle_interaction_tracking(&self) -> bool {
        match &self.capture {
            Some(capture) => capture.interactions.toggle(&self.page),
            None => false,
        }
    }

    pub fn start_profiling(&self) -> bool {
        match &self.capture {
            Some(capture) => {
                capture.profiler.start();
                true
            }
            None => false,
        }
    }

    pub fn stop_profiling(&self) -> Option<RenderReport> {
        let capture = self.capture.as_ref()?;
        capture
            .profiler
            .is_enabled()
            .then(|| capture.profiler.stop())
    }

    pub fn diagnostics(&self) -> Option<DiagnosticsReport> {
        let capture = self.capture.as_ref()?;
        let history = capture.history.borrow();
        Some(diagnostics::run_diagnostics(&self.page.facts(), &history))
    }

    pub fn inspect_storage(&self) -> Result<Vec<StorageEntry>> {
        diagnostics::inspect_storage(self.page.storage().as_ref())
    }

    /// Removes the host's own storage keys. Agent keys are left alone.
    pub fn clear_site_storage(&self) -> Result<usize> {
        let storage = self.page.storage();
        let mut removed = 0;
        for key in storage.keys()? {
            if keys::is_agent_key(&key) {
                continue;
            }
            storage.remove_item(&key)?;
            removed += 1;
        }
        info!(removed, "Cleared site storage");
        Ok(removed)
    }

    /// Empties every buffer, removes persisted history and writes one audit entry.
    pub fn purge_all(&self) -> usize {
        let Some(capture) = &self.capture else {
            return 0;
        };
        let removed = {
            let mut history = capture.history.borrow_mut();
            let counts = history.counts();
            history.clear_all();
            counts.logs + counts.requests + counts.routes + counts.interactions
        };
        self.audit.emit(
            &self.page,
            AuditEvent::DataPurged,
            json!({ "entriesRemoved": removed }),
        );
        removed
    }

    /// Ends the operator session and unmounts.
    pub fn end_session(&mut self) {
        self.session.borrow_mut().end();
        self.audit
            .emit(&self.page, AuditEvent::SessionEnded, json!({}));
        self.teardown();
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::host::{HttpRequest, HttpResponse, MemoryConsole, PageEvent, Transport, TransportError};
    use crate::storage::MemoryStorage;
    use chrono::Duration;

    struct Ok200;

    impl Transport for Ok200 {
        fn send(&self, _request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
            Ok(HttpResponse::ok("{}"))
        }
    }

    fn agent() -> (Agent, Rc<ManualClock>) {
        let page = Rc::new(HostPage::new(
            Rc::new(Ok200),
            Rc::new(MemoryConsole::new()),
            Rc::new(MemoryStorage::new()),
        ));
        let clock = Rc::new(ManualClock::default());
        let agent = Agent::create(AgentConfig::for_user("owner"), page)
            .unwrap()
            .with_clock(clock.clone());
        (agent, clock)
    }

    #[test]
    fn mount_requires_granted_decision() {
        let (mut agent, _) = agent();
        assert!(!agent.mount());
        assert_eq!(agent.authorize(&Identity::pending()), AccessDecision::Pending);
        assert!(!agent.is_mounted());
        assert!(agent.authorize(&Identity::user("owner", None)).is_granted());
        assert!(agent.is_mounted());
        assert!(agent.page().is_console_wrapped());
        assert!(agent.page().is_transport_wrapped());
    }

    #[test]
    fn teardown_restores_everything() {
        let (mut agent, _) = agent();
        agent.authorize(&Identity::user("owner", None));
        agent.toggle_interaction_tracking();
        agent.start_profiling();
        agent.teardown();

        let page = agent.page();
        assert!(!page.is_console_wrapped());
        assert!(!page.is_transport_wrapped());
        assert_eq!(page.events().listener_count(), 0);
    }

    #[test]
    fn activity_touches_session() {
        let (mut agent, clock) = agent();
        agent.authorize(&Identity::user("owner", None));
        let started = agent.session().borrow().record().unwrap().last_activity_at;
        clock.advance_ms(10_000);
        agent.page().dispatch(PageEvent::Scroll);
        let touched = agent.session().borrow().record().unwrap().last_activity_at;
        assert_eq!(touched - started, Duration::seconds(10));
    }

    #[test]
    fn expiry_tears_down_and_leaves_notice() {
        let (mut agent, clock) = agent();
        agent.authorize(&Identity::user("owner", None));
        clock.advance(Duration::minutes(31));
        assert!(agent.tick());
        assert!(!agent.is_mounted());
        assert_eq!(agent.session_state(), SessionState::Expired);
        assert!(agent.take_expiry_notice().is_some());
    }

    #[test]
    fn purge_leaves_only_its_audit_entry() {
        let (mut agent, _) = agent();
        agent.authorize(&Identity::user("owner", None));
        agent.page().log("one");
        agent.page().navigate("/a");
        agent.page().fetch(&HttpRequest::get("/api/x")).unwrap();

        assert!(agent.purge_all() >= 3);
        let counts = agent.counts();
        assert_eq!(counts.requests, 0);
        assert_eq!(counts.routes, 0);
        assert_eq!(counts.logs, 1);
        let capture = agent.capture().unwrap();
        let history = capture.history().borrow();
        assert!(history.logs().latest().unwrap().message.starts_with("[SECURITY] data_purged"));
    }
}
