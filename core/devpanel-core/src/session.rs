//! Operator session lifecycle.
//!
//! ```text
//! NoSession ──start──► Active ──touch──► Active
//!                        │
//!                        ├──check (idle ≥ timeout)──► Expired
//!                        └──end──────────────────────► Ended
//! ```
//!
//! The record is mirrored under the `debugSession` storage key with epoch
//! millisecond timestamps. `touch` and `check` only ever act on an `Active`
//! session, so nothing brings an ended or expired session back; only an
//! explicit `start` (or a fresh page load) creates a new one.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use devpanel_protocol::{keys, SessionRecord};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::storage::EphemeralStorage;

pub type SharedSession = Rc<RefCell<SessionManager>>;

pub const EXPIRY_NOTICE: &str = "Debug session expired after inactivity. Reload to start a new one.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Active(SessionRecord),
    Expired,
    Ended,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::NoSession => "none",
            SessionState::Active(_) => "active",
            SessionState::Expired => "expired",
            SessionState::Ended => "ended",
        }
    }
}

/// How [`SessionManager::resume_or_start`] got to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    Resumed(SessionRecord),
    Started(SessionRecord),
}

impl SessionOrigin {
    pub fn record(&self) -> SessionRecord {
        match self {
            SessionOrigin::Resumed(record) | SessionOrigin::Started(record) => *record,
        }
    }
}

pub struct SessionManager {
    storage: Rc<dyn EphemeralStorage>,
    clock: Rc<dyn Clock>,
    timeout: Duration,
    check_interval: Duration,
    state: SessionState,
    last_check: Option<DateTime<Utc>>,
    pending_notice: bool,
}

impl SessionManager {
    pub fn new(
        config: &SessionConfig,
        storage: Rc<dyn EphemeralStorage>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            clock,
            timeout: config.timeout(),
            check_interval: config.check_interval(),
            state: SessionState::NoSession,
            last_check: None,
            pending_notice: false,
        }
    }

    pub fn into_shared(self) -> SharedSession {
        Rc::new(RefCell::new(self))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn record(&self) -> Option<SessionRecord> {
        match self.state {
            SessionState::Active(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active(_))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn start(&mut self) -> SessionRecord {
        let now = self.clock.now();
        let record = SessionRecord {
            started_at: now,
            last_activity_at: now,
        };
        self.state = SessionState::Active(record);
        self.last_check = Some(now);
        self.pending_notice = false;
        self.persist(&record);
        info!(started_at = %now, "Debug session started");
        record
    }

    /// Continues a persisted session that is still within the timeout, or starts a new one.
    pub fn resume_or_start(&mut self) -> SessionOrigin {
        let now = self.clock.now();
        match self.load() {
            Some(record) if now - record.last_activity_at < self.timeout => {
                self.state = SessionState::Active(record);
                self.last_check = Some(now);
                info!(started_at = %record.started_at, "Debug session resumed");
                SessionOrigin::Resumed(record)
            }
            Some(_) => {
                debug!("Persisted session already past its timeout");
                SessionOrigin::Started(self.start())
            }
            None => SessionOrigin::Started(self.start()),
        }
    }

    /// Records activity. Only an active session is touched; time never runs backwards.
    pub fn touch(&mut self) -> bool {
        let SessionState::Active(mut record) = self.state else {
            return false;
        };
        let now = self.clock.now();
        if now > record.last_activity_at {
            record.last_activity_at = now;
            self.state = SessionState::Active(record);
            self.persist(&record);
        }
        true
    }

    /// Runs [`SessionManager::check`] once per check interval. Returns true on expiry.
    pub fn tick(&mut self) -> bool {
        let now = self.clock.now();
        let due = match self.last_check {
            Some(last) => now - last >= self.check_interval,
            None => true,
        };
        if !due {
            return false;
        }
        self.last_check = Some(now);
        self.check()
    }

    /// Expires an active session that has been idle for at least the timeout.
    pub fn check(&mut self) -> bool {
        let SessionState::Active(record) = self.state else {
            return false;
        };
        let idle = self.clock.now() - record.last_activity_at;
        if idle < self.timeout {
            return false;
        }
        self.state = SessionState::Expired;
        self.pending_notice = true;
        self.clear_persisted();
        info!(idle_secs = idle.num_seconds(), "Debug session expired");
        true
    }

    /// Operator action. Clears the persisted record immediately.
    pub fn end(&mut self) {
        self.state = SessionState::Ended;
        self.pending_notice = false;
        self.clear_persisted();
        info!("Debug session ended");
    }

    /// Time left before an idle expiry, for the General tab.
    pub fn remaining(&self) -> Option<Duration> {
        let record = self.record()?;
        let idle = self.clock.now() - record.last_activity_at;
        Some((self.timeout - idle).max(Duration::zero()))
    }

    /// The expiry notice, handed out once.
    pub fn take_expiry_notice(&mut self) -> Option<&'static str> {
        if std::mem::take(&mut self.pending_notice) {
            Some(EXPIRY_NOTICE)
        } else {
            None
        }
    }

    fn load(&self) -> Option<SessionRecord> {
        let raw = match self.storage.get_item(keys::SESSION) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(error = %err, "Failed to read persisted session");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(error = %err, "Discarding unreadable persisted session");
                None
            }
        }
    }

    fn persist(&self, record: &SessionRecord) {
        let result = serde_json::to_string(record)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                self.storage
                    .set_item(keys::SESSION, &raw)
                    .map_err(String::from)
            });
        if let Err(err) = result {
            warn!(error = %err, "Failed to persist session");
        }
    }

    fn clear_persisted(&self) {
        if let Err(err) = self.storage.remove_item(keys::SESSION) {
            warn!(error = %err, "Failed to clear persisted session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStorage;
    use chrono::TimeZone;

    fn manager() -> (SessionManager, Rc<ManualClock>, Rc<MemoryStorage>) {
        // Whole seconds: the persisted record keeps millisecond precision.
        let clock = Rc::new(ManualClock::new(
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        ));
        let storage = Rc::new(MemoryStorage::new());
        let manager = SessionManager::new(&SessionConfig::default(), storage.clone(), clock.clone());
        (manager, clock, storage)
    }

    #[test]
    fn start_persists_epoch_millis() {
        let (mut session, clock, storage) = manager();
        let record = session.start();
        assert_eq!(record.started_at, clock.now());

        let raw = storage.get_item(keys::SESSION).unwrap().expect("persisted");
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value["startedAt"].as_i64(),
            Some(clock.now().timestamp_millis())
        );
    }

    #[test]
    fn touch_is_monotonic() {
        let (mut session, clock, _) = manager();
        session.start();
        clock.advance_ms(5_000);
        assert!(session.touch());
        let after = session.record().unwrap().last_activity_at;

        clock.advance_ms(-60_000);
        session.touch();
        assert_eq!(session.record().unwrap().last_activity_at, after);
    }

    #[test]
    fn idle_timeout_expires_on_next_check() {
        let (mut session, clock, storage) = manager();
        session.start();
        clock.advance(Duration::minutes(29));
        assert!(!session.tick());
        clock.advance(Duration::minutes(1));
        assert!(session.tick());

        assert_eq!(session.state(), SessionState::Expired);
        assert_eq!(storage.get_item(keys::SESSION).unwrap(), None);
        assert_eq!(session.take_expiry_notice(), Some(EXPIRY_NOTICE));
        assert_eq!(session.take_expiry_notice(), None);
    }

    #[test]
    fn tick_waits_for_check_interval() {
        let (mut session, clock, _) = manager();
        session.start();
        clock.advance(Duration::minutes(29) + Duration::seconds(30));
        assert!(!session.tick());
        // Idle past the timeout, but the last check was only 40s ago.
        clock.advance_ms(40_000);
        assert!(!session.tick());
        assert!(session.is_active());
        // A direct check does not wait for the interval.
        assert!(session.check());
    }

    #[test]
    fn end_then_touch_stays_ended() {
        let (mut session, clock, storage) = manager();
        session.start();
        session.end();
        assert_eq!(storage.get_item(keys::SESSION).unwrap(), None);

        assert!(!session.touch());
        clock.advance(Duration::hours(2));
        assert!(!session.tick());
        assert!(!session.check());
        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(session.remaining(), None);
    }

    #[test]
    fn resume_within_timeout_keeps_start_time() {
        let (mut first, clock, storage) = manager();
        let original = first.start();
        clock.advance(Duration::minutes(10));

        let mut reloaded =
            SessionManager::new(&SessionConfig::default(), storage.clone(), clock.clone());
        assert_eq!(reloaded.resume_or_start(), SessionOrigin::Resumed(original));
        assert_eq!(reloaded.remaining(), Some(Duration::minutes(20)));
    }

    #[test]
    fn stale_or_corrupt_record_starts_fresh() {
        let (mut first, clock, storage) = manager();
        first.start();
        clock.advance(Duration::minutes(45));
        let mut reloaded =
            SessionManager::new(&SessionConfig::default(), storage.clone(), clock.clone());
        let origin = reloaded.resume_or_start();
        assert!(matches!(origin, SessionOrigin::Started(_)));
        assert_eq!(origin.record().started_at, clock.now());

        storage.set_item(keys::SESSION, "not json").unwrap();
        let mut corrupt = SessionManager::new(&SessionConfig::default(), storage, clock);
        assert!(matches!(corrupt.resume_or_start(), SessionOrigin::Started(_)));
    }
}
