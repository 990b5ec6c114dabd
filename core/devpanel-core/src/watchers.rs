//! Route and interaction watchers.
//!
//! Both attach page event listeners and write into the shared history. The
//! route watcher runs for as long as the agent is mounted; interaction
//! tracking is an operator toggle. Detaching is synchronous: once
//! `detach`/`disable` returns, no further events are recorded.

use std::cell::RefCell;
use std::rc::Rc;

use devpanel_protocol::{InteractionKind, RouteChange, UserInteraction};
use tracing::debug;
use ulid::Ulid;

use crate::clock::Clock;
use crate::history::SharedHistory;
use crate::host::{HostPage, ListenerSet, PageEvent, PageEventKind};
use crate::redaction::Redactor;

pub struct RouteWatcher {
    history: SharedHistory,
    redactor: Rc<Redactor>,
    clock: Rc<dyn Clock>,
    listeners: RefCell<ListenerSet>,
}

impl RouteWatcher {
    pub fn new(history: SharedHistory, redactor: Rc<Redactor>, clock: Rc<dyn Clock>) -> Self {
        Self {
            history,
            redactor,
            clock,
            listeners: RefCell::new(ListenerSet::default()),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.listeners.borrow().is_attached()
    }

    pub fn attach(&self, page: &HostPage) {
        if self.is_attached() {
            return;
        }
        let history = Rc::clone(&self.history);
        let redactor = Rc::clone(&self.redactor);
        let clock = Rc::clone(&self.clock);
        let id = page
            .events()
            .add_listener(PageEventKind::Navigate, move |event| {
                if let PageEvent::Navigate { to } = event {
                    record_route(&history, &redactor, clock.as_ref(), to);
                }
            });
        self.listeners.borrow_mut().push(id);
    }

    pub fn detach(&self, page: &HostPage) {
        self.listeners.borrow_mut().detach_all(page.events());
    }
}

/// `from` is the previous stored destination, so it is already redacted.
fn record_route(history: &SharedHistory, redactor: &Redactor, clock: &dyn Clock, to: &str) {
    let to = redactor.redact_str(to);
    let Ok(mut history) = history.try_borrow_mut() else {
        debug!(to = %to, "History busy; dropping route change");
        return;
    };
    let from = history.current_route().unwrap_or_default().to_string();
    history.push_route(RouteChange {
        from,
        to,
        timestamp: clock.now(),
    });
}

/// Records clicks, form submits and key presses while enabled.
///
/// Only the kind of interaction and a short element descriptor are kept;
/// typed key values never reach the history.
pub struct InteractionTracker {
    history: SharedHistory,
    redactor: Rc<Redactor>,
    clock: Rc<dyn Clock>,
    listeners: RefCell<ListenerSet>,
}

impl InteractionTracker {
    pub fn new(history: SharedHistory, redactor: Rc<Redactor>, clock: Rc<dyn Clock>) -> Self {
        Self {
            history,
            redactor,
            clock,
            listeners: RefCell::new(ListenerSet::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.listeners.borrow().is_attached()
    }

    pub fn enable(&self, page: &HostPage) {
        if self.is_enabled() {
            return;
        }
        let mut listeners = self.listeners.borrow_mut();
        for kind in [
            PageEventKind::Click,
            PageEventKind::Submit,
            PageEventKind::KeyDown,
        ] {
            let history = Rc::clone(&self.history);
            let redactor = Rc::clone(&self.redactor);
            let clock = Rc::clone(&self.clock);
            listeners.push(page.events().add_listener(kind, move |event| {
                record_interaction(&history, &redactor, clock.as_ref(), event);
            }));
        }
    }

    pub fn disable(&self, page: &HostPage) {
        self.listeners.borrow_mut().detach_all(page.events());
    }

    /// Flips tracking and returns the new state.
    pub fn toggle(&self, page: &HostPage) -> bool {
        if self.is_enabled() {
            self.disable(page);
        } else {
            self.enable(page);
        }
        self.is_enabled()
    }
}

fn record_interaction(
    history: &SharedHistory,
    redactor: &Redactor,
    clock: &dyn Clock,
    event: &PageEvent,
) {
    let (kind, target) = match event {
        PageEvent::Click { target } => (InteractionKind::Click, target),
        PageEvent::Submit { target } => (InteractionKind::Submit, target),
        PageEvent::KeyDown { target } => (InteractionKind::Keydown, target),
        _ => return,
    };
    let interaction = UserInteraction {
        id: Ulid::new().to_string(),
        kind,
        target_descriptor: redactor.redact_str(&target.descriptor()),
        timestamp: clock.now(),
    };
    match history.try_borrow_mut() {
        Ok(mut history) => history.push_interaction(interaction),
        Err(_) => debug!(kind = kind.as_str(), "History busy; dropping interaction"),
    }
}
