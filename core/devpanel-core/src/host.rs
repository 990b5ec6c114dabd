//! The host page as the agent sees it.
//!
//! A [`HostPage`] owns the primitives the page's own code calls (network
//! transport, console sink), an event bus for DOM-style events, the ephemeral
//! storage and a snapshot of page facts. Whatever UI framework embeds the
//! agent builds one of these; the agent never touches platform globals.
//!
//! # Interception Slots
//!
//! Primitives live in an [`Interceptable`] slot that remembers the original.
//! Wrapping installs a decorator built from the original; restoring drops the
//! decorator so the page calls the original again with nothing left behind.
//!
//! ```text
//! page code ──► HostPage::fetch ──► slot.current() ──► [wrapper] ──► original
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

use crate::storage::EphemeralStorage;

// ═══════════════════════════════════════════════════════════════════════════════
// Interception Slot
// ═══════════════════════════════════════════════════════════════════════════════

/// A primitive plus the tracked handle needed to undo a wrap.
pub struct Interceptable<T: ?Sized> {
    original: Rc<T>,
    wrapper: Option<Rc<T>>,
}

impl<T: ?Sized> Interceptable<T> {
    pub fn new(original: Rc<T>) -> Self {
        Self {
            original,
            wrapper: None,
        }
    }

    /// What page code reaches right now.
    pub fn current(&self) -> Rc<T> {
        match &self.wrapper {
            Some(wrapper) => Rc::clone(wrapper),
            None => Rc::clone(&self.original),
        }
    }

    pub fn original(&self) -> Rc<T> {
        Rc::clone(&self.original)
    }

    pub fn is_wrapped(&self) -> bool {
        self.wrapper.is_some()
    }

    /// Installs a decorator around the original. Returns false if one is already installed.
    pub fn wrap(&mut self, wrap: impl FnOnce(Rc<T>) -> Rc<T>) -> bool {
        if self.wrapper.is_some() {
            return false;
        }
        self.wrapper = Some(wrap(Rc::clone(&self.original)));
        true
    }

    /// Drops the decorator. Returns false if nothing was installed.
    pub fn restore(&mut self) -> bool {
        self.wrapper.take().is_some()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Network Primitive
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            url: url.into(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new("POST", url).with_body(body)
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The page's outbound request primitive.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Console Primitive
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMethod {
    Log,
    Info,
    Debug,
    Warn,
    Error,
}

impl ConsoleMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleMethod::Log => "log",
            ConsoleMethod::Info => "info",
            ConsoleMethod::Debug => "debug",
            ConsoleMethod::Warn => "warn",
            ConsoleMethod::Error => "error",
        }
    }
}

/// Anything the page can hand to the console.
pub trait ConsoleArg {
    fn to_json(&self) -> serde_json::Result<Value>;
    fn summary(&self) -> String;
}

impl<T: Serialize + fmt::Debug + ?Sized> ConsoleArg for T {
    fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    fn summary(&self) -> String {
        format!("{:?}", self)
    }
}

pub trait ConsoleSink {
    fn write(&self, method: ConsoleMethod, args: &[&dyn ConsoleArg]);
}

/// Console sink that keeps what it was given. Stands in for the native
/// console in tests and scripted runs.
#[derive(Debug, Default)]
pub struct MemoryConsole {
    lines: RefCell<Vec<(ConsoleMethod, String)>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(ConsoleMethod, String)> {
        self.lines.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }
}

impl ConsoleSink for MemoryConsole {
    fn write(&self, method: ConsoleMethod, args: &[&dyn ConsoleArg]) {
        let line = args
            .iter()
            .map(|arg| match arg.to_json() {
                Ok(Value::String(s)) => s,
                Ok(other) => other.to_string(),
                Err(_) => arg.summary(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        self.lines.borrow_mut().push((method, line));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Page Events
// ═══════════════════════════════════════════════════════════════════════════════

/// The element an interaction landed on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementTarget {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

/// At most this many classes go into a descriptor.
pub const MAX_DESCRIPTOR_CLASSES: usize = 3;

impl ElementTarget {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// `button#save.btn.btn-primary`
    pub fn descriptor(&self) -> String {
        let mut out = self.tag.to_lowercase();
        if out.is_empty() {
            out.push_str("unknown");
        }
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            out.push('#');
            out.push_str(id);
        }
        for class in self
            .classes
            .iter()
            .filter(|c| !c.is_empty())
            .take(MAX_DESCRIPTOR_CLASSES)
        {
            out.push('.');
            out.push_str(class);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    PointerDown,
    TouchStart,
    Scroll,
    KeyDown { target: ElementTarget },
    Click { target: ElementTarget },
    Submit { target: ElementTarget },
    Navigate { to: String },
    UncaughtError { message: String, source: Option<String> },
    UnhandledRejection { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageEventKind {
    PointerDown,
    TouchStart,
    Scroll,
    KeyDown,
    Click,
    Submit,
    Navigate,
    UncaughtError,
    UnhandledRejection,
}

impl PageEvent {
    pub fn kind(&self) -> PageEventKind {
        match self {
            PageEvent::PointerDown => PageEventKind::PointerDown,
            PageEvent::TouchStart => PageEventKind::TouchStart,
            PageEvent::Scroll => PageEventKind::Scroll,
            PageEvent::KeyDown { .. } => PageEventKind::KeyDown,
            PageEvent::Click { .. } => PageEventKind::Click,
            PageEvent::Submit { .. } => PageEventKind::Submit,
            PageEvent::Navigate { .. } => PageEventKind::Navigate,
            PageEvent::UncaughtError { .. } => PageEventKind::UncaughtError,
            PageEvent::UnhandledRejection { .. } => PageEventKind::UnhandledRejection,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&PageEvent)>;

/// Minimal `addEventListener` / `removeEventListener`.
#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<Vec<(ListenerId, PageEventKind, Listener)>>,
    next_id: Cell<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(
        &self,
        kind: PageEventKind,
        listener: impl Fn(&PageEvent) + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.listeners
            .borrow_mut()
            .push((id, kind, Rc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _, _)| *existing != id);
        listeners.len() != before
    }

    /// Delivers an event to every listener registered for its kind.
    ///
    /// Listeners are collected first so a callback may add or remove listeners.
    /// One removed by an earlier callback in the same dispatch is skipped.
    pub fn dispatch(&self, event: &PageEvent) {
        let kind = event.kind();
        let targets: Vec<(ListenerId, Listener)> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(id, _, listener)| (*id, Rc::clone(listener)))
            .collect();
        for (id, listener) in targets {
            if self.is_registered(id) {
                listener(event);
            }
        }
    }

    fn is_registered(&self, id: ListenerId) -> bool {
        self.listeners
            .borrow()
            .iter()
            .any(|(existing, _, _)| *existing == id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn listener_count_for(&self, kind: PageEventKind) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }
}

/// Listener handles owned by one component, detached together.
#[derive(Debug, Default)]
pub struct ListenerSet {
    ids: Vec<ListenerId>,
}

impl ListenerSet {
    pub fn push(&mut self, id: ListenerId) {
        self.ids.push(id);
    }

    pub fn is_attached(&self) -> bool {
        !self.ids.is_empty()
    }

    pub fn detach_all(&mut self, bus: &EventBus) {
        for id in self.ids.drain(..) {
            bus.remove_listener(id);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Page Facts
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFact {
    pub src: String,
    pub complete: bool,
    pub natural_width: u32,
}

impl ImageFact {
    /// Still loading, or loaded with no pixels (broken).
    pub fn is_unresolved(&self) -> bool {
        !self.complete || self.natural_width == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTiming {
    pub dom_content_loaded_ms: Option<f64>,
    pub load_ms: Option<f64>,
}

/// Read-only facts about the page, refreshed by the host.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFacts {
    pub viewport: Viewport,
    pub document_width: u32,
    pub document_height: u32,
    pub build_id: Option<String>,
    pub user_agent: Option<String>,
    pub element_count: usize,
    pub images: Vec<ImageFact>,
    pub timing: PageTiming,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Host Page
// ═══════════════════════════════════════════════════════════════════════════════

pub struct HostPage {
    transport: RefCell<Interceptable<dyn Transport>>,
    console: RefCell<Interceptable<dyn ConsoleSink>>,
    events: EventBus,
    storage: Rc<dyn EphemeralStorage>,
    facts: RefCell<PageFacts>,
}

impl HostPage {
    pub fn new(
        transport: Rc<dyn Transport>,
        console: Rc<dyn ConsoleSink>,
        storage: Rc<dyn EphemeralStorage>,
    ) -> Self {
        Self {
            transport: RefCell::new(Interceptable::new(transport)),
            console: RefCell::new(Interceptable::new(console)),
            events: EventBus::new(),
            storage,
            facts: RefCell::new(PageFacts::default()),
        }
    }

    pub fn with_facts(self, facts: PageFacts) -> Self {
        *self.facts.borrow_mut() = facts;
        self
    }

    /// Page code's outbound call. Goes through whatever is installed in the slot.
    pub fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let transport = self.transport.borrow().current();
        transport.send(request)
    }

    /// Page code's console call.
    pub fn console(&self, method: ConsoleMethod, args: &[&dyn ConsoleArg]) {
        let sink = self.console.borrow().current();
        sink.write(method, args);
    }

    pub fn log(&self, message: &str) {
        self.console(ConsoleMethod::Log, &[&message]);
    }

    pub fn warn(&self, message: &str) {
        self.console(ConsoleMethod::Warn, &[&message]);
    }

    pub fn error(&self, message: &str) {
        self.console(ConsoleMethod::Error, &[&message]);
    }

    pub fn dispatch(&self, event: PageEvent) {
        self.events.dispatch(&event);
    }

    pub fn navigate(&self, to: impl Into<String>) {
        self.dispatch(PageEvent::Navigate { to: to.into() });
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn storage(&self) -> Rc<dyn EphemeralStorage> {
        Rc::clone(&self.storage)
    }

    pub fn facts(&self) -> PageFacts {
        self.facts.borrow().clone()
    }

    pub fn set_facts(&self, facts: PageFacts) {
        *self.facts.borrow_mut() = facts;
    }

    pub fn transport_slot(&self) -> &RefCell<Interceptable<dyn Transport>> {
        &self.transport
    }

    pub fn console_slot(&self) -> &RefCell<Interceptable<dyn ConsoleSink>> {
        &self.console
    }

    pub fn is_transport_wrapped(&self) -> bool {
        self.transport.borrow().is_wrapped()
    }

    pub fn is_console_wrapped(&self) -> bool {
        self.console.borrow().is_wrapped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::collections::HashMap;

    struct Echo;

    impl Transport for Echo {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse::ok(request.url.clone()))
        }
    }

    struct Tagged {
        inner: Rc<dyn Transport>,
    }

    impl Transport for Tagged {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            let mut response = self.inner.send(request)?;
            response.status = 299;
            Ok(response)
        }
    }

    fn page() -> HostPage {
        HostPage::new(
            Rc::new(Echo),
            Rc::new(MemoryConsole::new()),
            Rc::new(MemoryStorage::new()),
        )
    }

    #[test]
    fn wrap_and_restore_leave_no_residue() {
        let page = page();
        let wrapped = page
            .transport_slot()
            .borrow_mut()
            .wrap(|inner| Rc::new(Tagged { inner }) as Rc<dyn Transport>);
        assert!(wrapped);
        assert_eq!(page.fetch(&HttpRequest::get("/a")).unwrap().status, 299);

        assert!(page.transport_slot().borrow_mut().restore());
        let slot = page.transport_slot().borrow();
        assert!(Rc::ptr_eq(&slot.current(), &slot.original()));
        drop(slot);
        assert_eq!(page.fetch(&HttpRequest::get("/a")).unwrap().status, 200);
    }

    #[test]
    fn double_wrap_is_refused() {
        let page = page();
        let mut slot = page.transport_slot().borrow_mut();
        assert!(slot.wrap(|inner| Rc::new(Tagged { inner }) as Rc<dyn Transport>));
        assert!(!slot.wrap(|inner| Rc::new(Tagged { inner }) as Rc<dyn Transport>));
        assert!(slot.restore());
        assert!(!slot.restore());
    }

    #[test]
    fn descriptor_includes_id_and_first_classes() {
        let target = ElementTarget::new("BUTTON")
            .with_id("save")
            .with_class("btn")
            .with_class("primary")
            .with_class("lg")
            .with_class("extra");
        assert_eq!(target.descriptor(), "button#save.btn.primary.lg");
        assert_eq!(ElementTarget::default().descriptor(), "unknown");
    }

    #[test]
    fn event_bus_routes_by_kind_and_detaches() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let id = bus.add_listener(PageEventKind::Scroll, move |_| {
            counter.set(counter.get() + 1)
        });

        bus.dispatch(&PageEvent::Scroll);
        bus.dispatch(&PageEvent::PointerDown);
        assert_eq!(hits.get(), 1);

        assert!(bus.remove_listener(id));
        bus.dispatch(&PageEvent::Scroll);
        assert_eq!(hits.get(), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn listener_removed_mid_dispatch_does_not_fire() {
        let bus = Rc::new(EventBus::new());
        let later_hits = Rc::new(Cell::new(0));
        let later_id = Rc::new(Cell::new(None));

        let bus_handle = Rc::clone(&bus);
        let victim = Rc::clone(&later_id);
        bus.add_listener(PageEventKind::Click, move |_| {
            if let Some(id) = victim.get() {
                bus_handle.remove_listener(id);
            }
        });
        let counter = Rc::clone(&later_hits);
        later_id.set(Some(bus.add_listener(PageEventKind::Click, move |_| {
            counter.set(counter.get() + 1)
        })));

        bus.dispatch(&PageEvent::Click {
            target: ElementTarget::new("button"),
        });
        assert_eq!(later_hits.get(), 0);
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn memory_console_falls_back_to_debug_summary() {
        let console = MemoryConsole::new();
        let mut map = HashMap::new();
        map.insert((1, 2), "tuple keys do not serialize");
        console.write(ConsoleMethod::Log, &[&"map:", &map]);
        let (_, line) = &console.lines()[0];
        assert!(line.starts_with("map: {(1, 2):"));
    }
}
