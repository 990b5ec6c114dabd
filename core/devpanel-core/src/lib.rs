//! # devpanel-core
//!
//! Embedded runtime observability agent: captures console output, network
//! calls, navigation and interactions from a host page, redacts them, keeps
//! them in bounded tab-scoped history and exposes them to an operator panel
//! behind a single-identity access gate.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. The host drives everything from its
//!   own event loop (events, completion callbacks, an interval timer).
//! - **Single-threaded**: Shared state is `Rc<RefCell<_>>`; nothing is `Send`.
//! - **Transparent**: Interception never changes what the page's own code
//!   sees. Capture failures degrade to placeholders and `tracing` output.
//! - **Redact before storing**: Nothing reaches a buffer or storage unredacted.
//! - **Explicit context**: One [`Agent`] per page; no globals.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use devpanel_core::{Agent, AgentConfig, HostPage, Identity, Panel};
//!
//! let page = Rc::new(HostPage::new(transport, console, storage));
//! let mut agent = Agent::create(AgentConfig::load(&path)?, page.clone())?;
//! agent.authorize(&Identity::user("user_owner", None));
//!
//! let mut panel = Panel::load(page.storage());
//! println!("{}", panel.render(&agent));
//! ```

pub mod agent;
pub mod audit;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gate;
pub mod history;
pub mod host;
pub mod intercept;
pub mod panel;
pub mod patterns;
pub mod profiler;
pub mod redaction;
pub mod session;
pub mod storage;
pub mod watchers;

// Re-export commonly used items at crate root
pub use agent::{Agent, Capture};
pub use audit::{AuditEvent, AuditLog};
pub use buffer::BoundedBuffer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AgentConfig;
pub use diagnostics::{DebugSnapshot, DiagnosticsReport, StorageEntry};
pub use error::{PanelError, Result};
pub use gate::{AccessDecision, AccessGate, DenialReason, Identity};
pub use history::{HistoryCounts, HistoryStore, SharedHistory};
pub use host::{
    ConsoleMethod, ConsoleSink, ElementTarget, HostPage, HttpRequest, HttpResponse, MemoryConsole,
    PageEvent, PageFacts, Transport, TransportError,
};
pub use panel::{ActionFeedback, FeedbackKind, Panel};
pub use profiler::{Compatibility, RenderHub, RenderInstrumentation, RenderProfiler, RenderReport, RenderSample};
pub use redaction::Redactor;
pub use session::{SessionManager, SessionState};
pub use storage::{EphemeralStorage, FileStorage, MemoryStorage};

pub use devpanel_protocol as protocol;
