//! Console capture.
//!
//! [`InterceptedConsole`] sits in the page's console slot. The original sink
//! always receives the call first; a [`LogEntry`] is appended afterwards.
//! [`ConsoleCapture`] also listens for uncaught errors and unhandled
//! rejections so they show up in the log view at error level.

use std::cell::RefCell;
use std::rc::Rc;

use devpanel_protocol::{LogEntry, LogLevel};
use serde_json::Value;
use tracing::debug;
use ulid::Ulid;

use super::truncate_chars;
use crate::clock::Clock;
use crate::history::SharedHistory;
use crate::host::{
    ConsoleArg, ConsoleMethod, ConsoleSink, HostPage, ListenerSet, PageEvent, PageEventKind,
};
use crate::redaction::Redactor;

/// Longest `Debug` summary kept for an argument that will not serialize.
pub const MAX_ARG_SUMMARY_CHARS: usize = 200;

pub fn level_for(method: ConsoleMethod) -> LogLevel {
    match method {
        ConsoleMethod::Log | ConsoleMethod::Info | ConsoleMethod::Debug => LogLevel::Info,
        ConsoleMethod::Warn => LogLevel::Warn,
        ConsoleMethod::Error => LogLevel::Error,
    }
}

#[derive(Clone)]
pub struct ConsoleRecorder {
    history: SharedHistory,
    redactor: Rc<Redactor>,
    clock: Rc<dyn Clock>,
}

impl ConsoleRecorder {
    pub fn new(history: SharedHistory, redactor: Rc<Redactor>, clock: Rc<dyn Clock>) -> Self {
        Self {
            history,
            redactor,
            clock,
        }
    }

    /// Formats console arguments into one redacted message and records it.
    pub fn record(&self, method: ConsoleMethod, args: &[&dyn ConsoleArg]) -> Option<LogEntry> {
        let message = self.format_args(args);
        self.record_message(level_for(method), &message)
    }

    /// Records an already formatted message. The pattern pass still applies.
    pub fn record_message(&self, level: LogLevel, message: &str) -> Option<LogEntry> {
        let entry = LogEntry {
            id: Ulid::new().to_string(),
            message: self.redactor.redact_str(message),
            level,
            timestamp: self.clock.now(),
        };

        match self.history.try_borrow_mut() {
            Ok(mut history) => {
                history.push_log(entry.clone());
                Some(entry)
            }
            Err(_) => {
                debug!(level = %level, "History busy; dropping console event");
                None
            }
        }
    }

    fn format_args(&self, args: &[&dyn ConsoleArg]) -> String {
        args.iter()
            .map(|arg| self.format_arg(*arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn format_arg(&self, arg: &dyn ConsoleArg) -> String {
        match arg.to_json() {
            Ok(Value::String(s)) => s,
            Ok(value) => {
                let redacted = self.redactor.redact_value(&value);
                serde_json::to_string_pretty(&redacted).unwrap_or_else(|_| redacted.to_string())
            }
            Err(_) => truncate_chars(&arg.summary(), MAX_ARG_SUMMARY_CHARS, "…"),
        }
    }
}

/// Decorator installed in the console slot.
pub struct InterceptedConsole {
    inner: Rc<dyn ConsoleSink>,
    recorder: ConsoleRecorder,
}

impl InterceptedConsole {
    pub fn new(inner: Rc<dyn ConsoleSink>, recorder: ConsoleRecorder) -> Self {
        Self { inner, recorder }
    }
}

impl ConsoleSink for InterceptedConsole {
    fn write(&self, method: ConsoleMethod, args: &[&dyn ConsoleArg]) {
        self.inner.write(method, args);
        self.recorder.record(method, args);
    }
}

/// Console slot wrap plus the page-level error listeners.
pub struct ConsoleCapture {
    recorder: ConsoleRecorder,
    listeners: RefCell<ListenerSet>,
}

impl ConsoleCapture {
    pub fn new(recorder: ConsoleRecorder) -> Self {
        Self {
            recorder,
            listeners: RefCell::new(ListenerSet::default()),
        }
    }

    pub fn recorder(&self) -> &ConsoleRecorder {
        &self.recorder
    }

    pub fn is_installed(&self) -> bool {
        self.listeners.borrow().is_attached()
    }

    pub fn install(&self, page: &HostPage) {
        if self.is_installed() {
            return;
        }

        let recorder = self.recorder.clone();
        page.console_slot().borrow_mut().wrap(|inner| {
            Rc::new(InterceptedConsole::new(inner, recorder)) as Rc<dyn ConsoleSink>
        });

        let mut listeners = self.listeners.borrow_mut();
        let recorder = self.recorder.clone();
        listeners.push(
            page.events()
                .add_listener(PageEventKind::UncaughtError, move |event| {
                    if let PageEvent::UncaughtError { message, source } = event {
                        let text = match source {
                            Some(source) => format!("Uncaught error: {} ({})", message, source),
                            None => format!("Uncaught error: {}", message),
                        };
                        recorder.record_message(LogLevel::Error, &text);
                    }
                }),
        );
        let recorder = self.recorder.clone();
        listeners.push(
            page.events()
                .add_listener(PageEventKind::UnhandledRejection, move |event| {
                    if let PageEvent::UnhandledRejection { reason } = event {
                        recorder.record_message(
                            LogLevel::Error,
                            &format!("Unhandled promise rejection: {}", reason),
                        );
                    }
                }),
        );
    }

    pub fn uninstall(&self, page: &HostPage) {
        page.console_slot().borrow_mut().restore();
        self.listeners.borrow_mut().detach_all(page.events());
    }
}
