//! On-demand render profiler.
//!
//! The agent never inspects framework internals. Whatever UI framework hosts
//! it supplies a [`RenderInstrumentation`]: per-render callbacks carrying
//! `(component id, phase, duration, commit time)` plus tree-mutation
//! notifications. [`RenderHub`] is a ready-made implementation the host
//! dispatches into.
//!
//! Profiling is an observation sidecar: callbacks only aggregate numbers,
//! they never return anything to the renderer.
//!
//! # Report Ordering
//!
//! The report holds the top `K` components by cumulative render time,
//! descending, with ties broken by render count (descending) and then name so
//! the output is stable.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use devpanel_protocol::{ComponentRenderStat, RenderPhase};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ProfilerConfig;
use crate::patterns::RE_VERSION_PREFIX;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSample {
    pub component_id: String,
    pub phase: RenderPhase,
    pub duration_ms: f64,
    pub commit_time: DateTime<Utc>,
}

/// Handle returned by a subscription. Cancelling (or dropping) detaches the callback.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Capability a host framework provides so renders can be measured.
pub trait RenderInstrumentation {
    fn on_render(&self, callback: Box<dyn Fn(&RenderSample)>) -> Subscription;

    /// `callback` receives the number of nodes touched by one mutation batch.
    fn on_mutation(&self, callback: Box<dyn Fn(usize)>) -> Subscription;

    fn framework_version(&self) -> Option<String>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-process instrumentation
// ═══════════════════════════════════════════════════════════════════════════════

type Registry<F> = Rc<RefCell<Vec<(u64, Rc<F>)>>>;

fn unsubscribe_from<F: ?Sized + 'static>(registry: &Registry<F>, id: u64) -> Subscription {
    let weak: Weak<RefCell<Vec<(u64, Rc<F>)>>> = Rc::downgrade(registry);
    Subscription::new(move || {
        if let Some(registry) = weak.upgrade() {
            registry.borrow_mut().retain(|(existing, _)| *existing != id);
        }
    })
}

/// Host-driven [`RenderInstrumentation`]: the host calls
/// [`RenderHub::dispatch_render`] from its render callback and
/// [`RenderHub::dispatch_mutations`] from its mutation observer.
#[derive(Default)]
pub struct RenderHub {
    renders: Registry<dyn Fn(&RenderSample)>,
    mutations: Registry<dyn Fn(usize)>,
    next_id: Cell<u64>,
    version: Option<String>,
}

impl RenderHub {
    pub fn new(version: Option<String>) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub fn dispatch_render(&self, sample: &RenderSample) {
        let callbacks: Vec<_> = self
            .renders
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(sample);
        }
    }

    pub fn dispatch_mutations(&self, count: usize) {
        let callbacks: Vec<_> = self
            .mutations
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(count);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.renders.borrow().len() + self.mutations.borrow().len()
    }
}

impl RenderInstrumentation for RenderHub {
    fn on_render(&self, callback: Box<dyn Fn(&RenderSample)>) -> Subscription {
        let id = self.next_id();
        self.renders.borrow_mut().push((id, Rc::from(callback)));
        unsubscribe_from(&self.renders, id)
    }

    fn on_mutation(&self, callback: Box<dyn Fn(usize)>) -> Subscription {
        let id = self.next_id();
        self.mutations.borrow_mut().push((id, Rc::from(callback)));
        unsubscribe_from(&self.mutations, id)
    }

    fn framework_version(&self) -> Option<String> {
        self.version.clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Compatibility
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    Supported { version: String },
    Unsupported { version: String, minimum: String },
    /// The host did not report a version, or it did not parse.
    Unknown,
}

impl Compatibility {
    pub fn check(version: Option<&str>, minimum: &str) -> Self {
        let Some(version) = version else {
            return Compatibility::Unknown;
        };
        match (parse_major_minor(version), parse_major_minor(minimum)) {
            (Some(found), Some(required)) if found >= required => Compatibility::Supported {
                version: version.to_string(),
            },
            (Some(_), Some(_)) => Compatibility::Unsupported {
                version: version.to_string(),
                minimum: minimum.to_string(),
            },
            _ => Compatibility::Unknown,
        }
    }

    /// Banner text shown in the panel. Capture keeps running either way.
    pub fn warning(&self) -> Option<String> {
        match self {
            Compatibility::Supported { .. } => None,
            Compatibility::Unsupported { version, minimum } => Some(format!(
                "Framework {} is older than {}; render profiling may be incomplete",
                version, minimum
            )),
            Compatibility::Unknown => {
                Some("Framework version unknown; render profiling may be incomplete".to_string())
            }
        }
    }
}

fn parse_major_minor(version: &str) -> Option<(u32, u32)> {
    let caps = RE_VERSION_PREFIX.captures(version)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    Some((major, minor))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Profiler
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderReport {
    pub top: Vec<ComponentRenderStat>,
    pub component_count: usize,
    pub total_renders: u64,
    pub total_render_ms: f64,
    pub mutations: u64,
}

#[derive(Default)]
struct ProfileState {
    enabled: bool,
    stats: HashMap<String, ComponentRenderStat>,
    mutations: u64,
}

impl ProfileState {
    fn record(&mut self, sample: &RenderSample, slow_render_ms: f64) {
        if !self.enabled {
            return;
        }
        let stat = self
            .stats
            .entry(sample.component_id.clone())
            .or_insert_with(|| ComponentRenderStat {
                name: sample.component_id.clone(),
                render_time_ms: 0.0,
                render_count: 0,
                phase: sample.phase,
                last_rendered_at: sample.commit_time,
                slow_renders: 0,
            });
        let duration = sample.duration_ms.max(0.0);
        stat.render_time_ms += duration;
        stat.render_count += 1;
        stat.phase = sample.phase;
        stat.last_rendered_at = sample.commit_time;
        if duration > slow_render_ms {
            stat.slow_renders += 1;
        }
    }

    fn report(&self, top_k: usize) -> RenderReport {
        let mut stats: Vec<ComponentRenderStat> = self.stats.values().cloned().collect();
        stats.sort_by(|a, b| {
            b.render_time_ms
                .total_cmp(&a.render_time_ms)
                .then_with(|| b.render_count.cmp(&a.render_count))
                .then_with(|| a.name.cmp(&b.name))
        });
        let total_renders = stats.iter().map(|s| s.render_count).sum();
        let total_render_ms = stats.iter().map(|s| s.render_time_ms).sum();
        let component_count = stats.len();
        stats.truncate(top_k);
        RenderReport {
            top: stats,
            component_count,
            total_renders,
            total_render_ms,
            mutations: self.mutations,
        }
    }
}

pub struct RenderProfiler {
    instrumentation: Rc<dyn RenderInstrumentation>,
    config: ProfilerConfig,
    state: Rc<RefCell<ProfileState>>,
    subscriptions: RefCell<Vec<Subscription>>,
    last_report: RefCell<Option<RenderReport>>,
}

impl RenderProfiler {
    pub fn new(instrumentation: Rc<dyn RenderInstrumentation>, config: ProfilerConfig) -> Self {
        Self {
            instrumentation,
            config,
            state: Rc::new(RefCell::new(ProfileState::default())),
            subscriptions: RefCell::new(Vec::new()),
            last_report: RefCell::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.borrow().enabled
    }

    pub fn compatibility(&self) -> Compatibility {
        Compatibility::check(
            self.instrumentation.framework_version().as_deref(),
            &self.config.min_framework_version,
        )
    }

    /// Clears previous stats and starts observing.
    pub fn start(&self) {
        if self.is_enabled() {
            return;
        }
        if let Some(banner) = self.compatibility().warning() {
            warn!(warning = %banner, "Profiling on a possibly unsupported framework");
        }

        {
            let mut state = self.state.borrow_mut();
            state.stats.clear();
            state.mutations = 0;
            state.enabled = true;
        }

        let slow_render_ms = self.config.slow_render_ms;
        let weak = Rc::downgrade(&self.state);
        let on_render = self.instrumentation.on_render(Box::new(move |sample| {
            if let Some(state) = weak.upgrade() {
                if let Ok(mut state) = state.try_borrow_mut() {
                    state.record(sample, slow_render_ms);
                }
            }
        }));

        let weak = Rc::downgrade(&self.state);
        let on_mutation = self.instrumentation.on_mutation(Box::new(move |count| {
            if let Some(state) = weak.upgrade() {
                if let Ok(mut state) = state.try_borrow_mut() {
                    if state.enabled {
                        state.mutations += count as u64;
                    }
                }
            }
        }));

        let mut subscriptions = self.subscriptions.borrow_mut();
        subscriptions.push(on_render);
        subscriptions.push(on_mutation);
        info!("Render profiling started");
    }

    /// Stops observing and snapshots the top components.
    pub fn stop(&self) -> RenderReport {
        self.state.borrow_mut().enabled = false;
        for subscription in self.subscriptions.borrow_mut().drain(..) {
            subscription.cancel();
        }

        let report = self.state.borrow().report(self.config.top_k);
        info!(
            components = report.component_count,
            renders = report.total_renders,
            "Render profiling stopped"
        );
        *self.last_report.borrow_mut() = Some(report.clone());
        report
    }

    /// The report from the most recent `stop`.
    pub fn last_report(&self) -> Option<RenderReport> {
        self.last_report.borrow().clone()
    }
}
