//! Scripted page session.
//!
//! Builds a page whose transport answers from a small fake backend, mounts
//! the agent on it, plays a short user journey and prints each panel tab.
//! Storage lives in the state directory, so a second run within the session
//! timeout resumes the same session and shows the earlier history too.

use std::path::Path;
use std::rc::Rc;

use chrono::{Duration, Utc};
use devpanel_core::host::{ConsoleArg, ImageFact, PageTiming, Viewport};
use devpanel_core::{
    AccessDecision, ActionFeedback, Agent, AgentConfig, Clock, ConsoleMethod, ConsoleSink, ElementTarget,
    FileStorage, HostPage, HttpRequest, HttpResponse, Identity, ManualClock, PageEvent, PageFacts,
    Panel, RenderHub, RenderSample, Transport, TransportError,
};
use devpanel_protocol::{PanelTab, RenderPhase};
use serde_json::Value;

const DEMO_FRAMEWORK_VERSION: &str = "18.2.0";

pub struct DemoOptions {
    pub user: Option<String>,
    pub track_interactions: bool,
    pub profile: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Page primitives
// ═══════════════════════════════════════════════════════════════════════════════

/// The page's native console: echoes to stdout.
struct TerminalConsole;

impl ConsoleSink for TerminalConsole {
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
        println!("  console.{:<5} {}", method.as_str(), line);
    }
}

/// Canned backend. Each call moves the clock forward by its latency.
struct FakeBackend {
    clock: Rc<ManualClock>,
}

impl Transport for FakeBackend {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let (latency_ms, result) = match (request.method.as_str(), request.url.as_str()) {
            ("GET", "/api/items") => (
                42,
                Ok(HttpResponse::ok(r#"[{"sku":"A-1","qty":3},{"sku":"B-7","qty":0}]"#)),
            ),
            ("POST", "/api/login") => (
                118,
                Ok(HttpResponse::ok(
                    r#"{"token":"eyJhbGciOiJIUzI1NiJ9.demo.sig","user":{"id":"u_1","name":"Ada"}}"#,
                )),
            ),
            ("GET", "/api/report") => (3_000, Err(TransportError::new("request timed out"))),
            _ => (9, Ok(HttpResponse::new(404, r#"{"error":"not found"}"#))),
        };
        self.clock.advance_ms(latency_ms);
        result
    }
}

fn demo_facts() -> PageFacts {
    PageFacts {
        viewport: Viewport {
            width: 1280,
            height: 800,
        },
        document_width: 1296,
        document_height: 2400,
        build_id: Some("demo-build".to_string()),
        user_agent: Some(format!("devpanel/{}", env!("CARGO_PKG_VERSION"))),
        element_count: 640,
        images: vec![
            ImageFact {
                src: "/img/logo.svg".to_string(),
                complete: true,
                natural_width: 120,
            },
            ImageFact {
                src: "/img/hero.jpg".to_string(),
                complete: true,
                natural_width: 0,
            },
        ],
        timing: PageTiming {
            dom_content_loaded_ms: Some(820.0),
            load_ms: Some(1_450.0),
        },
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Script
// ═══════════════════════════════════════════════════════════════════════════════

fn report(label: &str, feedback: ActionFeedback) {
    println!("> {}: {}", label, feedback.message);
}

fn render(hub: &RenderHub, clock: &ManualClock, component: &str, phase: RenderPhase, ms: f64) {
    hub.dispatch_render(&RenderSample {
        component_id: component.to_string(),
        phase,
        duration_ms: ms,
        commit_time: clock.now(),
    });
}

fn play_journey(page: &HostPage, hub: &RenderHub, clock: &ManualClock) {
    page.navigate("/inventory");
    render(hub, clock, "InventoryTable", RenderPhase::Mount, 24.5);
    render(hub, clock, "Sidebar", RenderPhase::Mount, 3.1);
    hub.dispatch_mutations(37);
    let _ = page.fetch(&HttpRequest::get("/api/items"));
    page.log("inventory loaded");

    page.dispatch(PageEvent::Click {
        target: ElementTarget::new("button")
            .with_id("sign-in")
            .with_class("primary"),
    });
    let _ = page.fetch(&HttpRequest::post(
        "/api/login",
        r#"{"email":"ada@example.com","password":"hunter2"}"#,
    ));
    page.console(
        ConsoleMethod::Info,
        &[&"signed in with", &serde_json::json!({ "user": "ada", "apiKey": "sk-live-123" })],
    );
    clock.advance(Duration::seconds(20));

    page.navigate("/reports");
    page.dispatch(PageEvent::Scroll);
    render(hub, clock, "ReportChart", RenderPhase::Mount, 41.0);
    render(hub, clock, "InventoryTable", RenderPhase::Update, 8.2);
    if page.fetch(&HttpRequest::get("/api/report")).is_err() {
        page.warn("report request failed; retrying later");
    }
    let _ = page.fetch(&HttpRequest::get("/api/missing"));
    page.dispatch(PageEvent::UnhandledRejection {
        reason: "chart data unavailable".to_string(),
    });
    clock.advance(Duration::seconds(45));
}

pub fn run(config: AgentConfig, state_dir: &Path, options: DemoOptions) -> Result<(), String> {
    let storage = Rc::new(FileStorage::open(state_dir)?);
    let clock = Rc::new(ManualClock::new(Utc::now()));
    let page = Rc::new(
        HostPage::new(
            Rc::new(FakeBackend {
                clock: Rc::clone(&clock),
            }),
            Rc::new(TerminalConsole),
            storage,
        )
        .with_facts(demo_facts()),
    );
    let hub = Rc::new(RenderHub::new(Some(DEMO_FRAMEWORK_VERSION.to_string())));

    let user = options
        .user
        .unwrap_or_else(|| config.allowed_user_id.clone());
    let mut agent = Agent::create(config, Rc::clone(&page))?
        .with_clock(clock.clone())
        .with_instrumentation(hub.clone());
    tracing::info!(dir = %state_dir.display(), "Starting demo page");

    let shown = if user.is_empty() { "<anonymous>" } else { user.as_str() };
    println!("Page loaded; authorizing {}", shown);
    let identity = if user.is_empty() {
        Identity::anonymous()
    } else {
        Identity::user(user, None)
    };
    match agent.authorize(&identity) {
        AccessDecision::Granted => {}
        other => {
            println!("Access {:?}; the panel stays hidden and nothing is captured.", other);
            return Ok(());
        }
    }

    let mut panel = Panel::load(page.storage());
    if options.track_interactions {
        report("interactions", panel.toggle_interactions(&agent));
    }
    if options.profile {
        report("profiler", panel.toggle_profiling(&agent));
    }

    play_journey(&page, &hub, &clock);
    agent.tick();

    if options.profile {
        report("profiler", panel.toggle_profiling(&agent));
    }
    report("diagnostics", panel.run_diagnostics(&agent));

    for tab in PanelTab::ALL {
        panel.select_tab(tab);
        println!();
        println!("{}", panel.render(&agent));
    }
    Ok(())
}
