#![forbid(unsafe_code)]

//! The engine: one context object owning every capture subsystem.
//!
//! The web glue constructs a single [`Engine`] per script load and routes
//! everything through it: lifecycle (init, root render, cleanup on re-init),
//! inbound parent-frame commands, browser events, and the host-polled
//! timers. The engine itself never touches the DOM or the clock; hosts pass
//! `now_ms` in and execute the returned effects.

use serde_json::Value;
use tracing::debug;

use crate::console::{ConsoleCall, capture as capture_console};
use crate::faults::{FaultPipeline, RejectionFault, RuntimeFault};
use crate::keybind::{KeydownOutcome, on_keydown};
use crate::navigation::{NavigationProbe, NavigationTracker, NavigationTrigger, UrlWatch};
use crate::network::{
    FetchFailure, RequestCapture, ResponseFacts, failure_event, success_event,
};
use crate::overlay::{OverlaySnapshot, fallback_overlay_error, report_overlay_error};
use crate::picker::{Effect, PickerConfig, PickerEngine, PickerInput};
use crate::dom::ElementFacts;
use crate::protocol::{
    CommandRejected, ComponentTreePayload, InboundCommand, OutboundMessage, RawKeyEvent,
    ScriptLoadedPayload, parse_command,
};
use crate::trail::{FormFacts, InteractionTrail, PageContext};
use crate::tree::{RawNode, build_tree};
use crate::view::{DocumentSnapshot, UNKNOWN_VIEW, ViewDetector};

/// Path that turns the page into a raw error-log dump.
pub const DEBUG_ERRORS_PATH: &str = "/__debug/errors";

/// Static engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Parent origins allowed to command this page (exact match).
    pub allowed_origins: Vec<String>,
    /// DOM id of the app root element.
    pub root_id: String,
    /// Version reported in `SELECTOR_SCRIPT_LOADED`.
    pub script_version: String,
    /// Extra keywords for the view detector's semantic-class strategy;
    /// empty means the built-in list.
    pub semantic_keywords: Vec<String>,
    pub picker: PickerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            root_id: "root".to_owned(),
            script_version: "1.0.0".to_owned(),
            semantic_keywords: Vec::new(),
            picker: PickerConfig::default(),
        }
    }
}

/// What `init` decided.
#[derive(Debug, Clone, PartialEq)]
pub enum InitOutcome {
    /// Normal start: inject the stylesheet, post the messages, carry on.
    Start {
        stylesheet: String,
        messages: Vec<OutboundMessage>,
    },
    /// Debug route: replace the document with this JSON and stop.
    DebugDump(String),
}

/// Command dispatch result. Most commands reduce to effects; two need host
/// work the engine cannot express.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Effects(Vec<Effect>),
    /// Reflect the app root and call [`Engine::component_tree`].
    NeedsComponentTree,
    /// Clear caches, unregister service workers, clear session storage,
    /// then reload with `hard=<value>` appended as a cache buster.
    HardRefresh { cache_buster: String },
}

/// Everything the instrumentation layer keeps between events.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    trail: InteractionTrail,
    view: ViewDetector,
    pipeline: FaultPipeline,
    picker: PickerEngine,
    nav: NavigationTracker,
    url_watch: UrlWatch,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig, initial_url: &str, initial_path: &str) -> Self {
        let view = if config.semantic_keywords.is_empty() {
            ViewDetector::with_default_keywords()
        } else {
            ViewDetector::new(config.semantic_keywords.clone())
        };
        let picker = PickerEngine::new(config.picker.clone());
        Self {
            config,
            trail: InteractionTrail::new(),
            view,
            pipeline: FaultPipeline::new(),
            picker,
            nav: NavigationTracker::new(initial_path, UNKNOWN_VIEW),
            url_watch: UrlWatch::new(initial_url),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn picker(&self) -> &PickerEngine {
        &self.picker
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// First call after script load. On the debug route the page becomes a
    /// raw dump of the error log and nothing else initializes.
    pub fn init(
        &mut self,
        now_ms: u64,
        page: &PageContext,
        snapshot: DocumentSnapshot,
    ) -> InitOutcome {
        if page.path.starts_with(DEBUG_ERRORS_PATH) {
            return InitOutcome::DebugDump(self.pipeline.log().export_json());
        }
        let title = snapshot.title.clone();
        let view = self.view.detect_with(now_ms, || snapshot);
        self.trail.record_page_load(&view, &title, now_ms, page);
        self.nav = NavigationTracker::new(page.path.clone(), view);
        debug!(version = %self.config.script_version, "instrumentation starting");
        InitOutcome::Start {
            stylesheet: self.config.picker.base_stylesheet(),
            messages: vec![OutboundMessage::SelectorScriptLoaded {
                payload: ScriptLoadedPayload {
                    version: self.config.script_version.clone(),
                },
            }],
        }
    }

    /// The app root has rendered (and any pending hot update settled): ask
    /// the parent to replay picker state and selection.
    #[must_use]
    pub fn on_root_rendered(&self) -> Vec<OutboundMessage> {
        vec![
            OutboundMessage::RequestPickerState,
            OutboundMessage::RequestSelectedElements,
        ]
    }

    // -----------------------------------------------------------------------
    // Inbound commands
    // -----------------------------------------------------------------------

    /// Parse and dispatch one `message` event.
    pub fn on_message(
        &mut self,
        origin: &str,
        data: &Value,
        now_ms: u64,
    ) -> Result<CommandOutcome, CommandRejected> {
        let command = parse_command(&self.config.allowed_origins, origin, data)?;
        Ok(self.dispatch(command, now_ms))
    }

    /// Dispatch a parsed command.
    pub fn dispatch(&mut self, command: InboundCommand, now_ms: u64) -> CommandOutcome {
        match command {
            InboundCommand::RequestComponentTree => CommandOutcome::NeedsComponentTree,
            InboundCommand::HardRefresh { token } => CommandOutcome::HardRefresh {
                cache_buster: match token {
                    Some(Value::String(s)) => s,
                    Some(other) => other.to_string(),
                    None => now_ms.to_string(),
                },
            },
            other => CommandOutcome::Effects(self.picker.apply_command(&other)),
        }
    }

    /// Host-side dispatch threw; tear the picker down so no listeners or
    /// style overrides leak.
    pub fn on_dispatch_failure(&mut self) -> Vec<Effect> {
        self.picker.on_dispatch_failure()
    }

    /// Build the `COMPONENT_TREE` reply from the reflected app root.
    #[must_use]
    pub fn component_tree(&self, root: &RawNode) -> OutboundMessage {
        OutboundMessage::ComponentTree {
            payload: ComponentTreePayload {
                tree: build_tree(root),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Picker passthrough
    // -----------------------------------------------------------------------

    pub fn handle_picker_input(&mut self, input: PickerInput, now_ms: u64) -> Vec<Effect> {
        self.picker.handle(input, now_ms)
    }

    // -----------------------------------------------------------------------
    // Fault capture
    // -----------------------------------------------------------------------

    pub fn report_runtime_error(
        &mut self,
        fault: &RuntimeFault,
        now_ms: u64,
        page: &PageContext,
    ) -> Option<OutboundMessage> {
        let trail = self.trail.snapshot();
        self.pipeline.report_runtime_error(fault, now_ms, page, trail)
    }

    pub fn report_unhandled_rejection(
        &mut self,
        fault: &RejectionFault,
        now_ms: u64,
        page: &PageContext,
    ) -> Option<OutboundMessage> {
        let trail = self.trail.snapshot();
        self.pipeline
            .report_unhandled_rejection(fault, now_ms, page, trail)
    }

    pub fn report_console(
        &mut self,
        call: ConsoleCall,
        now_ms: u64,
        page: &PageContext,
    ) -> OutboundMessage {
        let trail = self.trail.snapshot();
        capture_console(call, now_ms, page, trail, &mut self.pipeline)
    }

    pub fn report_overlay(
        &mut self,
        snapshot: &OverlaySnapshot,
        now_ms: u64,
        page: &PageContext,
    ) -> OutboundMessage {
        let trail = self.trail.snapshot();
        report_overlay_error(&mut self.pipeline, snapshot, now_ms, page, trail)
    }

    pub fn report_overlay_fallback(
        &mut self,
        raw_text: &str,
        now_ms: u64,
        page: &PageContext,
    ) -> OutboundMessage {
        let trail = self.trail.snapshot();
        fallback_overlay_error(&mut self.pipeline, raw_text, now_ms, page, trail)
    }

    /// JSON dump for the debug route.
    #[must_use]
    pub fn export_errors(&self) -> String {
        self.pipeline.log().export_json()
    }

    // -----------------------------------------------------------------------
    // Network
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn network_success(
        &self,
        capture: &RequestCapture,
        response: &ResponseFacts,
        duration_ms: u64,
        timestamp: String,
        origin: String,
        page: &PageContext,
    ) -> OutboundMessage {
        success_event(
            capture,
            response,
            duration_ms,
            timestamp,
            origin,
            page,
            self.trail.snapshot(),
        )
    }

    #[must_use]
    pub fn network_failure(
        &self,
        capture: &RequestCapture,
        failure: &FetchFailure,
        duration_ms: u64,
        timestamp: String,
        origin: String,
        page: &PageContext,
    ) -> OutboundMessage {
        failure_event(
            capture,
            failure,
            duration_ms,
            timestamp,
            origin,
            page,
            self.trail.snapshot(),
        )
    }

    // -----------------------------------------------------------------------
    // Interaction trail
    // -----------------------------------------------------------------------

    pub fn record_click(&mut self, facts: &ElementFacts, now_ms: u64, page: &PageContext) -> bool {
        self.trail.record_click(facts, now_ms, page)
    }

    pub fn record_focus(&mut self, facts: &ElementFacts, now_ms: u64, page: &PageContext) -> bool {
        self.trail.record_focus(facts, now_ms, page)
    }

    pub fn record_form_submit(&mut self, form: &FormFacts, now_ms: u64, page: &PageContext) {
        self.trail.record_form_submit(form, now_ms, page);
    }

    // -----------------------------------------------------------------------
    // Keybinds
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn keydown(&self, event: &RawKeyEvent, now_ms: u64) -> KeydownOutcome {
        on_keydown(event, now_ms)
    }

    // -----------------------------------------------------------------------
    // Navigation & view
    // -----------------------------------------------------------------------

    pub fn detect_view(
        &mut self,
        now_ms: u64,
        snapshot: impl FnOnce() -> DocumentSnapshot,
    ) -> String {
        self.view.detect_with(now_ms, snapshot)
    }

    pub fn note_root_mutation(&mut self, now_ms: u64) {
        self.nav.note_mutation(now_ms);
        self.view.invalidate();
    }

    pub fn note_popstate(&mut self, now_ms: u64) {
        self.nav.note_popstate(now_ms);
        self.view.invalidate();
    }

    /// Returns the trigger of a due navigation check, if any. The host then
    /// gathers a fresh probe and calls [`Self::apply_navigation`].
    pub fn poll_navigation(&mut self, now_ms: u64) -> Option<NavigationTrigger> {
        self.nav.poll(now_ms)
    }

    pub fn apply_navigation(
        &mut self,
        probe: &NavigationProbe,
        trigger: NavigationTrigger,
        now_ms: u64,
        page: &PageContext,
    ) -> bool {
        self.nav
            .apply(probe, trigger, &mut self.trail, now_ms, page)
    }

    /// Check the full URL against the last broadcast value.
    pub fn observe_url(&mut self, url: &str) -> Option<OutboundMessage> {
        self.url_watch.observe(url)
    }

    /// Fire due picker timers.
    pub fn poll_picker(&mut self, now_ms: u64) -> Vec<Effect> {
        self.picker.poll(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config() -> EngineConfig {
        EngineConfig {
            allowed_origins: vec!["https://studio.example".to_owned()],
            ..EngineConfig::default()
        }
    }

    fn page() -> PageContext {
        PageContext::new("https://app.test/a", "/a")
    }

    fn snapshot(title: &str) -> DocumentSnapshot {
        DocumentSnapshot {
            title: title.to_owned(),
            hostname: "app.test".to_owned(),
            path: "/a".to_owned(),
            ..DocumentSnapshot::default()
        }
    }

    #[test]
    fn init_records_page_load_and_announces_the_script() {
        let mut engine = Engine::new(config(), "https://app.test/a", "/a");
        let outcome = engine.init(1_000, &page(), snapshot("Dashboard"));
        let InitOutcome::Start { messages, stylesheet } = outcome else {
            panic!("expected normal start");
        };
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            &messages[0],
            OutboundMessage::SelectorScriptLoaded { payload } if payload.version == "1.0.0"
        ));
        assert!(stylesheet.contains("#0da2e7"));
    }

    #[test]
    fn debug_route_short_circuits_init() {
        let mut engine = Engine::new(config(), "https://app.test/x", DEBUG_ERRORS_PATH);
        let debug_page = PageContext::new(
            "https://app.test/__debug/errors",
            DEBUG_ERRORS_PATH,
        );
        let outcome = engine.init(1_000, &debug_page, snapshot("x"));
        assert_eq!(outcome, InitOutcome::DebugDump("[]".to_owned()));
    }

    #[test]
    fn root_render_requests_picker_replay() {
        let engine = Engine::new(config(), "https://app.test/a", "/a");
        assert_eq!(
            engine.on_root_rendered(),
            vec![
                OutboundMessage::RequestPickerState,
                OutboundMessage::RequestSelectedElements,
            ]
        );
    }

    #[test]
    fn message_from_allowed_origin_dispatches() {
        let mut engine = Engine::new(config(), "https://app.test/a", "/a");
        let outcome = engine
            .on_message(
                "https://studio.example",
                &json!({ "type": "GET_SELECTOR_STATE" }),
                1_000,
            )
            .expect("dispatch");
        let CommandOutcome::Effects(effects) = outcome else {
            panic!("expected effects");
        };
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn message_from_unknown_origin_is_rejected() {
        let mut engine = Engine::new(config(), "https://app.test/a", "/a");
        let err = engine
            .on_message(
                "https://evil.example",
                &json!({ "type": "GET_SELECTOR_STATE" }),
                1_000,
            )
            .expect_err("must reject");
        assert_eq!(err, CommandRejected::OriginNotAllowed);
    }

    #[test]
    fn hard_refresh_prefers_the_provided_token() {
        let mut engine = Engine::new(config(), "https://app.test/a", "/a");
        let outcome = engine.dispatch(
            InboundCommand::HardRefresh {
                token: Some(json!("deploy-42")),
            },
            9_999,
        );
        assert_eq!(
            outcome,
            CommandOutcome::HardRefresh {
                cache_buster: "deploy-42".to_owned()
            }
        );

        let outcome = engine.dispatch(InboundCommand::HardRefresh { token: None }, 9_999);
        assert_eq!(
            outcome,
            CommandOutcome::HardRefresh {
                cache_buster: "9999".to_owned()
            }
        );
    }

    #[test]
    fn component_tree_request_defers_to_the_host() {
        let mut engine = Engine::new(config(), "https://app.test/a", "/a");
        assert_eq!(
            engine.dispatch(InboundCommand::RequestComponentTree, 1_000),
            CommandOutcome::NeedsComponentTree
        );
    }

    #[test]
    fn faults_carry_the_current_trail() {
        let mut engine = Engine::new(config(), "https://app.test/a", "/a");
        engine.init(1_000, &page(), snapshot("Dashboard"));
        let msg = engine
            .report_runtime_error(
                &RuntimeFault {
                    message: "boom".into(),
                    filename: "src/App.tsx".into(),
                    lineno: 3,
                    colno: 1,
                    stack: None,
                },
                2_000,
                &page(),
            )
            .expect("first report");
        let OutboundMessage::RuntimeError { error } = msg else {
            panic!("wrong variant");
        };
        // The page-load record from init is on the trail.
        assert_eq!(error.interaction_trail.len(), 1);
        assert!(engine.export_errors().contains("boom"));
    }

    #[test]
    fn navigation_poll_and_apply_flow() {
        let mut engine = Engine::new(config(), "https://app.test/a", "/a");
        engine.init(1_000, &page(), snapshot("Dashboard"));
        engine.note_root_mutation(2_000);
        assert!(engine.poll_navigation(2_040).is_none());
        let trigger = engine.poll_navigation(2_050).expect("due");
        let changed = engine.apply_navigation(
            &NavigationProbe {
                path: "/b".into(),
                view: "reports".into(),
                title: "Reports".into(),
            },
            trigger,
            2_051,
            &page(),
        );
        assert!(changed);
    }

    #[test]
    fn url_watch_round_trip() {
        let mut engine = Engine::new(config(), "https://app.test/a", "/a");
        assert!(engine.observe_url("https://app.test/a").is_none());
        assert!(engine.observe_url("https://app.test/b").is_some());
    }
}
