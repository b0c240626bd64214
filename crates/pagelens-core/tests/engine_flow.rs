#![forbid(unsafe_code)]

//! End-to-end engine flows: script load, parent-frame command dispatch,
//! pick-and-report, and the fault pipeline feeding the debug dump.

use pretty_assertions::assert_eq;
use serde_json::json;

use pagelens_core::dom::{ElementFacts, Rect};
use pagelens_core::engine::DEBUG_ERRORS_PATH;
use pagelens_core::faults::RuntimeFault;
use pagelens_core::locator::{ElementLocator, LENS_ID_ATTR};
use pagelens_core::picker::DomCommand;
use pagelens_core::tree::RawNode;
use pagelens_core::view::DocumentSnapshot;
use pagelens_core::{
    CommandOutcome, Effect, Engine, EngineConfig, InboundCommand, InitOutcome, OutboundMessage,
    PageContext, PickerInput,
};

const PARENT: &str = "https://studio.example";

fn engine() -> Engine {
    Engine::new(
        EngineConfig {
            allowed_origins: vec![PARENT.to_owned()],
            ..EngineConfig::default()
        },
        "https://app.test/a",
        "/a",
    )
}

fn page() -> PageContext {
    PageContext::new("https://app.test/a", "/a")
}

fn snapshot() -> DocumentSnapshot {
    DocumentSnapshot {
        title: "Dashboard".into(),
        hostname: "app.test".into(),
        path: "/a".into(),
        ..DocumentSnapshot::default()
    }
}

fn button_facts() -> ElementFacts {
    ElementFacts {
        tag: "button".into(),
        text: "Save".into(),
        locator: Some(ElementLocator::new("src/App.tsx", 12, 4)),
        has_lens_identity: true,
        rect: Rect {
            left: 10.0,
            top: 50.0,
            width: 120.0,
            height: 32.0,
        },
        viewport_width: 1280.0,
        ..ElementFacts::default()
    }
}

fn button_node() -> RawNode {
    let mut node = RawNode {
        tag_name: "BUTTON".into(),
        text: "Save".into(),
        ..RawNode::default()
    };
    node.attrs
        .insert(LENS_ID_ATTR.to_owned(), "src/App.tsx:12:4".to_owned());
    node
}

#[test]
fn full_pick_flow_from_parent_toggle_to_click_report() {
    let mut engine = engine();
    let InitOutcome::Start { messages, .. } = engine.init(0, &page(), snapshot()) else {
        panic!("normal start expected");
    };
    assert!(matches!(
        messages[0],
        OutboundMessage::SelectorScriptLoaded { .. }
    ));

    // Parent turns picking on.
    let outcome = engine
        .on_message(PARENT, &json!({ "type": "TOGGLE_SELECTOR", "payload": true }), 100)
        .expect("toggle dispatch");
    let CommandOutcome::Effects(effects) = outcome else {
        panic!("effects expected");
    };
    assert!(effects.contains(&Effect::Dom(DomCommand::AttachPickerListeners)));

    // Hover settles after the debounce, highlighting by locator.
    engine.handle_picker_input(
        PickerInput::MouseOver {
            target: button_facts(),
        },
        200,
    );
    let effects = engine.poll_picker(210);
    assert!(effects.contains(&Effect::Dom(DomCommand::MarkHovered {
        locator: ElementLocator::new("src/App.tsx", 12, 4),
    })));

    // Click selects and reports, with the component payload built from the
    // reflected element.
    let effects = engine.handle_picker_input(
        PickerInput::Click {
            target: button_facts(),
            hovered_node: Some(button_node()),
            meta_key: false,
            ctrl_key: false,
        },
        300,
    );
    let Some(Effect::Send(OutboundMessage::ElementClicked {
        payload,
        is_multi_select,
    })) = effects.last()
    else {
        panic!("click report expected");
    };
    assert!(!is_multi_select);
    assert_eq!(payload.file_path, "src/App.tsx");
    assert_eq!(payload.line_number, 12);
}

#[test]
fn faults_accumulate_and_surface_on_the_debug_route() {
    let mut engine = engine();
    engine.init(0, &page(), snapshot());

    let fault = RuntimeFault {
        message: "boom".into(),
        filename: "src/App.tsx".into(),
        lineno: 3,
        colno: 1,
        stack: None,
    };
    assert!(engine.report_runtime_error(&fault, 1_000, &page()).is_some());
    // Same fault inside the window: logged once.
    assert!(engine.report_runtime_error(&fault, 2_000, &page()).is_none());

    let dump = engine.export_errors();
    let parsed: serde_json::Value = serde_json::from_str(&dump).expect("valid json");
    assert_eq!(parsed.as_array().map(Vec::len), Some(1));
    assert_eq!(parsed[0]["message"], "boom");
    assert_eq!(parsed[0]["source"], "runtime");
    // The page-load interaction from init rides along.
    assert_eq!(parsed[0]["interactionTrail"][0]["type"], "page_load");

    // A fresh engine landing on the debug route dumps and halts.
    let mut debug_engine = engine_on_debug_route();
    let outcome = debug_engine.init(
        0,
        &PageContext::new("https://app.test/__debug/errors", DEBUG_ERRORS_PATH),
        snapshot(),
    );
    assert_eq!(outcome, InitOutcome::DebugDump("[]".to_owned()));
}

fn engine_on_debug_route() -> Engine {
    Engine::new(
        EngineConfig {
            allowed_origins: vec![PARENT.to_owned()],
            ..EngineConfig::default()
        },
        "https://app.test/__debug/errors",
        DEBUG_ERRORS_PATH,
    )
}

#[test]
fn selection_survives_picker_deactivation() {
    let mut engine = engine();
    engine.init(0, &page(), snapshot());
    engine.dispatch(InboundCommand::ToggleSelector { payload: true }, 100);
    let outcome = engine.dispatch(
        InboundCommand::UpdateSelectedElements {
            payload: vec![ElementLocator::new("src/App.tsx", 12, 4)],
        },
        150,
    );
    let CommandOutcome::Effects(effects) = outcome else {
        panic!("effects expected");
    };
    assert!(effects.contains(&Effect::Dom(DomCommand::MarkSelected {
        locator: ElementLocator::new("src/App.tsx", 12, 4),
    })));

    let CommandOutcome::Effects(effects) =
        engine.dispatch(InboundCommand::ToggleSelector { payload: false }, 200)
    else {
        panic!("effects expected");
    };
    // Deactivation never strips explicit selection.
    assert!(!effects.contains(&Effect::Dom(DomCommand::ClearAllSelectionMarks)));
    assert!(effects.contains(&Effect::Dom(DomCommand::ClearHoverMarksExceptSelected)));
}
