#![forbid(unsafe_code)]

//! Wire protocol between the instrumented page and its hosting parent frame.
//!
//! Everything on the wire is a structured object with a `type` tag. Outbound
//! traffic ([`OutboundMessage`]) is best-effort: the web glue posts each
//! message once per configured parent origin and swallows send failures.
//! Inbound traffic is parsed by [`parse_command`] into the closed
//! [`InboundCommand`] enum; dispatch over it is an exhaustive match, so an
//! unrecognized `type` surfaces as a single warning instead of silent
//! fallthrough.
//!
//! Origin policy: origins are matched exactly against the allow-list. A
//! mismatch drops the message *silently* — logging would leak protocol shape
//! to untrusted senders. Malformed payloads from allowed origins are logged
//! and dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::faults::ErrorRecord;
use crate::locator::{ElementLocator, TargetRef};
use crate::network::NetworkEvent;
use crate::serialize::SerializedNode;
use crate::trail::{InteractionEvent, PageContext};
use crate::tree::{ComponentMeta, NodeTree};

// ---------------------------------------------------------------------------
// Outbound (page -> parent)
// ---------------------------------------------------------------------------

/// Console wire levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleWireLevel {
    Info,
    Warning,
    Error,
}

/// Raw keyboard event fields forwarded with a keybind message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawKeyEvent {
    pub key: String,
    pub code: String,
    pub meta_key: bool,
    pub ctrl_key: bool,
    pub alt_key: bool,
    pub shift_key: bool,
}

/// Messages emitted to the parent frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    UrlChanged {
        url: String,
    },
    RuntimeError {
        error: ErrorRecord,
    },
    UnhandledPromiseRejection {
        error: ErrorRecord,
    },
    NetworkRequest {
        request: NetworkEvent,
    },
    #[serde(rename_all = "camelCase")]
    ConsoleOutput {
        level: ConsoleWireLevel,
        message: String,
        /// Host-formatted ISO-8601 wall-clock time.
        #[serde(rename = "logged_at")]
        logged_at: String,
        raw: Vec<SerializedNode>,
        page_url: String,
        page_path: String,
        interaction_trail: Vec<InteractionEvent>,
    },
    ComponentTree {
        payload: ComponentTreePayload,
    },
    Keybind {
        payload: KeybindPayload,
    },
    #[serde(rename_all = "camelCase")]
    ElementClicked {
        payload: ComponentMeta,
        is_multi_select: bool,
    },
    ElementDoubleClicked {
        payload: ComponentMeta,
    },
    ElementTextUpdated {
        payload: TextUpdatedPayload,
    },
    ParentElement {
        payload: Option<ComponentMeta>,
    },
    SelectorStateResponse {
        payload: SelectorStatePayload,
    },
    SelectorScriptLoaded {
        payload: ScriptLoadedPayload,
    },
    RequestPickerState,
    RequestSelectedElements,
    TogglePickAndEditRequested {
        payload: Option<bool>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentTreePayload {
    pub tree: NodeTree,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeybindPayload {
    pub composite_key: String,
    pub raw_event: RawKeyEvent,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextUpdatedPayload {
    pub id: TargetRef,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorStatePayload {
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptLoadedPayload {
    pub version: String,
}

impl OutboundMessage {
    /// Console output with page context attached.
    #[must_use]
    pub fn console_output(
        level: ConsoleWireLevel,
        message: String,
        logged_at: String,
        raw: Vec<SerializedNode>,
        page: &PageContext,
        interaction_trail: Vec<InteractionEvent>,
    ) -> Self {
        Self::ConsoleOutput {
            level,
            message,
            logged_at,
            raw,
            page_url: page.url.clone(),
            page_path: page.path.clone(),
            interaction_trail,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound (parent -> page)
// ---------------------------------------------------------------------------

/// Commands accepted from the parent frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundCommand {
    ToggleSelector {
        payload: bool,
    },
    UpdateSelectedElements {
        payload: Vec<ElementLocator>,
    },
    GetSelectorState,
    SetElementContent {
        payload: SetContentPayload,
    },
    SetElementAttrs {
        payload: SetAttrsPayload,
    },
    DuplicateElementRequested {
        payload: IdPayload,
    },
    SetStylesheet {
        payload: StylesheetPayload,
    },
    EditTextRequested {
        payload: IdPayload,
    },
    HoverElementRequested {
        payload: IdPayload,
    },
    UnhoverElementRequested {
        payload: IdPayload,
    },
    GetParentElement {
        payload: IdPayload,
    },
    RequestComponentTree,
    HardRefresh {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<serde_json::Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetContentPayload {
    pub id: TargetRef,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetAttrsPayload {
    pub id: TargetRef,
    pub attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdPayload {
    pub id: TargetRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StylesheetPayload {
    pub stylesheet: String,
}

// ---------------------------------------------------------------------------
// Parsing & origin policy
// ---------------------------------------------------------------------------

/// Why an inbound message was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandRejected {
    /// Sender origin is not on the allow-list. Dropped without logging.
    #[error("sender origin not on the allow-list")]
    OriginNotAllowed,
    /// The `type` tag named a command we do not know.
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    /// The message had no usable `type`/payload structure.
    #[error("malformed command: {0}")]
    Malformed(String),
}

/// Whether `origin` is allowed to command this page.
#[must_use]
pub fn origin_allowed(allowed_origins: &[String], origin: &str) -> bool {
    allowed_origins.iter().any(|o| o == origin)
}

/// Parse one inbound `message` event into a command.
///
/// Returns `Err` for anything that must be dropped; only allowed-origin
/// failures are logged.
pub fn parse_command(
    allowed_origins: &[String],
    origin: &str,
    data: &serde_json::Value,
) -> Result<InboundCommand, CommandRejected> {
    if !origin_allowed(allowed_origins, origin) {
        return Err(CommandRejected::OriginNotAllowed);
    }
    match InboundCommand::deserialize(data) {
        Ok(command) => Ok(command),
        Err(err) => {
            let rejection = match data.get("type").and_then(serde_json::Value::as_str) {
                Some(tag) if !known_command_type(tag) => {
                    warn!(command_type = tag, "unknown message type");
                    CommandRejected::UnknownType(tag.to_owned())
                }
                Some(tag) => {
                    warn!(command_type = tag, error = %err, "malformed command payload");
                    CommandRejected::Malformed(err.to_string())
                }
                None => {
                    warn!(error = %err, "command missing type tag");
                    CommandRejected::Malformed(err.to_string())
                }
            };
            Err(rejection)
        }
    }
}

fn known_command_type(tag: &str) -> bool {
    matches!(
        tag,
        "TOGGLE_SELECTOR"
            | "UPDATE_SELECTED_ELEMENTS"
            | "GET_SELECTOR_STATE"
            | "SET_ELEMENT_CONTENT"
            | "SET_ELEMENT_ATTRS"
            | "DUPLICATE_ELEMENT_REQUESTED"
            | "SET_STYLESHEET"
            | "EDIT_TEXT_REQUESTED"
            | "HOVER_ELEMENT_REQUESTED"
            | "UNHOVER_ELEMENT_REQUESTED"
            | "GET_PARENT_ELEMENT"
            | "REQUEST_COMPONENT_TREE"
            | "HARD_REFRESH"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn allowed() -> Vec<String> {
        vec![
            "https://studio.example".to_owned(),
            "http://localhost:3000".to_owned(),
        ]
    }

    #[test]
    fn outbound_type_tags_are_screaming_snake() {
        let msg = OutboundMessage::UrlChanged {
            url: "https://app.test/settings".into(),
        };
        let value = serde_json::to_value(&msg).expect("json");
        assert_eq!(value["type"], "URL_CHANGED");
        assert_eq!(value["url"], "https://app.test/settings");

        let value = serde_json::to_value(OutboundMessage::RequestPickerState).expect("json");
        assert_eq!(value, json!({ "type": "REQUEST_PICKER_STATE" }));
    }

    #[test]
    fn selector_state_response_uses_camel_case_payload() {
        let msg = OutboundMessage::SelectorStateResponse {
            payload: SelectorStatePayload { is_active: true },
        };
        let value = serde_json::to_value(&msg).expect("json");
        assert_eq!(value["payload"]["isActive"], true);
    }

    #[test]
    fn toggle_selector_parses_from_allowed_origin() {
        let cmd = parse_command(
            &allowed(),
            "http://localhost:3000",
            &json!({ "type": "TOGGLE_SELECTOR", "payload": true }),
        )
        .expect("command");
        assert_eq!(cmd, InboundCommand::ToggleSelector { payload: true });
    }

    #[test]
    fn unlisted_origin_is_silently_rejected() {
        let err = parse_command(
            &allowed(),
            "https://evil.example",
            &json!({ "type": "TOGGLE_SELECTOR", "payload": true }),
        )
        .expect_err("must reject");
        assert_eq!(err, CommandRejected::OriginNotAllowed);
    }

    #[test]
    fn unknown_type_is_reported_as_unknown() {
        let err = parse_command(
            &allowed(),
            "http://localhost:3000",
            &json!({ "type": "FORMAT_DISK" }),
        )
        .expect_err("must reject");
        assert_eq!(err, CommandRejected::UnknownType("FORMAT_DISK".into()));
    }

    #[test]
    fn malformed_known_command_is_reported_as_malformed() {
        let err = parse_command(
            &allowed(),
            "http://localhost:3000",
            &json!({ "type": "UPDATE_SELECTED_ELEMENTS", "payload": "not-a-list" }),
        )
        .expect_err("must reject");
        assert!(matches!(err, CommandRejected::Malformed(_)));
    }

    #[test]
    fn update_selected_elements_round_trips_locators() {
        let cmd = parse_command(
            &allowed(),
            "https://studio.example",
            &json!({
                "type": "UPDATE_SELECTED_ELEMENTS",
                "payload": [
                    { "filePath": "src/App.tsx", "lineNumber": 12, "col": 4 },
                    { "filePath": "src/Nav.tsx", "lineNumber": 3 }
                ]
            }),
        )
        .expect("command");
        let InboundCommand::UpdateSelectedElements { payload } = cmd else {
            panic!("wrong variant");
        };
        assert_eq!(payload.len(), 2);
        assert_eq!(payload[0].file_path, "src/App.tsx");
        assert_eq!(payload[0].line_number, 12);
        assert_eq!(payload[0].col, 4);
        // Missing col defaults to 0 (column drift tolerance).
        assert_eq!(payload[1].col, 0);
    }

    #[test]
    fn hard_refresh_token_is_optional() {
        let cmd = parse_command(
            &allowed(),
            "https://studio.example",
            &json!({ "type": "HARD_REFRESH" }),
        )
        .expect("command");
        assert_eq!(cmd, InboundCommand::HardRefresh { token: None });

        let cmd = parse_command(
            &allowed(),
            "https://studio.example",
            &json!({ "type": "HARD_REFRESH", "token": 17 }),
        )
        .expect("command");
        assert_eq!(
            cmd,
            InboundCommand::HardRefresh {
                token: Some(json!(17))
            }
        );
    }
}
