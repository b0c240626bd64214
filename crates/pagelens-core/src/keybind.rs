#![forbid(unsafe_code)]

//! Global keybind forwarding.
//!
//! Every keydown on the page is reduced to a composite form
//! (`Meta+Shift+p`, `Ctrl+s`, plain `F5`) and forwarded to the parent frame
//! so it can drive its own shortcuts. A handful of combos the parent always
//! owns are additionally suppressed in the page.

use crate::protocol::{KeybindPayload, OutboundMessage, RawKeyEvent};

/// Combos suppressed in the page (the parent frame handles them).
pub const RESERVED_COMBOS: [&str; 3] = ["Meta+z", "Meta+Backspace", "Meta+d"];

/// Outcome of one keydown: what to send, and whether to swallow the event.
#[derive(Debug, Clone, PartialEq)]
pub struct KeydownOutcome {
    pub prevent_default: bool,
    pub message: Option<OutboundMessage>,
}

/// Modifiers in `Meta+Ctrl+Alt+Shift` order, then the key itself; a pure
/// modifier press contributes no key of its own.
#[must_use]
pub fn composite_key(event: &RawKeyEvent) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if event.meta_key {
        parts.push("Meta");
    }
    if event.ctrl_key {
        parts.push("Ctrl");
    }
    if event.alt_key {
        parts.push("Alt");
    }
    if event.shift_key {
        parts.push("Shift");
    }
    if !matches!(event.key.as_str(), "Meta" | "Control" | "Alt" | "Shift") && !event.key.is_empty()
    {
        parts.push(&event.key);
    }
    parts.join("+")
}

/// Process one keydown. An empty composite (nothing at all was pressed that
/// names a key) reports nothing.
#[must_use]
pub fn on_keydown(event: &RawKeyEvent, now_ms: u64) -> KeydownOutcome {
    let composite = composite_key(event);
    if composite.is_empty() {
        return KeydownOutcome {
            prevent_default: false,
            message: None,
        };
    }
    KeydownOutcome {
        prevent_default: RESERVED_COMBOS.contains(&composite.as_str()),
        message: Some(OutboundMessage::Keybind {
            payload: KeybindPayload {
                composite_key: composite,
                raw_event: event.clone(),
                timestamp: now_ms,
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(key: &str, meta: bool, ctrl: bool, alt: bool, shift: bool) -> RawKeyEvent {
        RawKeyEvent {
            key: key.into(),
            code: String::new(),
            meta_key: meta,
            ctrl_key: ctrl,
            alt_key: alt,
            shift_key: shift,
        }
    }

    #[test]
    fn modifier_order_is_fixed() {
        let e = event("p", true, false, false, true);
        assert_eq!(composite_key(&e), "Meta+Shift+p");
        let e = event("s", false, true, true, false);
        assert_eq!(composite_key(&e), "Ctrl+Alt+s");
    }

    #[test]
    fn pure_modifier_press_reports_modifiers_only() {
        let e = event("Meta", true, false, false, false);
        assert_eq!(composite_key(&e), "Meta");
        let e = event("Shift", false, false, false, true);
        assert_eq!(composite_key(&e), "Shift");
    }

    #[test]
    fn reserved_combos_are_suppressed() {
        for key in ["z", "Backspace", "d"] {
            let outcome = on_keydown(&event(key, true, false, false, false), 1_000);
            assert!(outcome.prevent_default, "Meta+{key} should be suppressed");
            assert!(outcome.message.is_some());
        }
        let outcome = on_keydown(&event("z", false, true, false, false), 1_000);
        assert!(!outcome.prevent_default);
    }

    #[test]
    fn keybind_payload_carries_the_raw_event() {
        let outcome = on_keydown(&event("F5", false, false, false, false), 7);
        let Some(OutboundMessage::Keybind { payload }) = outcome.message else {
            panic!("expected keybind");
        };
        assert_eq!(payload.composite_key, "F5");
        assert_eq!(payload.timestamp, 7);
        assert_eq!(payload.raw_event.key, "F5");
    }
}
