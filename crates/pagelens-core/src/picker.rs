#![forbid(unsafe_code)]

//! Element picker state machine.
//!
//! The picker lets the parent frame walk the user through visually selecting
//! elements: hover highlights, a tag-name tooltip, click-to-select with
//! multi-select, and a set of element manipulation commands. The engine here
//! is deterministic and DOM-free: browser events arrive as [`PickerInput`]
//! values, parent-frame commands as [`InboundCommand`]s, and every decision
//! comes back as a list of [`Effect`]s — either a [`DomCommand`] for the web
//! glue to execute or an [`OutboundMessage`] to post.
//!
//! Marker attributes, not element references, carry highlight state: hover
//! and selection are written onto every element sharing the target's source
//! locator, so a component rendered in several places highlights everywhere.
//! Deactivation clears hover marks but never explicit selection marks; the
//! parent frame owns the selection set via `UPDATE_SELECTED_ELEMENTS`.

use std::collections::BTreeMap;

use tracing::warn;

use crate::dom::ElementFacts;
use crate::locator::ElementLocator;
use crate::protocol::{
    InboundCommand, OutboundMessage, RawKeyEvent, SelectorStatePayload,
};
use crate::timer::DebounceTimer;
use crate::tree::{RawNode, component_meta};

/// Marker attribute for parent-frame-selected elements.
pub const SELECTED_ATTR: &str = "data-lens-selected";
/// Marker attribute for the currently hovered element(s).
pub const HOVERED_ATTR: &str = "data-lens-hovered";
/// Marker for native buttons whose `disabled` was lifted during picking.
pub const DISABLED_ATTR: &str = "data-lens-disabled";
/// Marker for elements whose highlight needs the inset full-width outline.
pub const FULL_WIDTH_ATTR: &str = "data-full-width";
/// `<style>` element id for the parent-provided override stylesheet.
pub const OVERRIDE_STYLESHEET_ID: &str = "lens-override";

/// Visual and timing knobs. Defaults mirror the parent frame's design.
#[derive(Debug, Clone, PartialEq)]
pub struct PickerConfig {
    pub highlight_color: String,
    pub highlight_bg: String,
    pub z_index: u32,
    /// Tooltip rides this many pixels above the element.
    pub tooltip_offset: f64,
    pub max_tooltip_width: f64,
    pub hover_debounce_ms: u64,
    pub scroll_debounce_ms: u64,
    /// CSS length for pinning the tooltip on full-width elements.
    pub full_width_tooltip_offset: String,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            highlight_color: "#0da2e7".to_owned(),
            highlight_bg: "#0da2e71a".to_owned(),
            z_index: 10_000,
            tooltip_offset: 25.0,
            max_tooltip_width: 200.0,
            hover_debounce_ms: 10,
            scroll_debounce_ms: 420,
            full_width_tooltip_offset: "12px".to_owned(),
        }
    }
}

impl PickerConfig {
    /// CSS injected once at startup: tooltip chrome plus the hover/selection
    /// outline rules keyed on the marker attributes.
    #[must_use]
    pub fn base_stylesheet(&self) -> String {
        format!(
            r#".lens-selector-tooltip {{
  position: fixed;
  z-index: {z};
  pointer-events: none;
  background-color: {color};
  color: white;
  padding: 4px 8px;
  border-radius: 4px;
  font-size: 14px;
  font-weight: bold;
  line-height: 1;
  white-space: nowrap;
  display: none;
  box-shadow: 0 2px 4px rgba(0,0,0,0.2);
  transition: opacity 0.2s ease-in-out;
  margin: 0;
}}
[{hovered}] {{
  position: relative;
}}
[{hovered}]::before {{
  content: '';
  position: absolute;
  top: 0;
  left: 0;
  width: 100%;
  height: 100%;
  outline: 1px dashed {color} !important;
  outline-offset: 0 !important;
  background-color: {bg} !important;
  z-index: {z};
  pointer-events: none;
}}
[{selected}] {{
  position: relative;
}}
[{selected}]::before {{
  content: '';
  position: absolute;
  top: 0;
  left: 0;
  width: 100%;
  height: 100%;
  outline: 1px dashed {color} !important;
  outline-offset: 3px !important;
  transition: outline-offset 0.2s ease-in-out;
  z-index: {z};
  pointer-events: none;
}}
[{selected}][contenteditable] {{
  outline: none !important;
}}
[{hovered}][{full_width}]::before,
[{selected}][{full_width}]::before {{
  outline-offset: -5px !important;
}}
"#,
            z = self.z_index,
            color = self.highlight_color,
            bg = self.highlight_bg,
            hovered = HOVERED_ATTR,
            selected = SELECTED_ATTR,
            full_width = FULL_WIDTH_ATTR,
        )
    }
}

/// Where the tooltip goes for the current hover target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TooltipPlacement {
    /// Full-width element: pin to the configured corner offset so the
    /// tooltip never sits off-screen above the element.
    Pinned,
    /// Clamped to the viewport above the element's box.
    At { left: f64, top: f64 },
}

/// DOM work delegated to the web glue. Locator-bearing commands apply to
/// every element the locator resolves to (exact selector first, path+line
/// fallback); hover/clear commands skip elements carrying the selected
/// marker.
#[derive(Debug, Clone, PartialEq)]
pub enum DomCommand {
    AttachPickerListeners,
    DetachPickerListeners,
    /// Force `scroll-behavior: auto` so programmatic scrolls are instant.
    InjectScrollLockStyle,
    RemoveScrollLockStyle,
    /// preventDefault + stopPropagation on the event being dispatched.
    SuppressEvent,
    ShowTooltip {
        text: String,
        placement: TooltipPlacement,
    },
    HideTooltip,
    /// Hover marker + measured full-width marker on unselected matches.
    MarkHovered { locator: ElementLocator },
    /// Remove hover marker everywhere it matches; unselected matches also
    /// lose the full-width marker and any cursor override.
    ClearHovered { locator: ElementLocator },
    /// Selection marker + measured full-width marker on all matches.
    MarkSelected { locator: ElementLocator },
    /// Parent-driven hover: marker only, no measurement.
    SetHoverAttr { locator: ElementLocator },
    ClearHoverAttr { locator: ElementLocator },
    ClearAllHoverAttrs,
    /// Strip selected + hovered + full-width markers document-wide.
    ClearAllSelectionMarks,
    /// Deactivation sweep: clear hover/full-width on everything that is not
    /// explicitly selected.
    ClearHoverMarksExceptSelected,
    /// Lift `disabled` from native buttons so they respond to picking,
    /// remembering them with the marker attribute.
    ReleaseNativeButtons,
    RestoreNativeButtons,
    /// Reset body cursor and user-select overrides.
    ResetDocumentStyles,
    SetElementContent {
        locator: ElementLocator,
        content: String,
    },
    SetElementAttrs {
        locator: ElementLocator,
        attrs: BTreeMap<String, String>,
    },
    /// Clone the element in place, stamping the copy as temporary.
    DuplicateElement { locator: ElementLocator },
    /// Upsert the override `<style>` element.
    SetOverrideStylesheet { css: String },
    /// Make the element contenteditable and report text edits until blur.
    BeginTextEdit { locator: ElementLocator },
    /// Resolve the element under the point; reply via
    /// [`PickerInput::ElementAtPoint`].
    QueryElementAtPoint { x: f64, y: f64 },
    /// Resolve the element's parent; reply via
    /// [`PickerInput::ParentResolved`].
    QueryParentElement { locator: ElementLocator },
}

/// One engine decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Dom(DomCommand),
    Send(OutboundMessage),
}

/// Browser events, pre-reduced by the web glue.
#[derive(Debug, Clone, PartialEq)]
pub enum PickerInput {
    MouseOver { target: ElementFacts },
    MouseOut,
    MouseMove { x: f64, y: f64 },
    Scroll,
    Click {
        target: ElementFacts,
        /// Reflection of the element currently carrying the hover, for the
        /// click report payload.
        hovered_node: Option<RawNode>,
        meta_key: bool,
        ctrl_key: bool,
    },
    DoubleClick {
        target: ElementFacts,
        node: RawNode,
    },
    KeyDown { event: RawKeyEvent },
    /// Host reply to [`DomCommand::QueryElementAtPoint`].
    ElementAtPoint { target: Option<ElementFacts> },
    /// Host reply to [`DomCommand::QueryParentElement`]; `None` when the
    /// element has no parent.
    ParentResolved { node: Option<RawNode> },
}

#[derive(Debug, Clone, Default)]
struct PickerState {
    active: bool,
    hovered: Option<ElementFacts>,
    pending_hover: Option<ElementFacts>,
    mouse_x: f64,
    mouse_y: f64,
    hover_timer: DebounceTimer,
    out_timer: DebounceTimer,
    scroll_timer: DebounceTimer,
}

impl PickerState {
    fn reset(&mut self) {
        self.hovered = None;
        self.pending_hover = None;
        self.hover_timer.disarm();
        self.out_timer.disarm();
        self.scroll_timer.disarm();
    }
}

/// The picker engine: config + state, fed by inputs and commands.
#[derive(Debug, Clone)]
pub struct PickerEngine {
    config: PickerConfig,
    state: PickerState,
}

impl PickerEngine {
    #[must_use]
    pub fn new(config: PickerConfig) -> Self {
        Self {
            config,
            state: PickerState::default(),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.active
    }

    #[must_use]
    pub fn config(&self) -> &PickerConfig {
        &self.config
    }

    /// Hover/selection eligibility: the element must carry a source
    /// identity, must not be the document element, and must not be an
    /// svg-internal shape.
    fn pickable(target: &ElementFacts) -> bool {
        target.has_lens_identity && target.tag != "html" && !target.is_svg_internal()
    }

    fn tooltip_placement(&self, target: &ElementFacts) -> TooltipPlacement {
        if target.is_full_width() {
            TooltipPlacement::Pinned
        } else {
            TooltipPlacement::At {
                left: target.rect.left.max(0.0),
                top: (target.rect.top - self.config.tooltip_offset).max(0.0),
            }
        }
    }

    /// Process one browser event.
    pub fn handle(&mut self, input: PickerInput, now_ms: u64) -> Vec<Effect> {
        match input {
            PickerInput::MouseOver { target } => {
                self.state.pending_hover = Some(target);
                self.state
                    .hover_timer
                    .arm(now_ms, self.config.hover_debounce_ms);
                Vec::new()
            }
            PickerInput::MouseOut => {
                self.state
                    .out_timer
                    .arm(now_ms, self.config.hover_debounce_ms);
                Vec::new()
            }
            PickerInput::MouseMove { x, y } => {
                self.state.mouse_x = x;
                self.state.mouse_y = y;
                Vec::new()
            }
            PickerInput::Scroll => self.on_scroll(now_ms),
            PickerInput::Click {
                target,
                hovered_node,
                meta_key,
                ctrl_key,
            } => self.on_click(&target, hovered_node.as_ref(), meta_key || ctrl_key),
            PickerInput::DoubleClick { target, node } => self.on_double_click(&target, &node),
            PickerInput::KeyDown { event } => self.on_key_down(&event),
            PickerInput::ElementAtPoint { target } => {
                if self.state.active
                    && let Some(target) = target
                {
                    // Route through the normal hover debounce.
                    self.state.pending_hover = Some(target);
                    self.state
                        .hover_timer
                        .arm(now_ms, self.config.hover_debounce_ms);
                }
                Vec::new()
            }
            PickerInput::ParentResolved { node } => Self::on_parent_resolved(node.as_ref()),
        }
    }

    /// Fire due timers. The host calls this from its frame/interval loop.
    pub fn poll(&mut self, now_ms: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state.out_timer.fire_due(now_ms) {
            effects.extend(self.fire_out());
        }
        if self.state.hover_timer.fire_due(now_ms) {
            effects.extend(self.fire_hover());
        }
        if self.state.scroll_timer.fire_due(now_ms) {
            effects.push(Effect::Dom(DomCommand::QueryElementAtPoint {
                x: self.state.mouse_x,
                y: self.state.mouse_y,
            }));
        }
        effects
    }

    fn fire_hover(&mut self) -> Vec<Effect> {
        let Some(target) = self.state.pending_hover.take() else {
            return Vec::new();
        };
        if !self.state.active || !Self::pickable(&target) {
            return Vec::new();
        }
        let mut effects = Vec::new();
        if let Some(old) = self.state.hovered.take()
            && let Some(locator) = old.locator
        {
            effects.push(Effect::Dom(DomCommand::ClearHovered { locator }));
        }
        if let Some(locator) = target.locator.clone() {
            effects.push(Effect::Dom(DomCommand::MarkHovered { locator }));
        }
        effects.push(Effect::Dom(DomCommand::ShowTooltip {
            text: target.tag.clone(),
            placement: self.tooltip_placement(&target),
        }));
        self.state.hovered = Some(target);
        effects
    }

    fn fire_out(&mut self) -> Vec<Effect> {
        if !self.state.active {
            return Vec::new();
        }
        let mut effects = Vec::new();
        if let Some(old) = self.state.hovered.take()
            && let Some(locator) = old.locator
        {
            effects.push(Effect::Dom(DomCommand::ClearHovered { locator }));
        }
        effects.push(Effect::Dom(DomCommand::HideTooltip));
        effects
    }

    fn on_scroll(&mut self, now_ms: u64) -> Vec<Effect> {
        if !self.state.active {
            return Vec::new();
        }
        let mut effects = vec![Effect::Dom(DomCommand::HideTooltip)];
        if let Some(hovered) = &self.state.hovered
            && !hovered.is_selected
            && let Some(locator) = hovered.locator.clone()
        {
            effects.push(Effect::Dom(DomCommand::ClearHovered { locator }));
        }
        // Re-resolve whatever sits under the cursor once scrolling settles.
        self.state
            .scroll_timer
            .arm(now_ms, self.config.scroll_debounce_ms);
        effects
    }

    fn on_click(
        &mut self,
        target: &ElementFacts,
        hovered_node: Option<&RawNode>,
        is_multi_select: bool,
    ) -> Vec<Effect> {
        if !self.state.active || !Self::pickable(target) {
            return Vec::new();
        }
        let mut effects = vec![Effect::Dom(DomCommand::SuppressEvent)];
        if let Some(hovered) = &self.state.hovered {
            if let Some(locator) = hovered.locator.clone() {
                effects.push(Effect::Dom(DomCommand::MarkSelected { locator }));
            }
            if let Some(node) = hovered_node {
                effects.push(Effect::Send(OutboundMessage::ElementClicked {
                    payload: component_meta(node),
                    is_multi_select,
                }));
            }
        }
        effects
    }

    fn on_double_click(&mut self, target: &ElementFacts, node: &RawNode) -> Vec<Effect> {
        if !self.state.active || !Self::pickable(target) {
            return Vec::new();
        }
        vec![
            Effect::Dom(DomCommand::SuppressEvent),
            Effect::Send(OutboundMessage::ElementDoubleClicked {
                payload: component_meta(node),
            }),
        ]
    }

    /// Escape (active only) asks the parent to turn picking off; Alt+S (or
    /// the `ß` the combo produces on some layouts) asks for a toggle either
    /// way.
    fn on_key_down(&mut self, event: &RawKeyEvent) -> Vec<Effect> {
        if event.key == "Escape" && self.state.active {
            return vec![
                Effect::Dom(DomCommand::SuppressEvent),
                Effect::Send(OutboundMessage::TogglePickAndEditRequested {
                    payload: Some(false),
                }),
            ];
        }
        if (event.alt_key && event.key.eq_ignore_ascii_case("s")) || event.key == "\u{df}" {
            return vec![
                Effect::Dom(DomCommand::SuppressEvent),
                Effect::Send(OutboundMessage::TogglePickAndEditRequested { payload: None }),
            ];
        }
        Vec::new()
    }

    fn on_parent_resolved(node: Option<&RawNode>) -> Vec<Effect> {
        let payload = node
            .filter(|n| {
                n.attrs.get("id").map(String::as_str) != Some("root")
                    && !matches!(n.tag_name.as_str(), "HTML" | "BODY")
            })
            .map(component_meta);
        vec![Effect::Send(OutboundMessage::ParentElement { payload })]
    }

    /// Apply one parent-frame command. The engine routes only picker-scoped
    /// commands here.
    pub fn apply_command(&mut self, command: &InboundCommand) -> Vec<Effect> {
        match command {
            InboundCommand::ToggleSelector { payload } => self.toggle(*payload),
            InboundCommand::UpdateSelectedElements { payload } => {
                let mut effects = vec![Effect::Dom(DomCommand::ClearAllSelectionMarks)];
                for locator in payload {
                    if locator.file_path.is_empty() || locator.line_number == 0 {
                        warn!(?locator, "selected element without a usable identity");
                        continue;
                    }
                    effects.push(Effect::Dom(DomCommand::MarkSelected {
                        locator: locator.clone(),
                    }));
                }
                effects
            }
            InboundCommand::GetSelectorState => {
                vec![Effect::Send(OutboundMessage::SelectorStateResponse {
                    payload: SelectorStatePayload {
                        is_active: self.state.active,
                    },
                })]
            }
            InboundCommand::SetElementContent { payload } => {
                vec![Effect::Dom(DomCommand::SetElementContent {
                    locator: payload.id.to_locator(),
                    content: payload.content.clone(),
                })]
            }
            InboundCommand::SetElementAttrs { payload } => {
                vec![Effect::Dom(DomCommand::SetElementAttrs {
                    locator: payload.id.to_locator(),
                    attrs: payload.attrs.clone(),
                })]
            }
            InboundCommand::DuplicateElementRequested { payload } => {
                vec![Effect::Dom(DomCommand::DuplicateElement {
                    locator: payload.id.to_locator(),
                })]
            }
            InboundCommand::SetStylesheet { payload } => {
                vec![Effect::Dom(DomCommand::SetOverrideStylesheet {
                    css: payload.stylesheet.clone(),
                })]
            }
            InboundCommand::EditTextRequested { payload } => {
                vec![Effect::Dom(DomCommand::BeginTextEdit {
                    locator: payload.id.to_locator(),
                })]
            }
            InboundCommand::HoverElementRequested { payload } => {
                vec![
                    Effect::Dom(DomCommand::ClearAllHoverAttrs),
                    Effect::Dom(DomCommand::SetHoverAttr {
                        locator: payload.id.to_locator(),
                    }),
                ]
            }
            InboundCommand::UnhoverElementRequested { payload } => {
                vec![Effect::Dom(DomCommand::ClearHoverAttr {
                    locator: payload.id.to_locator(),
                })]
            }
            InboundCommand::GetParentElement { payload } => {
                vec![Effect::Dom(DomCommand::QueryParentElement {
                    locator: payload.id.to_locator(),
                })]
            }
            // Routed elsewhere by the engine; harmless no-ops here.
            InboundCommand::RequestComponentTree | InboundCommand::HardRefresh { .. } => {
                Vec::new()
            }
        }
    }

    fn toggle(&mut self, activate: bool) -> Vec<Effect> {
        if self.state.active == activate {
            return Vec::new();
        }
        self.state.active = activate;
        if activate {
            vec![
                Effect::Dom(DomCommand::AttachPickerListeners),
                Effect::Dom(DomCommand::InjectScrollLockStyle),
                Effect::Dom(DomCommand::ReleaseNativeButtons),
            ]
        } else {
            self.state.reset();
            vec![
                Effect::Dom(DomCommand::DetachPickerListeners),
                Effect::Dom(DomCommand::RemoveScrollLockStyle),
                Effect::Dom(DomCommand::RestoreNativeButtons),
                Effect::Dom(DomCommand::ClearHoverMarksExceptSelected),
                Effect::Dom(DomCommand::ResetDocumentStyles),
                Effect::Dom(DomCommand::HideTooltip),
            ]
        }
    }

    /// A command handler threw on the host side: tear picking down entirely
    /// so the page is never left with dangling listeners or style overrides.
    pub fn on_dispatch_failure(&mut self) -> Vec<Effect> {
        let mut effects = self.toggle(false);
        self.state.active = false;
        self.state.reset();
        if effects.is_empty() {
            // Was already inactive; still clear any residue.
            effects = vec![
                Effect::Dom(DomCommand::ClearHoverMarksExceptSelected),
                Effect::Dom(DomCommand::HideTooltip),
            ];
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::dom::Rect;
    use crate::locator::LENS_ID_ATTR;

    fn engine_active() -> PickerEngine {
        let mut engine = PickerEngine::new(PickerConfig::default());
        engine.apply_command(&InboundCommand::ToggleSelector { payload: true });
        engine
    }

    fn facts(tag: &str, path: &str, line: u32) -> ElementFacts {
        ElementFacts {
            tag: tag.into(),
            locator: Some(ElementLocator::new(path, line, 0)),
            has_lens_identity: true,
            rect: Rect {
                left: 40.0,
                top: 100.0,
                width: 200.0,
                height: 50.0,
            },
            viewport_width: 1920.0,
            ..ElementFacts::default()
        }
    }

    fn node(path: &str, line: u32) -> RawNode {
        let mut node = RawNode {
            tag_name: "DIV".into(),
            ..RawNode::default()
        };
        node.attrs
            .insert(LENS_ID_ATTR.to_owned(), format!("{path}:{line}:0"));
        node
    }

    #[test]
    fn toggle_is_idempotent() {
        let mut engine = PickerEngine::new(PickerConfig::default());
        let on = engine.apply_command(&InboundCommand::ToggleSelector { payload: true });
        assert!(!on.is_empty());
        assert!(
            engine
                .apply_command(&InboundCommand::ToggleSelector { payload: true })
                .is_empty()
        );
        assert!(engine.is_active());
    }

    #[test]
    fn deactivation_clears_hover_but_not_selection() {
        let mut engine = engine_active();
        let effects = engine.apply_command(&InboundCommand::ToggleSelector { payload: false });
        assert!(
            effects.contains(&Effect::Dom(DomCommand::ClearHoverMarksExceptSelected))
        );
        assert!(effects.contains(&Effect::Dom(DomCommand::RestoreNativeButtons)));
        assert!(!effects.contains(&Effect::Dom(DomCommand::ClearAllSelectionMarks)));
        assert!(!engine.is_active());
    }

    #[test]
    fn hover_is_debounced_and_marks_by_locator() {
        let mut engine = engine_active();
        assert!(
            engine
                .handle(
                    PickerInput::MouseOver {
                        target: facts("button", "src/App.tsx", 4),
                    },
                    1_000,
                )
                .is_empty()
        );
        assert!(engine.poll(1_005).is_empty());
        let effects = engine.poll(1_010);
        assert!(effects.contains(&Effect::Dom(DomCommand::MarkHovered {
            locator: ElementLocator::new("src/App.tsx", 4, 0),
        })));
        let Some(Effect::Dom(DomCommand::ShowTooltip { text, placement })) = effects.last()
        else {
            panic!("tooltip expected");
        };
        assert_eq!(text, "button");
        assert_eq!(
            *placement,
            TooltipPlacement::At {
                left: 40.0,
                top: 75.0
            }
        );
    }

    #[test]
    fn hovering_a_second_element_clears_the_first() {
        let mut engine = engine_active();
        engine.handle(
            PickerInput::MouseOver {
                target: facts("button", "src/App.tsx", 4),
            },
            1_000,
        );
        engine.poll(1_010);
        engine.handle(
            PickerInput::MouseOver {
                target: facts("a", "src/Nav.tsx", 9),
            },
            1_020,
        );
        let effects = engine.poll(1_030);
        assert_eq!(
            effects[0],
            Effect::Dom(DomCommand::ClearHovered {
                locator: ElementLocator::new("src/App.tsx", 4, 0),
            })
        );
    }

    #[test]
    fn svg_internal_and_html_targets_are_ignored() {
        let mut engine = engine_active();
        let mut path_shape = facts("path", "src/Icon.tsx", 2);
        path_shape.inside_svg = true;
        engine.handle(PickerInput::MouseOver { target: path_shape }, 1_000);
        assert!(engine.poll(1_010).is_empty());

        engine.handle(
            PickerInput::MouseOver {
                target: facts("html", "src/App.tsx", 1),
            },
            2_000,
        );
        assert!(engine.poll(2_010).is_empty());
    }

    #[test]
    fn full_width_element_pins_the_tooltip() {
        let mut engine = engine_active();
        let mut hero = facts("section", "src/Hero.tsx", 7);
        hero.rect.width = 1918.0;
        engine.handle(PickerInput::MouseOver { target: hero }, 1_000);
        let effects = engine.poll(1_010);
        let Some(Effect::Dom(DomCommand::ShowTooltip { placement, .. })) = effects.last() else {
            panic!("tooltip expected");
        };
        assert_eq!(*placement, TooltipPlacement::Pinned);
    }

    #[test]
    fn scroll_hides_tooltip_then_requeries_under_cursor() {
        let mut engine = engine_active();
        engine.handle(PickerInput::MouseMove { x: 320.0, y: 480.0 }, 900);
        let effects = engine.handle(PickerInput::Scroll, 1_000);
        assert_eq!(effects[0], Effect::Dom(DomCommand::HideTooltip));
        assert!(engine.poll(1_400).is_empty());
        assert_eq!(
            engine.poll(1_420),
            vec![Effect::Dom(DomCommand::QueryElementAtPoint {
                x: 320.0,
                y: 480.0
            })]
        );
    }

    #[test]
    fn click_selects_hovered_and_reports_multi_select() {
        let mut engine = engine_active();
        engine.handle(
            PickerInput::MouseOver {
                target: facts("button", "src/App.tsx", 4),
            },
            1_000,
        );
        engine.poll(1_010);
        let effects = engine.handle(
            PickerInput::Click {
                target: facts("button", "src/App.tsx", 4),
                hovered_node: Some(node("src/App.tsx", 4)),
                meta_key: true,
                ctrl_key: false,
            },
            1_100,
        );
        assert_eq!(effects[0], Effect::Dom(DomCommand::SuppressEvent));
        assert!(effects.contains(&Effect::Dom(DomCommand::MarkSelected {
            locator: ElementLocator::new("src/App.tsx", 4, 0),
        })));
        let Some(Effect::Send(OutboundMessage::ElementClicked {
            payload,
            is_multi_select,
        })) = effects.last()
        else {
            panic!("click report expected");
        };
        assert!(*is_multi_select);
        assert_eq!(payload.file_path, "src/App.tsx");
    }

    #[test]
    fn click_while_inactive_does_nothing() {
        let mut engine = PickerEngine::new(PickerConfig::default());
        let effects = engine.handle(
            PickerInput::Click {
                target: facts("button", "src/App.tsx", 4),
                hovered_node: Some(node("src/App.tsx", 4)),
                meta_key: false,
                ctrl_key: false,
            },
            1_000,
        );
        assert!(effects.is_empty());
    }

    #[test]
    fn escape_requests_toggle_off_only_while_active() {
        let key = RawKeyEvent {
            key: "Escape".into(),
            code: "Escape".into(),
            meta_key: false,
            ctrl_key: false,
            alt_key: false,
            shift_key: false,
        };
        let mut engine = engine_active();
        let effects = engine.handle(PickerInput::KeyDown { event: key.clone() }, 1_000);
        assert!(effects.contains(&Effect::Send(
            OutboundMessage::TogglePickAndEditRequested {
                payload: Some(false)
            }
        )));

        let mut inactive = PickerEngine::new(PickerConfig::default());
        assert!(
            inactive
                .handle(PickerInput::KeyDown { event: key }, 1_000)
                .is_empty()
        );
    }

    #[test]
    fn alt_s_requests_toggle_regardless_of_state() {
        let alt_s = RawKeyEvent {
            key: "s".into(),
            code: "KeyS".into(),
            meta_key: false,
            ctrl_key: false,
            alt_key: true,
            shift_key: false,
        };
        let mut engine = PickerEngine::new(PickerConfig::default());
        let effects = engine.handle(PickerInput::KeyDown { event: alt_s }, 1_000);
        assert!(effects.contains(&Effect::Send(
            OutboundMessage::TogglePickAndEditRequested { payload: None }
        )));

        // Some layouts deliver the combo as the composed character.
        let eszett = RawKeyEvent {
            key: "\u{df}".into(),
            code: "KeyS".into(),
            meta_key: false,
            ctrl_key: false,
            alt_key: false,
            shift_key: false,
        };
        let effects = engine.handle(PickerInput::KeyDown { event: eszett }, 1_000);
        assert!(!effects.is_empty());
    }

    #[test]
    fn update_selected_clears_then_marks_valid_locators() {
        let mut engine = engine_active();
        let effects = engine.apply_command(&InboundCommand::UpdateSelectedElements {
            payload: vec![
                ElementLocator::new("src/App.tsx", 4, 2),
                ElementLocator::new("", 0, 0),
                ElementLocator::new("src/Nav.tsx", 9, 0),
            ],
        });
        assert_eq!(effects[0], Effect::Dom(DomCommand::ClearAllSelectionMarks));
        assert_eq!(effects.len(), 3);
    }

    #[test]
    fn selector_state_reflects_activity() {
        let mut engine = engine_active();
        let effects = engine.apply_command(&InboundCommand::GetSelectorState);
        assert_eq!(
            effects,
            vec![Effect::Send(OutboundMessage::SelectorStateResponse {
                payload: SelectorStatePayload { is_active: true },
            })]
        );
    }

    #[test]
    fn parent_of_root_reports_null() {
        let mut engine = engine_active();
        let mut root = RawNode {
            tag_name: "DIV".into(),
            ..RawNode::default()
        };
        root.attrs.insert("id".into(), "root".into());
        let effects = engine.handle(PickerInput::ParentResolved { node: Some(root) }, 1_000);
        assert_eq!(
            effects,
            vec![Effect::Send(OutboundMessage::ParentElement { payload: None })]
        );

        let effects = engine.handle(
            PickerInput::ParentResolved {
                node: Some(node("src/App.tsx", 1)),
            },
            1_000,
        );
        let Some(Effect::Send(OutboundMessage::ParentElement {
            payload: Some(meta),
        })) = effects.last()
        else {
            panic!("parent payload expected");
        };
        assert_eq!(meta.file_path, "src/App.tsx");
    }

    #[test]
    fn dispatch_failure_tears_everything_down() {
        let mut engine = engine_active();
        engine.handle(
            PickerInput::MouseOver {
                target: facts("button", "src/App.tsx", 4),
            },
            1_000,
        );
        engine.poll(1_010);
        let effects = engine.on_dispatch_failure();
        assert!(!engine.is_active());
        assert!(effects.contains(&Effect::Dom(DomCommand::DetachPickerListeners)));
        assert!(engine.poll(10_000).is_empty());
    }

    #[test]
    fn stylesheet_carries_configured_values() {
        let css = PickerConfig::default().base_stylesheet();
        assert!(css.contains("#0da2e7"));
        assert!(css.contains("z-index: 10000"));
        assert!(css.contains(HOVERED_ATTR));
        assert!(css.contains(SELECTED_ATTR));
    }
}
