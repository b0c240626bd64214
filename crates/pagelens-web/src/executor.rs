#![forbid(unsafe_code)]

//! Executes the engine's [`DomCommand`]s against the live document.
//!
//! Marker-attribute commands resolve their locator with the exact composite
//! selector first, then the path+line fallback, and apply to every match;
//! a component rendered in several places highlights everywhere. Listener
//! attach/detach and query replies cannot be finished here (the event
//! closures live in the entry module), so those come back as [`HostNote`]s.

use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use web_sys::{Document, Element, Event, HtmlElement, Window};

use pagelens_core::locator::{ElementLocator, TargetRef};
use pagelens_core::picker::{
    DISABLED_ATTR, DomCommand, FULL_WIDTH_ATTR, HOVERED_ATTR, OVERRIDE_STYLESHEET_ID,
    PickerConfig, SELECTED_ATTR, TooltipPlacement,
};
use pagelens_core::protocol::TextUpdatedPayload;
use pagelens_core::{OutboundMessage, PickerInput};

use crate::channel::Channel;
use crate::snapshot;

const TOOLTIP_CLASS: &str = "lens-selector-tooltip";
const BASE_STYLESHEET_ID: &str = "lens-base";
const SCROLL_LOCK_STYLE_ID: &str = "lens-scroll-lock";
const DUPLICATE_ATTR: &str = "data-lens-duplicate";

/// Work the executor hands back to the entry module.
#[derive(Debug)]
pub enum HostNote {
    AttachListeners,
    DetachListeners,
    /// A query command resolved; feed this back into the engine.
    Reply(PickerInput),
}

pub struct Executor {
    window: Window,
    document: Document,
    config: PickerConfig,
    channel: Rc<Channel>,
}

impl Executor {
    #[must_use]
    pub fn new(
        window: Window,
        document: Document,
        config: PickerConfig,
        channel: Rc<Channel>,
    ) -> Self {
        Self {
            window,
            document,
            config,
            channel,
        }
    }

    /// Install the engine's startup stylesheet (tooltip chrome and the
    /// marker-attribute outline rules).
    pub fn install_base_stylesheet(&self, css: &str) {
        self.upsert_style(BASE_STYLESHEET_ID, css);
    }

    /// Execute one command. `event` is the browser event being dispatched,
    /// when there is one; only `SuppressEvent` touches it.
    pub fn execute(&self, command: &DomCommand, event: Option<&Event>) -> Vec<HostNote> {
        match command {
            DomCommand::AttachPickerListeners => return vec![HostNote::AttachListeners],
            DomCommand::DetachPickerListeners => return vec![HostNote::DetachListeners],
            DomCommand::SuppressEvent => {
                if let Some(event) = event {
                    event.prevent_default();
                    event.stop_propagation();
                }
            }
            DomCommand::InjectScrollLockStyle => {
                self.upsert_style(SCROLL_LOCK_STYLE_ID, "* { scroll-behavior: auto !important; }");
            }
            DomCommand::RemoveScrollLockStyle => {
                if let Ok(Some(style)) = self
                    .document
                    .query_selector(&format!("#{SCROLL_LOCK_STYLE_ID}"))
                {
                    style.remove();
                }
            }
            DomCommand::ShowTooltip { text, placement } => self.show_tooltip(text, *placement),
            DomCommand::HideTooltip => {
                if let Some(tooltip) = self.find_tooltip() {
                    set_style(&tooltip, "display", "none");
                }
            }
            DomCommand::MarkHovered { locator } => {
                for element in self.resolve(locator) {
                    if element.has_attribute(SELECTED_ATTR) {
                        continue;
                    }
                    let _ = element.set_attribute(HOVERED_ATTR, "true");
                    self.stamp_full_width(&element);
                    if let Some(html) = element.dyn_ref::<HtmlElement>() {
                        let _ = html.style().set_property("cursor", "pointer");
                    }
                }
            }
            DomCommand::ClearHovered { locator } => {
                for element in self.resolve(locator) {
                    let _ = element.remove_attribute(HOVERED_ATTR);
                    if !element.has_attribute(SELECTED_ATTR) {
                        let _ = element.remove_attribute(FULL_WIDTH_ATTR);
                        if let Some(html) = element.dyn_ref::<HtmlElement>() {
                            let _ = html.style().remove_property("cursor");
                        }
                    }
                }
            }
            DomCommand::MarkSelected { locator } => {
                for element in self.resolve(locator) {
                    let _ = element.set_attribute(SELECTED_ATTR, "true");
                    self.stamp_full_width(&element);
                }
            }
            DomCommand::SetHoverAttr { locator } => {
                for element in self.resolve(locator) {
                    let _ = element.set_attribute(HOVERED_ATTR, "true");
                }
            }
            DomCommand::ClearHoverAttr { locator } => {
                for element in self.resolve(locator) {
                    let _ = element.remove_attribute(HOVERED_ATTR);
                }
            }
            DomCommand::ClearAllHoverAttrs => {
                for element in self.query_all(&format!("[{HOVERED_ATTR}]")) {
                    let _ = element.remove_attribute(HOVERED_ATTR);
                }
            }
            DomCommand::ClearAllSelectionMarks => {
                let selector =
                    format!("[{SELECTED_ATTR}], [{HOVERED_ATTR}], [{FULL_WIDTH_ATTR}]");
                for element in self.query_all(&selector) {
                    let _ = element.remove_attribute(SELECTED_ATTR);
                    let _ = element.remove_attribute(HOVERED_ATTR);
                    let _ = element.remove_attribute(FULL_WIDTH_ATTR);
                }
            }
            DomCommand::ClearHoverMarksExceptSelected => {
                let selector = format!("[{HOVERED_ATTR}]:not([{SELECTED_ATTR}])");
                for element in self.query_all(&selector) {
                    let _ = element.remove_attribute(HOVERED_ATTR);
                    let _ = element.remove_attribute(FULL_WIDTH_ATTR);
                    if let Some(html) = element.dyn_ref::<HtmlElement>() {
                        let _ = html.style().remove_property("cursor");
                    }
                }
            }
            DomCommand::ReleaseNativeButtons => {
                for element in self.query_all("button[disabled]") {
                    let _ = element.remove_attribute("disabled");
                    let _ = element.set_attribute(DISABLED_ATTR, "true");
                }
            }
            DomCommand::RestoreNativeButtons => {
                for element in self.query_all(&format!("[{DISABLED_ATTR}]")) {
                    let _ = element.set_attribute("disabled", "");
                    let _ = element.remove_attribute(DISABLED_ATTR);
                }
            }
            DomCommand::ResetDocumentStyles => {
                if let Some(body) = self.document.body() {
                    let _ = body.style().remove_property("cursor");
                    let _ = body.style().remove_property("user-select");
                }
            }
            DomCommand::SetElementContent { locator, content } => {
                for element in self.resolve(locator) {
                    element.set_inner_html(content);
                }
            }
            DomCommand::SetElementAttrs { locator, attrs } => {
                for element in self.resolve(locator) {
                    for (name, value) in attrs {
                        let _ = element.set_attribute(name, value);
                    }
                }
            }
            DomCommand::DuplicateElement { locator } => self.duplicate(locator),
            DomCommand::SetOverrideStylesheet { css } => {
                self.upsert_style(OVERRIDE_STYLESHEET_ID, css);
            }
            DomCommand::BeginTextEdit { locator } => self.begin_text_edit(locator),
            DomCommand::QueryElementAtPoint { x, y } => {
                let target = self
                    .document
                    .element_from_point(*x as f32, *y as f32)
                    .map(|element| snapshot::element_facts(&element, &self.window));
                return vec![HostNote::Reply(PickerInput::ElementAtPoint { target })];
            }
            DomCommand::QueryParentElement { locator } => {
                let node = self
                    .resolve(locator)
                    .into_iter()
                    .next()
                    .and_then(|element| element.parent_element())
                    .map(|parent| snapshot::raw_node(&parent));
                return vec![HostNote::Reply(PickerInput::ParentResolved { node })];
            }
        }
        Vec::new()
    }

    fn resolve(&self, locator: &ElementLocator) -> Vec<Element> {
        let exact = self.query_all(&locator.exact_selector());
        if !exact.is_empty() {
            return exact;
        }
        self.query_all(&locator.fallback_selector())
    }

    fn query_all(&self, selector: &str) -> Vec<Element> {
        let Ok(list) = self.document.query_selector_all(selector) else {
            return Vec::new();
        };
        (0..list.length())
            .filter_map(|i| list.get(i)?.dyn_into::<Element>().ok())
            .collect()
    }

    fn stamp_full_width(&self, element: &Element) {
        let width = element.get_bounding_client_rect().width();
        let viewport = self
            .window
            .inner_width()
            .ok()
            .and_then(|w| w.as_f64())
            .unwrap_or(0.0);
        if (width - viewport).abs() < 5.0 {
            let _ = element.set_attribute(FULL_WIDTH_ATTR, "true");
        } else {
            let _ = element.remove_attribute(FULL_WIDTH_ATTR);
        }
    }

    fn find_tooltip(&self) -> Option<HtmlElement> {
        self.document
            .query_selector(&format!(".{TOOLTIP_CLASS}"))
            .ok()
            .flatten()
            .and_then(|e| e.dyn_into::<HtmlElement>().ok())
    }

    fn tooltip(&self) -> Option<HtmlElement> {
        if let Some(existing) = self.find_tooltip() {
            return Some(existing);
        }
        let element = self.document.create_element("div").ok()?;
        element.set_class_name(TOOLTIP_CLASS);
        let tooltip = element.dyn_into::<HtmlElement>().ok()?;
        let _ = tooltip.style().set_property(
            "max-width",
            &format!("{}px", self.config.max_tooltip_width),
        );
        self.document.body()?.append_child(&tooltip).ok()?;
        Some(tooltip)
    }

    fn show_tooltip(&self, text: &str, placement: TooltipPlacement) {
        let Some(tooltip) = self.tooltip() else {
            return;
        };
        tooltip.set_text_content(Some(text));
        match placement {
            TooltipPlacement::Pinned => {
                set_style(&tooltip, "left", &self.config.full_width_tooltip_offset);
                set_style(&tooltip, "top", &self.config.full_width_tooltip_offset);
            }
            TooltipPlacement::At { left, top } => {
                set_style(&tooltip, "left", &format!("{left}px"));
                set_style(&tooltip, "top", &format!("{top}px"));
            }
        }
        set_style(&tooltip, "display", "block");
    }

    fn upsert_style(&self, id: &str, css: &str) {
        if let Ok(Some(existing)) = self.document.query_selector(&format!("#{id}")) {
            existing.set_text_content(Some(css));
            return;
        }
        let Ok(style) = self.document.create_element("style") else {
            return;
        };
        style.set_id(id);
        style.set_text_content(Some(css));
        if let Some(head) = self.document.head() {
            let _ = head.append_child(&style);
        }
    }

    fn duplicate(&self, locator: &ElementLocator) {
        let Some(element) = self.resolve(locator).into_iter().next() else {
            return;
        };
        let Ok(clone) = element.clone_node_with_deep(true) else {
            return;
        };
        if let Some(clone) = clone.dyn_ref::<Element>() {
            let _ = clone.set_attribute(DUPLICATE_ATTR, "true");
        }
        if let Some(parent) = element.parent_node() {
            let _ = parent.insert_before(&clone, element.next_sibling().as_ref());
        }
    }

    /// Make the first match contenteditable; every input reports the new
    /// text to the parent, and blur ends the edit.
    fn begin_text_edit(&self, locator: &ElementLocator) {
        let Some(element) = self.resolve(locator).into_iter().next() else {
            return;
        };
        let Ok(target) = element.clone().dyn_into::<HtmlElement>() else {
            return;
        };
        let _ = target.set_attribute("contenteditable", "true");
        let _ = target.focus();

        let id = TargetRef::from(locator);
        let channel = Rc::clone(&self.channel);
        let edited = target.clone();
        let on_input = Closure::<dyn FnMut()>::new(move || {
            channel.post(&OutboundMessage::ElementTextUpdated {
                payload: TextUpdatedPayload {
                    id: id.clone(),
                    content: edited.inner_text(),
                },
            });
        });
        target.set_oninput(Some(on_input.as_ref().unchecked_ref()));

        let ended = target.clone();
        let on_blur = Closure::<dyn FnMut()>::new(move || {
            let _ = ended.remove_attribute("contenteditable");
            ended.set_oninput(None);
            ended.set_onblur(None);
        });
        target.set_onblur(Some(on_blur.as_ref().unchecked_ref()));

        // Handler lifetime is owned by the element from here on.
        on_input.forget();
        on_blur.forget();
    }
}

fn set_style(element: &HtmlElement, property: &str, value: &str) {
    let _ = element.style().set_property(property, value);
}
