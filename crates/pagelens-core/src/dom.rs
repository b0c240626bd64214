#![forbid(unsafe_code)]

//! Host-captured facts about DOM elements.
//!
//! The engine never holds a DOM reference. The web glue snapshots whatever an
//! event handler can see about its target into [`ElementFacts`] and passes
//! that in; the element itself stays owned by the document and is re-resolved
//! by handle or locator when a command needs to touch it (weak-relation
//! model).

use serde::{Deserialize, Serialize};

use crate::locator::ElementLocator;

/// Opaque host handle for one live element. Valid only as long as the host
/// keeps its side of the mapping; never dereferenced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub u32);

/// Bounding box in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Visible per the trail recorder's definition: non-degenerate box.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    #[must_use]
    pub fn center_x(&self) -> i64 {
        (self.left + self.width / 2.0).round() as i64
    }

    #[must_use]
    pub fn center_y(&self) -> i64 {
        (self.top + self.height / 2.0).round() as i64
    }
}

/// Snapshot of one element at event time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementFacts {
    pub handle: Option<ElementHandle>,
    /// Lowercased tag name.
    pub tag: String,
    pub id: String,
    /// Full `class` attribute value.
    pub classes: String,
    /// Trimmed text content.
    pub text: String,
    pub aria_label: String,
    pub test_id: String,
    pub title: String,
    pub placeholder: String,
    pub value: String,
    pub name: String,
    pub role: String,
    /// `type` attribute for inputs/buttons.
    pub input_type: String,
    pub href: String,
    pub required: bool,
    pub has_onclick: bool,
    pub tab_index: Option<i32>,
    pub rect: Rect,
    pub viewport_width: f64,
    /// Source-position identity, when the element carries one.
    pub locator: Option<ElementLocator>,
    /// Whether the element carries any lens identity attribute at all.
    pub has_lens_identity: bool,
    /// Inside an `<svg>` subtree (the element itself may be the `<svg>`).
    pub inside_svg: bool,
    /// Currently carries the selected marker attribute.
    pub is_selected: bool,
}

impl ElementFacts {
    /// A human-meaningful identifier for the interaction trail, in priority
    /// order: short text, aria-label, test id, title, placeholder, short
    /// value, id, then tag + first two classes.
    #[must_use]
    pub fn identifier(&self) -> String {
        if !self.text.is_empty() && self.text.chars().count() < 50 {
            return format!("\"{}\"", self.text);
        }
        if !self.aria_label.is_empty() {
            return format!("[aria-label=\"{}\"]", self.aria_label);
        }
        if !self.test_id.is_empty() {
            return format!("[data-testid=\"{}\"]", self.test_id);
        }
        if !self.title.is_empty() {
            return format!("[title=\"{}\"]", self.title);
        }
        if !self.placeholder.is_empty() {
            return format!("[placeholder=\"{}\"]", self.placeholder);
        }
        if !self.value.is_empty() && self.value.chars().count() < 20 {
            return format!("[value=\"{}\"]", self.value);
        }
        if !self.id.is_empty() {
            return format!("#{}", self.id);
        }
        let short_class: Vec<&str> = self.classes.split_whitespace().take(2).collect();
        if short_class.is_empty() {
            self.tag.clone()
        } else {
            format!("{}.{}", self.tag, short_class.join(" "))
        }
    }

    /// Whether a click on this element is worth recording: native interactive
    /// tags, ARIA button role, click handlers, test ids, or a reachable tab
    /// index.
    #[must_use]
    pub fn is_trackable(&self) -> bool {
        const INTERACTIVE_TAGS: [&str; 5] = ["button", "a", "input", "select", "textarea"];
        if INTERACTIVE_TAGS.contains(&self.tag.as_str()) {
            return true;
        }
        if self.role == "button" {
            return true;
        }
        if self.has_onclick {
            return true;
        }
        if !self.test_id.is_empty() {
            return true;
        }
        matches!(self.tab_index, Some(t) if t != -1)
    }

    /// SVG-internal shapes are excluded from hover/selection; the `<svg>`
    /// root itself is fair game.
    #[must_use]
    pub fn is_svg_internal(&self) -> bool {
        self.inside_svg && self.tag != "svg"
    }

    /// Full-width heuristic: the box spans the viewport within 5px.
    #[must_use]
    pub fn is_full_width(&self) -> bool {
        (self.rect.width - self.viewport_width).abs() < 5.0
    }
}
