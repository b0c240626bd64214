#![forbid(unsafe_code)]

//! Bounded recent-history buffer of user interactions.
//!
//! Every fault and network record carries a *snapshot* of this trail so the
//! parent frame can see what the user did in the moments before something
//! went wrong. The trail holds the last [`TRAIL_CAPACITY`] interactions in
//! FIFO order; appends evict the oldest entry. Snapshots are owned copies —
//! later appends must not mutate history already attached to a record.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::dom::ElementFacts;

/// Last N interactions kept.
pub const TRAIL_CAPACITY: usize = 8;
/// Minimum spacing between recorded clicks, collapsing synthetic duplicates.
pub const CLICK_DEBOUNCE_MS: u64 = 100;

/// Where the page currently is. Attached to every record and event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageContext {
    /// Full href.
    pub url: String,
    /// pathname + search + hash.
    pub path: String,
}

impl PageContext {
    #[must_use]
    pub fn new(url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
        }
    }
}

/// Interaction categories recorded in the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    PageLoad,
    Click,
    FormSubmit,
    Focus,
    Navigation,
}

/// One recorded interaction, enriched with page context at record time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    /// Element category ("button", "form", "page", …).
    pub element: String,
    /// Human-meaningful identifier (short text, selector-ish attribute, view
    /// name for page-level events).
    pub identifier: String,
    /// Kind-specific context.
    pub details: serde_json::Value,
    pub timestamp: u64,
    pub page_url: String,
    pub page_path: String,
}

/// Navigation change details shared by the observer and popstate paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationChange {
    pub from_path: String,
    pub to_path: String,
    pub from_view: String,
    pub to_view: String,
    pub title: String,
    /// Set for discrete back/forward events.
    pub popstate: bool,
}

/// Form submission facts captured by the submit handler.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormFacts {
    pub identifier: String,
    pub action: String,
    pub method: String,
    pub field_count: usize,
}

/// Fixed-capacity FIFO recorder of user interactions.
#[derive(Debug, Clone)]
pub struct InteractionTrail {
    events: VecDeque<InteractionEvent>,
    last_click_ms: Option<u64>,
}

impl Default for InteractionTrail {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionTrail {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: VecDeque::with_capacity(TRAIL_CAPACITY),
            last_click_ms: None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Owned copy of the trail, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<InteractionEvent> {
        self.events.iter().cloned().collect()
    }

    fn push(
        &mut self,
        kind: InteractionKind,
        element: impl Into<String>,
        identifier: impl Into<String>,
        details: serde_json::Value,
        now_ms: u64,
        page: &PageContext,
    ) {
        if self.events.len() >= TRAIL_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(InteractionEvent {
            kind,
            element: element.into(),
            identifier: identifier.into(),
            details,
            timestamp: now_ms,
            page_url: page.url.clone(),
            page_path: page.path.clone(),
        });
    }

    /// Initial page load, identified by the detected view.
    pub fn record_page_load(
        &mut self,
        view: &str,
        title: &str,
        now_ms: u64,
        page: &PageContext,
    ) {
        self.push(
            InteractionKind::PageLoad,
            "page",
            view,
            json!({
                "title": title,
                "url": page.url,
                "detectedView": view,
            }),
            now_ms,
            page,
        );
    }

    /// Click on a trackable element. Returns false when the click was dropped
    /// (untrackable target or within the debounce window).
    pub fn record_click(
        &mut self,
        facts: &ElementFacts,
        now_ms: u64,
        page: &PageContext,
    ) -> bool {
        if let Some(last) = self.last_click_ms
            && now_ms.saturating_sub(last) < CLICK_DEBOUNCE_MS
        {
            return false;
        }
        self.last_click_ms = Some(now_ms);
        if !facts.is_trackable() {
            return false;
        }
        let details = json!({
            "tagName": facts.tag,
            "type": facts.input_type,
            "href": facts.href,
            "position": {
                "x": facts.rect.center_x(),
                "y": facts.rect.center_y(),
            },
        });
        self.push(
            InteractionKind::Click,
            facts.tag.clone(),
            facts.identifier(),
            details,
            now_ms,
            page,
        );
        true
    }

    pub fn record_form_submit(&mut self, form: &FormFacts, now_ms: u64, page: &PageContext) {
        let details = json!({
            "action": form.action,
            "method": if form.method.is_empty() { "GET" } else { &form.method },
            "fieldCount": form.field_count,
        });
        self.push(
            InteractionKind::FormSubmit,
            "form",
            form.identifier.clone(),
            details,
            now_ms,
            page,
        );
    }

    /// Focus on a form field; other targets are ignored.
    pub fn record_focus(
        &mut self,
        facts: &ElementFacts,
        now_ms: u64,
        page: &PageContext,
    ) -> bool {
        if !matches!(facts.tag.as_str(), "input" | "textarea" | "select") {
            return false;
        }
        let details = json!({
            "tagName": facts.tag,
            "type": facts.input_type,
            "name": facts.name,
            "required": facts.required,
        });
        self.push(
            InteractionKind::Focus,
            facts.tag.clone(),
            facts.identifier(),
            details,
            now_ms,
            page,
        );
        true
    }

    pub fn record_navigation(
        &mut self,
        change: &NavigationChange,
        now_ms: u64,
        page: &PageContext,
    ) {
        let mut details = json!({
            "from": change.from_path,
            "to": change.to_path,
            "fromView": change.from_view,
            "toView": change.to_view,
            "title": change.title,
        });
        if change.popstate
            && let Some(map) = details.as_object_mut()
        {
            map.insert("trigger".to_owned(), json!("popstate"));
        }
        self.push(
            InteractionKind::Navigation,
            "page",
            change.to_view.clone(),
            details,
            now_ms,
            page,
        );
    }
}
