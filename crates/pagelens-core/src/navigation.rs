#![forbid(unsafe_code)]

//! Single-page-app navigation detection.
//!
//! Client-side routers change the URL without a page load, and some view
//! transitions change the rendered view without touching the URL at all, so
//! a navigation is "path changed OR detected view changed". Two inputs feed
//! the check: DOM mutations under the app root (debounced, routers re-render
//! on navigation) and `popstate` (back/forward, checked after a short delay
//! so the router has re-rendered). Both run the same predicate and update
//! atomically, so overlapping triggers record one navigation, not two.
//!
//! Separately, any change to the full page URL broadcasts a `URL_CHANGED`
//! message to the parent frame.

use crate::protocol::OutboundMessage;
use crate::timer::DebounceTimer;
use crate::trail::{InteractionTrail, NavigationChange, PageContext};

/// Mutation bursts settle for this long before the navigation check runs.
pub const MUTATION_DEBOUNCE_MS: u64 = 50;
/// Post-`popstate` delay so the router's re-render lands first.
pub const POPSTATE_DELAY_MS: u64 = 10;

/// What scheduled the pending navigation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationTrigger {
    Mutation,
    Popstate,
}

/// Fresh facts gathered by the host when a check fires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationProbe {
    /// pathname + search + hash.
    pub path: String,
    pub view: String,
    pub title: String,
}

/// Tracks the current path/view pair and schedules checks.
#[derive(Debug, Clone)]
pub struct NavigationTracker {
    current_path: String,
    current_view: String,
    timer: DebounceTimer,
    pending: Option<NavigationTrigger>,
}

impl NavigationTracker {
    #[must_use]
    pub fn new(initial_path: impl Into<String>, initial_view: impl Into<String>) -> Self {
        Self {
            current_path: initial_path.into(),
            current_view: initial_view.into(),
            timer: DebounceTimer::new(),
            pending: None,
        }
    }

    #[must_use]
    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    #[must_use]
    pub fn current_view(&self) -> &str {
        &self.current_view
    }

    /// A DOM mutation under the app root. Re-arms the debounce unless a
    /// popstate check is already imminent (it runs sooner and checks the
    /// same predicate).
    pub fn note_mutation(&mut self, now_ms: u64) {
        if self.pending == Some(NavigationTrigger::Popstate) {
            return;
        }
        self.pending = Some(NavigationTrigger::Mutation);
        self.timer.arm(now_ms, MUTATION_DEBOUNCE_MS);
    }

    /// Back/forward event. Supersedes any pending mutation check.
    pub fn note_popstate(&mut self, now_ms: u64) {
        self.pending = Some(NavigationTrigger::Popstate);
        self.timer.arm(now_ms, POPSTATE_DELAY_MS);
    }

    /// Host poll. When a scheduled check is due, returns its trigger; the
    /// host then gathers a [`NavigationProbe`] and calls [`Self::apply`].
    pub fn poll(&mut self, now_ms: u64) -> Option<NavigationTrigger> {
        if self.timer.fire_due(now_ms) {
            self.pending.take()
        } else {
            None
        }
    }

    /// Run the shared predicate against fresh facts. On a change, updates
    /// the tracked pair and records a navigation event on the trail.
    /// Returns true when a navigation was recorded.
    pub fn apply(
        &mut self,
        probe: &NavigationProbe,
        trigger: NavigationTrigger,
        trail: &mut InteractionTrail,
        now_ms: u64,
        page: &PageContext,
    ) -> bool {
        if probe.path == self.current_path && probe.view == self.current_view {
            return false;
        }
        let change = NavigationChange {
            from_path: std::mem::replace(&mut self.current_path, probe.path.clone()),
            to_path: probe.path.clone(),
            from_view: std::mem::replace(&mut self.current_view, probe.view.clone()),
            to_view: probe.view.clone(),
            title: probe.title.clone(),
            popstate: trigger == NavigationTrigger::Popstate,
        };
        trail.record_navigation(&change, now_ms, page);
        true
    }

    pub fn cancel_pending(&mut self) {
        self.timer.disarm();
        self.pending = None;
    }
}

/// Broadcast-on-change watch over the full page URL.
#[derive(Debug, Clone)]
pub struct UrlWatch {
    last_url: String,
}

impl UrlWatch {
    #[must_use]
    pub fn new(initial_url: impl Into<String>) -> Self {
        Self {
            last_url: initial_url.into(),
        }
    }

    /// Compare against the last seen URL; emit `URL_CHANGED` on change.
    pub fn observe(&mut self, url: &str) -> Option<OutboundMessage> {
        if url == self.last_url {
            return None;
        }
        self.last_url = url.to_owned();
        Some(OutboundMessage::UrlChanged {
            url: url.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn page() -> PageContext {
        PageContext::new("https://app.test/a", "/a")
    }

    fn probe(path: &str, view: &str) -> NavigationProbe {
        NavigationProbe {
            path: path.into(),
            view: view.into(),
            title: "App".into(),
        }
    }

    #[test]
    fn mutation_check_runs_after_debounce() {
        let mut tracker = NavigationTracker::new("/a", "home");
        tracker.note_mutation(1_000);
        tracker.note_mutation(1_030);
        assert_eq!(tracker.poll(1_050), None);
        assert_eq!(tracker.poll(1_080), Some(NavigationTrigger::Mutation));
        assert_eq!(tracker.poll(1_081), None);
    }

    #[test]
    fn popstate_supersedes_pending_mutation() {
        let mut tracker = NavigationTracker::new("/a", "home");
        tracker.note_mutation(1_000);
        tracker.note_popstate(1_010);
        assert_eq!(tracker.poll(1_020), Some(NavigationTrigger::Popstate));
    }

    #[test]
    fn mutation_does_not_delay_imminent_popstate() {
        let mut tracker = NavigationTracker::new("/a", "home");
        tracker.note_popstate(1_000);
        tracker.note_mutation(1_005);
        assert_eq!(tracker.poll(1_010), Some(NavigationTrigger::Popstate));
    }

    #[test]
    fn view_change_alone_is_a_navigation() {
        let mut tracker = NavigationTracker::new("/a", "home");
        let mut trail = InteractionTrail::new();
        let changed = tracker.apply(
            &probe("/a", "settings"),
            NavigationTrigger::Mutation,
            &mut trail,
            2_000,
            &page(),
        );
        assert!(changed);
        assert_eq!(tracker.current_view(), "settings");
        assert_eq!(trail.snapshot().len(), 1);
    }

    #[test]
    fn unchanged_probe_records_nothing() {
        let mut tracker = NavigationTracker::new("/a", "home");
        let mut trail = InteractionTrail::new();
        assert!(!tracker.apply(
            &probe("/a", "home"),
            NavigationTrigger::Mutation,
            &mut trail,
            2_000,
            &page(),
        ));
        assert!(trail.snapshot().is_empty());
    }

    #[test]
    fn popstate_navigation_is_tagged() {
        let mut tracker = NavigationTracker::new("/a", "home");
        let mut trail = InteractionTrail::new();
        tracker.apply(
            &probe("/b", "reports"),
            NavigationTrigger::Popstate,
            &mut trail,
            2_000,
            &page(),
        );
        let events = trail.snapshot();
        assert_eq!(events[0].details["trigger"], "popstate");
        assert_eq!(events[0].details["from"], "/a");
        assert_eq!(events[0].details["to"], "/b");
    }

    #[test]
    fn url_watch_emits_only_on_change() {
        let mut watch = UrlWatch::new("https://app.test/a");
        assert!(watch.observe("https://app.test/a").is_none());
        let msg = watch.observe("https://app.test/b").expect("change");
        let OutboundMessage::UrlChanged { url } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(url, "https://app.test/b");
        assert!(watch.observe("https://app.test/b").is_none());
    }
}
