#![forbid(unsafe_code)]

//! Current-view detection for single-page apps.
//!
//! "View" is the human-meaningful screen the user is on, distinct from the
//! raw URL. Detection is a cascade of independent strategies evaluated in
//! order until one produces a non-empty, non-generic result; the final
//! fallback is the literal [`UNKNOWN_VIEW`]. Results are cached for
//! [`VIEW_CACHE_TTL_MS`] so that rapid mutation bursts do not re-run DOM
//! queries — the host only assembles a [`DocumentSnapshot`] on cache misses.

use regex_lite::Regex;

/// Final fallback when no strategy produces a view name.
pub const UNKNOWN_VIEW: &str = "Unknown View";
/// How long a detected view stays fresh.
pub const VIEW_CACHE_TTL_MS: u64 = 100;

/// Ranked "active navigation" selectors, queried by the host in order.
pub const ACTIVE_NAV_SELECTORS: [&str; 6] = [
    "[aria-current=\"page\"]",
    ".active:not(.disabled)",
    ".current",
    "[data-current=\"true\"]",
    ".router-link-active",
    ".router-link-exact-active",
];

/// Explicit page-marker attributes, queried by the host in order.
pub const EXPLICIT_MARKER_SELECTORS: [(&str, &str); 4] = [
    ("[data-page]", "data-page"),
    ("[data-view]", "data-view"),
    ("[data-route]", "data-route"),
    ("[data-testid*=\"page\"]", "data-testid"),
];

/// Selector collecting candidates for the class-pattern strategy.
pub const MARKER_CLASS_SELECTOR: &str =
    "[class*=\"page-\"], [class*=\"view-\"], [class*=\"Page\"], [class*=\"View\"], [class*=\"Screen\"]";

/// Main-content containers searched by the semantic-keyword strategy.
pub const MAIN_CONTAINER_SELECTOR: &str = "main, [role=\"main\"], .main-content, #main, .app-content";

/// Default semantic keywords for the main-content strategy.
pub const DEFAULT_SEMANTIC_KEYWORDS: [&str; 23] = [
    "dashboard",
    "profile",
    "settings",
    "admin",
    "login",
    "signup",
    "home",
    "about",
    "contact",
    "help",
    "account",
    "billing",
    "reports",
    "analytics",
    "users",
    "projects",
    "tasks",
    "invoice",
    "orders",
    "products",
    "customers",
    "payments",
    "notifications",
];

/// Everything the cascade needs, captured by the host in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSnapshot {
    /// Trimmed document title.
    pub title: String,
    pub hostname: String,
    /// Text of the first visible `<h1>`, if any.
    pub visible_h1: Option<String>,
    /// Text of the first element matching [`ACTIVE_NAV_SELECTORS`] in rank
    /// order, if any.
    pub active_nav_text: Option<String>,
    /// First non-empty attribute value from [`EXPLICIT_MARKER_SELECTORS`].
    pub explicit_marker: Option<String>,
    /// Class attribute values of elements matching [`MARKER_CLASS_SELECTOR`].
    pub marker_class_names: Vec<String>,
    /// Class attribute values of descendants of main-content containers.
    pub main_class_names: Vec<String>,
    /// `location.pathname` only (no search/hash).
    pub path: String,
}

/// One detection strategy: pure, independently testable.
type Strategy = fn(&DocumentSnapshot, &[String]) -> Option<String>;

const STRATEGIES: [Strategy; 6] = [
    title_strategy,
    heading_strategy,
    active_nav_strategy,
    explicit_marker_strategy,
    semantic_keyword_strategy,
    path_segment_strategy,
];

/// Titles that identify nothing ("Loading…", scaffold defaults, bare host).
#[must_use]
pub fn is_generic_title(title: &str, hostname: &str) -> bool {
    let lower = title.to_lowercase();
    lower.contains("loading")
        || lower.contains("my app")
        || lower.contains("localhost")
        || title == hostname
        || lower == "app"
}

fn title_strategy(doc: &DocumentSnapshot, _keywords: &[String]) -> Option<String> {
    let title = doc.title.trim();
    if title.is_empty() || is_generic_title(title, &doc.hostname) {
        None
    } else {
        Some(title.to_owned())
    }
}

fn heading_strategy(doc: &DocumentSnapshot, _keywords: &[String]) -> Option<String> {
    doc.visible_h1
        .as_ref()
        .map(|h| h.trim())
        .filter(|h| !h.is_empty())
        .map(str::to_owned)
}

fn active_nav_strategy(doc: &DocumentSnapshot, _keywords: &[String]) -> Option<String> {
    doc.active_nav_text
        .as_ref()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

fn explicit_marker_strategy(doc: &DocumentSnapshot, _keywords: &[String]) -> Option<String> {
    if let Some(marker) = doc
        .explicit_marker
        .as_ref()
        .filter(|value| !value.is_empty())
    {
        return Some(despace(marker));
    }
    // Class naming conventions: page-foo / fooPage / FooScreen, …
    let patterns = [
        Regex::new(r"(?i)(?:page|view|screen)-([a-zA-Z]+)").ok()?,
        Regex::new(r"([a-zA-Z]+)(?:Page|View|Screen)$").ok()?,
    ];
    for pattern in &patterns {
        for class_attr in &doc.marker_class_names {
            for class in class_attr.split_whitespace() {
                if let Some(captures) = pattern.captures(class)
                    && let Some(name) = captures.get(1)
                {
                    return Some(despace(name.as_str()));
                }
            }
        }
    }
    None
}

fn semantic_keyword_strategy(doc: &DocumentSnapshot, keywords: &[String]) -> Option<String> {
    for keyword in keywords {
        let hit = doc
            .main_class_names
            .iter()
            .any(|class| class.to_lowercase().contains(keyword.as_str()));
        if hit {
            return Some(capitalize(keyword));
        }
    }
    None
}

fn path_segment_strategy(doc: &DocumentSnapshot, _keywords: &[String]) -> Option<String> {
    if doc.path.is_empty() || doc.path == "/" || doc.path == "/index.html" {
        return None;
    }
    doc.path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(|segment| segment.replace('-', " "))
}

fn despace(value: &str) -> String {
    value.replace(['-', '_'], " ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Run the cascade without caching.
#[must_use]
pub fn detect(doc: &DocumentSnapshot, keywords: &[String]) -> String {
    STRATEGIES
        .iter()
        .find_map(|strategy| strategy(doc, keywords))
        .unwrap_or_else(|| UNKNOWN_VIEW.to_owned())
}

/// Cached view detector.
///
/// The snapshot closure runs only on cache misses, bounding the cost of
/// repeated detection during mutation bursts.
#[derive(Debug, Clone)]
pub struct ViewDetector {
    keywords: Vec<String>,
    cached: Option<CachedView>,
}

#[derive(Debug, Clone)]
struct CachedView {
    value: String,
    computed_at_ms: u64,
}

impl ViewDetector {
    #[must_use]
    pub fn new(keywords: Vec<String>) -> Self {
        Self {
            keywords,
            cached: None,
        }
    }

    #[must_use]
    pub fn with_default_keywords() -> Self {
        Self::new(
            DEFAULT_SEMANTIC_KEYWORDS
                .iter()
                .map(|k| (*k).to_owned())
                .collect(),
        )
    }

    /// Detect the current view, consulting the cache first.
    pub fn detect_with<F>(&mut self, now_ms: u64, snapshot: F) -> String
    where
        F: FnOnce() -> DocumentSnapshot,
    {
        if let Some(cached) = &self.cached
            && now_ms.saturating_sub(cached.computed_at_ms) < VIEW_CACHE_TTL_MS
        {
            return cached.value.clone();
        }
        let value = detect(&snapshot(), &self.keywords);
        self.cached = Some(CachedView {
            value: value.clone(),
            computed_at_ms: now_ms,
        });
        value
    }

    /// Drop any cached value (page teardown, forced refresh).
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keywords() -> Vec<String> {
        DEFAULT_SEMANTIC_KEYWORDS
            .iter()
            .map(|k| (*k).to_owned())
            .collect()
    }

    #[test]
    fn meaningful_title_wins() {
        let doc = DocumentSnapshot {
            title: "Dashboard — Acme".into(),
            hostname: "app.acme.test".into(),
            visible_h1: Some("Ignored".into()),
            ..DocumentSnapshot::default()
        };
        assert_eq!(detect(&doc, &keywords()), "Dashboard — Acme");
    }

    #[test]
    fn loading_title_falls_through_to_path_segment() {
        let doc = DocumentSnapshot {
            title: "Loading".into(),
            hostname: "app.test".into(),
            path: "/app/settings".into(),
            ..DocumentSnapshot::default()
        };
        assert_eq!(detect(&doc, &keywords()), "settings");
    }

    #[test]
    fn generic_titles_are_rejected() {
        assert!(is_generic_title("Loading...", "x"));
        assert!(is_generic_title("My App", "x"));
        assert!(is_generic_title("app", "x"));
        assert!(is_generic_title("app.test", "app.test"));
        assert!(!is_generic_title("Appointments", "x"));
    }

    #[test]
    fn visible_heading_beats_nav_and_markers() {
        let doc = DocumentSnapshot {
            title: "Loading".into(),
            visible_h1: Some("Billing History".into()),
            active_nav_text: Some("Settings".into()),
            ..DocumentSnapshot::default()
        };
        assert_eq!(detect(&doc, &keywords()), "Billing History");
    }

    #[test]
    fn explicit_marker_attribute_is_despaced() {
        let doc = DocumentSnapshot {
            explicit_marker: Some("user-profile".into()),
            ..DocumentSnapshot::default()
        };
        assert_eq!(detect(&doc, &keywords()), "user profile");
    }

    #[test]
    fn class_pattern_extracts_page_name() {
        let doc = DocumentSnapshot {
            marker_class_names: vec!["container page-checkout wide".into()],
            ..DocumentSnapshot::default()
        };
        assert_eq!(detect(&doc, &keywords()), "checkout");

        let doc = DocumentSnapshot {
            marker_class_names: vec!["SettingsScreen".into()],
            ..DocumentSnapshot::default()
        };
        assert_eq!(detect(&doc, &keywords()), "Settings");
    }

    #[test]
    fn semantic_keyword_is_capitalized() {
        let doc = DocumentSnapshot {
            main_class_names: vec!["col".into(), "billing-summary".into()],
            ..DocumentSnapshot::default()
        };
        assert_eq!(detect(&doc, &keywords()), "Billing");
    }

    #[test]
    fn root_paths_yield_unknown_view() {
        let doc = DocumentSnapshot {
            path: "/".into(),
            ..DocumentSnapshot::default()
        };
        assert_eq!(detect(&doc, &keywords()), UNKNOWN_VIEW);

        let doc = DocumentSnapshot {
            path: "/index.html".into(),
            ..DocumentSnapshot::default()
        };
        assert_eq!(detect(&doc, &keywords()), UNKNOWN_VIEW);
    }

    #[test]
    fn cache_skips_snapshot_within_ttl() {
        let mut detector = ViewDetector::new(keywords());
        let mut calls = 0;
        let make = |calls: &mut u32| {
            *calls += 1;
            DocumentSnapshot {
                title: "Reports".into(),
                ..DocumentSnapshot::default()
            }
        };
        assert_eq!(detector.detect_with(1_000, || make(&mut calls)), "Reports");
        assert_eq!(detector.detect_with(1_050, || make(&mut calls)), "Reports");
        assert_eq!(calls, 1);
        // TTL expired: snapshot re-taken.
        assert_eq!(detector.detect_with(1_150, || make(&mut calls)), "Reports");
        assert_eq!(calls, 2);
    }
}
