#![forbid(unsafe_code)]

//! Element identity on the wire and in the DOM.
//!
//! Elements are addressed by the source position that produced them: the
//! triple `(filePath, lineNumber, col)`, mirrored onto DOM nodes as a
//! composite `data-lens-id="path:line:col"` attribute (with a legacy
//! `data-component-path`/`data-component-line` pair as fallback). Lookup
//! first tries the exact triple, then degrades to path+line only — column
//! numbers drift across re-renders, file and line rarely do.

use serde::{Deserialize, Serialize};

/// Attribute carrying the composite `path:line:col` identity.
pub const LENS_ID_ATTR: &str = "data-lens-id";
/// Legacy per-field identity attributes.
pub const COMPONENT_PATH_ATTR: &str = "data-component-path";
pub const COMPONENT_LINE_ATTR: &str = "data-component-line";
/// Attribute carrying author-provided element content.
pub const COMPONENT_CONTENT_ATTR: &str = "data-component-content";

/// Full source-position identity of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementLocator {
    pub file_path: String,
    pub line_number: u32,
    #[serde(default)]
    pub col: u32,
}

impl ElementLocator {
    #[must_use]
    pub fn new(file_path: impl Into<String>, line_number: u32, col: u32) -> Self {
        Self {
            file_path: file_path.into(),
            line_number,
            col,
        }
    }

    /// Parse a composite `path:line:col` attribute value. Missing line/col
    /// parse as zero, mirroring the attribute writer's defaults.
    #[must_use]
    pub fn parse_composite(raw: &str) -> Self {
        let mut parts = raw.splitn(3, ':');
        let file_path = parts.next().unwrap_or_default().to_owned();
        let line_number = parts
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or_default();
        let col = parts
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or_default();
        Self {
            file_path,
            line_number,
            col,
        }
    }

    /// Composite attribute value form.
    #[must_use]
    pub fn composite(&self) -> String {
        format!("{}:{}:{}", self.file_path, self.line_number, self.col)
    }

    /// File name portion of the path.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.file_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.file_path)
    }

    /// Exact CSS selector for this locator.
    #[must_use]
    pub fn exact_selector(&self) -> String {
        format!("[{LENS_ID_ATTR}=\"{}\"]", self.composite())
    }

    /// Fallback selector that tolerates column drift.
    #[must_use]
    pub fn fallback_selector(&self) -> String {
        format!(
            "[{COMPONENT_PATH_ATTR}=\"{}\"][{COMPONENT_LINE_ATTR}=\"{}\"]",
            self.file_path, self.line_number
        )
    }
}

/// Path+line reference used by edit/hover/duplicate command payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub path: String,
    pub line: u32,
}

impl TargetRef {
    /// Widen to a locator (column unknown).
    #[must_use]
    pub fn to_locator(&self) -> ElementLocator {
        ElementLocator::new(self.path.clone(), self.line, 0)
    }
}

impl From<&ElementLocator> for TargetRef {
    fn from(locator: &ElementLocator) -> Self {
        Self {
            path: locator.file_path.clone(),
            line: locator.line_number,
        }
    }
}
