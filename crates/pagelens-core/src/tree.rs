#![forbid(unsafe_code)]

//! DOM snapshot and component tree building.
//!
//! The web glue reflects the app root into a [`RawNode`] tree (element
//! attributes, inner text, child nodes); the engine turns that into the two
//! wire shapes the parent frame consumes: the full [`NodeTree`] dump for
//! `COMPONENT_TREE`, and per-element [`ComponentMeta`] payloads for click
//! reports and parent-element queries.
//!
//! An element "belongs to a component" when the build pipeline stamped it
//! with a source identity attribute. Component children are the element's
//! DOM children that carry an identity from a *different* source file,
//! deduplicated by file path, so a list rendering fifty rows of the same
//! component reports one child.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::locator::{
    COMPONENT_CONTENT_ATTR, COMPONENT_LINE_ATTR, COMPONENT_PATH_ATTR, ElementLocator,
    LENS_ID_ATTR,
};

/// A host-reflected DOM element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawNode {
    /// Tag name as the DOM reports it (uppercase for HTML elements).
    pub tag_name: String,
    pub attrs: BTreeMap<String, String>,
    /// Rendered text (`innerText`), descendants included.
    pub text: String,
    pub children: Vec<RawChild>,
}

/// Child slot of a [`RawNode`]: nested element or text node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawChild {
    Element(RawNode),
    Text(String),
}

impl RawNode {
    fn attr(&self, name: &str) -> &str {
        self.attrs.get(name).map_or("", String::as_str)
    }

    /// True when the build pipeline stamped this element with an identity.
    #[must_use]
    pub fn has_component_identity(&self) -> bool {
        self.attrs.contains_key(LENS_ID_ATTR) || self.attrs.contains_key(COMPONENT_PATH_ATTR)
    }

    /// Source location: the composite id attribute wins, the path/line
    /// attribute pair is the fallback. Missing pieces become empty/zero.
    #[must_use]
    pub fn locator(&self) -> ElementLocator {
        let composite = self.attr(LENS_ID_ATTR);
        if !composite.is_empty() {
            return ElementLocator::parse_composite(composite);
        }
        ElementLocator {
            file_path: self.attr(COMPONENT_PATH_ATTR).to_owned(),
            line_number: self.attr(COMPONENT_LINE_ATTR).parse().unwrap_or(0),
            col: 0,
        }
    }

    fn element_children(&self) -> impl Iterator<Item = &RawNode> {
        self.children.iter().filter_map(|child| match child {
            RawChild::Element(node) => Some(node),
            RawChild::Text(_) => None,
        })
    }
}

/// `src` is the only attribute the parent frame consumes per component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComponentAttrs {
    pub src: String,
}

/// Child entry of a [`ComponentMeta`]; one level deep, no recursion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSummary {
    pub id: String,
    pub file_path: String,
    pub file_name: String,
    pub line_number: u32,
    pub col: u32,
    pub element_type: String,
    pub content: String,
    pub class_name: String,
    pub text_content: String,
    pub attrs: ComponentAttrs,
}

/// Component identity of one element, as reported to the parent frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMeta {
    pub id: String,
    pub file_path: String,
    pub file_name: String,
    pub line_number: u32,
    pub col: u32,
    pub element_type: String,
    pub content: String,
    pub children: Vec<ComponentSummary>,
    pub class_name: String,
    pub text_content: String,
    pub attrs: ComponentAttrs,
}

fn summary_of(node: &RawNode) -> ComponentSummary {
    let locator = node.locator();
    ComponentSummary {
        id: node.attr(LENS_ID_ATTR).to_owned(),
        file_name: locator.file_name().to_owned(),
        file_path: locator.file_path,
        line_number: locator.line_number,
        col: locator.col,
        element_type: node.tag_name.to_lowercase(),
        content: node.attr(COMPONENT_CONTENT_ATTR).to_owned(),
        class_name: node.attr("class").to_owned(),
        text_content: node.text.clone(),
        attrs: ComponentAttrs {
            src: node.attr("src").to_owned(),
        },
    }
}

/// Build the component payload for one element: its own identity plus its
/// distinct-file component children.
#[must_use]
pub fn component_meta(node: &RawNode) -> ComponentMeta {
    let locator = node.locator();

    let mut children: Vec<ComponentSummary> = Vec::new();
    for child in node.element_children() {
        if !child.has_component_identity() {
            continue;
        }
        let child_locator = child.locator();
        if child_locator.file_path == locator.file_path {
            continue;
        }
        if children
            .iter()
            .any(|seen| seen.file_path == child_locator.file_path)
        {
            continue;
        }
        children.push(summary_of(child));
    }

    ComponentMeta {
        id: node.attr(LENS_ID_ATTR).to_owned(),
        file_name: locator.file_name().to_owned(),
        file_path: locator.file_path,
        line_number: locator.line_number,
        col: locator.col,
        element_type: node.tag_name.to_lowercase(),
        content: node.attr(COMPONENT_CONTENT_ATTR).to_owned(),
        children,
        class_name: node.attr("class").to_owned(),
        text_content: node.text.clone(),
        attrs: ComponentAttrs {
            src: node.attr("src").to_owned(),
        },
    }
}

/// Full-fidelity dump of the rendered DOM, element and text nodes alike.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeTree {
    #[serde(rename_all = "camelCase")]
    Node {
        children: Vec<NodeTree>,
        attrs: BTreeMap<String, String>,
        tag_name: String,
        data: ComponentMeta,
    },
    #[serde(rename_all = "camelCase")]
    Text { text_content: String },
}

/// Recursively convert the reflected root into the wire tree.
#[must_use]
pub fn build_tree(root: &RawNode) -> NodeTree {
    NodeTree::Node {
        children: root
            .children
            .iter()
            .map(|child| match child {
                RawChild::Element(node) => build_tree(node),
                RawChild::Text(text) => NodeTree::Text {
                    text_content: text.clone(),
                },
            })
            .collect(),
        attrs: root.attrs.clone(),
        tag_name: root.tag_name.clone(),
        data: component_meta(root),
    }
}
