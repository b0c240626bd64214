#![forbid(unsafe_code)]

//! DOM snapshot builders: everything the engine consumes as plain data is
//! assembled here, in one pass per event, so the engine never needs a live
//! DOM handle.

use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlElement, ShadowRoot, Window};

use pagelens_core::dom::{ElementFacts, Rect};
use pagelens_core::locator::{
    COMPONENT_LINE_ATTR, COMPONENT_PATH_ATTR, ElementLocator, LENS_ID_ATTR,
};
use pagelens_core::overlay::OverlaySnapshot;
use pagelens_core::picker::SELECTED_ATTR;
use pagelens_core::trail::FormFacts;
use pagelens_core::tree::{RawChild, RawNode};
use pagelens_core::view::{
    ACTIVE_NAV_SELECTORS, DocumentSnapshot, EXPLICIT_MARKER_SELECTORS, MAIN_CONTAINER_SELECTOR,
    MARKER_CLASS_SELECTOR,
};

fn attr(element: &Element, name: &str) -> String {
    element.get_attribute(name).unwrap_or_default()
}

fn trimmed_text(element: &Element) -> String {
    element
        .text_content()
        .unwrap_or_default()
        .trim()
        .to_owned()
}

/// Snapshot one element at event time.
#[must_use]
pub fn element_facts(element: &Element, window: &Window) -> ElementFacts {
    let rect = element.get_bounding_client_rect();
    let tag = element.tag_name().to_lowercase();
    let composite = attr(element, LENS_ID_ATTR);
    let locator = if composite.is_empty() {
        let path = attr(element, COMPONENT_PATH_ATTR);
        if path.is_empty() {
            None
        } else {
            Some(ElementLocator {
                file_path: path,
                line_number: attr(element, COMPONENT_LINE_ATTR).parse().unwrap_or(0),
                col: 0,
            })
        }
    } else {
        Some(ElementLocator::parse_composite(&composite))
    };
    let has_lens_identity =
        element.has_attribute(LENS_ID_ATTR) || element.has_attribute(COMPONENT_PATH_ATTR);

    let html: Option<&HtmlElement> = element.dyn_ref::<HtmlElement>();
    let text = html
        .map(|h| h.inner_text())
        .unwrap_or_else(|| element.text_content().unwrap_or_default())
        .trim()
        .to_owned();

    ElementFacts {
        handle: None,
        tag,
        id: element.id(),
        classes: attr(element, "class"),
        text,
        aria_label: attr(element, "aria-label"),
        test_id: attr(element, "data-testid"),
        title: attr(element, "title"),
        placeholder: attr(element, "placeholder"),
        value: element
            .dyn_ref::<web_sys::HtmlInputElement>()
            .map(web_sys::HtmlInputElement::value)
            .unwrap_or_default(),
        name: attr(element, "name"),
        role: attr(element, "role"),
        input_type: attr(element, "type"),
        href: attr(element, "href"),
        required: element.has_attribute("required"),
        has_onclick: element.has_attribute("onclick"),
        tab_index: html.map(HtmlElement::tab_index),
        rect: Rect {
            left: rect.left(),
            top: rect.top(),
            width: rect.width(),
            height: rect.height(),
        },
        viewport_width: window
            .inner_width()
            .ok()
            .and_then(|w| w.as_f64())
            .unwrap_or(0.0),
        locator,
        has_lens_identity,
        inside_svg: element.closest("svg").ok().flatten().is_some(),
        is_selected: element.has_attribute(SELECTED_ATTR),
    }
}

/// Snapshot a form for the interaction trail.
#[must_use]
pub fn form_facts(form: &web_sys::HtmlFormElement) -> FormFacts {
    let identifier = if !form.id().is_empty() {
        format!("#{}", form.id())
    } else if !form.name().is_empty() {
        format!("[name=\"{}\"]", form.name())
    } else {
        "form".to_owned()
    };
    FormFacts {
        identifier,
        action: form.action(),
        method: form.method(),
        field_count: form.elements().length() as usize,
    }
}

/// One pass over the document for the view-detection cascade.
#[must_use]
pub fn document_snapshot(document: &Document) -> DocumentSnapshot {
    let visible_h1 = document
        .query_selector_all("h1")
        .ok()
        .and_then(|list| {
            (0..list.length()).find_map(|i| {
                let element = list.get(i)?.dyn_into::<Element>().ok()?;
                let rect = element.get_bounding_client_rect();
                if rect.width() > 0.0 && rect.height() > 0.0 {
                    let text = trimmed_text(&element);
                    (!text.is_empty()).then_some(text)
                } else {
                    None
                }
            })
        });

    let active_nav_text = ACTIVE_NAV_SELECTORS.iter().find_map(|selector| {
        let element = document.query_selector(selector).ok().flatten()?;
        let text = trimmed_text(&element);
        (!text.is_empty()).then_some(text)
    });

    let explicit_marker = EXPLICIT_MARKER_SELECTORS
        .iter()
        .find_map(|(selector, attr_name)| {
            let element = document.query_selector(selector).ok().flatten()?;
            let value = attr(&element, attr_name);
            (!value.is_empty()).then_some(value)
        });

    let marker_class_names = class_names_matching(document, MARKER_CLASS_SELECTOR);
    let main_class_names = descendant_class_names(document, MAIN_CONTAINER_SELECTOR);

    let location = document.location();
    DocumentSnapshot {
        title: document.title().trim().to_owned(),
        hostname: location
            .as_ref()
            .and_then(|l| l.hostname().ok())
            .unwrap_or_default(),
        visible_h1,
        active_nav_text,
        explicit_marker,
        marker_class_names,
        main_class_names,
        path: location
            .as_ref()
            .and_then(|l| l.pathname().ok())
            .unwrap_or_default(),
    }
}

fn class_names_matching(document: &Document, selector: &str) -> Vec<String> {
    let Ok(list) = document.query_selector_all(selector) else {
        return Vec::new();
    };
    (0..list.length())
        .filter_map(|i| {
            let element = list.get(i)?.dyn_into::<Element>().ok()?;
            let classes = attr(&element, "class");
            (!classes.is_empty()).then_some(classes)
        })
        .collect()
}

fn descendant_class_names(document: &Document, container_selector: &str) -> Vec<String> {
    let Ok(containers) = document.query_selector_all(container_selector) else {
        return Vec::new();
    };
    let mut names = Vec::new();
    for i in 0..containers.length() {
        let Some(container) = containers.get(i).and_then(|n| n.dyn_into::<Element>().ok()) else {
            continue;
        };
        if let Ok(descendants) = container.query_selector_all("[class]") {
            for j in 0..descendants.length() {
                if let Some(element) = descendants.get(j).and_then(|n| n.dyn_into::<Element>().ok())
                {
                    let classes = attr(&element, "class");
                    if !classes.is_empty() {
                        names.push(classes);
                    }
                }
            }
        }
    }
    names
}

/// Scrape the dev-server overlay's shadow root.
#[must_use]
pub fn overlay_snapshot(shadow: &ShadowRoot) -> OverlaySnapshot {
    let select = |selector: &str| -> String {
        shadow
            .query_selector(selector)
            .ok()
            .flatten()
            .map(|e| trimmed_text(&e))
            .unwrap_or_default()
    };
    let message_body = select(".message-body");
    let message_text = if message_body.is_empty() {
        select(".message")
    } else {
        String::new()
    };
    OverlaySnapshot {
        plugin: select("span.plugin"),
        message_body,
        message_text,
        file_text: select(".file"),
        frame: select(".frame"),
        stack: select(".stack"),
        window_text: select(".window"),
    }
}

/// Reflect an element subtree for component-tree building. Attribute maps
/// and rendered text come along; non-element, non-text nodes are dropped.
#[must_use]
pub fn raw_node(element: &Element) -> RawNode {
    let mut attrs = std::collections::BTreeMap::new();
    let attributes = element.attributes();
    for i in 0..attributes.length() {
        if let Some(a) = attributes.item(i) {
            attrs.insert(a.name(), a.value());
        }
    }

    let text = element
        .dyn_ref::<HtmlElement>()
        .map(|h| h.inner_text())
        .unwrap_or_else(|| element.text_content().unwrap_or_default());

    let mut children = Vec::new();
    let child_nodes = element.child_nodes();
    for i in 0..child_nodes.length() {
        let Some(node) = child_nodes.get(i) else {
            continue;
        };
        if let Some(child) = node.dyn_ref::<Element>() {
            children.push(RawChild::Element(raw_node(child)));
        } else if let Some(text_node) = node.dyn_ref::<web_sys::Text>() {
            children.push(RawChild::Text(
                text_node.text_content().unwrap_or_default(),
            ));
        }
    }

    RawNode {
        tag_name: element.tag_name(),
        attrs,
        text,
        children,
    }
}
