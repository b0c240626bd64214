#![forbid(unsafe_code)]

//! Dev-server error overlay scraping, engine half.
//!
//! When the dev server compiles a broken module it injects a
//! `vite-error-overlay` custom element with the details inside a shadow root.
//! The web glue watches for that element (mutation observer + hot-update
//! event + initial sweep), scrapes the shadow root's text fields into an
//! [`OverlaySnapshot`], and hands it here. The engine distills a single
//! composite error message plus a best-effort source location, records it as
//! an `hmr`-sourced fault, and emits it on the `RUNTIME_ERROR` channel.
//!
//! Scraping a moving overlay DOM can itself fail; [`fallback_overlay_error`]
//! covers that path with whatever raw text the host salvaged.

use regex_lite::Regex;

use crate::faults::{ErrorLocation, ErrorRecord, ErrorSource, FaultPipeline};
use crate::protocol::OutboundMessage;
use crate::trail::{InteractionEvent, PageContext};

/// Text fields scraped from the overlay's shadow root. All trimmed; empty
/// means the selector found nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlaySnapshot {
    /// `span.plugin` content.
    pub plugin: String,
    /// `.message-body` content.
    pub message_body: String,
    /// `.message` content, consulted only when `message_body` is empty.
    pub message_text: String,
    /// `.file` content.
    pub file_text: String,
    /// `.frame` content.
    pub frame: String,
    /// `.stack` content.
    pub stack: String,
    /// `.window` container text, the widest net.
    pub window_text: String,
}

impl OverlaySnapshot {
    /// Error text by preference order across the scraped fields.
    fn error_text(&self) -> &str {
        [
            self.message_body.as_str(),
            self.message_text.as_str(),
            self.window_text.as_str(),
        ]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or("Unknown Vite error")
    }
}

fn first_capture_triplet(re: &Regex, haystack: &str) -> Option<ErrorLocation> {
    let caps = re.captures(haystack)?;
    Some(ErrorLocation {
        filename: caps.get(1)?.as_str().to_owned(),
        line: caps.get(2)?.as_str().parse().ok()?,
        column: caps.get(3)?.as_str().parse().ok()?,
    })
}

/// Probe the scraped fields for a `file:line:column` triplet, widest-net
/// last. Returns the first hit.
#[must_use]
pub fn extract_location(snapshot: &OverlaySnapshot) -> Option<ErrorLocation> {
    let from_file = Regex::new(r"(.*?):(\d+):(\d+)").ok()?;
    let from_frame = Regex::new(r"(\S+\.[tj]sx?):(\d+):(\d+)").ok()?;
    let from_text = Regex::new(r"([^:\s]+\.[tj]sx?):(\d+):(\d+)").ok()?;

    first_capture_triplet(&from_file, &snapshot.file_text)
        .or_else(|| first_capture_triplet(&from_frame, &snapshot.frame))
        .or_else(|| first_capture_triplet(&from_text, snapshot.error_text()))
        .or_else(|| first_capture_triplet(&from_text, &snapshot.window_text))
}

/// Assemble the composite message: optional `[plugin] ` prefix, the error
/// text, then frame and file lines when they add information the message
/// does not already contain.
#[must_use]
pub fn compose_message(snapshot: &OverlaySnapshot) -> String {
    let mut message = String::new();
    if !snapshot.plugin.is_empty() {
        message.push_str(&format!("[{}] ", snapshot.plugin));
    }
    message.push_str(snapshot.error_text());
    if !snapshot.frame.is_empty() && !message.contains(&snapshot.frame) {
        message.push_str(&format!("\n\n{}", snapshot.frame));
    }
    if !snapshot.file_text.is_empty() && !message.contains(&snapshot.file_text) {
        message.push_str(&format!("\n\nFile: {}", snapshot.file_text));
    }
    if message.trim().is_empty() {
        message = if snapshot.window_text.is_empty() {
            "Vite error detected (no details available)".to_owned()
        } else {
            snapshot.window_text.clone()
        };
    }
    message
}

/// Record a scraped overlay and produce its outbound message. Overlay faults
/// are never deduplicated: the dev server already shows one overlay at a
/// time, and each appearance is a distinct compile failure.
pub fn report_overlay_error(
    pipeline: &mut FaultPipeline,
    snapshot: &OverlaySnapshot,
    now_ms: u64,
    page: &PageContext,
    trail: Vec<InteractionEvent>,
) -> OutboundMessage {
    let record = ErrorRecord {
        id: format!("hmr-error-{now_ms}"),
        message: compose_message(snapshot),
        stack: Some(snapshot.stack.clone()),
        source: ErrorSource::Hmr,
        location: extract_location(snapshot),
        timestamp: now_ms,
        page_url: page.url.clone(),
        page_path: page.path.clone(),
        interaction_trail: trail,
    };
    pipeline.append(record.clone());
    OutboundMessage::RuntimeError { error: record }
}

/// Last-resort path when scraping the shadow root threw: report whatever raw
/// text the host salvaged, capped at 500 characters.
pub fn fallback_overlay_error(
    pipeline: &mut FaultPipeline,
    raw_text: &str,
    now_ms: u64,
    page: &PageContext,
    trail: Vec<InteractionEvent>,
) -> OutboundMessage {
    let trimmed = raw_text.trim();
    let text = if trimmed.is_empty() {
        "Unknown Vite error"
    } else {
        trimmed
    };
    let capped: String = text.chars().take(500).collect();
    let record = ErrorRecord {
        id: format!("hmr-error-fallback-{now_ms}"),
        message: format!("Vite error: {capped}"),
        stack: None,
        source: ErrorSource::Hmr,
        location: None,
        timestamp: now_ms,
        page_url: page.url.clone(),
        page_path: page.path.clone(),
        interaction_trail: trail,
    };
    pipeline.append(record.clone());
    OutboundMessage::RuntimeError { error: record }
}
