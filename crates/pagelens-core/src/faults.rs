#![forbid(unsafe_code)]

//! Fault capture pipeline: one record shape for every error-like signal.
//!
//! Four sources feed the pipeline — window errors, unhandled promise
//! rejections, intercepted console errors, and dev-server overlay scrapes —
//! and every record lands in the page-lifetime [`ErrorLog`] and (for the
//! deduplicated sources) comes back out as an [`OutboundMessage`] for the
//! parent frame. Nothing here ever throws toward the host page: the
//! instrumentation must not be the thing that breaks the page.
//!
//! Runtime errors and rejections are deduplicated by signature with a
//! [`DEDUP_WINDOW_MS`] self-expiring membership, so a component re-rendering
//! the same fault every frame produces one record, not a flood.

use serde::{Deserialize, Serialize};

use crate::protocol::OutboundMessage;
use crate::trail::{InteractionEvent, PageContext};

/// How long an identical fault signature suppresses re-reporting.
pub const DEDUP_WINDOW_MS: u64 = 5_000;

/// Which capture source produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    Runtime,
    Promise,
    Console,
    Hmr,
}

/// Source position of a fault, when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    pub filename: String,
    pub line: u32,
    pub column: u32,
}

/// The unified error record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub source: ErrorSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<ErrorLocation>,
    pub timestamp: u64,
    pub page_url: String,
    pub page_path: String,
    pub interaction_trail: Vec<InteractionEvent>,
}

/// Append-only page-lifetime error log.
///
/// Deliberately unbounded: it lives exactly as long as one page load and is
/// exported wholesale by the debug route.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    records: Vec<ErrorRecord>,
}

impl ErrorLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ErrorRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// JSON dump for the `/__debug/errors` route.
    #[must_use]
    pub fn export_json(&self) -> String {
        serde_json::to_string(&self.records).unwrap_or_else(|_| "[]".to_owned())
    }
}

/// Signature set with self-expiring membership.
#[derive(Debug, Clone, Default)]
pub struct DedupCache {
    entries: Vec<(String, u64)>,
}

impl DedupCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `signature` was already seen within the window.
    /// Otherwise records it (with `now_ms` as its insertion time) and
    /// returns false. Expired entries are purged lazily on each call.
    pub fn is_duplicate(&mut self, signature: &str, now_ms: u64) -> bool {
        self.entries
            .retain(|(_, inserted)| now_ms.saturating_sub(*inserted) < DEDUP_WINDOW_MS);
        if self.entries.iter().any(|(sig, _)| sig == signature) {
            return true;
        }
        self.entries.push((signature.to_owned(), now_ms));
        false
    }
}

/// A `window.onerror`-shaped fault.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuntimeFault {
    pub message: String,
    pub filename: String,
    pub lineno: u32,
    pub colno: u32,
    pub stack: Option<String>,
}

impl RuntimeFault {
    #[must_use]
    pub fn signature(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.message, self.filename, self.lineno, self.colno
        )
    }
}

/// An unhandled promise rejection, pre-flattened by the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RejectionFault {
    /// `reason.message`, or the reason's string form as a last resort.
    pub message: String,
    /// `reason.stack`, or the reason's string form.
    pub stack: Option<String>,
}

impl RejectionFault {
    /// Stack-or-message; legitimate errors often have no stack at all.
    #[must_use]
    pub fn signature(&self) -> String {
        self.stack.clone().unwrap_or_else(|| self.message.clone())
    }
}

/// Dedup cache + error log, the shared sink for all four capture sources.
#[derive(Debug, Clone, Default)]
pub struct FaultPipeline {
    log: ErrorLog,
    dedup: DedupCache,
}

impl FaultPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn log(&self) -> &ErrorLog {
        &self.log
    }

    /// Push a pre-built record (console / overlay sources).
    pub fn append(&mut self, record: ErrorRecord) {
        self.log.push(record);
    }

    /// Report a runtime error. Returns the outbound message unless the fault
    /// is a recent duplicate.
    pub fn report_runtime_error(
        &mut self,
        fault: &RuntimeFault,
        now_ms: u64,
        page: &PageContext,
        trail: Vec<InteractionEvent>,
    ) -> Option<OutboundMessage> {
        if self.dedup.is_duplicate(&fault.signature(), now_ms) {
            return None;
        }
        let record = ErrorRecord {
            id: format!("runtime-error-{now_ms}"),
            message: fault.message.clone(),
            stack: fault.stack.clone(),
            source: ErrorSource::Runtime,
            location: Some(ErrorLocation {
                filename: fault.filename.clone(),
                line: fault.lineno,
                column: fault.colno,
            }),
            timestamp: now_ms,
            page_url: page.url.clone(),
            page_path: page.path.clone(),
            interaction_trail: trail,
        };
        self.log.push(record.clone());
        Some(OutboundMessage::RuntimeError { error: record })
    }

    /// Report an unhandled promise rejection, deduplicated by
    /// stack-or-message signature.
    pub fn report_unhandled_rejection(
        &mut self,
        fault: &RejectionFault,
        now_ms: u64,
        page: &PageContext,
        trail: Vec<InteractionEvent>,
    ) -> Option<OutboundMessage> {
        if self.dedup.is_duplicate(&fault.signature(), now_ms) {
            return None;
        }
        let message = if fault.message.is_empty() {
            "Unhandled promise rejection".to_owned()
        } else {
            fault.message.clone()
        };
        let record = ErrorRecord {
            id: format!("promise-error-{now_ms}"),
            message,
            stack: fault.stack.clone(),
            source: ErrorSource::Promise,
            location: None,
            timestamp: now_ms,
            page_url: page.url.clone(),
            page_path: page.path.clone(),
            interaction_trail: trail,
        };
        self.log.push(record.clone());
        Some(OutboundMessage::UnhandledPromiseRejection { error: record })
    }
}
