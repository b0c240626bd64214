#![forbid(unsafe_code)]

//! Network interception, engine half.
//!
//! The web glue wraps the page's `fetch` and reports each call here. The
//! wrapper is a transparent proxy: the caller observes exactly the resolved
//! value, rejection reason and timing it would without instrumentation —
//! telemetry is a side channel. The engine only builds the records.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::protocol::OutboundMessage;
use crate::trail::{InteractionEvent, PageContext};

/// Placeholder when a request body defeats stringification.
pub const UNSERIALIZABLE_BODY: &str = "Could not serialize request body";

/// Request body as captured by the wrapper.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),
    /// `FormData` entries.
    FormPairs(Vec<(String, String)>),
    /// `URLSearchParams` entries.
    UrlEncoded(Vec<(String, String)>),
    Json(serde_json::Value),
    /// The host could not read the body at all.
    Unserializable,
}

impl RequestBody {
    /// Best-effort string form; never fails.
    #[must_use]
    pub fn stringify(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::FormPairs(pairs) => {
                let joined = pairs
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("&");
                format!("FormData: {joined}")
            }
            Self::UrlEncoded(pairs) => pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&"),
            Self::Json(value) => {
                serde_json::to_string(value).unwrap_or_else(|_| UNSERIALIZABLE_BODY.to_owned())
            }
            Self::Unserializable => UNSERIALIZABLE_BODY.to_owned(),
        }
    }
}

/// What the wrapper knew when the request started.
#[derive(Debug, Clone, Default)]
pub struct RequestCapture {
    pub url: String,
    /// Empty means GET.
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
}

impl RequestCapture {
    fn method_or_get(&self) -> String {
        if self.method.is_empty() {
            "GET".to_owned()
        } else {
            self.method.clone()
        }
    }
}

/// Why the wrapped call rejected.
#[derive(Debug, Clone, Default)]
pub struct FetchFailure {
    pub message: Option<String>,
    pub stack: Option<String>,
    /// `TypeError` rejections (network-level failures) keep their fields
    /// verbatim; anything else degrades to placeholder text.
    pub is_type_error: bool,
}

/// Error half of a failed network event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// One observed request, success- or error-shaped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEvent {
    pub url: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    /// Host-formatted ISO-8601 wall-clock time.
    pub timestamp: String,
    /// Monotonic start→end duration.
    pub duration: u64,
    pub origin: String,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NetworkError>,
    pub page_url: String,
    pub page_path: String,
    pub interaction_trail: Vec<InteractionEvent>,
}

/// Completion facts for a request that resolved.
#[derive(Debug, Clone, Default)]
pub struct ResponseFacts {
    pub status: u16,
    pub status_text: String,
    pub response_body: Option<String>,
}

/// Build the telemetry message for a resolved request.
#[must_use]
pub fn success_event(
    capture: &RequestCapture,
    response: &ResponseFacts,
    duration_ms: u64,
    timestamp: String,
    origin: String,
    page: &PageContext,
    trail: Vec<InteractionEvent>,
) -> OutboundMessage {
    OutboundMessage::NetworkRequest {
        request: NetworkEvent {
            url: capture.url.clone(),
            method: capture.method_or_get(),
            status: Some(response.status),
            status_text: Some(response.status_text.clone()),
            response_body: response.response_body.clone(),
            request_body: capture.body.as_ref().map(RequestBody::stringify),
            timestamp,
            duration: duration_ms,
            origin,
            headers: capture.headers.clone(),
            error: None,
            page_url: page.url.clone(),
            page_path: page.path.clone(),
            interaction_trail: trail,
        },
    }
}

/// Build the telemetry message for a rejected request. The original
/// rejection is re-thrown to the caller by the wrapper, unchanged.
#[must_use]
pub fn failure_event(
    capture: &RequestCapture,
    failure: &FetchFailure,
    duration_ms: u64,
    timestamp: String,
    origin: String,
    page: &PageContext,
    trail: Vec<InteractionEvent>,
) -> OutboundMessage {
    let error = if failure.is_type_error {
        NetworkError {
            message: failure
                .message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_owned()),
            stack: failure.stack.clone(),
        }
    } else {
        NetworkError {
            message: failure
                .message
                .clone()
                .unwrap_or_else(|| "Unknown fetch error".to_owned()),
            stack: Some(
                failure
                    .stack
                    .clone()
                    .unwrap_or_else(|| "Not available".to_owned()),
            ),
        }
    };
    OutboundMessage::NetworkRequest {
        request: NetworkEvent {
            url: capture.url.clone(),
            method: capture.method_or_get(),
            status: None,
            status_text: None,
            response_body: None,
            request_body: capture.body.as_ref().map(RequestBody::stringify),
            timestamp,
            duration: duration_ms,
            origin,
            headers: capture.headers.clone(),
            error: Some(error),
            page_url: page.url.clone(),
            page_path: page.path.clone(),
            interaction_trail: trail,
        },
    }
}
