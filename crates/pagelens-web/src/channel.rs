#![forbid(unsafe_code)]

//! Outbound postMessage channel to the parent frame.
//!
//! Messages are serialized once, then posted to every configured parent
//! origin. Failures are swallowed: the page must keep working when the
//! parent is gone or the frame is sandboxed, and a posting error carries no
//! information the page could act on anyway.

use tracing::warn;

use pagelens_core::OutboundMessage;

pub struct Channel {
    parent: web_sys::Window,
    targets: Vec<String>,
}

impl Channel {
    #[must_use]
    pub fn new(parent: web_sys::Window, targets: Vec<String>) -> Self {
        Self { parent, targets }
    }

    /// Post one message to every configured origin, best effort.
    pub fn post(&self, message: &OutboundMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "outbound message failed to serialize");
                return;
            }
        };
        let Ok(data) = js_sys::JSON::parse(&json) else {
            return;
        };
        for origin in &self.targets {
            // A closed or cross-origin-restricted parent throws; ignore it.
            let _ = self.parent.post_message(&data, origin);
        }
    }

    pub fn post_all(&self, messages: &[OutboundMessage]) {
        for message in messages {
            self.post(message);
        }
    }
}
