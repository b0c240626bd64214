#![forbid(unsafe_code)]

//! Console interception, engine half.
//!
//! The web glue wraps `console.log`/`warn`/`error`, always invoking the
//! original first (real console output is never swallowed), then hands the
//! call here. Every call is serialized (depth 5) and forwarded as a
//! `CONSOLE_OUTPUT` message; `error`-level calls additionally land in the
//! error log. For `warn`/`error` the host captures a caller stack by
//! constructing an `Error` inside the wrapper — its top two frames belong to
//! the interceptor itself and are stripped before the stack is attached.

use crate::faults::{ErrorRecord, ErrorSource, FaultPipeline};
use crate::protocol::{ConsoleWireLevel, OutboundMessage};
use crate::serialize::{SerializeOptions, SerializedNode, serialize};
use crate::trail::{InteractionEvent, PageContext};
use crate::value::Reflected;

/// Intercepted console methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
}

impl ConsoleLevel {
    /// Wire-level naming (`info`/`warning`/`error`).
    #[must_use]
    pub const fn wire(self) -> ConsoleWireLevel {
        match self {
            Self::Log => ConsoleWireLevel::Info,
            Self::Warn => ConsoleWireLevel::Warning,
            Self::Error => ConsoleWireLevel::Error,
        }
    }
}

/// Drop the interceptor's own frames from a captured caller stack.
#[must_use]
pub fn strip_interceptor_frames(stack: &str) -> String {
    stack.lines().skip(2).collect::<Vec<_>>().join("\n")
}

/// One intercepted console call.
#[derive(Debug, Clone)]
pub struct ConsoleCall {
    pub level: ConsoleLevel,
    /// Reflected arguments, in call order.
    pub args: Vec<Reflected>,
    /// Raw caller stack captured by the wrapper (warn/error only).
    pub caller_stack: Option<String>,
    /// Host-formatted ISO-8601 wall-clock time.
    pub logged_at: String,
}

/// Process one intercepted call: serialize arguments, assemble the joined
/// message, append `error`-level calls to the log, and produce the outbound
/// message.
pub fn capture(
    call: ConsoleCall,
    now_ms: u64,
    page: &PageContext,
    trail: Vec<InteractionEvent>,
    pipeline: &mut FaultPipeline,
) -> OutboundMessage {
    let opts = SerializeOptions::console();
    let raw: Vec<SerializedNode> = call.args.iter().map(|a| serialize(a, &opts)).collect();

    let stack = match call.level {
        ConsoleLevel::Log => None,
        ConsoleLevel::Warn | ConsoleLevel::Error => call
            .caller_stack
            .as_deref()
            .map(strip_interceptor_frames)
            .filter(|s| !s.is_empty()),
    };

    let mut message = raw
        .iter()
        .map(SerializedNode::display_string)
        .collect::<Vec<_>>()
        .join(" ");
    if let Some(stack) = &stack {
        message.push('\n');
        message.push_str(stack);
    }

    if call.level == ConsoleLevel::Error {
        pipeline.append(ErrorRecord {
            id: format!("console-error-{now_ms}"),
            message: message.clone(),
            stack: stack.clone(),
            source: ErrorSource::Console,
            location: None,
            timestamp: now_ms,
            page_url: page.url.clone(),
            page_path: page.path.clone(),
            interaction_trail: trail.clone(),
        });
    }

    OutboundMessage::console_output(
        call.level.wire(),
        message,
        call.logged_at,
        raw,
        page,
        trail,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn page() -> PageContext {
        PageContext::new("https://app.test/x", "/x")
    }

    fn call(level: ConsoleLevel, args: Vec<Reflected>) -> ConsoleCall {
        ConsoleCall {
            level,
            args,
            caller_stack: None,
            logged_at: "2026-08-30T12:00:00.000Z".into(),
        }
    }

    #[test]
    fn log_level_maps_to_info_and_skips_error_log() {
        let mut pipeline = FaultPipeline::new();
        let msg = capture(
            call(ConsoleLevel::Log, vec![Reflected::Str("hello".into())]),
            1_000,
            &page(),
            vec![],
            &mut pipeline,
        );
        let OutboundMessage::ConsoleOutput { level, message, .. } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(level, ConsoleWireLevel::Info);
        assert_eq!(message, "hello");
        assert!(pipeline.log().is_empty());
    }

    #[test]
    fn error_level_appends_to_error_log() {
        let mut pipeline = FaultPipeline::new();
        capture(
            call(ConsoleLevel::Error, vec![Reflected::Str("bad".into())]),
            1_000,
            &page(),
            vec![],
            &mut pipeline,
        );
        assert_eq!(pipeline.log().len(), 1);
        let record = &pipeline.log().records()[0];
        assert_eq!(record.id, "console-error-1000");
        assert_eq!(record.source, ErrorSource::Console);
        assert_eq!(record.message, "bad");
    }

    #[test]
    fn interceptor_frames_are_stripped_from_caller_stack() {
        let mut pipeline = FaultPipeline::new();
        let mut c = call(ConsoleLevel::Warn, vec![Reflected::Str("careful".into())]);
        c.caller_stack = Some("Error\n    at wrapper\n    at caller\n    at main".into());
        let msg = capture(c, 1_000, &page(), vec![], &mut pipeline);
        let OutboundMessage::ConsoleOutput { message, .. } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(message, "careful\n    at caller\n    at main");
    }

    #[test]
    fn non_string_args_render_as_pretty_json() {
        let mut pipeline = FaultPipeline::new();
        let msg = capture(
            call(
                ConsoleLevel::Log,
                vec![
                    Reflected::Str("count:".into()),
                    Reflected::Number(3.0),
                ],
            ),
            1_000,
            &page(),
            vec![],
            &mut pipeline,
        );
        let OutboundMessage::ConsoleOutput { message, raw, .. } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(message, "count: 3.0");
        assert_eq!(raw.len(), 2);
    }

    #[test]
    fn log_level_never_carries_a_stack() {
        let mut pipeline = FaultPipeline::new();
        let mut c = call(ConsoleLevel::Log, vec![Reflected::Str("x".into())]);
        c.caller_stack = Some("Error\n a\n b\n c".into());
        let msg = capture(c, 1_000, &page(), vec![], &mut pipeline);
        let OutboundMessage::ConsoleOutput { message, .. } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(message, "x");
    }
}
