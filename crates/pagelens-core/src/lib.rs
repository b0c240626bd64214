#![forbid(unsafe_code)]

//! `pagelens-core` is the deterministic engine behind the in-page
//! instrumentation layer: fault capture, interaction trails, console and
//! network telemetry, view detection, and the element picker.
//!
//! Design goals:
//! - **Host-driven I/O**: the embedding environment (a thin WASM binding)
//!   reflects DOM state in and executes the returned effects.
//! - **Deterministic time**: every time-dependent API takes `now_ms`
//!   explicitly; nothing here reads a clock.
//! - **No DOM, no JS types**: suitable for `wasm32-unknown-unknown` and for
//!   exhaustive native testing.
//!
//! The crate intentionally does not bind to `wasm-bindgen`; `pagelens-web`
//! wraps it with the browser-facing API.

pub mod console;
pub mod dom;
pub mod engine;
pub mod faults;
pub mod keybind;
pub mod locator;
pub mod navigation;
pub mod network;
pub mod overlay;
pub mod picker;
pub mod protocol;
pub mod serialize;
pub mod timer;
pub mod trail;
pub mod tree;
pub mod value;
pub mod view;

pub use engine::{CommandOutcome, Engine, EngineConfig, InitOutcome};
pub use picker::{DomCommand, Effect, PickerConfig, PickerEngine, PickerInput};
pub use protocol::{InboundCommand, OutboundMessage};
pub use trail::PageContext;
