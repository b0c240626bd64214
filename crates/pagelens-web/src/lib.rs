#![forbid(unsafe_code)]

//! `pagelens-web` wraps [`pagelens_core`] with the browser-facing glue: it
//! reflects DOM state into the engine's host-neutral types, executes the
//! effects the engine returns, and owns the postMessage channel to the
//! parent frame.
//!
//! Everything DOM-bound is gated to `wasm32`; the handful of pure helpers
//! below stay buildable (and tested) on native targets.

#[cfg(target_arch = "wasm32")]
pub mod channel;
#[cfg(target_arch = "wasm32")]
pub mod executor;
#[cfg(target_arch = "wasm32")]
pub mod reflect;
#[cfg(target_arch = "wasm32")]
pub mod snapshot;
#[cfg(target_arch = "wasm32")]
mod wasm;

/// Poll interval while waiting for a pending hot update to settle.
pub const HOT_UPDATE_SETTLE_POLL_MS: u64 = 50;

/// Interval driving the engine's debounce timers.
pub const TIMER_POLL_MS: u64 = 5;

/// Rebuild `href` with `hard=<cache_buster>` set in the query string,
/// replacing any previous value and preserving the fragment.
#[must_use]
pub fn hard_refresh_url(href: &str, cache_buster: &str) -> String {
    let (base, fragment) = match href.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (href, None),
    };
    let (path, query) = match base.split_once('?') {
        Some((path, query)) => (path, query),
        None => (base, ""),
    };
    let mut params: Vec<(String, String)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_owned(), v.to_owned()),
            None => (pair.to_owned(), String::new()),
        })
        .filter(|(k, _)| k != "hard")
        .collect();
    params.push(("hard".to_owned(), cache_buster.to_owned()));

    let query = params
        .iter()
        .map(|(k, v)| {
            if v.is_empty() {
                k.clone()
            } else {
                format!("{k}={v}")
            }
        })
        .collect::<Vec<_>>()
        .join("&");
    match fragment {
        Some(fragment) => format!("{path}?{query}#{fragment}"),
        None => format!("{path}?{query}"),
    }
}
