#![forbid(unsafe_code)]

//! Browser entry point: wires the engine to the live page.
//!
//! One [`App`] exists per script load, shared behind `Rc<RefCell<_>>` by
//! every event closure. Event closures use `try_borrow_mut` and bail when
//! the app is already borrowed; a DOM call made while running effects can
//! fire synchronous events (focus, mutation) and those must not reenter.
//!
//! The script only instruments pages embedded in a parent frame. Loaded
//! standalone it does nothing, except on the debug route, where it replaces
//! the document with the raw error log.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Function, Object, Promise, Reflect};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Document, Element, ErrorEvent, Event, KeyboardEvent, MessageEvent, MouseEvent,
    MutationObserver, MutationObserverInit, PromiseRejectionEvent, Window,
};

use pagelens_core::console::{ConsoleCall, ConsoleLevel};
use pagelens_core::faults::{RejectionFault, RuntimeFault};
use pagelens_core::navigation::NavigationProbe;
use pagelens_core::network::{FetchFailure, RequestBody, RequestCapture, ResponseFacts};
use pagelens_core::picker::HOVERED_ATTR;
use pagelens_core::protocol::RawKeyEvent;
use pagelens_core::{
    CommandOutcome, Effect, Engine, EngineConfig, InitOutcome, PageContext, PickerInput,
};

use crate::channel::Channel;
use crate::executor::{Executor, HostNote};
use crate::reflect::Reflector;
use crate::snapshot;
use crate::{HOT_UPDATE_SETTLE_POLL_MS, TIMER_POLL_MS, hard_refresh_url};

/// Double-injection guard on the window object.
const ACTIVE_FLAG: &str = "__pageLensActive";

// ---------------------------------------------------------------------------
// Boot
// ---------------------------------------------------------------------------

/// Start instrumentation. The embedding script calls this once, passing the
/// parent origins allowed to command the page.
#[wasm_bindgen]
pub fn boot(allowed_origins: Vec<String>) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;

    if Reflect::get(&window, &JsValue::from_str(ACTIVE_FLAG))
        .map(|v| v.is_truthy())
        .unwrap_or(false)
    {
        return Ok(());
    }
    let _ = Reflect::set(&window, &JsValue::from_str(ACTIVE_FLAG), &JsValue::TRUE);

    let mut engine = Engine::new(
        EngineConfig {
            allowed_origins: allowed_origins.clone(),
            ..EngineConfig::default()
        },
        &window.location().href().unwrap_or_default(),
        &current_page(&window).path,
    );

    let page = current_page(&window);
    let outcome = engine.init(now_ms(), &page, snapshot::document_snapshot(&document));
    match outcome {
        InitOutcome::DebugDump(json) => {
            render_debug_dump(&document, &json);
            Ok(())
        }
        InitOutcome::Start {
            stylesheet,
            messages,
        } => {
            // Standalone pages are left alone; only embedded pages report.
            if !embedded(&window) {
                return Ok(());
            }
            let parent = window
                .parent()
                .ok()
                .flatten()
                .ok_or_else(|| JsValue::from_str("no parent frame"))?;
            let channel = Rc::new(Channel::new(parent, allowed_origins));
            let executor = Executor::new(
                window.clone(),
                document.clone(),
                engine.config().picker.clone(),
                Rc::clone(&channel),
            );
            executor.install_base_stylesheet(&stylesheet);
            channel.post_all(&messages);

            let root_id = engine.config().root_id.clone();
            let app = Rc::new(RefCell::new(App {
                engine,
                channel,
                executor,
                window,
                document,
                root_id,
                picker_listeners: None,
            }));
            install_console_interceptors(&app)?;
            install_fetch_interceptor(&app)?;
            install_global_listeners(&app)?;
            install_observers(&app)?;
            install_timer_loop(&app)?;
            Ok(())
        }
    }
}

fn embedded(window: &Window) -> bool {
    match window.top() {
        Ok(Some(top)) => !Object::is(top.as_ref(), window.as_ref()),
        _ => true,
    }
}

fn render_debug_dump(document: &Document, json: &str) {
    if let Some(body) = document.body() {
        body.set_text_content(None);
        if let Ok(pre) = document.create_element("pre") {
            pre.set_text_content(Some(json));
            let _ = body.append_child(&pre);
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct App {
    engine: Engine,
    channel: Rc<Channel>,
    executor: Executor,
    window: Window,
    document: Document,
    root_id: String,
    picker_listeners: Option<PickerListeners>,
}

type Shared = Rc<RefCell<App>>;

fn now_ms() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn iso_now() -> String {
    String::from(js_sys::Date::new_0().to_iso_string())
}

fn current_page(window: &Window) -> PageContext {
    let location = window.location();
    let url = location.href().unwrap_or_default();
    let path = format!(
        "{}{}{}",
        location.pathname().unwrap_or_default(),
        location.search().unwrap_or_default(),
        location.hash().unwrap_or_default(),
    );
    PageContext::new(url, path)
}

impl App {
    fn root_element(&self) -> Option<Element> {
        self.document
            .get_element_by_id(&self.root_id)
            .or_else(|| self.document.body().map(Into::into))
    }

    fn hovered_node(&self) -> Option<pagelens_core::tree::RawNode> {
        self.document
            .query_selector(&format!("[{HOVERED_ATTR}]"))
            .ok()
            .flatten()
            .map(|element| snapshot::raw_node(&element))
    }
}

/// Run effects, feeding query replies back into the engine until it has
/// nothing more to say.
fn run_effects(shared: &Shared, app: &mut App, effects: Vec<Effect>, event: Option<&Event>) {
    let mut queue = effects;
    while !queue.is_empty() {
        let mut replies = Vec::new();
        for effect in queue {
            match effect {
                Effect::Send(message) => app.channel.post(&message),
                Effect::Dom(command) => {
                    for note in app.executor.execute(&command, event) {
                        match note {
                            HostNote::AttachListeners => attach_picker_listeners(shared, app),
                            HostNote::DetachListeners => detach_picker_listeners(app),
                            HostNote::Reply(input) => replies.push(input),
                        }
                    }
                }
            }
        }
        queue = replies
            .into_iter()
            .flat_map(|input| app.engine.handle_picker_input(input, now_ms()))
            .collect();
    }
}

fn with_app(shared: &Shared, f: impl FnOnce(&Shared, &mut App)) {
    if let Ok(mut app) = shared.try_borrow_mut() {
        f(shared, &mut app);
    }
}

// ---------------------------------------------------------------------------
// Console interception
// ---------------------------------------------------------------------------

fn install_console_interceptors(shared: &Shared) -> Result<(), JsValue> {
    let console = Reflect::get(&js_sys::global(), &JsValue::from_str("console"))?;
    for (name, level) in [
        ("log", ConsoleLevel::Log),
        ("warn", ConsoleLevel::Warn),
        ("error", ConsoleLevel::Error),
    ] {
        let original: Function = Reflect::get(&console, &JsValue::from_str(name))?.dyn_into()?;
        let console_this = console.clone();
        let shared = Rc::clone(shared);
        let wrapper = Closure::<dyn FnMut(JsValue, JsValue, JsValue, JsValue, JsValue)>::new(
            move |a: JsValue, b: JsValue, c: JsValue, d: JsValue, e: JsValue| {
                let args = js_sys::Array::new();
                for value in [&a, &b, &c, &d, &e] {
                    args.push(value);
                }
                // Missing trailing parameters arrive as undefined; an
                // explicit trailing undefined argument is indistinguishable
                // and gets dropped with them.
                while args.length() > 0 && args.get(args.length() - 1).is_undefined() {
                    args.pop();
                }
                // The real console always fires first.
                let _ = original.apply(&console_this, &args);

                let caller_stack = match level {
                    ConsoleLevel::Log => None,
                    ConsoleLevel::Warn | ConsoleLevel::Error => {
                        Reflect::get(&js_sys::Error::new(""), &JsValue::from_str("stack"))
                            .ok()
                            .and_then(|v| v.as_string())
                    }
                };
                with_app(&shared, |_, app| {
                    let mut reflector = Reflector::new();
                    let reflected = args.iter().map(|v| reflector.reflect(&v)).collect();
                    let page = current_page(&app.window);
                    let message = app.engine.report_console(
                        ConsoleCall {
                            level,
                            args: reflected,
                            caller_stack,
                            logged_at: iso_now(),
                        },
                        now_ms(),
                        &page,
                    );
                    app.channel.post(&message);
                });
            },
        );
        Reflect::set(
            &console,
            &JsValue::from_str(name),
            wrapper.as_ref().unchecked_ref(),
        )?;
        wrapper.forget();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Fetch interception
// ---------------------------------------------------------------------------

fn install_fetch_interceptor(shared: &Shared) -> Result<(), JsValue> {
    let window: JsValue = {
        let app = shared.borrow();
        app.window.clone().into()
    };
    let original: Function = Reflect::get(&window, &JsValue::from_str("fetch"))?.dyn_into()?;

    let shared = Rc::clone(shared);
    let window_this = window.clone();
    let wrapper = Closure::<dyn FnMut(JsValue, JsValue) -> Promise>::new(
        move |input: JsValue, init: JsValue| {
            let capture = capture_request(&input, &init);
            let started = now_ms();
            let call = original.call2(&window_this, &input, &init);
            let shared = Rc::clone(&shared);
            wasm_bindgen_futures::future_to_promise(async move {
                let pending: Promise = match call {
                    Ok(value) => value.dyn_into()?,
                    Err(err) => {
                        report_fetch_failure(&shared, &capture, &err, started);
                        return Err(err);
                    }
                };
                match JsFuture::from(pending).await {
                    Ok(resolved) => {
                        report_fetch_success(&shared, &capture, &resolved, started).await;
                        Ok(resolved)
                    }
                    Err(err) => {
                        report_fetch_failure(&shared, &capture, &err, started);
                        Err(err)
                    }
                }
            })
        },
    );
    Reflect::set(
        &window,
        &JsValue::from_str("fetch"),
        wrapper.as_ref().unchecked_ref(),
    )?;
    wrapper.forget();
    Ok(())
}

fn capture_request(input: &JsValue, init: &JsValue) -> RequestCapture {
    let (url, mut method) = if let Some(request) = input.dyn_ref::<web_sys::Request>() {
        (request.url(), request.method())
    } else {
        (input.as_string().unwrap_or_default(), String::new())
    };
    let mut headers = std::collections::BTreeMap::new();
    let mut body = None;
    if init.is_object() {
        if let Ok(m) = Reflect::get(init, &JsValue::from_str("method"))
            && let Some(m) = m.as_string()
        {
            method = m;
        }
        if let Ok(h) = Reflect::get(init, &JsValue::from_str("headers")) {
            headers = capture_headers(&h);
        }
        if let Ok(b) = Reflect::get(init, &JsValue::from_str("body")) {
            body = capture_body(&b);
        }
    }
    RequestCapture {
        url,
        method,
        headers,
        body,
    }
}

fn capture_headers(value: &JsValue) -> std::collections::BTreeMap<String, String> {
    let mut headers = std::collections::BTreeMap::new();
    if let Some(h) = value.dyn_ref::<web_sys::Headers>() {
        for entry in js_sys::try_iter(h).ok().flatten().into_iter().flatten() {
            if let Ok(pair) = entry
                && let Ok(pair) = pair.dyn_into::<js_sys::Array>()
                && let (Some(k), Some(v)) = (pair.get(0).as_string(), pair.get(1).as_string())
            {
                headers.insert(k, v);
            }
        }
        return headers;
    }
    if let Some(object) = value.dyn_ref::<Object>() {
        for key in Object::keys(object).iter() {
            if let Some(name) = key.as_string()
                && let Ok(v) = Reflect::get(value, &key)
                && let Some(v) = v.as_string()
            {
                headers.insert(name, v);
            }
        }
    }
    headers
}

fn capture_body(value: &JsValue) -> Option<RequestBody> {
    if value.is_undefined() || value.is_null() {
        return None;
    }
    if let Some(text) = value.as_string() {
        return Some(RequestBody::Text(text));
    }
    if let Some(form) = value.dyn_ref::<web_sys::FormData>() {
        return Some(RequestBody::FormPairs(entry_pairs(&form.entries())));
    }
    if let Some(params) = value.dyn_ref::<web_sys::UrlSearchParams>() {
        return Some(RequestBody::UrlEncoded(entry_pairs(&params.entries())));
    }
    Some(RequestBody::Unserializable)
}

fn entry_pairs(entries: &js_sys::Iterator) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for entry in js_sys::try_iter(entries).ok().flatten().into_iter().flatten() {
        if let Ok(pair) = entry
            && let Ok(pair) = pair.dyn_into::<js_sys::Array>()
            && let Some(k) = pair.get(0).as_string()
        {
            let v = pair
                .get(1)
                .as_string()
                .unwrap_or_else(|| "[object]".to_owned());
            pairs.push((k, v));
        }
    }
    pairs
}

async fn report_fetch_success(
    shared: &Shared,
    capture: &RequestCapture,
    resolved: &JsValue,
    started: u64,
) {
    let Some(response) = resolved.dyn_ref::<web_sys::Response>() else {
        return;
    };
    // Only failed responses get their body captured; reading a clone of a
    // healthy response would race the page's own consumption for nothing.
    let response_body = if response.ok() {
        None
    } else if let Ok(clone) = response.clone()
        && let Ok(text) = clone.text()
    {
        JsFuture::from(text).await.ok().and_then(|v| v.as_string())
    } else {
        None
    };
    let facts = ResponseFacts {
        status: response.status(),
        status_text: response.status_text(),
        response_body,
    };
    with_app(shared, |_, app| {
        let page = current_page(&app.window);
        let origin = app.window.location().origin().unwrap_or_default();
        let message = app.engine.network_success(
            capture,
            &facts,
            now_ms().saturating_sub(started),
            iso_now(),
            origin,
            &page,
        );
        app.channel.post(&message);
    });
}

fn report_fetch_failure(shared: &Shared, capture: &RequestCapture, err: &JsValue, started: u64) {
    let failure = FetchFailure {
        message: Reflect::get(err, &JsValue::from_str("message"))
            .ok()
            .and_then(|v| v.as_string()),
        stack: Reflect::get(err, &JsValue::from_str("stack"))
            .ok()
            .and_then(|v| v.as_string()),
        is_type_error: err.has_type::<js_sys::TypeError>(),
    };
    with_app(shared, |_, app| {
        let page = current_page(&app.window);
        let origin = app.window.location().origin().unwrap_or_default();
        let message = app.engine.network_failure(
            capture,
            &failure,
            now_ms().saturating_sub(started),
            iso_now(),
            origin,
            &page,
        );
        app.channel.post(&message);
    });
}

// ---------------------------------------------------------------------------
// Global listeners
// ---------------------------------------------------------------------------

fn install_global_listeners(shared: &Shared) -> Result<(), JsValue> {
    let (window, document) = {
        let app = shared.borrow();
        (app.window.clone(), app.document.clone())
    };

    // Runtime errors.
    {
        let shared = Rc::clone(shared);
        let cb = Closure::<dyn FnMut(ErrorEvent)>::new(move |event: ErrorEvent| {
            let stack = Reflect::get(&event.error(), &JsValue::from_str("stack"))
                .ok()
                .and_then(|v| v.as_string());
            with_app(&shared, |_, app| {
                let page = current_page(&app.window);
                let fault = RuntimeFault {
                    message: event.message(),
                    filename: event.filename(),
                    lineno: event.lineno(),
                    colno: event.colno(),
                    stack,
                };
                if let Some(message) = app.engine.report_runtime_error(&fault, now_ms(), &page) {
                    app.channel.post(&message);
                }
            });
        });
        window.add_event_listener_with_callback("error", cb.as_ref().unchecked_ref())?;
        cb.forget();
    }

    // Unhandled promise rejections.
    {
        let shared = Rc::clone(shared);
        let cb = Closure::<dyn FnMut(PromiseRejectionEvent)>::new(
            move |event: PromiseRejectionEvent| {
                let reason = event.reason();
                let fallback = reason.as_string();
                let message = Reflect::get(&reason, &JsValue::from_str("message"))
                    .ok()
                    .and_then(|v| v.as_string())
                    .or_else(|| fallback.clone())
                    .unwrap_or_else(|| "Unhandled rejection".to_owned());
                let stack = Reflect::get(&reason, &JsValue::from_str("stack"))
                    .ok()
                    .and_then(|v| v.as_string())
                    .or(fallback);
                with_app(&shared, |_, app| {
                    let page = current_page(&app.window);
                    let fault = RejectionFault { message, stack };
                    if let Some(out) =
                        app.engine.report_unhandled_rejection(&fault, now_ms(), &page)
                    {
                        app.channel.post(&out);
                    }
                });
            },
        );
        window.add_event_listener_with_callback("unhandledrejection", cb.as_ref().unchecked_ref())?;
        cb.forget();
    }

    // Interaction trail: clicks, focus, form submits, all capture-phase so
    // stopPropagation in the app cannot hide them.
    {
        let shared = Rc::clone(shared);
        let cb = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let Some(target) = event.target().and_then(|t| t.dyn_into::<Element>().ok()) else {
                return;
            };
            with_app(&shared, |_, app| {
                let facts = snapshot::element_facts(&target, &app.window);
                let page = current_page(&app.window);
                app.engine.record_click(&facts, now_ms(), &page);
            });
        });
        document.add_event_listener_with_callback_and_bool(
            "click",
            cb.as_ref().unchecked_ref(),
            true,
        )?;
        cb.forget();
    }
    {
        let shared = Rc::clone(shared);
        let cb = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let Some(target) = event.target().and_then(|t| t.dyn_into::<Element>().ok()) else {
                return;
            };
            with_app(&shared, |_, app| {
                let facts = snapshot::element_facts(&target, &app.window);
                let page = current_page(&app.window);
                app.engine.record_focus(&facts, now_ms(), &page);
            });
        });
        document.add_event_listener_with_callback_and_bool(
            "focusin",
            cb.as_ref().unchecked_ref(),
            true,
        )?;
        cb.forget();
    }
    {
        let shared = Rc::clone(shared);
        let cb = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let Some(form) = event
                .target()
                .and_then(|t| t.dyn_into::<web_sys::HtmlFormElement>().ok())
            else {
                return;
            };
            with_app(&shared, |_, app| {
                let facts = snapshot::form_facts(&form);
                let page = current_page(&app.window);
                app.engine.record_form_submit(&facts, now_ms(), &page);
            });
        });
        document.add_event_listener_with_callback_and_bool(
            "submit",
            cb.as_ref().unchecked_ref(),
            true,
        )?;
        cb.forget();
    }

    // Keydown: reserved-combo forwarding plus the picker's own bindings.
    {
        let shared = Rc::clone(shared);
        let cb = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            let raw = raw_key_event(&event);
            with_app(&shared, |shared, app| {
                let outcome = app.engine.keydown(&raw, now_ms());
                if outcome.prevent_default {
                    event.prevent_default();
                }
                if let Some(message) = outcome.message {
                    app.channel.post(&message);
                }
                let effects = app
                    .engine
                    .handle_picker_input(PickerInput::KeyDown { event: raw.clone() }, now_ms());
                run_effects(shared, app, effects, Some(event.as_ref()));
            });
        });
        window.add_event_listener_with_callback("keydown", cb.as_ref().unchecked_ref())?;
        cb.forget();
    }

    // popstate schedules a navigation check after the router settles.
    {
        let shared = Rc::clone(shared);
        let cb = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
            with_app(&shared, |_, app| {
                app.engine.note_popstate(now_ms());
            });
        });
        window.add_event_listener_with_callback("popstate", cb.as_ref().unchecked_ref())?;
        cb.forget();
    }

    // Parent-frame commands.
    {
        let shared = Rc::clone(shared);
        let cb = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let Some(data) = json_value(&event.data()) else {
                return;
            };
            let origin = event.origin();
            with_app(&shared, |shared, app| {
                match app.engine.on_message(&origin, &data, now_ms()) {
                    Ok(CommandOutcome::Effects(effects)) => {
                        if app.document.body().is_none() {
                            // Document torn down mid-dispatch: deactivate
                            // instead of touching a dead tree.
                            let effects = app.engine.on_dispatch_failure();
                            run_effects(shared, app, effects, None);
                            return;
                        }
                        run_effects(shared, app, effects, None);
                    }
                    Ok(CommandOutcome::NeedsComponentTree) => {
                        if let Some(root) = app.root_element() {
                            let node = snapshot::raw_node(&root);
                            let message = app.engine.component_tree(&node);
                            app.channel.post(&message);
                        }
                    }
                    Ok(CommandOutcome::HardRefresh { cache_buster }) => {
                        hard_refresh(&app.window, cache_buster);
                    }
                    Err(_) => {}
                }
            });
        });
        window.add_event_listener_with_callback("message", cb.as_ref().unchecked_ref())?;
        cb.forget();
    }

    Ok(())
}

fn raw_key_event(event: &KeyboardEvent) -> RawKeyEvent {
    RawKeyEvent {
        key: event.key(),
        code: event.code(),
        meta_key: event.meta_key(),
        ctrl_key: event.ctrl_key(),
        alt_key: event.alt_key(),
        shift_key: event.shift_key(),
    }
}

/// Structured clone of a message payload into `serde_json::Value`, via the
/// page's own JSON. Non-object data (strings, MessagePorts) is dropped.
fn json_value(data: &JsValue) -> Option<serde_json::Value> {
    if !data.is_object() {
        return None;
    }
    let text = js_sys::JSON::stringify(data).ok()?;
    serde_json::from_str(&String::from(text)).ok()
}

// ---------------------------------------------------------------------------
// Picker listeners
// ---------------------------------------------------------------------------

/// The closures attached while picking is active. Dropping this detaches
/// nothing on its own; `detach` must run first so the DOM side is released.
struct PickerListeners {
    mouseover: Closure<dyn FnMut(MouseEvent)>,
    mouseout: Closure<dyn FnMut(MouseEvent)>,
    mousemove: Closure<dyn FnMut(MouseEvent)>,
    scroll: Closure<dyn FnMut(Event)>,
    click: Closure<dyn FnMut(MouseEvent)>,
    dblclick: Closure<dyn FnMut(MouseEvent)>,
}

fn attach_picker_listeners(shared: &Shared, app: &mut App) {
    if app.picker_listeners.is_some() {
        return;
    }

    let mouseover = {
        let shared = Rc::clone(shared);
        Closure::<dyn FnMut(MouseEvent)>::new(move |event: MouseEvent| {
            on_picker_event(&shared, &event.clone().into(), |app, target| {
                let facts = snapshot::element_facts(&target, &app.window);
                PickerInput::MouseOver { target: facts }
            });
        })
    };
    let mouseout = {
        let shared = Rc::clone(shared);
        Closure::<dyn FnMut(MouseEvent)>::new(move |_event: MouseEvent| {
            with_app(&shared, |shared, app| {
                let effects = app
                    .engine
                    .handle_picker_input(PickerInput::MouseOut, now_ms());
                run_effects(shared, app, effects, None);
            });
        })
    };
    let mousemove = {
        let shared = Rc::clone(shared);
        Closure::<dyn FnMut(MouseEvent)>::new(move |event: MouseEvent| {
            with_app(&shared, |shared, app| {
                let effects = app.engine.handle_picker_input(
                    PickerInput::MouseMove {
                        x: f64::from(event.client_x()),
                        y: f64::from(event.client_y()),
                    },
                    now_ms(),
                );
                run_effects(shared, app, effects, None);
            });
        })
    };
    let scroll = {
        let shared = Rc::clone(shared);
        Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
            with_app(&shared, |shared, app| {
                let effects = app.engine.handle_picker_input(PickerInput::Scroll, now_ms());
                run_effects(shared, app, effects, None);
            });
        })
    };
    let click = {
        let shared = Rc::clone(shared);
        Closure::<dyn FnMut(MouseEvent)>::new(move |event: MouseEvent| {
            let meta_key = event.meta_key();
            let ctrl_key = event.ctrl_key();
            on_picker_event(&shared, &event.clone().into(), move |app, target| {
                PickerInput::Click {
                    target: snapshot::element_facts(&target, &app.window),
                    hovered_node: app.hovered_node(),
                    meta_key,
                    ctrl_key,
                }
            });
        })
    };
    let dblclick = {
        let shared = Rc::clone(shared);
        Closure::<dyn FnMut(MouseEvent)>::new(move |event: MouseEvent| {
            on_picker_event(&shared, &event.clone().into(), |app, target| {
                PickerInput::DoubleClick {
                    target: snapshot::element_facts(&target, &app.window),
                    node: snapshot::raw_node(&target),
                }
            });
        })
    };

    let listeners = PickerListeners {
        mouseover,
        mouseout,
        mousemove,
        scroll,
        click,
        dblclick,
    };
    let pairs: [(&str, &JsValue); 6] = [
        ("mouseover", listeners.mouseover.as_ref()),
        ("mouseout", listeners.mouseout.as_ref()),
        ("mousemove", listeners.mousemove.as_ref()),
        ("scroll", listeners.scroll.as_ref()),
        ("click", listeners.click.as_ref()),
        ("dblclick", listeners.dblclick.as_ref()),
    ];
    for (name, cb) in pairs {
        let _ = app
            .document
            .add_event_listener_with_callback_and_bool(name, cb.unchecked_ref(), true);
    }
    app.picker_listeners = Some(listeners);
}

fn detach_picker_listeners(app: &mut App) {
    let Some(listeners) = app.picker_listeners.take() else {
        return;
    };
    let pairs: [(&str, &JsValue); 6] = [
        ("mouseover", listeners.mouseover.as_ref()),
        ("mouseout", listeners.mouseout.as_ref()),
        ("mousemove", listeners.mousemove.as_ref()),
        ("scroll", listeners.scroll.as_ref()),
        ("click", listeners.click.as_ref()),
        ("dblclick", listeners.dblclick.as_ref()),
    ];
    for (name, cb) in pairs {
        let _ = app
            .document
            .remove_event_listener_with_callback_and_bool(name, cb.unchecked_ref(), true);
    }
}

fn on_picker_event(
    shared: &Shared,
    event: &Event,
    to_input: impl FnOnce(&App, Element) -> PickerInput,
) {
    let Some(target) = event.target().and_then(|t| t.dyn_into::<Element>().ok()) else {
        return;
    };
    with_app(shared, |shared, app| {
        let input = to_input(app, target);
        let effects = app.engine.handle_picker_input(input, now_ms());
        run_effects(shared, app, effects, Some(event));
    });
}

// ---------------------------------------------------------------------------
// Mutation observers
// ---------------------------------------------------------------------------

fn install_observers(shared: &Shared) -> Result<(), JsValue> {
    let document = shared.borrow().document.clone();

    // Dev-server overlay: scrape new <vite-error-overlay> elements once
    // their shadow root has rendered.
    {
        let shared = Rc::clone(shared);
        let cb = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |records: js_sys::Array, _observer: MutationObserver| {
                for record in records.iter() {
                    let Ok(record) = record.dyn_into::<web_sys::MutationRecord>() else {
                        continue;
                    };
                    let added = record.added_nodes();
                    for i in 0..added.length() {
                        let Some(element) =
                            added.get(i).and_then(|n| n.dyn_into::<Element>().ok())
                        else {
                            continue;
                        };
                        if element.tag_name().eq_ignore_ascii_case("vite-error-overlay") {
                            schedule_overlay_scrape(&shared, element);
                        }
                    }
                }
            },
        );
        let observer = MutationObserver::new(cb.as_ref().unchecked_ref())?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        if let Some(root) = document.document_element() {
            observer.observe_with_options(&root, &init)?;
        }
        cb.forget();
    }

    // SPA navigation: DOM churn under the app root and URL changes.
    {
        let shared = Rc::clone(shared);
        let cb = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |_records: js_sys::Array, _observer: MutationObserver| {
                with_app(&shared, |_, app| {
                    app.engine.note_root_mutation(now_ms());
                    if let Ok(href) = app.window.location().href()
                        && let Some(message) = app.engine.observe_url(&href)
                    {
                        app.channel.post(&message);
                    }
                });
            },
        );
        let observer = MutationObserver::new(cb.as_ref().unchecked_ref())?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        let target = shared
            .borrow()
            .root_element()
            .or_else(|| document.body().map(Into::into));
        if let Some(target) = target {
            observer.observe_with_options(&target, &init)?;
        }
        cb.forget();
    }

    // One-shot: once the app root has rendered children, give any pending
    // hot update a beat to settle, then ask the parent to replay state.
    {
        let shared = Rc::clone(shared);
        let cb = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |_records: js_sys::Array, observer: MutationObserver| {
                let rendered = shared
                    .try_borrow()
                    .ok()
                    .and_then(|app| app.root_element())
                    .is_some_and(|root| root.child_element_count() > 0);
                if !rendered {
                    return;
                }
                observer.disconnect();
                let shared = Rc::clone(&shared);
                schedule_timeout(HOT_UPDATE_SETTLE_POLL_MS, move || {
                    with_app(&shared, |_, app| {
                        for message in app.engine.on_root_rendered() {
                            app.channel.post(&message);
                        }
                    });
                });
            },
        );
        let observer = MutationObserver::new(cb.as_ref().unchecked_ref())?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        let target = shared.borrow().root_element();
        if let Some(target) = target {
            if target.child_element_count() > 0 {
                // Already rendered before we got here.
                let shared = Rc::clone(shared);
                schedule_timeout(HOT_UPDATE_SETTLE_POLL_MS, move || {
                    with_app(&shared, |_, app| {
                        for message in app.engine.on_root_rendered() {
                            app.channel.post(&message);
                        }
                    });
                });
            } else {
                observer.observe_with_options(&target, &init)?;
            }
        }
        cb.forget();
    }

    Ok(())
}

fn schedule_overlay_scrape(shared: &Shared, overlay: Element) {
    let shared = Rc::clone(shared);
    // The overlay populates its shadow root after insertion; scrape on the
    // next frame.
    let cb = Closure::once(move |_timestamp: f64| {
        with_app(&shared, |_, app| {
            let page = current_page(&app.window);
            let message = match overlay.shadow_root() {
                Some(shadow) => {
                    let snap = snapshot::overlay_snapshot(&shadow);
                    app.engine.report_overlay(&snap, now_ms(), &page)
                }
                None => {
                    let raw = overlay.text_content().unwrap_or_default();
                    app.engine.report_overlay_fallback(&raw, now_ms(), &page)
                }
            };
            app.channel.post(&message);
        });
    });
    let window = web_sys::window();
    if let Some(window) = window {
        let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
    }
    cb.forget();
}

fn schedule_timeout(delay_ms: u64, f: impl FnOnce() + 'static) {
    let cb = Closure::once(f);
    if let Some(window) = web_sys::window() {
        let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(
            cb.as_ref().unchecked_ref(),
            delay_ms as i32,
        );
    }
    cb.forget();
}

// ---------------------------------------------------------------------------
// Timer loop
// ---------------------------------------------------------------------------

fn install_timer_loop(shared: &Shared) -> Result<(), JsValue> {
    let window = shared.borrow().window.clone();
    let shared = Rc::clone(shared);
    let cb = Closure::<dyn FnMut()>::new(move || {
        with_app(&shared, |shared, app| {
            let now = now_ms();
            let effects = app.engine.poll_picker(now);
            run_effects(shared, app, effects, None);

            if let Some(trigger) = app.engine.poll_navigation(now) {
                let page = current_page(&app.window);
                let document = app.document.clone();
                let view = app
                    .engine
                    .detect_view(now, || snapshot::document_snapshot(&document));
                let probe = NavigationProbe {
                    path: page.path.clone(),
                    view,
                    title: app.document.title(),
                };
                app.engine.apply_navigation(&probe, trigger, now, &page);
            }

            if let Ok(href) = app.window.location().href()
                && let Some(message) = app.engine.observe_url(&href)
            {
                app.channel.post(&message);
            }
        });
    });
    window.set_interval_with_callback_and_timeout_and_arguments_0(
        cb.as_ref().unchecked_ref(),
        TIMER_POLL_MS as i32,
    )?;
    cb.forget();
    Ok(())
}

// ---------------------------------------------------------------------------
// Hard refresh
// ---------------------------------------------------------------------------

/// Clear caches, service workers and session storage, then reload with a
/// cache-busting query parameter. Every step is best effort; the reload
/// happens regardless.
fn hard_refresh(window: &Window, cache_buster: String) {
    let window = window.clone();
    wasm_bindgen_futures::spawn_local(async move {
        if let Ok(caches) = window.caches()
            && let Ok(keys) = JsFuture::from(caches.keys()).await
            && let Ok(keys) = keys.dyn_into::<js_sys::Array>()
        {
            for key in keys.iter() {
                if let Some(name) = key.as_string() {
                    let _ = JsFuture::from(caches.delete(&name)).await;
                }
            }
        }
        if let Ok(registrations) =
            JsFuture::from(window.navigator().service_worker().get_registrations()).await
            && let Ok(registrations) = registrations.dyn_into::<js_sys::Array>()
        {
            for registration in registrations.iter() {
                if let Ok(registration) =
                    registration.dyn_into::<web_sys::ServiceWorkerRegistration>()
                    && let Ok(pending) = registration.unregister()
                {
                    let _ = JsFuture::from(pending).await;
                }
            }
        }
        if let Ok(Some(storage)) = window.session_storage() {
            let _ = storage.clear();
        }

        let location = window.location();
        let href = location.href().unwrap_or_default();
        if location
            .replace(&hard_refresh_url(&href, &cache_buster))
            .is_err()
        {
            let _ = location.reload();
        }
    });
}
