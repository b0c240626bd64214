#![forbid(unsafe_code)]

//! `JsValue` reflection into the engine's host-neutral value tree.
//!
//! Identity is captured here, where the live objects still exist: every
//! composite object gets an id from a per-pass `js_sys::Map` keyed on the
//! object itself, and a re-encounter reflects as [`Reflected::Cycle`]. A
//! depth guard bounds the walk independently of the serializer's own cap so
//! a hostile getter chain cannot stall the page.

use js_sys::{Array, Date, Function, Map, Object, Promise, Reflect, RegExp, Set, Symbol};
use wasm_bindgen::{JsCast, JsValue};

use pagelens_core::value::{ObjectKind, Reflected};

/// Host-side reflection depth guard. Deeper subtrees reflect as
/// [`Reflected::Pruned`].
const MAX_REFLECT_DEPTH: usize = 16;
/// Sample size for typed-array contents.
const TYPED_ARRAY_SAMPLE: usize = 16;

/// Per-pass reflection state: the identity map and the id counter.
pub struct Reflector {
    seen: Map,
    next_id: u64,
}

impl Default for Reflector {
    fn default() -> Self {
        Self::new()
    }
}

impl Reflector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen: Map::new(),
            next_id: 0,
        }
    }

    /// Reflect one value. Never throws; anything unreadable reflects as
    /// [`Reflected::PropertyError`].
    pub fn reflect(&mut self, value: &JsValue) -> Reflected {
        self.reflect_at(value, 0)
    }

    fn reflect_at(&mut self, value: &JsValue, depth: usize) -> Reflected {
        if value.is_undefined() {
            return Reflected::Undefined;
        }
        if value.is_null() {
            return Reflected::Null;
        }
        if let Some(b) = value.as_bool() {
            return Reflected::Bool(b);
        }
        if let Some(n) = value.as_f64() {
            return Reflected::Number(n);
        }
        if let Some(s) = value.as_string() {
            return Reflected::Str(s);
        }
        if let Some(bigint) = value.dyn_ref::<js_sys::BigInt>() {
            let digits = bigint
                .to_string(10)
                .map(String::from)
                .unwrap_or_else(|_| "0".to_owned());
            return Reflected::BigInt(digits);
        }
        if value.is_symbol() {
            let sym: &Symbol = value.unchecked_ref();
            return Reflected::Symbol(String::from(sym.to_string()));
        }
        if value.is_function() {
            let func: &Function = value.unchecked_ref();
            return Reflected::Function {
                name: String::from(func.name()),
                source: String::from(func.to_string()),
            };
        }
        if depth >= MAX_REFLECT_DEPTH {
            return Reflected::Pruned;
        }

        // Composite object: resolve identity first.
        if let Some(id) = self.seen.get(value).as_f64() {
            return Reflected::Cycle(pagelens_core::value::ObjectId(id as u64));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.seen.set(value, &JsValue::from_f64(id as f64));

        let kind = self.reflect_object(value, depth);
        Reflected::object(id, kind)
    }

    fn reflect_object(&mut self, value: &JsValue, depth: usize) -> ObjectKind {
        if let Some(err) = value.dyn_ref::<js_sys::Error>() {
            let stack = Reflect::get(value, &JsValue::from_str("stack"))
                .ok()
                .and_then(|v| v.as_string());
            return ObjectKind::Error {
                name: String::from(err.name()),
                message: String::from(err.message()),
                stack,
                props: self.own_props(value, depth, &["name", "message", "stack"]),
            };
        }
        if let Some(date) = value.dyn_ref::<Date>() {
            return ObjectKind::Date {
                iso: date
                    .to_json()
                    .as_string()
                    .unwrap_or_else(|| "Invalid Date".to_owned()),
                epoch_ms: date.get_time(),
                local: String::from(date.to_string()),
            };
        }
        if let Some(re) = value.dyn_ref::<RegExp>() {
            return ObjectKind::Regexp {
                source: String::from(re.source()),
                flags: String::from(re.flags()),
            };
        }
        if value.dyn_ref::<Promise>().is_some() {
            return ObjectKind::Promise;
        }
        if value.dyn_ref::<js_sys::WeakMap>().is_some() {
            return ObjectKind::WeakCollection {
                name: "WeakMap".to_owned(),
            };
        }
        if value.dyn_ref::<js_sys::WeakSet>().is_some() {
            return ObjectKind::WeakCollection {
                name: "WeakSet".to_owned(),
            };
        }
        if let Some(set) = value.dyn_ref::<Set>() {
            let mut values = Vec::new();
            for entry in js_sys::try_iter(set).ok().flatten().into_iter().flatten() {
                match entry {
                    Ok(v) => values.push(self.reflect_at(&v, depth + 1)),
                    Err(_) => values.push(Reflected::PropertyError("iteration failed".to_owned())),
                }
            }
            return ObjectKind::Set { values };
        }
        if let Some(map) = value.dyn_ref::<Map>() {
            let mut entries = Vec::new();
            for entry in js_sys::try_iter(map).ok().flatten().into_iter().flatten() {
                match entry.ok().and_then(|e| e.dyn_into::<Array>().ok()) {
                    Some(pair) => {
                        let key = self.reflect_at(&pair.get(0), depth + 1);
                        let val = self.reflect_at(&pair.get(1), depth + 1);
                        entries.push((key, val));
                    }
                    None => entries.push((
                        Reflected::PropertyError("iteration failed".to_owned()),
                        Reflected::Undefined,
                    )),
                }
            }
            return ObjectKind::Map { entries };
        }
        if let Some(typed) = typed_array_kind(value) {
            return typed;
        }
        if let Some(array) = value.dyn_ref::<Array>() {
            let items = array
                .iter()
                .map(|item| self.reflect_at(&item, depth + 1))
                .collect();
            return ObjectKind::Array { items };
        }
        ObjectKind::Plain {
            props: self.own_props(value, depth, &[]),
        }
    }

    fn own_props(
        &mut self,
        value: &JsValue,
        depth: usize,
        skip: &[&str],
    ) -> Vec<(String, Reflected)> {
        let Some(object) = value.dyn_ref::<Object>() else {
            return Vec::new();
        };
        let mut props = Vec::new();
        for key in Object::keys(object).iter() {
            let Some(name) = key.as_string() else {
                continue;
            };
            if skip.contains(&name.as_str()) {
                continue;
            }
            let reflected = match Reflect::get(value, &key) {
                Ok(v) => self.reflect_at(&v, depth + 1),
                // A throwing getter is information, not a failure.
                Err(err) => Reflected::PropertyError(stringify(&err)),
            };
            props.push((name, reflected));
        }
        props
    }
}

/// Best-effort string form of an arbitrary value (thrown getter results).
fn stringify(value: &JsValue) -> String {
    value
        .as_string()
        .unwrap_or_else(|| String::from(Object::from(value.clone()).to_string()))
}

fn typed_array_kind(value: &JsValue) -> Option<ObjectKind> {
    macro_rules! try_typed {
        ($ty:ty, $name:literal) => {
            if let Some(arr) = value.dyn_ref::<$ty>() {
                let len = arr.length() as usize;
                let take = len.min(TYPED_ARRAY_SAMPLE) as u32;
                let sample = arr
                    .subarray(0, take)
                    .to_vec()
                    .into_iter()
                    .map(f64::from)
                    .collect();
                return Some(ObjectKind::TypedArray {
                    name: $name.to_owned(),
                    len,
                    byte_len: arr.byte_length() as usize,
                    sample,
                });
            }
        };
    }
    try_typed!(js_sys::Uint8Array, "Uint8Array");
    try_typed!(js_sys::Int8Array, "Int8Array");
    try_typed!(js_sys::Uint16Array, "Uint16Array");
    try_typed!(js_sys::Int16Array, "Int16Array");
    try_typed!(js_sys::Uint32Array, "Uint32Array");
    try_typed!(js_sys::Int32Array, "Int32Array");
    try_typed!(js_sys::Float32Array, "Float32Array");
    try_typed!(js_sys::Float64Array, "Float64Array");
    None
}
