#![forbid(unsafe_code)]

//! Cycle-safe, depth- and size-bounded value serializer.
//!
//! Turns a [`Reflected`] runtime value into a [`SerializedNode`] tree that is
//! guaranteed to be finite, JSON-representable, and bounded:
//!
//! - recursion stops at [`SerializeOptions::max_depth`] path segments with an
//!   explicit `MaxDepthReached` marker,
//! - strings/arrays/sets/maps/objects beyond their caps are truncated with
//!   markers stating how much was omitted,
//! - a back-reference to an already-visited object becomes a
//!   [`SerializedNode::Circular`] marker naming the first path at which that
//!   object was seen,
//! - a property whose reflection threw is replaced inline; the walk never
//!   aborts because one property is hostile.
//!
//! The serializer is a pure function: fresh output per call, no shared state.

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::value::{ObjectId, ObjectKind, Reflected};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Bounds applied during serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Maximum number of `.`-separated path segments before truncation.
    pub max_depth: usize,
    /// Maximum string length kept verbatim.
    pub max_string_length: usize,
    /// Maximum array/set elements serialized.
    pub max_array_length: usize,
    /// Maximum object properties / map entries serialized.
    pub max_object_keys: usize,
    /// Whether host-reflected symbol properties are kept.
    pub include_symbols: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_string_length: 10_000,
            max_array_length: 100,
            max_object_keys: 100,
            include_symbols: true,
        }
    }
}

impl SerializeOptions {
    /// Options used for console argument serialization (shallower walk).
    #[must_use]
    pub fn console() -> Self {
        Self {
            max_depth: 5,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Output tree
// ---------------------------------------------------------------------------

/// One node of the serialized tree.
///
/// Wire shape (via serde):
/// - primitives serialize as themselves,
/// - [`Self::Typed`] as `{"_type": kind, "value": …}`,
/// - [`Self::Circular`] as `{"message": "[Circular Reference to <path>]"}`,
/// - [`Self::Seq`] as an array, [`Self::Map`] as an object in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum SerializedNode {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    /// Wrapper preserving a runtime kind plain JSON cannot express.
    Typed {
        kind: String,
        value: Box<SerializedNode>,
    },
    /// Back-reference to an already-serialized object.
    Circular { path: String },
    Seq(Vec<SerializedNode>),
    /// Key/value pairs in insertion order.
    Map(Vec<(String, SerializedNode)>),
}

impl SerializedNode {
    fn typed(kind: &str, value: SerializedNode) -> Self {
        Self::Typed {
            kind: kind.to_owned(),
            value: Box::new(value),
        }
    }

    fn typed_str(kind: &str, value: impl Into<String>) -> Self {
        Self::typed(kind, Self::Str(value.into()))
    }

    /// String form used when console arguments are joined into one message:
    /// strings render verbatim, everything else as pretty-printed JSON.
    #[must_use]
    pub fn display_string(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            other => serde_json::to_string_pretty(other)
                .unwrap_or_else(|_| "[unserializable]".to_owned()),
        }
    }

    /// Compact JSON form (map keys, debug dumps).
    #[must_use]
    pub fn json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[unserializable]".to_owned())
    }
}

impl Serialize for SerializedNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Num(n) => serializer.serialize_f64(*n),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Typed { kind, value } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("_type", kind)?;
                map.serialize_entry("value", value)?;
                map.end()
            }
            Self::Circular { path } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("message", &format!("[Circular Reference to {path}]"))?;
                map.end()
            }
            Self::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

/// Serialize a reflected value under the given bounds.
#[must_use]
pub fn serialize(value: &Reflected, options: &SerializeOptions) -> SerializedNode {
    let mut visited: HashMap<ObjectId, String> = HashMap::new();
    walk(value, options, &mut visited, "root")
}

fn depth_of(path: &str) -> usize {
    path.split('.').count()
}

fn walk(
    value: &Reflected,
    opts: &SerializeOptions,
    visited: &mut HashMap<ObjectId, String>,
    path: &str,
) -> SerializedNode {
    if depth_of(path) > opts.max_depth {
        return SerializedNode::typed_str(
            "MaxDepthReached",
            format!("[Max depth of {} reached]", opts.max_depth),
        );
    }

    match value {
        Reflected::Undefined => SerializedNode::typed_str("undefined", "undefined"),
        Reflected::Null => SerializedNode::Null,
        Reflected::Bool(b) => SerializedNode::Bool(*b),
        Reflected::Str(s) => {
            if s.chars().count() > opts.max_string_length {
                let kept: String = s.chars().take(opts.max_string_length).collect();
                let omitted = s.chars().count() - opts.max_string_length;
                SerializedNode::typed_str(
                    "String",
                    format!("{kept}... [{omitted} more characters]"),
                )
            } else {
                SerializedNode::Str(s.clone())
            }
        }
        Reflected::Number(n) => {
            if n.is_nan() {
                SerializedNode::typed_str("Number", "NaN")
            } else if n.is_finite() {
                SerializedNode::Num(*n)
            } else if *n > 0.0 {
                SerializedNode::typed_str("Number", "Infinity")
            } else {
                SerializedNode::typed_str("Number", "-Infinity")
            }
        }
        Reflected::BigInt(s) => SerializedNode::typed_str("BigInt", s.clone()),
        Reflected::Symbol(s) => SerializedNode::typed_str("Symbol", s.clone()),
        Reflected::Function { name, source } => {
            let name = if name.is_empty() { "anonymous" } else { name };
            let source: String = source.chars().take(opts.max_string_length).collect();
            SerializedNode::typed(
                "Function",
                SerializedNode::Map(vec![
                    ("name".to_owned(), SerializedNode::Str(name.to_owned())),
                    ("stringValue".to_owned(), SerializedNode::Str(source)),
                ]),
            )
        }
        Reflected::Pruned => SerializedNode::typed_str(
            "MaxDepthReached",
            format!("[Max depth of {} reached]", opts.max_depth),
        ),
        Reflected::PropertyError(msg) => {
            SerializedNode::typed_str("Error", format!("[Unable to serialize: {msg}]"))
        }
        Reflected::Cycle(id) => {
            let target = visited
                .get(id)
                .cloned()
                .unwrap_or_else(|| "(truncated)".to_owned());
            SerializedNode::Circular { path: target }
        }
        Reflected::Object { id, kind } => {
            if let Some(first) = visited.get(id) {
                return SerializedNode::Circular {
                    path: first.clone(),
                };
            }
            visited.insert(*id, path.to_owned());
            walk_object(kind, opts, visited, path)
        }
    }
}

fn walk_object(
    kind: &ObjectKind,
    opts: &SerializeOptions,
    visited: &mut HashMap<ObjectId, String>,
    path: &str,
) -> SerializedNode {
    match kind {
        ObjectKind::Error {
            name,
            message,
            stack,
            props,
        } => {
            let mut entries = vec![
                ("name".to_owned(), SerializedNode::Str(name.clone())),
                ("message".to_owned(), SerializedNode::Str(message.clone())),
                (
                    "stack".to_owned(),
                    stack
                        .as_ref()
                        .map_or(SerializedNode::Null, |s| SerializedNode::Str(s.clone())),
                ),
            ];
            for (key, value) in props {
                if entries.iter().any(|(k, _)| k == key) {
                    continue;
                }
                let child = walk(value, opts, visited, &format!("{path}.{key}"));
                entries.push((key.clone(), child));
            }
            SerializedNode::typed("Error", SerializedNode::Map(entries))
        }
        ObjectKind::Date {
            iso,
            epoch_ms,
            local,
        } => SerializedNode::typed(
            "Date",
            SerializedNode::Map(vec![
                ("iso".to_owned(), SerializedNode::Str(iso.clone())),
                ("value".to_owned(), SerializedNode::Num(*epoch_ms)),
                ("local".to_owned(), SerializedNode::Str(local.clone())),
            ]),
        ),
        ObjectKind::Regexp { source, flags } => SerializedNode::typed(
            "RegExp",
            SerializedNode::Map(vec![
                ("source".to_owned(), SerializedNode::Str(source.clone())),
                ("flags".to_owned(), SerializedNode::Str(flags.clone())),
                (
                    "string".to_owned(),
                    SerializedNode::Str(format!("/{source}/{flags}")),
                ),
            ]),
        ),
        ObjectKind::Promise => SerializedNode::typed_str("Promise", "[Promise]"),
        ObjectKind::WeakCollection { name } => {
            SerializedNode::typed_str(name, format!("[{name}]"))
        }
        ObjectKind::Set { values } => {
            let shown: Vec<SerializedNode> = values
                .iter()
                .take(opts.max_array_length)
                .enumerate()
                .map(|(i, v)| walk(v, opts, visited, &format!("{path}.Set[{i}]")))
                .collect();
            let mut entries = vec![("values".to_owned(), SerializedNode::Seq(shown))];
            if values.len() > opts.max_array_length {
                let truncated = values.len() - opts.max_array_length;
                entries.push(("truncated".to_owned(), SerializedNode::Num(truncated as f64)));
            }
            SerializedNode::typed("Set", SerializedNode::Map(entries))
        }
        ObjectKind::Map { entries } => {
            let mut out = Vec::new();
            let mut omitted = 0usize;
            for (key, value) in entries {
                if out.len() >= opts.max_object_keys {
                    omitted += 1;
                    continue;
                }
                let key_str = map_key_string(key, opts, visited, path);
                let child = walk(value, opts, visited, &format!("{path}.Map[{key_str}]"));
                out.push((key_str, child));
            }
            let mut wrapper = vec![("entries".to_owned(), SerializedNode::Map(out))];
            if omitted > 0 {
                wrapper.push(("truncated".to_owned(), SerializedNode::Num(omitted as f64)));
            }
            SerializedNode::typed("Map", SerializedNode::Map(wrapper))
        }
        ObjectKind::TypedArray {
            name,
            len,
            byte_len,
            sample,
        } => SerializedNode::typed(
            name,
            SerializedNode::Map(vec![
                ("length".to_owned(), SerializedNode::Num(*len as f64)),
                ("byteLength".to_owned(), SerializedNode::Num(*byte_len as f64)),
                (
                    "sample".to_owned(),
                    SerializedNode::Seq(sample.iter().map(|n| SerializedNode::Num(*n)).collect()),
                ),
            ]),
        ),
        ObjectKind::Array { items } => {
            let mut out: Vec<SerializedNode> = items
                .iter()
                .take(opts.max_array_length)
                .enumerate()
                .map(|(i, v)| walk(v, opts, visited, &format!("{path}[{i}]")))
                .collect();
            if items.len() > opts.max_array_length {
                let omitted = items.len() - opts.max_array_length;
                out.push(SerializedNode::Str(format!("... {omitted} more items")));
            }
            SerializedNode::Seq(out)
        }
        ObjectKind::Plain { props } => {
            let mut out = Vec::new();
            for (key, value) in props.iter().take(opts.max_object_keys) {
                let child = walk(value, opts, visited, &format!("{path}.{key}"));
                out.push((key.clone(), child));
            }
            if props.len() > opts.max_object_keys {
                let omitted = props.len() - opts.max_object_keys;
                out.push((
                    "...".to_owned(),
                    SerializedNode::Str(format!("{omitted} more properties")),
                ));
            }
            SerializedNode::Map(out)
        }
    }
}

/// Map keys mirror the runtime behavior: strings verbatim, other primitives
/// via their string form, objects via compact JSON of their serialized form.
fn map_key_string(
    key: &Reflected,
    opts: &SerializeOptions,
    visited: &mut HashMap<ObjectId, String>,
    path: &str,
) -> String {
    match key {
        Reflected::Str(s) => s.clone(),
        Reflected::Bool(b) => b.to_string(),
        Reflected::Number(n) => {
            if n.fract() == 0.0 && n.is_finite() {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        Reflected::Null => "null".to_owned(),
        Reflected::Undefined => "undefined".to_owned(),
        Reflected::BigInt(s) | Reflected::Symbol(s) => s.clone(),
        other => walk(other, opts, visited, &format!("{path}.MapKey")).json_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ObjectKind, Reflected};

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn plain(id: u64, props: Vec<(&str, Reflected)>) -> Reflected {
        Reflected::object(
            id,
            ObjectKind::Plain {
                props: props
                    .into_iter()
                    .map(|(k, v)| (k.to_owned(), v))
                    .collect(),
            },
        )
    }

    #[test]
    fn primitives_pass_through() {
        let opts = SerializeOptions::default();
        assert_eq!(serialize(&Reflected::Null, &opts), SerializedNode::Null);
        assert_eq!(
            serialize(&Reflected::Bool(true), &opts),
            SerializedNode::Bool(true)
        );
        assert_eq!(
            serialize(&Reflected::Number(4.5), &opts),
            SerializedNode::Num(4.5)
        );
        assert_eq!(
            serialize(&Reflected::Str("hi".into()), &opts),
            SerializedNode::Str("hi".into())
        );
    }

    #[test]
    fn non_finite_numbers_become_typed_markers() {
        let opts = SerializeOptions::default();
        assert_eq!(
            serialize(&Reflected::Number(f64::NAN), &opts),
            SerializedNode::typed_str("Number", "NaN")
        );
        assert_eq!(
            serialize(&Reflected::Number(f64::INFINITY), &opts),
            SerializedNode::typed_str("Number", "Infinity")
        );
        assert_eq!(
            serialize(&Reflected::Number(f64::NEG_INFINITY), &opts),
            SerializedNode::typed_str("Number", "-Infinity")
        );
    }

    #[test]
    fn undefined_is_a_typed_marker() {
        let node = serialize(&Reflected::Undefined, &SerializeOptions::default());
        assert_eq!(node, SerializedNode::typed_str("undefined", "undefined"));
    }

    #[test]
    fn long_string_truncated_with_suffix() {
        let opts = SerializeOptions {
            max_string_length: 5,
            ..SerializeOptions::default()
        };
        let node = serialize(&Reflected::Str("abcdefghij".into()), &opts);
        assert_eq!(
            node,
            SerializedNode::typed_str("String", "abcde... [5 more characters]")
        );
    }

    #[test]
    fn self_reference_becomes_circular_ref_to_first_path() {
        // { a: { back: <cycle to root> } }
        let inner = plain(2, vec![("back", Reflected::Cycle(crate::value::ObjectId(1)))]);
        let root = plain(1, vec![("a", inner)]);
        let node = serialize(&root, &SerializeOptions::default());
        let SerializedNode::Map(entries) = node else {
            panic!("expected map");
        };
        let SerializedNode::Map(inner_entries) = &entries[0].1 else {
            panic!("expected inner map");
        };
        assert_eq!(
            inner_entries[0].1,
            SerializedNode::Circular {
                path: "root".into()
            }
        );
    }

    #[test]
    fn repeated_sibling_object_is_circular_to_first_occurrence() {
        let shared = plain(7, vec![("x", Reflected::Number(1.0))]);
        let root = plain(
            1,
            vec![
                ("first", shared),
                ("second", Reflected::Cycle(crate::value::ObjectId(7))),
            ],
        );
        let node = serialize(&root, &SerializeOptions::default());
        let SerializedNode::Map(entries) = node else {
            panic!("expected map");
        };
        assert_eq!(
            entries[1].1,
            SerializedNode::Circular {
                path: "root.first".into()
            }
        );
    }

    #[test]
    fn depth_cap_yields_marker_not_recursion() {
        // Nest deeper than max_depth via dotted paths.
        let mut value = Reflected::Number(0.0);
        for i in 0..16 {
            value = plain(100 + i, vec![("n", value)]);
        }
        let opts = SerializeOptions {
            max_depth: 4,
            ..SerializeOptions::default()
        };
        let mut node = serialize(&value, &opts);
        // Walk down to the truncation point.
        for _ in 0..3 {
            let SerializedNode::Map(entries) = node else {
                panic!("expected map");
            };
            node = entries.into_iter().next().map(|(_, v)| v).expect("entry");
        }
        assert_eq!(
            node,
            SerializedNode::typed_str("MaxDepthReached", "[Max depth of 4 reached]")
        );
    }

    #[test]
    fn array_truncation_appends_more_items_marker() {
        let items: Vec<Reflected> = (0..7).map(|i| Reflected::Number(f64::from(i))).collect();
        let arr = Reflected::object(1, ObjectKind::Array { items });
        let opts = SerializeOptions {
            max_array_length: 5,
            ..SerializeOptions::default()
        };
        let SerializedNode::Seq(out) = serialize(&arr, &opts) else {
            panic!("expected seq");
        };
        assert_eq!(out.len(), 6);
        assert_eq!(out[5], SerializedNode::Str("... 2 more items".into()));
    }

    #[test]
    fn object_key_cap_adds_ellipsis_entry() {
        let props: Vec<(String, Reflected)> = (0..6)
            .map(|i| (format!("k{i}"), Reflected::Number(f64::from(i))))
            .collect();
        let obj = Reflected::object(1, ObjectKind::Plain { props });
        let opts = SerializeOptions {
            max_object_keys: 4,
            ..SerializeOptions::default()
        };
        let SerializedNode::Map(entries) = serialize(&obj, &opts) else {
            panic!("expected map");
        };
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[4].0, "...");
        assert_eq!(entries[4].1, SerializedNode::Str("2 more properties".into()));
    }

    #[test]
    fn property_error_is_inlined_and_walk_continues() {
        let obj = plain(
            1,
            vec![
                ("bad", Reflected::PropertyError("getter threw".into())),
                ("good", Reflected::Number(3.0)),
            ],
        );
        let SerializedNode::Map(entries) = serialize(&obj, &SerializeOptions::default()) else {
            panic!("expected map");
        };
        assert_eq!(
            entries[0].1,
            SerializedNode::typed_str("Error", "[Unable to serialize: getter threw]")
        );
        assert_eq!(entries[1].1, SerializedNode::Num(3.0));
    }

    #[test]
    fn shallow_plain_data_is_shape_preserving() {
        let obj = plain(
            1,
            vec![
                ("n", Reflected::Number(1.0)),
                ("s", Reflected::Str("two".into())),
                ("b", Reflected::Bool(false)),
                (
                    "nested",
                    plain(2, vec![("inner", Reflected::Str("deep".into()))]),
                ),
            ],
        );
        let json = serde_json::to_value(serialize(&obj, &SerializeOptions::default()))
            .expect("json");
        assert_eq!(
            json,
            serde_json::json!({
                "n": 1.0,
                "s": "two",
                "b": false,
                "nested": { "inner": "deep" }
            })
        );
    }

    #[test]
    fn wire_shape_of_typed_and_circular_nodes() {
        let typed = SerializedNode::typed_str("Number", "NaN");
        assert_eq!(
            serde_json::to_string(&typed).expect("json"),
            r#"{"_type":"Number","value":"NaN"}"#
        );
        let circ = SerializedNode::Circular {
            path: "root.a".into(),
        };
        assert_eq!(
            serde_json::to_string(&circ).expect("json"),
            r#"{"message":"[Circular Reference to root.a]"}"#
        );
    }

    #[test]
    fn function_marker_carries_name_and_source() {
        let node = serialize(
            &Reflected::Function {
                name: String::new(),
                source: "() => {}".into(),
            },
            &SerializeOptions::default(),
        );
        let SerializedNode::Typed { kind, value } = node else {
            panic!("expected typed");
        };
        assert_eq!(kind, "Function");
        let SerializedNode::Map(entries) = *value else {
            panic!("expected map");
        };
        assert_eq!(entries[0].1, SerializedNode::Str("anonymous".into()));
    }

    fn arb_reflected() -> impl Strategy<Value = Reflected> {
        let leaf = prop_oneof![
            Just(Reflected::Undefined),
            Just(Reflected::Null),
            any::<bool>().prop_map(Reflected::Bool),
            any::<f64>().prop_map(Reflected::Number),
            "[a-z]{0,12}".prop_map(Reflected::Str),
            (0u64..8).prop_map(|id| Reflected::Cycle(crate::value::ObjectId(id))),
        ];
        leaf.prop_recursive(5, 64, 8, |inner| {
            prop_oneof![
                (0u64..8, prop::collection::vec(inner.clone(), 0..6)).prop_map(|(id, items)| {
                    Reflected::object(id, ObjectKind::Array { items })
                }),
                (
                    0u64..8,
                    prop::collection::vec(("[a-z]{1,6}", inner), 0..6)
                )
                    .prop_map(|(id, props)| Reflected::object(id, ObjectKind::Plain { props })),
            ]
        })
    }

    proptest! {
        // Termination + JSON-representability for arbitrary (possibly
        // back-referencing) reflected trees.
        #[test]
        fn serializer_always_terminates_and_emits_json(value in arb_reflected()) {
            let node = serialize(&value, &SerializeOptions::default());
            prop_assert!(serde_json::to_string(&node).is_ok());
        }
    }
}
