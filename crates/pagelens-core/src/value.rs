#![forbid(unsafe_code)]

//! Host-side mirror of arbitrary page runtime values.
//!
//! The engine never touches the browser, so the web glue reflects whatever
//! value it intercepted (a console argument, an error object, a request body)
//! into a [`Reflected`] tree before handing it to the serializer. Reflection
//! is where object *identity* is captured: the host assigns each distinct
//! composite object an [`ObjectId`] and re-encounters of the same object
//! become [`Reflected::Cycle`] back-references instead of infinite subtrees.
//!
//! The serializer (see [`crate::serialize`]) then applies depth, length and
//! key caps and turns back-references into circular-reference markers naming
//! the first path at which the object was seen.

/// Host-assigned identity for a composite runtime object.
///
/// Ids only need to be unique within one reflection pass; the web layer mints
/// them from a per-call counter keyed by a JS identity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// One reflected runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Reflected {
    Undefined,
    Null,
    Bool(bool),
    /// Any numeric value, including non-finite ones; the serializer decides
    /// how NaN/Infinity are represented on the wire.
    Number(f64),
    BigInt(String),
    Symbol(String),
    Str(String),
    Function {
        name: String,
        source: String,
    },
    /// The host already reflected this object earlier in the same pass.
    Cycle(ObjectId),
    /// The host stopped descending (its own depth guard); rendered the same
    /// as the serializer's depth marker.
    Pruned,
    /// Reading this property threw during reflection.
    PropertyError(String),
    /// A composite object with identity.
    Object {
        id: ObjectId,
        kind: Box<ObjectKind>,
    },
}

/// The composite shapes the serializer knows how to render.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Error {
        name: String,
        message: String,
        stack: Option<String>,
        /// Own properties beyond name/message/stack.
        props: Vec<(String, Reflected)>,
    },
    Date {
        iso: String,
        epoch_ms: f64,
        local: String,
    },
    Regexp {
        source: String,
        flags: String,
    },
    Promise,
    /// WeakMap / WeakSet — contents are unobservable by design.
    WeakCollection {
        name: String,
    },
    Set {
        values: Vec<Reflected>,
    },
    Map {
        entries: Vec<(Reflected, Reflected)>,
    },
    TypedArray {
        name: String,
        len: usize,
        byte_len: usize,
        /// First few elements, captured host-side.
        sample: Vec<f64>,
    },
    Array {
        items: Vec<Reflected>,
    },
    Plain {
        /// Own string properties in enumeration order, symbols appended when
        /// the host was asked to include them.
        props: Vec<(String, Reflected)>,
    },
}

impl Reflected {
    /// Convenience constructor for a plain object.
    #[must_use]
    pub fn object(id: u64, kind: ObjectKind) -> Self {
        Self::Object {
            id: ObjectId(id),
            kind: Box::new(kind),
        }
    }

    /// Whether this value carries composite identity.
    #[must_use]
    pub const fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Object { id, .. } => Some(*id),
            _ => None,
        }
    }
}
