//! The wire-shaped data model: `Path`, `TypedValue`, `Update`,
//! `Notification`, and the `Value` enum pushed onto the [`crate::queue`].
//!
//! `Path`/`TypedValue`/`Update`/`Notification` double as the protobuf
//! message shapes the real gNMI wire format uses (`prefix`/`update`/
//! `delete`/`timestamp` on a `Notification`, a scalar oneof on a
//! `TypedValue`). Deriving `prost::Message` on them costs nothing at the
//! type-definition level and gives [`Value::encoded_len`] a real
//! protobuf-accurate byte count instead of an ad hoc estimate, so the
//! bounded queue can size by the protobuf-serialized size of the
//! Notification if present, otherwise of the TypedValue.

use std::collections::BTreeMap;

use prost::Message;

/// One element of a [`Path`], e.g. `Ethernet0` in `[k=v]` form carries keyed
/// attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Message)]
pub struct PathElem {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(map = "string, string", tag = "2")]
    pub key: BTreeMap<String, String>,
}

impl PathElem {
    #[must_use]
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: BTreeMap::new(),
        }
    }

    /// True if this element's name ends in `*`, i.e. it is a virtual-path
    /// wildcard key.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.name.ends_with('*')
    }

    /// The wildcard's literal prefix, e.g. `Ethernet` for `Ethernet*`.
    #[must_use]
    pub fn wildcard_prefix(&self) -> &str {
        self.name.strip_suffix('*').unwrap_or(&self.name)
    }
}

/// An ordered sequence of path elements with an optional origin/target.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Message)]
pub struct Path {
    #[prost(string, optional, tag = "1")]
    pub origin: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub target: Option<String>,
    #[prost(message, repeated, tag = "3")]
    pub elem: Vec<PathElem>,
}

impl Path {
    #[must_use]
    pub fn new(elems: impl IntoIterator<Item = PathElem>) -> Self {
        Self {
            origin: None,
            target: None,
            elem: elems.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn with_origin_target(
        mut self,
        origin: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.origin = Some(origin.into());
        self.target = Some(target.into());
        self
    }

    /// Plain dotted/slashed rendering used for log messages and cache keys;
    /// not meant to round-trip through [`crate::path::parse_path_str`].
    #[must_use]
    pub fn display_elems(&self) -> String {
        self.elem
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// A scalar leaf value.
#[derive(Clone, Debug, PartialEq, prost::Oneof)]
pub enum TypedValue {
    #[prost(string, tag = "2")]
    StringVal(String),
    #[prost(int64, tag = "3")]
    IntVal(i64),
    #[prost(uint64, tag = "4")]
    UintVal(u64),
    #[prost(bool, tag = "5")]
    BoolVal(bool),
    #[prost(bytes, tag = "6")]
    BytesVal(Vec<u8>),
    #[prost(float, tag = "7")]
    FloatVal(f32),
    /// JSON-encoded leaf.
    #[prost(string, tag = "8")]
    JsonVal(String),
}

impl TypedValue {
    /// Builds a `JsonVal` from a [`serde_json::Value`], the representation
    /// used for the JSON and JSON-IETF encodings.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        TypedValue::JsonVal(value.to_string())
    }
}

#[derive(Clone, PartialEq, Message)]
struct TypedValueEnvelope {
    #[prost(oneof = "TypedValue", tags = "2,3,4,5,6,7,8")]
    value: Option<TypedValue>,
}

/// One leaf update within a [`Notification`].
#[derive(Clone, Debug, PartialEq, Message)]
pub struct Update {
    #[prost(message, optional, tag = "1")]
    pub path: Option<Path>,
    #[prost(oneof = "TypedValue", tags = "2,3,4,5,6,7,8")]
    pub value: Option<TypedValue>,
}

impl Update {
    #[must_use]
    pub fn new(path: Path, value: TypedValue) -> Self {
        Self {
            path: Some(path),
            value: Some(value),
        }
    }
}

/// A prefix path plus the updates, deletes, and timestamp reported for it.
/// Timestamps are nanoseconds since epoch throughout.
#[derive(Clone, Debug, Default, PartialEq, Message)]
pub struct Notification {
    #[prost(message, optional, tag = "1")]
    pub prefix: Option<Path>,
    #[prost(message, repeated, tag = "2")]
    pub update: Vec<Update>,
    #[prost(message, repeated, tag = "3")]
    pub delete: Vec<Path>,
    #[prost(int64, tag = "4")]
    pub timestamp: i64,
}

impl Notification {
    #[must_use]
    pub fn new(prefix: Path, timestamp_ns: i64) -> Self {
        Self {
            prefix: Some(prefix),
            update: Vec::new(),
            delete: Vec::new(),
            timestamp: timestamp_ns,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.update.is_empty() && self.delete.is_empty()
    }
}

/// The item type stored in the [`crate::queue::BoundedQueue`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A streamed update, the common case.
    Notification(Notification),
    /// A bare scalar response, used by `Get`/`ONCE` single-leaf replies.
    Scalar {
        path: Path,
        value: TypedValue,
        timestamp: i64,
    },
    /// Marks the end of the initial sync for a (streaming) subscription.
    SyncResponse,
    /// A fatal marker; its enqueue tells the (out-of-scope) server to close
    /// the RPC with an internal-error status.
    Fatal(String),
}

impl Value {
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Value::Fatal(message.into())
    }

    /// True for the graceful-end sentinel: an orderly `poll` channel
    /// closure is not an error and should not be confused with a fatal
    /// marker carrying an actual message, so it gets an explicit, named
    /// constructor instead of an ambiguous empty string, while still
    /// recognizing the empty-string shape for interop with call sites that
    /// produce one directly.
    #[must_use]
    pub fn graceful_end() -> Self {
        Value::Fatal(String::new())
    }

    #[must_use]
    pub fn is_graceful_end(&self) -> bool {
        matches!(self, Value::Fatal(msg) if msg.is_empty())
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Value::Fatal(msg) if !msg.is_empty())
    }

    /// The protobuf-accurate byte size used by the bounded queue: always
    /// equal to the wire-encoded size of this value, so
    /// `bytes_after - bytes_before == serialized_size(v)` for any enqueue.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Value::Notification(n) => n.encoded_len(),
            Value::Scalar {
                value, ..
            } => TypedValueEnvelope {
                value: Some(value.clone()),
            }
            .encoded_len(),
            Value::SyncResponse => 0,
            Value::Fatal(msg) => msg.len(),
        }
    }
}
