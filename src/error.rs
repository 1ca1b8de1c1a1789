//! Categorical error kinds shared across the client family: an outer
//! `eyre::Report` for construction-time failures, and small `thiserror`
//! leaf enums for the recoverable, categorical errors each component
//! reports.

use thiserror::Error;

/// Errors returned by [`crate::json_patch::JsonPatchClient`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("path not found: {0:?}")]
    NotFound(Vec<String>),
    #[error("path already exists: {0:?}")]
    AlreadyExists(Vec<String>),
    #[error("invalid array index {index:?} at {path:?}")]
    InvalidIndex { path: Vec<String>, index: String },
    #[error("value is not valid JSON: {0}")]
    InvalidValue(String),
    #[error("checkpoint file I/O failed: {0}")]
    IoFailure(String),
}

/// Errors returned while resolving a virtual path.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ResolveError {
    #[error("unknown port {0:?}")]
    UnknownPort(String),
    #[error("no namespace mapping for port {0:?}")]
    MissingNamespace(String),
    #[error("required counters sub-map {0:?} absent")]
    MissingCounterMap(String),
    #[error("no translator registered for virtual path {0:?}")]
    NoTranslator(Vec<String>),
}

/// Errors returned by path-syntax parsing helpers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathParseError {
    #[error("path is empty")]
    Empty,
    #[error("malformed keyed attribute {0:?}")]
    MalformedAttribute(String),
    #[error("subscription list mixes origins {0:?} and {1:?}")]
    MixedOrigin(String, String),
    #[error("subscription list mixes targets {0:?} and {1:?}")]
    MixedTarget(String, String),
}

/// Errors returned by the ZMQ-backed write path.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ZmqError {
    #[error("connection break: {0}")]
    ConnectionBreak(String),
    #[error("producer error: {0}")]
    Producer(String),
}

impl ZmqError {
    /// Whether this error belongs to the "connection break" family that the
    /// retry helper is allowed to recover from.
    #[must_use]
    pub fn is_connection_break(&self) -> bool {
        matches!(self, ZmqError::ConnectionBreak(_))
    }
}

/// Errors surfaced synchronously to the caller of
/// [`crate::client::Client::set`].
#[derive(Debug, Error)]
pub enum SetError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Zmq(#[from] ZmqError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("bulk patch rejected: {0}")]
    BulkPatch(String),
}

/// Errors returned directly from [`crate::client::Client::get`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
}
