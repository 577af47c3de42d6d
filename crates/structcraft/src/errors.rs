//! Error types for type resolution, loading, and committing nodes.

use std::io;

use thiserror::Error;

use crate::node::NodeId;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while resolving, loading, mutating or writing back nodes.
#[derive(Debug, Error)]
pub enum Error {
    /// A descriptor could not be resolved to a concrete type.
    #[error("cannot resolve field `{field}`: {reason}")]
    Resolution { field: String, reason: String },

    /// The source ran out before the node's required bytes were consumed.
    ///
    /// The partially initialized node is kept in its tree and can be
    /// inspected through `node`.
    #[error(
        "truncated read of `{path}` at offset {offset:#x}: {shortfall} of {expected} bytes missing"
    )]
    TruncatedRead {
        node: NodeId,
        path: String,
        offset: u64,
        expected: u64,
        shortfall: u64,
    },

    /// A constructor received a negative or otherwise unusable argument.
    #[error("invalid argument to {constructor}: {reason}")]
    InvalidArgument {
        constructor: &'static str,
        reason: String,
    },

    /// Writing a node back to its source failed.
    #[error("failed to commit `{path}` at offset {offset:#x}")]
    Commit {
        node: NodeId,
        path: String,
        offset: u64,
        #[source]
        source: SourceError,
    },

    /// An internal consistency check failed. Indicates a defect, never data.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The node has never been loaded, so it has no value to work with.
    #[error("`{path}` is uninitialized")]
    Uninitialized { path: String },

    /// A field lookup by name found nothing.
    #[error("no field named `{name}` in `{path}`")]
    UnknownField { path: String, name: String },

    /// None of a container's children covers the requested offset.
    #[error("offset {offset:#x} is not within any child of `{path}`")]
    OffsetNotFound { path: String, offset: u64 },

    /// The operation does not apply to this kind of node.
    #[error("`{path}` is not {expected}")]
    KindMismatch { path: String, expected: &'static str },
}

impl Error {
    pub(crate) fn invalid(constructor: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            constructor,
            reason: reason.into(),
        }
    }

    pub(crate) fn resolution(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Resolution {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for truncation, which arrays downgrade to a soft stop.
    pub fn is_truncation(&self) -> bool {
        matches!(self, Error::TruncatedRead { .. })
    }
}

/// Errors reported by a [crate::source::Source] when storing bytes.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The medium does not accept writes.
    #[error("source is read-only")]
    ReadOnly,
    /// The write would land outside a fixed-size buffer.
    #[error("write of {len} bytes at offset {offset:#x} exceeds capacity {capacity:#x}")]
    OutOfBounds { offset: u64, len: usize, capacity: u64 },
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}
