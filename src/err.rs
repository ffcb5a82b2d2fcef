//! Declare error types for dircache.

use thiserror::Error;

/// An error returned by the directory cache pipeline.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The path was not cached and the key-value store has no value for it.
    #[error("no such directory: {path}")]
    NotFound {
        /// The path that was looked up.
        path: String,
    },

    /// A key-value store operation returned a transient failure: an
    /// incomplete response, a transport error, or anything else recorded via
    /// session health rather than as a hard failure.
    #[error("transient key-value store error for {path}: {detail}")]
    Transient {
        /// The path the operation was for.
        path: String,
        /// Human-readable detail from the underlying collaborator.
        detail: String,
    },

    /// A supplied path exceeded the maximum permitted length, or was
    /// otherwise structurally invalid. This is a programmer error: callers
    /// are expected to validate paths before handing them to this crate.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// An invariant this crate relies on did not hold. This should never
    /// happen outside of a bug in this crate or one of its collaborators.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Error {
        Error::Internal("a lock was poisoned by a panicking thread".into())
    }
}

impl Error {
    /// Construct an [`Error::Internal`] naming the invariant that failed.
    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Construct an [`Error::Transient`] for `path`.
    pub(crate) fn transient(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Transient {
            path: path.into(),
            detail: detail.into(),
        }
    }
}
