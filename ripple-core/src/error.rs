//! Error types for the Ripple runtime.
//!
//! Only failures that abort an operation are represented here. Misuse
//! diagnostics (key collisions, prop mutation, bad watch paths) are reported
//! through [`crate::config::warn`] and never surface as errors.

use thiserror::Error;

/// Errors produced by reactive computations and the instance layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A computation (getter, callback, method or data factory) failed.
    #[error("{0}")]
    Computation(String),

    /// `evaluate()` was called on a watcher that is not lazy.
    #[error("watcher \"{0}\" is not lazy and cannot be evaluated on demand")]
    NotLazy(String),

    /// A method was invoked that is not defined on the instance.
    #[error("method \"{0}\" is not defined on the instance")]
    UnknownMethod(String),

    /// Data handed to the runtime had the wrong shape.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    /// Shorthand for building a [`Error::Computation`] from any message.
    pub fn computation(message: impl Into<String>) -> Self {
        Self::Computation(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
