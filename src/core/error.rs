//! Error types for the request path.
//!
//! Three outcomes leave the core as errors: a request the emulation cannot
//! honour, a malformed request, and a storage failure. A compare-and-swap
//! that loses its precondition is not an error; it travels as
//! [`WriteOutcome::Conflict`](crate::backend::WriteOutcome) and ends up as
//! `succeeded = false` on the wire.

use crate::backend::BackendError;
use thiserror::Error;

/// Errors surfaced to the RPC caller.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The request used a field, option, or transaction shape the emulation
    /// does not implement.
    #[error("etcdserver: unsupported operation: {what}")]
    Unsupported { what: String },

    /// The request is malformed (for example a key that is not UTF-8).
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The storage backend failed.
    #[error("backend {operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },
}

impl BridgeError {
    /// Create an Unsupported error naming the rejected option.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported { what: what.into() }
    }

    /// Create an InvalidRequest error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Adapter for `map_err` that tags a backend error with the operation
    /// that produced it.
    pub fn backend(operation: &'static str) -> impl FnOnce(BackendError) -> Self {
        move |source| Self::Backend { operation, source }
    }

    /// Whether the request itself was at fault (as opposed to storage).
    pub fn is_request_error(&self) -> bool {
        matches!(self, Self::Unsupported { .. } | Self::InvalidRequest { .. })
    }
}

/// Result type using BridgeError.
pub type BridgeResult<T> = Result<T, BridgeError>;
