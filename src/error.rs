//! Error types for the hello operator
//!
//! Errors are grouped by how the dispatcher should react to them. Anything
//! coming from the object store (I/O, optimistic-concurrency conflicts,
//! cancellation, deadlines) is retryable; malformed objects and bad
//! configuration are not.

use thiserror::Error;

/// Main error type for hello operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Write rejected because the stored object changed since it was read
    #[error("conflict: {0}")]
    Conflict(String),

    /// Owner reference could not be stamped onto a dependent object
    #[error("ownership link error: {0}")]
    OwnershipLink(String),

    /// Store operation aborted because the pass was cancelled
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Store operation did not finish before the pass deadline
    #[error("timed out: {0}")]
    Timeout(String),

    /// Namespaced object arrived without a namespace or name
    #[error("missing identity: {0}")]
    MissingIdentity(String),

    /// Invalid operator configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal/operational error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a conflict error with the given message
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an ownership link error with the given message
    pub fn ownership_link(msg: impl Into<String>) -> Self {
        Self::OwnershipLink(msg.into())
    }

    /// Create a cancellation error for the named operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled(operation.into())
    }

    /// Create a timeout error for the named operation
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout(operation.into())
    }

    /// Create a missing identity error with the given message
    pub fn missing_identity(msg: impl Into<String>) -> Self {
        Self::MissingIdentity(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the dispatcher should retry the pass with back-off.
    ///
    /// Store failures never distinguish sub-causes: transient I/O, conflicts,
    /// cancellation and deadlines are all retried. Ownership link failures are
    /// fatal for the pass but still retried, since the type scheme or the
    /// owner's identity may settle. Objects without identity and bad
    /// configuration need a change before another attempt can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube(_)
            | Self::Conflict(_)
            | Self::OwnershipLink(_)
            | Self::Cancelled(_)
            | Self::Timeout(_)
            | Self::Internal(_) => true,
            Self::MissingIdentity(_) | Self::Config(_) => false,
        }
    }
}
