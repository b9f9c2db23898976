//! Error taxonomy for document store operations.
//!
//! Variants mirror the status codes a managed document database reports, so
//! that every backend (in-memory, `PostgreSQL`, a hosted document service)
//! can map its native failures onto one vocabulary and the domain layer can
//! translate that vocabulary into user-facing messages in a single place.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures reported by a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The caller is not allowed to read or write the document.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The caller has no valid credentials.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// An update targeted a document that does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// The backend is temporarily unreachable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A quota or resource limit was hit.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The operation did not finish before its deadline.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The document is not in a state the operation requires
    /// (for example incrementing a non-numeric field).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The operation was cancelled by the client.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A transaction lost an optimistic concurrency race.
    ///
    /// Some document it read was modified by another committed transaction
    /// before it could commit. The transaction runner re-executes on this.
    #[error("Transaction aborted: {0}")]
    Aborted(String),

    /// A stored document does not match the expected schema.
    #[error("Failed to decode document {path}: {reason}")]
    Decode {
        /// Path of the malformed document.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Anything else.
    #[error("Store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Provider-style status code for logs and metric labels.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "permission-denied",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::NotFound(_) => "not-found",
            Self::Unavailable(_) => "unavailable",
            Self::ResourceExhausted(_) => "resource-exhausted",
            Self::DeadlineExceeded(_) => "deadline-exceeded",
            Self::FailedPrecondition(_) => "failed-precondition",
            Self::Cancelled(_) => "cancelled",
            Self::Aborted(_) => "aborted",
            Self::Decode { .. } => "data-loss",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns `true` for optimistic concurrency conflicts.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Returns `true` when a caller may reasonably retry the whole operation later.
    ///
    /// The protocol itself never retries these.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::DeadlineExceeded(_))
    }

    /// Returns `true` for cancellations, which read paths treat as benign.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {err}"))
    }
}

/// Error types usable as the failure of a transaction body.
///
/// The transaction runner needs to know whether a body failure was really a
/// lost concurrency race (re-execute) or a terminal error (give up).
pub trait TransactionError: From<StoreError> {
    /// Returns `true` if the failure is an optimistic concurrency conflict.
    fn is_conflict(&self) -> bool;
}

impl TransactionError for StoreError {
    fn is_conflict(&self) -> bool {
        StoreError::is_conflict(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(StoreError::Aborted("x".into()).is_conflict());
        assert!(!StoreError::Unavailable("x".into()).is_conflict());
        assert!(StoreError::Unavailable("x".into()).is_transient());
        assert!(StoreError::DeadlineExceeded("x".into()).is_transient());
        assert!(!StoreError::PermissionDenied("x".into()).is_transient());
        assert!(StoreError::Cancelled("x".into()).is_cancelled());
    }

    #[test]
    fn decode_error_display() {
        let error = StoreError::Decode {
            path: "customerCards/c1".into(),
            reason: "missing field `stamps`".into(),
        };
        let display = format!("{error}");
        assert!(display.contains("customerCards/c1"));
        assert!(display.contains("missing field"));
        assert_eq!(error.code(), "data-loss");
    }
}
