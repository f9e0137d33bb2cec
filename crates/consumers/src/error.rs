//! Consumer error types.

use domain::{EventKind, RepositoryError};
use thiserror::Error;

/// Errors raised while handling one event.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The event's payload does not have the shape its kind promises.
    #[error("Unexpected payload for {kind}: {detail}")]
    UnexpectedPayload { kind: EventKind, detail: String },

    /// A repository call failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl ConsumerError {
    pub(crate) fn unexpected(kind: EventKind, detail: impl Into<String>) -> Self {
        Self::UnexpectedPayload {
            kind,
            detail: detail.into(),
        }
    }
}

/// Result type for consumer operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;
