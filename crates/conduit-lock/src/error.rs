//! Lock error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the distributed lock.
///
/// Losing a race for a lock is not one of them: `acquire` returns `None`.
#[derive(Debug, Error)]
pub enum LockError {
    /// The composite key exceeds the length bound. Raised before any cache call.
    #[error("lock key is {len} characters long, the maximum is {max}")]
    KeyTooLong {
        /// Length of the rejected key, in characters.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// A blocking acquisition ran past its deadline.
    #[error("timed out after {waited:?} waiting for lock {key}")]
    Timeout {
        /// The composite key that stayed held.
        key: String,
        /// How long the caller waited.
        waited: Duration,
    },

    /// A handle was released through a backend that did not issue it.
    #[error("lock handle for {key} was not issued by the {backend} backend")]
    ForeignHandle {
        /// The composite key of the handle.
        key: String,
        /// The backend that rejected it.
        backend: &'static str,
    },

    /// The cache service failed.
    #[error("cache error: {0}")]
    Cache(String),
}

impl From<LockError> for conduit_core::error::DomainError {
    fn from(err: LockError) -> Self {
        Self::Internal(Box::new(err))
    }
}
