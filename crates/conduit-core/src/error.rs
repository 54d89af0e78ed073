//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Boxed error used to carry an underlying cause through `DomainError::Internal`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// Normalized form of a concurrency conflict surfaced to callers.
    #[error("stale data on aggregate {aggregate_id}, please retry")]
    StaleData {
        /// The aggregate whose stored version moved underneath the request.
        aggregate_id: Uuid,
    },

    /// A business-rule violation raised by domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// The tenant directory has no entry for the tenant.
    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// An infrastructure error that keeps its underlying cause.
    #[error("internal error")]
    Internal(#[source] BoxError),
}

impl DomainError {
    /// Returns `true` for expected business-rule violations.
    #[must_use]
    pub fn is_business_rule(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Renders the error together with its full source chain.
    #[must_use]
    pub fn detail(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}
