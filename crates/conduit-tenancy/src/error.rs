//! Tenancy error types.

use conduit_core::error::DomainError;
use conduit_lock::LockError;
use thiserror::Error;

/// Errors raised while resolving a tenant connection.
#[derive(Debug, Error)]
pub enum TenancyError {
    /// The tenant directory has no entry for the tenant. Not retried.
    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    /// The stored connection secret could not be decrypted.
    #[error("could not decrypt connection secret for tenant {tenant_id}")]
    Decrypt {
        /// Tenant whose secret failed.
        tenant_id: String,
    },

    /// Opening the tenant's storage engine failed.
    #[error("could not open storage for tenant {tenant_id}: {reason}")]
    Connect {
        /// Tenant being connected.
        tenant_id: String,
        /// What went wrong.
        reason: String,
    },

    /// The tenant directory failed.
    #[error("tenant directory error: {0}")]
    Directory(String),

    /// The cross-process registration lock failed or timed out.
    #[error("tenant registration lock failed")]
    Lock(#[from] LockError),

    /// The in-process connection cache is unusable.
    #[error("tenant connection cache unavailable")]
    Registry,
}

impl From<TenancyError> for DomainError {
    fn from(err: TenancyError) -> Self {
        match err {
            TenancyError::TenantNotFound(tenant_id) => Self::TenantNotFound(tenant_id),
            other => Self::Internal(Box::new(other)),
        }
    }
}
