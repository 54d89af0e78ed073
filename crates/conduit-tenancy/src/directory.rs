//! Tenant directory and secret decryption seams.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TenancyError;

/// How a tenant's data is isolated from other tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// Lives in the default database under its own namespace.
    Shared,
    /// Has a database of its own.
    Dedicated,
}

/// What the tenant directory knows about a tenant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantInfo {
    /// Encrypted connection string; only meaningful for dedicated tenants.
    pub connection_string_encrypted: Option<String>,
    /// Isolation mode.
    pub isolation_level: IsolationLevel,
}

impl std::fmt::Debug for TenantInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantInfo")
            .field(
                "connection_string_encrypted",
                &self.connection_string_encrypted.as_ref().map(|_| "<redacted>"),
            )
            .field("isolation_level", &self.isolation_level)
            .finish()
    }
}

/// Directory service answering "where does this tenant live".
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Looks up `tenant_code` for the calling application. `None` when the
    /// tenant is unknown.
    async fn get_tenant_info(
        &self,
        tenant_code: &str,
        app_id: &str,
    ) -> Result<Option<TenantInfo>, TenancyError>;
}

/// Turns a stored connection secret into a usable connection string.
pub trait SecretDecryptor: Send + Sync {
    /// Decrypts `ciphertext`; `None` if it cannot be decrypted.
    fn decrypt(&self, ciphertext: &str) -> Option<String>;
}

/// Decryptor for directories that store connection strings in the clear.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughDecryptor;

impl SecretDecryptor for PassthroughDecryptor {
    fn decrypt(&self, ciphertext: &str) -> Option<String> {
        Some(ciphertext.to_owned())
    }
}
