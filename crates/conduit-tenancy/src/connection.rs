//! Tenant connections and the factory that opens their storage.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conduit_core::scope::ScopedTarget;
use conduit_core::storage::StorageEngine;

use crate::directory::IsolationLevel;
use crate::error::TenancyError;

/// How a tenant's storage is reached.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Decrypted connection string of a dedicated tenant.
    pub connection_string: Option<String>,
    /// Isolation mode.
    pub isolation: IsolationLevel,
    /// Namespace inside the shared database.
    pub namespace: Option<String>,
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "<redacted>"),
            )
            .field("isolation", &self.isolation)
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// A resolved tenant storage context. One per tenant id per process.
pub struct TenantConnection {
    /// Tenant the connection belongs to.
    pub tenant_id: String,
    /// How the storage was reached.
    pub descriptor: ConnectionDescriptor,
    /// The tenant's storage engine.
    pub storage: Arc<dyn StorageEngine>,
    /// When the connection was registered.
    pub created_at: DateTime<Utc>,
}

impl TenantConnection {
    /// Returns the request-scope target for this connection.
    #[must_use]
    pub fn target(&self) -> ScopedTarget {
        ScopedTarget {
            tenant_id: self.tenant_id.clone(),
            storage: Arc::clone(&self.storage),
        }
    }
}

impl fmt::Debug for TenantConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConnection")
            .field("tenant_id", &self.tenant_id)
            .field("descriptor", &self.descriptor)
            .field("storage", &self.storage.describe())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Opens storage engines for tenants.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// The default storage target scoped to `namespace`.
    async fn shared(&self, namespace: &str) -> Result<Arc<dyn StorageEngine>, TenancyError>;

    /// A storage engine of its own for `connection_string`.
    async fn dedicated(
        &self,
        tenant_id: &str,
        connection_string: &str,
    ) -> Result<Arc<dyn StorageEngine>, TenancyError>;
}
