//! Opens tenant storage on PostgreSQL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use conduit_core::storage::StorageEngine;
use conduit_tenancy::{ConnectionFactory, TenancyError};

use crate::storage::PgStorage;

/// Connection factory for PostgreSQL tenants.
///
/// Shared tenants get a schema in the default pool, provisioned on first
/// use. Dedicated tenants get a small pool of their own.
#[derive(Debug, Clone)]
pub struct PgConnectionFactory {
    default_pool: PgPool,
    dedicated_max_connections: u32,
    acquire_timeout: Duration,
}

impl PgConnectionFactory {
    /// Default size of a dedicated tenant pool.
    pub const DEFAULT_DEDICATED_MAX_CONNECTIONS: u32 = 5;

    /// Creates a factory over the default pool.
    #[must_use]
    pub fn new(default_pool: PgPool) -> Self {
        Self {
            default_pool,
            dedicated_max_connections: Self::DEFAULT_DEDICATED_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    /// Overrides the size of dedicated tenant pools.
    #[must_use]
    pub fn with_dedicated_max_connections(mut self, max: u32) -> Self {
        self.dedicated_max_connections = max;
        self
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn shared(&self, namespace: &str) -> Result<Arc<dyn StorageEngine>, TenancyError> {
        let connect_error = |reason: String| TenancyError::Connect {
            tenant_id: namespace.to_owned(),
            reason,
        };
        let storage = PgStorage::with_namespace(self.default_pool.clone(), namespace)
            .map_err(|e| connect_error(e.to_string()))?;
        storage
            .provision()
            .await
            .map_err(|e| connect_error(e.to_string()))?;
        Ok(Arc::new(storage))
    }

    async fn dedicated(
        &self,
        tenant_id: &str,
        connection_string: &str,
    ) -> Result<Arc<dyn StorageEngine>, TenancyError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.dedicated_max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(connection_string)
            .await
            .map_err(|e| TenancyError::Connect {
                tenant_id: tenant_id.to_owned(),
                reason: e.to_string(),
            })?;
        info!(tenant_id, max_connections = self.dedicated_max_connections, "dedicated pool opened");
        Ok(Arc::new(PgStorage::new(pool)))
    }
}
