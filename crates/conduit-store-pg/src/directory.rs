//! `PostgreSQL` tenant directory.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use conduit_tenancy::{IsolationLevel, TenancyError, TenantDirectory, TenantInfo};

use crate::schema::TENANTS_TABLE;

/// Tenant directory backed by the `tenants` table.
#[derive(Debug, Clone)]
pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    /// Creates a directory reading from `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_isolation(value: &str) -> Result<IsolationLevel, TenancyError> {
    match value {
        "Shared" | "shared" => Ok(IsolationLevel::Shared),
        "Dedicated" | "dedicated" => Ok(IsolationLevel::Dedicated),
        other => Err(TenancyError::Directory(format!(
            "unknown isolation level: {other}"
        ))),
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    #[instrument(skip(self))]
    async fn get_tenant_info(
        &self,
        tenant_code: &str,
        app_id: &str,
    ) -> Result<Option<TenantInfo>, TenancyError> {
        let sql = format!(
            "SELECT connection_string_encrypted, isolation_level FROM {TENANTS_TABLE} \
             WHERE tenant_code = $1 AND app_id = $2"
        );
        let row: Option<(Option<String>, String)> = sqlx::query_as(&sql)
            .bind(tenant_code)
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TenancyError::Directory(e.to_string()))?;

        row.map(|(connection_string_encrypted, isolation)| {
            Ok(TenantInfo {
                connection_string_encrypted,
                isolation_level: parse_isolation(&isolation)?,
            })
        })
        .transpose()
    }
}
