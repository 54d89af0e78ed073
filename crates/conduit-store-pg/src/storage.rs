//! `PostgreSQL` implementation of the storage engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use conduit_core::error::DomainError;
use conduit_core::outbox::{OutboxRow, OutboxStatus, RetryScan};
use conduit_core::storage::{AggregateRecord, OutboxStore, StorageEngine, StorageTransaction};

use crate::schema::{self, AGGREGATES_TABLE, OUTBOX_TABLE};

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> DomainError {
    move |e| DomainError::Infrastructure(format!("{context}: {e}"))
}

#[derive(Debug, Clone)]
struct Tables {
    schema: Option<String>,
    aggregates: String,
    outbox: String,
}

impl Tables {
    fn new(schema: Option<String>) -> Self {
        let qualify = |table: &str| match &schema {
            Some(schema) => format!("{schema}.{table}"),
            None => table.to_owned(),
        };
        Self {
            aggregates: qualify(AGGREGATES_TABLE),
            outbox: qualify(OUTBOX_TABLE),
            schema,
        }
    }
}

/// PostgreSQL-backed storage engine, optionally confined to one schema.
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
    tables: Tables,
}

impl PgStorage {
    /// Creates a storage engine over the default schema.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tables: Tables::new(None),
        }
    }

    /// Creates a storage engine whose tables live in schema `namespace`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if `namespace` is not a valid
    /// schema name.
    pub fn with_namespace(pool: PgPool, namespace: &str) -> Result<Self, DomainError> {
        let schema = schema::quote_ident(namespace)
            .ok_or_else(|| DomainError::Infrastructure(format!("invalid namespace: {namespace}")))?;
        Ok(Self {
            pool,
            tables: Tables::new(Some(schema)),
        })
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the namespace schema and its tables if they are missing.
    /// A no-op for the default schema, which `migrations/` manages.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if a statement fails.
    #[instrument(skip(self), fields(schema = ?self.tables.schema))]
    pub async fn provision(&self) -> Result<(), DomainError> {
        let Some(schema) = &self.tables.schema else {
            return Ok(());
        };
        for statement in schema::provision_statements(schema) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(db_error("schema provisioning failed"))?;
        }
        debug!("namespace provisioned");
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for PgStorage {
    fn describe(&self) -> String {
        match &self.tables.schema {
            Some(schema) => format!("postgres/{}", schema.trim_matches('"')),
            None => "postgres".to_owned(),
        }
    }

    async fn begin(&self) -> Result<Box<dyn StorageTransaction>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("failed to begin transaction"))?;
        Ok(Box::new(PgTransaction {
            tx,
            tables: self.tables.clone(),
        }))
    }

    async fn find_aggregate(
        &self,
        aggregate_type: &str,
        id: Uuid,
    ) -> Result<Option<AggregateRecord>, DomainError> {
        let row = sqlx::query(&select_aggregate_sql(&self.tables))
            .bind(aggregate_type)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("aggregate lookup failed"))?;
        row.map(|row| aggregate_from_row(aggregate_type, id, &row))
            .transpose()
    }
}

#[async_trait]
impl OutboxStore for PgStorage {
    async fn fetch_retryable(
        &self,
        scan: &RetryScan,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxRow>, DomainError> {
        let sql = format!(
            "SELECT id, name, content, retries, added, expires_at, status_name, version \
             FROM {} \
             WHERE status_name IN ($1, $2) AND retries < $3 AND added < $4 AND version = $5 \
             ORDER BY added \
             LIMIT $6",
            self.tables.outbox
        );
        let rows = sqlx::query(&sql)
            .bind(OutboxStatus::Failed.as_str())
            .bind(OutboxStatus::Scheduled.as_str())
            .bind(scan.max_retries)
            .bind(now - scan.grace)
            .bind(&scan.version)
            .bind(i64::try_from(scan.batch_size).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("outbox retry scan failed"))?;
        rows.iter().map(outbox_from_row).collect()
    }
}

/// An open PostgreSQL transaction. Dropping it without commit rolls back.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
    tables: Tables,
}

impl PgTransaction {
    async fn current_version(&mut self, aggregate_type: &str, id: Uuid) -> Result<Option<i64>, DomainError> {
        let sql = format!(
            "SELECT version FROM {} WHERE aggregate_type = $1 AND id = $2",
            self.tables.aggregates
        );
        sqlx::query_scalar(&sql)
            .bind(aggregate_type)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("version lookup failed"))
    }

    async fn version_mismatch(&mut self, aggregate_type: &str, id: Uuid, expected: i64) -> DomainError {
        match self.current_version(aggregate_type, id).await {
            Ok(Some(actual)) => DomainError::ConcurrencyConflict {
                aggregate_id: id,
                expected,
                actual,
            },
            Ok(None) => DomainError::AggregateNotFound(id),
            Err(err) => err,
        }
    }
}

#[async_trait]
impl StorageTransaction for PgTransaction {
    async fn find_aggregate(
        &mut self,
        aggregate_type: &str,
        id: Uuid,
    ) -> Result<Option<AggregateRecord>, DomainError> {
        let row = sqlx::query(&select_aggregate_sql(&self.tables))
            .bind(aggregate_type)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("aggregate lookup failed"))?;
        row.map(|row| aggregate_from_row(aggregate_type, id, &row))
            .transpose()
    }

    async fn insert_aggregate(&mut self, record: &AggregateRecord) -> Result<(), DomainError> {
        let sql = format!(
            "INSERT INTO {} (aggregate_type, id, version, state, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (aggregate_type, id) DO NOTHING",
            self.tables.aggregates
        );
        let result = sqlx::query(&sql)
            .bind(&record.aggregate_type)
            .bind(record.id)
            .bind(record.version)
            .bind(&record.state)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("aggregate insert failed"))?;
        if result.rows_affected() == 1 {
            return Ok(());
        }
        let actual = self
            .current_version(&record.aggregate_type, record.id)
            .await?
            .unwrap_or_default();
        Err(DomainError::ConcurrencyConflict {
            aggregate_id: record.id,
            expected: 0,
            actual,
        })
    }

    async fn update_aggregate(
        &mut self,
        record: &AggregateRecord,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        let sql = format!(
            "UPDATE {} SET version = $3, state = $4, updated_at = $5 \
             WHERE aggregate_type = $1 AND id = $2 AND version = $6",
            self.tables.aggregates
        );
        let result = sqlx::query(&sql)
            .bind(&record.aggregate_type)
            .bind(record.id)
            .bind(record.version)
            .bind(&record.state)
            .bind(record.updated_at)
            .bind(expected_version)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("aggregate update failed"))?;
        if result.rows_affected() == 1 {
            return Ok(());
        }
        Err(self
            .version_mismatch(&record.aggregate_type, record.id, expected_version)
            .await)
    }

    async fn delete_aggregate(
        &mut self,
        aggregate_type: &str,
        id: Uuid,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        let sql = format!(
            "DELETE FROM {} WHERE aggregate_type = $1 AND id = $2 AND version = $3",
            self.tables.aggregates
        );
        let result = sqlx::query(&sql)
            .bind(aggregate_type)
            .bind(id)
            .bind(expected_version)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("aggregate delete failed"))?;
        if result.rows_affected() == 1 {
            return Ok(());
        }
        Err(self.version_mismatch(aggregate_type, id, expected_version).await)
    }

    async fn append_outbox(&mut self, row: &OutboxRow) -> Result<(), DomainError> {
        let sql = format!(
            "INSERT INTO {} (id, name, content, retries, added, expires_at, status_name, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            self.tables.outbox
        );
        sqlx::query(&sql)
            .bind(row.id)
            .bind(&row.name)
            .bind(&row.content)
            .bind(row.retries)
            .bind(row.added)
            .bind(row.expires_at)
            .bind(row.status.as_str())
            .bind(&row.version)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("outbox append failed"))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(db_error("commit failed"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.rollback().await.map_err(db_error("rollback failed"))
    }
}

fn select_aggregate_sql(tables: &Tables) -> String {
    format!(
        "SELECT version, state, created_at, updated_at FROM {} \
         WHERE aggregate_type = $1 AND id = $2",
        tables.aggregates
    )
}

fn decode_error(e: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("row decoding failed: {e}"))
}

fn aggregate_from_row(aggregate_type: &str, id: Uuid, row: &PgRow) -> Result<AggregateRecord, DomainError> {
    Ok(AggregateRecord {
        aggregate_type: aggregate_type.to_owned(),
        id,
        version: row.try_get("version").map_err(decode_error)?,
        state: row.try_get("state").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn outbox_from_row(row: &PgRow) -> Result<OutboxRow, DomainError> {
    let status_name: String = row.try_get("status_name").map_err(decode_error)?;
    Ok(OutboxRow {
        id: row.try_get("id").map_err(decode_error)?,
        name: row.try_get("name").map_err(decode_error)?,
        content: row.try_get("content").map_err(decode_error)?,
        retries: row.try_get("retries").map_err(decode_error)?,
        added: row.try_get("added").map_err(decode_error)?,
        expires_at: row.try_get("expires_at").map_err(decode_error)?,
        status: status_name.parse()?,
        version: row.try_get("version").map_err(decode_error)?,
    })
}
