//! `PostgreSQL` lock cache shared by every process on the same database.

use std::time::Duration;

use async_trait::async_trait;
use conduit_lock::{LockCache, LockError, NativeLease, NativeLockClient};
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::schema::LOCKS_TABLE;

/// Lock cache over the `distributed_locks` table.
///
/// Expiry is judged by the database clock, so replicas with skewed clocks
/// still agree on who holds a key.
#[derive(Debug, Clone)]
pub struct PgLockCache {
    pool: PgPool,
}

impl PgLockCache {
    /// Creates a lock cache on `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn cache_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> LockError {
    move |e| LockError::Cache(format!("{context}: {e}"))
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl LockCache for PgLockCache {
    #[instrument(skip(self, value))]
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockError> {
        // An expired row is taken over in place; a live one leaves the upsert
        // with no affected rows.
        let sql = format!(
            "INSERT INTO {LOCKS_TABLE} (key, value, expires_at) \
             VALUES ($1, $2, now() + $3::bigint * INTERVAL '1 millisecond') \
             ON CONFLICT (key) DO UPDATE \
             SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at \
             WHERE {LOCKS_TABLE}.expires_at <= now()"
        );
        let result = sqlx::query(&sql)
            .bind(key)
            .bind(value)
            .bind(ttl_millis(ttl))
            .execute(&self.pool)
            .await
            .map_err(cache_error("lock acquire failed"))?;
        let acquired = result.rows_affected() == 1;
        debug!(acquired, "lock set-if-absent");
        Ok(acquired)
    }

    #[instrument(skip(self, expected))]
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LockError> {
        let sql = format!(
            "DELETE FROM {LOCKS_TABLE} WHERE key = $1 AND value = $2 AND expires_at > now()"
        );
        let result = sqlx::query(&sql)
            .bind(key)
            .bind(expected)
            .execute(&self.pool)
            .await
            .map_err(cache_error("lock release failed"))?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl NativeLockClient for PgLockCache {
    async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<NativeLease>, LockError> {
        let lease = NativeLease::new(Uuid::new_v4().to_string());
        let acquired = self.set_if_absent(name, lease.id(), ttl).await?;
        Ok(acquired.then_some(lease))
    }

    async fn unlock(&self, name: &str, lease: &NativeLease) -> Result<bool, LockError> {
        self.compare_and_delete(name, lease.id()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_is_sent_in_milliseconds() {
        assert_eq!(ttl_millis(Duration::from_secs(30)), 30_000);
        assert_eq!(ttl_millis(Duration::from_millis(1)), 1);
        assert_eq!(ttl_millis(Duration::MAX), i64::MAX);
    }
}
