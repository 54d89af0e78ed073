//! In-process cache backend.
//!
//! Implements both [`LockCache`] and [`NativeLockClient`] over a single map,
//! for single-node deployments and tests. Expired entries count as absent.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::backend::{LockCache, NativeLease, NativeLockClient};
use crate::error::LockError;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// A TTL-aware key/value map with atomic lock operations.
#[derive(Debug, Default)]
pub struct InMemoryLockCache {
    entries: Mutex<HashMap<String, Entry>>,
    next_lease: AtomicU64,
}

impl InMemoryLockCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `LockError::Cache` if the internal mutex is poisoned.
    pub fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        let entries = self.lock_entries()?;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    fn lock_entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, LockError> {
        self.entries
            .lock()
            .map_err(|_| LockError::Cache("in-memory lock cache mutex poisoned".into()))
    }
}

#[async_trait]
impl LockCache for InMemoryLockCache {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut entries = self.lock_entries()?;
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| entry.expires_at > now) {
            return Ok(false);
        }
        entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LockError> {
        let mut entries = self.lock_entries()?;
        let now = Instant::now();
        let owned = entries
            .get(key)
            .is_some_and(|entry| entry.expires_at > now && entry.value == expected);
        if owned {
            entries.remove(key);
        }
        Ok(owned)
    }
}

#[async_trait]
impl NativeLockClient for InMemoryLockCache {
    async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<NativeLease>, LockError> {
        let lease = NativeLease::new(format!(
            "lease-{}",
            self.next_lease.fetch_add(1, Ordering::Relaxed)
        ));
        let acquired = self.set_if_absent(name, lease.id(), ttl).await?;
        Ok(acquired.then_some(lease))
    }

    async fn unlock(&self, name: &str, lease: &NativeLease) -> Result<bool, LockError> {
        self.compare_and_delete(name, lease.id()).await
    }
}
