//! The distributed lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::backend::{
    LockBackend, LockBackendKind, LockCache, LockToken, NativeLockBackend, NativeLockClient,
    ScriptLockBackend,
};
use crate::error::LockError;
use crate::key::LockKey;

/// Proof of a successful acquisition.
///
/// Valid only while its token still matches the value stored under the key;
/// once the TTL lapses another caller may take the lock, after which
/// releasing this handle is a no-op.
#[derive(Debug, Clone)]
pub struct LockHandle {
    resource_name: String,
    key: String,
    lock_key: LockKey,
    token: LockToken,
    ttl: Duration,
    acquired_at: Instant,
}

impl LockHandle {
    /// Resource the lock protects.
    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Key within the resource.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Composite cache key.
    #[must_use]
    pub fn lock_key(&self) -> &LockKey {
        &self.lock_key
    }

    /// Fencing token, when the backend exposes one.
    #[must_use]
    pub fn fencing_token(&self) -> Option<&str> {
        match &self.token {
            LockToken::Fencing(token) => Some(token),
            LockToken::Lease(_) => None,
        }
    }

    /// Time-to-live requested at acquisition.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns `true` once the TTL has lapsed, after which the handle can no
    /// longer be trusted to own the lock.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.acquired_at.elapsed() >= self.ttl
    }
}

/// Cross-process mutual exclusion keyed by `(resource, key)`.
#[derive(Clone)]
pub struct DistributedLock {
    backend: Arc<dyn LockBackend>,
    poll_interval: Duration,
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("backend", &self.backend.kind())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl DistributedLock {
    /// Interval between attempts of [`DistributedLock::acquire_blocking`].
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

    /// Creates a lock over an arbitrary backend.
    #[must_use]
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        Self {
            backend,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Creates a lock using atomic scripts against `cache`.
    #[must_use]
    pub fn script<C: LockCache + 'static>(cache: Arc<C>) -> Self {
        Self::new(Arc::new(ScriptLockBackend::new(cache)))
    }

    /// Creates a lock using `client`'s built-in lock primitive.
    #[must_use]
    pub fn native<N: NativeLockClient + 'static>(client: Arc<N>) -> Self {
        Self::new(Arc::new(NativeLockBackend::new(client)))
    }

    /// Creates a lock over whichever backend `kind` selects.
    #[must_use]
    pub fn from_kind<C>(kind: LockBackendKind, client: Arc<C>) -> Self
    where
        C: LockCache + NativeLockClient + 'static,
    {
        match kind {
            LockBackendKind::Script => Self::script(client),
            LockBackendKind::Native => Self::native(client),
        }
    }

    /// Overrides the blocking poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Backend variant in use.
    #[must_use]
    pub fn kind(&self) -> LockBackendKind {
        self.backend.kind()
    }

    /// Tries once to take the lock. `None` means someone else holds it.
    ///
    /// # Errors
    ///
    /// Returns `LockError::KeyTooLong` before contacting the cache when the
    /// composite key is over the bound, or `LockError::Cache` when the cache
    /// fails.
    #[instrument(skip(self), fields(backend = %self.backend.kind()))]
    pub async fn acquire(
        &self,
        resource_name: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockHandle>, LockError> {
        let lock_key = LockKey::new(resource_name, key)?;
        let Some(token) = self.backend.try_acquire(&lock_key, ttl).await? else {
            debug!(lock_key = %lock_key, "lock held elsewhere");
            return Ok(None);
        };
        debug!(lock_key = %lock_key, "lock acquired");
        Ok(Some(LockHandle {
            resource_name: resource_name.to_owned(),
            key: key.to_owned(),
            lock_key,
            token,
            ttl,
            acquired_at: Instant::now(),
        }))
    }

    /// Polls [`DistributedLock::acquire`] until it succeeds.
    ///
    /// With `deadline = None` this waits indefinitely; callers that cannot
    /// tolerate that must pass a deadline.
    ///
    /// # Errors
    ///
    /// Returns `LockError::Timeout` when `deadline` elapses first, or any
    /// error raised by [`DistributedLock::acquire`].
    pub async fn acquire_blocking(
        &self,
        resource_name: &str,
        key: &str,
        ttl: Duration,
        deadline: Option<Duration>,
    ) -> Result<LockHandle, LockError> {
        let started = Instant::now();
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            if let Some(handle) = self.acquire(resource_name, key, ttl).await? {
                if attempts > 1 {
                    debug!(lock_key = %handle.lock_key, attempts, "lock acquired after waiting");
                }
                return Ok(handle);
            }
            if let Some(deadline) = deadline {
                let waited = started.elapsed();
                if waited >= deadline {
                    let lock_key = LockKey::new(resource_name, key)?;
                    warn!(lock_key = %lock_key, ?waited, attempts, "gave up waiting for lock");
                    return Err(LockError::Timeout {
                        key: lock_key.to_string(),
                        waited,
                    });
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Releases the lock if `handle` still owns it.
    ///
    /// Returns `false` when the handle's token no longer matches, which
    /// leaves any later holder's lock in place.
    ///
    /// # Errors
    ///
    /// Returns `LockError::Cache` when the cache fails, or
    /// `LockError::ForeignHandle` when `handle` came from another backend.
    #[instrument(skip(self, handle), fields(lock_key = %handle.lock_key))]
    pub async fn release(&self, handle: LockHandle) -> Result<bool, LockError> {
        let released = self.backend.release(&handle.lock_key, &handle.token).await?;
        if released {
            debug!("lock released");
        } else {
            warn!("stale lock handle; release ignored");
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use conduit_test_support::SequenceTokens;

    use super::*;
    use crate::memory::InMemoryLockCache;

    const MINUTE: Duration = Duration::from_secs(60);

    fn script_lock() -> (DistributedLock, Arc<InMemoryLockCache>) {
        let cache = Arc::new(InMemoryLockCache::new());
        (DistributedLock::script(Arc::clone(&cache)), cache)
    }

    /// Counts every cache call and delegates to an in-memory cache.
    #[derive(Default)]
    struct CountingCache {
        inner: InMemoryLockCache,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LockCache for CountingCache {
        async fn set_if_absent(
            &self,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> Result<bool, LockError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.set_if_absent(key, value, ttl).await
        }

        async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LockError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.compare_and_delete(key, expected).await
        }
    }

    #[tokio::test]
    async fn test_second_acquire_is_refused_until_release() {
        // Arrange
        let (lock, _cache) = script_lock();

        // Act
        let first = lock.acquire("OrderInit", "T1", MINUTE).await.unwrap();
        let second = lock.acquire("OrderInit", "T1", MINUTE).await.unwrap();

        // Assert
        let first = first.expect("first acquire succeeds");
        assert!(second.is_none());
        assert!(lock.release(first).await.unwrap());
        assert!(lock.acquire("OrderInit", "T1", MINUTE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let (lock, _cache) = script_lock();

        let a = lock.acquire("OrderInit", "T1", MINUTE).await.unwrap();
        let b = lock.acquire("OrderInit", "T2", MINUTE).await.unwrap();
        let c = lock.acquire("StockInit", "T1", MINUTE).await.unwrap();

        assert!(a.is_some() && b.is_some() && c.is_some());
    }

    #[tokio::test]
    async fn test_handle_carries_fencing_token_stored_in_cache() {
        // Arrange
        let cache = Arc::new(InMemoryLockCache::new());
        let backend = ScriptLockBackend::with_tokens(
            Arc::clone(&cache),
            Arc::new(SequenceTokens::new(["token-a", "token-b"])),
        );
        let lock = DistributedLock::new(Arc::new(backend));

        // Act
        let handle = lock.acquire("OrderInit", "T1", MINUTE).await.unwrap().unwrap();

        // Assert
        assert_eq!(handle.fencing_token(), Some("token-a"));
        assert_eq!(handle.resource_name(), "OrderInit");
        assert_eq!(handle.key(), "T1");
        assert_eq!(
            cache.get("DistributedLock_OrderInit.T1").unwrap().as_deref(),
            Some("token-a")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquires_grant_exactly_one_handle() {
        // Arrange
        let (lock, _cache) = script_lock();
        let lock = Arc::new(lock);

        // Act
        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let lock = Arc::clone(&lock);
                tokio::spawn(async move { lock.acquire("OrderInit", "T1", MINUTE).await })
            })
            .collect();
        let mut granted = 0;
        for attempt in attempts {
            if attempt.await.unwrap().unwrap().is_some() {
                granted += 1;
            }
        }

        // Assert
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn test_stale_release_does_not_remove_later_holder() {
        // Arrange
        let (lock, cache) = script_lock();
        let stale = lock
            .acquire("OrderInit", "T1", Duration::from_millis(30))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(stale.is_expired());
        let current = lock.acquire("OrderInit", "T1", MINUTE).await.unwrap().unwrap();

        // Act
        let released = lock.release(stale).await.unwrap();

        // Assert
        assert!(!released);
        assert_eq!(
            cache.get("DistributedLock_OrderInit.T1").unwrap().as_deref(),
            current.fencing_token()
        );
        assert!(lock.acquire("OrderInit", "T1", MINUTE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overlong_key_fails_without_touching_the_cache() {
        // Arrange
        let cache = Arc::new(CountingCache::default());
        let lock = DistributedLock::script(Arc::clone(&cache));
        let key = "x".repeat(300);

        // Act
        let result = lock.acquire("OrderInit", &key, MINUTE).await;

        // Assert
        assert!(matches!(result, Err(LockError::KeyTooLong { .. })));
        assert_eq!(cache.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blocking_acquire_waits_for_release() {
        // Arrange
        let (lock, _cache) = script_lock();
        let lock = Arc::new(lock);
        let held = lock.acquire("OrderInit", "T1", MINUTE).await.unwrap().unwrap();
        let waiter = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                lock.acquire_blocking("OrderInit", "T1", MINUTE, Some(Duration::from_secs(5)))
                    .await
            })
        };

        // Act
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!waiter.is_finished());
        lock.release(held).await.unwrap();
        let handle = waiter.await.unwrap();

        // Assert
        assert!(handle.is_ok());
    }

    #[tokio::test]
    async fn test_blocking_acquire_times_out_at_deadline() {
        let (lock, _cache) = script_lock();
        let _held = lock.acquire("OrderInit", "T1", MINUTE).await.unwrap().unwrap();

        let result = lock
            .acquire_blocking("OrderInit", "T1", MINUTE, Some(Duration::from_millis(60)))
            .await;

        match result {
            Err(LockError::Timeout { key, waited }) => {
                assert_eq!(key, "DistributedLock_OrderInit.T1");
                assert!(waited >= Duration::from_millis(60));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_blocking_acquire_succeeds_after_ttl_expiry() {
        let (lock, _cache) = script_lock();
        let _abandoned = lock
            .acquire("OrderInit", "T1", Duration::from_millis(40))
            .await
            .unwrap()
            .unwrap();

        let handle = lock
            .acquire_blocking("OrderInit", "T1", MINUTE, None)
            .await
            .unwrap();

        assert_eq!(handle.lock_key().as_str(), "DistributedLock_OrderInit.T1");
    }

    #[tokio::test]
    async fn test_native_backend_satisfies_the_same_contract() {
        // Arrange
        let cache = Arc::new(InMemoryLockCache::new());
        let lock = DistributedLock::from_kind(LockBackendKind::Native, cache);

        // Act
        let first = lock.acquire("OrderInit", "T1", MINUTE).await.unwrap().unwrap();
        let second = lock.acquire("OrderInit", "T1", MINUTE).await.unwrap();

        // Assert
        assert_eq!(lock.kind(), LockBackendKind::Native);
        assert!(first.fencing_token().is_none());
        assert!(second.is_none());
        assert!(lock.release(first).await.unwrap());
        assert!(lock.acquire("OrderInit", "T1", MINUTE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_handle_from_other_backend_is_rejected() {
        let cache = Arc::new(InMemoryLockCache::new());
        let native = DistributedLock::from_kind(LockBackendKind::Native, Arc::clone(&cache));
        let script = DistributedLock::from_kind(LockBackendKind::Script, cache);
        let handle = native.acquire("OrderInit", "T1", MINUTE).await.unwrap().unwrap();

        let result = script.release(handle).await;

        assert!(matches!(result, Err(LockError::ForeignHandle { .. })));
    }
}
