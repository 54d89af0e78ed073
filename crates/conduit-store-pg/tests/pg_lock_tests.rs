//! Integration tests for `PgLockCache`.

use std::sync::Arc;
use std::time::Duration;

use conduit_lock::{DistributedLock, LockBackendKind, LockCache};
use conduit_store_pg::PgLockCache;
use sqlx::PgPool;

/// One lock per replica, each with its own cache over the shared database.
fn replica(pool: &PgPool, kind: LockBackendKind) -> DistributedLock {
    DistributedLock::from_kind(kind, Arc::new(PgLockCache::new(pool.clone())))
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_replicas_exclude_each_other(pool: PgPool) {
    let replica_a = replica(&pool, LockBackendKind::Script);
    let replica_b = replica(&pool, LockBackendKind::Script);
    let ttl = Duration::from_secs(30);

    let held = replica_a
        .acquire("TenantRegistration", "acme", ttl)
        .await
        .unwrap()
        .unwrap();
    let refused = replica_b.acquire("TenantRegistration", "acme", ttl).await.unwrap();

    assert!(refused.is_none());

    assert!(replica_a.release(held).await.unwrap());
    let taken_over = replica_b.acquire("TenantRegistration", "acme", ttl).await.unwrap();
    assert!(taken_over.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_native_replicas_exclude_each_other(pool: PgPool) {
    let replica_a = replica(&pool, LockBackendKind::Native);
    let replica_b = replica(&pool, LockBackendKind::Native);
    let ttl = Duration::from_secs(30);

    let held = replica_a.acquire("TenantRegistration", "acme", ttl).await.unwrap();
    let refused = replica_b.acquire("TenantRegistration", "acme", ttl).await.unwrap();

    assert!(held.is_some());
    assert!(refused.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_expired_key_can_be_taken_over(pool: PgPool) {
    let cache = PgLockCache::new(pool);

    assert!(cache.set_if_absent("k", "first", Duration::from_millis(50)).await.unwrap());
    assert!(!cache.set_if_absent("k", "second", Duration::from_secs(30)).await.unwrap());

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert!(cache.set_if_absent("k", "second", Duration::from_secs(30)).await.unwrap());
    // The first holder's token no longer owns the key.
    assert!(!cache.compare_and_delete("k", "first").await.unwrap());
    assert!(cache.compare_and_delete("k", "second").await.unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_replicas_grant_exactly_one_handle(pool: PgPool) {
    let attempts = (0..8).map(|_| {
        let lock = replica(&pool, LockBackendKind::Script);
        tokio::spawn(async move {
            lock.acquire("TenantRegistration", "globex", Duration::from_secs(30))
                .await
                .unwrap()
                .is_some()
        })
    });

    let mut granted = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        if attempt.await.unwrap() {
            granted += 1;
        }
    }

    assert_eq!(granted, 1);
}
