//! Lock backends.
//!
//! [`LockBackend`] is the single interface the lock talks to. The script
//! backend drives a raw cache through two atomic operations; the native
//! backend hands the whole job to a client that already ships a lock.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_core::clock::{RandomTokenSource, TokenSource};
use serde::{Deserialize, Serialize};

use crate::error::LockError;
use crate::key::LockKey;

/// Lua body of the conditional set, for Redis-protocol caches.
///
/// `KEYS[1]` is the lock key, `ARGV[1]` the fencing token, `ARGV[2]` the TTL
/// in milliseconds.
pub const ACQUIRE_SCRIPT: &str = r"return redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ARGV[2])";

/// Lua body of the check-and-delete, for Redis-protocol caches.
///
/// Deletes `KEYS[1]` only while it still holds the fencing token `ARGV[1]`.
pub const RELEASE_SCRIPT: &str = r"if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end";

/// Which backend a lock is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackendKind {
    /// Atomic scripts against a raw cache.
    #[default]
    Script,
    /// The cache client's built-in lock primitive.
    Native,
}

impl LockBackendKind {
    /// Lowercase name used in configuration and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Native => "native",
        }
    }
}

impl fmt::Display for LockBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "script" => Ok(Self::Script),
            "native" => Ok(Self::Native),
            other => Err(format!("unknown lock backend `{other}` (expected script or native)")),
        }
    }
}

/// Opaque lease returned by a native lock client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeLease(String);

impl NativeLease {
    /// Wraps the client's lease identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The client's lease identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Proof of ownership held by a lock handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockToken {
    /// Fencing token stored as the key's value (script backend).
    Fencing(String),
    /// Lease issued by the cache client (native backend).
    Lease(NativeLease),
}

/// Raw cache operations the script backend needs, each atomic on the server.
#[async_trait]
pub trait LockCache: Send + Sync {
    /// Sets `key` to `value` with `ttl` only if `key` is absent
    /// ([`ACQUIRE_SCRIPT`]). Returns whether the value was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Deletes `key` only if it currently holds `expected`
    /// ([`RELEASE_SCRIPT`]). Returns whether a key was deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LockError>;
}

/// A cache client with a built-in lock primitive.
#[async_trait]
pub trait NativeLockClient: Send + Sync {
    /// Tries to take the lock named `name` for `ttl`.
    async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<NativeLease>, LockError>;

    /// Releases `lease` if it still owns the lock named `name`.
    async fn unlock(&self, name: &str, lease: &NativeLease) -> Result<bool, LockError>;
}

/// The interface the distributed lock is built on.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> LockBackendKind;

    /// Tries to take `key` for `ttl`. `None` when someone else holds it.
    async fn try_acquire(
        &self,
        key: &LockKey,
        ttl: Duration,
    ) -> Result<Option<LockToken>, LockError>;

    /// Releases `key` if `token` still owns it.
    async fn release(&self, key: &LockKey, token: &LockToken) -> Result<bool, LockError>;
}

/// Backend issuing conditional-set / compare-and-delete against a raw cache.
pub struct ScriptLockBackend<C> {
    cache: Arc<C>,
    tokens: Arc<dyn TokenSource>,
}

impl<C: LockCache> ScriptLockBackend<C> {
    /// Creates a backend generating fencing tokens from the thread RNG.
    #[must_use]
    pub fn new(cache: Arc<C>) -> Self {
        Self::with_tokens(cache, Arc::new(RandomTokenSource::default()))
    }

    /// Creates a backend with an explicit fencing-token source.
    #[must_use]
    pub fn with_tokens(cache: Arc<C>, tokens: Arc<dyn TokenSource>) -> Self {
        Self { cache, tokens }
    }
}

#[async_trait]
impl<C: LockCache + 'static> LockBackend for ScriptLockBackend<C> {
    fn kind(&self) -> LockBackendKind {
        LockBackendKind::Script
    }

    async fn try_acquire(
        &self,
        key: &LockKey,
        ttl: Duration,
    ) -> Result<Option<LockToken>, LockError> {
        let token = self.tokens.next_token();
        let acquired = self.cache.set_if_absent(key.as_str(), &token, ttl).await?;
        Ok(acquired.then_some(LockToken::Fencing(token)))
    }

    async fn release(&self, key: &LockKey, token: &LockToken) -> Result<bool, LockError> {
        match token {
            LockToken::Fencing(token) => self.cache.compare_and_delete(key.as_str(), token).await,
            LockToken::Lease(_) => Err(LockError::ForeignHandle {
                key: key.to_string(),
                backend: "script",
            }),
        }
    }
}

/// Backend delegating to a cache client's own lock.
pub struct NativeLockBackend<N> {
    client: Arc<N>,
}

impl<N: NativeLockClient> NativeLockBackend<N> {
    /// Creates a backend over `client`.
    #[must_use]
    pub fn new(client: Arc<N>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<N: NativeLockClient + 'static> LockBackend for NativeLockBackend<N> {
    fn kind(&self) -> LockBackendKind {
        LockBackendKind::Native
    }

    async fn try_acquire(
        &self,
        key: &LockKey,
        ttl: Duration,
    ) -> Result<Option<LockToken>, LockError> {
        let lease = self.client.try_lock(key.as_str(), ttl).await?;
        Ok(lease.map(LockToken::Lease))
    }

    async fn release(&self, key: &LockKey, token: &LockToken) -> Result<bool, LockError> {
        match token {
            LockToken::Lease(lease) => self.client.unlock(key.as_str(), lease).await,
            LockToken::Fencing(_) => Err(LockError::ForeignHandle {
                key: key.to_string(),
                backend: "native",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parses_case_insensitively() {
        assert_eq!("Script".parse::<LockBackendKind>().unwrap(), LockBackendKind::Script);
        assert_eq!("NATIVE".parse::<LockBackendKind>().unwrap(), LockBackendKind::Native);
        assert!("zookeeper".parse::<LockBackendKind>().is_err());
    }

    #[test]
    fn test_scripts_use_conditional_set_and_compare_and_delete() {
        assert!(ACQUIRE_SCRIPT.contains("'NX'"));
        assert!(RELEASE_SCRIPT.contains("== ARGV[1]"));
    }
}
