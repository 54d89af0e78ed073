//! Conduit Lock — cross-process mutual exclusion over a cache service.
//!
//! A lock is a key `DistributedLock_<resource>.<key>` set-if-absent with a
//! TTL. Two backends satisfy the same acquire/release contract: the script
//! backend stores a fencing token and releases with an atomic
//! compare-and-delete, the native backend delegates to the cache client's own
//! lock primitive. Failing to acquire is not an error.

pub mod backend;
pub mod error;
pub mod key;
pub mod lock;
pub mod memory;

pub use backend::{
    LockBackend, LockBackendKind, LockCache, LockToken, NativeLease, NativeLockBackend,
    NativeLockClient, ScriptLockBackend,
};
pub use error::LockError;
pub use key::{LOCK_KEY_PREFIX, LockKey, MAX_LOCK_KEY_LEN};
pub use lock::{DistributedLock, LockHandle};
pub use memory::InMemoryLockCache;
