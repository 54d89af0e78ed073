//! Composite lock keys.

use std::fmt;

use crate::error::LockError;

/// Prefix of every lock key in the cache.
pub const LOCK_KEY_PREFIX: &str = "DistributedLock_";

/// Maximum length of a composite lock key, in characters.
pub const MAX_LOCK_KEY_LEN: usize = 256;

/// A validated `DistributedLock_<resource>.<key>` cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// Builds and validates the composite key.
    ///
    /// # Errors
    ///
    /// Returns `LockError::KeyTooLong` when the key exceeds
    /// [`MAX_LOCK_KEY_LEN`] characters.
    pub fn new(resource_name: &str, key: &str) -> Result<Self, LockError> {
        let composite = format!("{LOCK_KEY_PREFIX}{resource_name}.{key}");
        let len = composite.chars().count();
        if len > MAX_LOCK_KEY_LEN {
            return Err(LockError::KeyTooLong {
                len,
                max: MAX_LOCK_KEY_LEN,
            });
        }
        Ok(Self(composite))
    }

    /// The key as stored in the cache.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key_format() {
        let key = LockKey::new("OrderInit", "T1").unwrap();

        assert_eq!(key.as_str(), "DistributedLock_OrderInit.T1");
    }

    #[test]
    fn test_key_at_the_bound_is_accepted() {
        // prefix (16) + "r" + "." = 18 characters of overhead
        let key = "k".repeat(MAX_LOCK_KEY_LEN - 18);

        let lock_key = LockKey::new("r", &key).unwrap();

        assert_eq!(lock_key.as_str().chars().count(), MAX_LOCK_KEY_LEN);
    }

    #[test]
    fn test_key_over_the_bound_is_rejected() {
        let key = "k".repeat(MAX_LOCK_KEY_LEN - 17);

        let result = LockKey::new("r", &key);

        match result {
            Err(LockError::KeyTooLong { len, max }) => {
                assert_eq!(len, MAX_LOCK_KEY_LEN + 1);
                assert_eq!(max, MAX_LOCK_KEY_LEN);
            }
            other => panic!("expected KeyTooLong, got {other:?}"),
        }
    }

    #[test]
    fn test_length_is_counted_in_characters() {
        // 238 two-byte characters stay within the bound even though they
        // take 476 bytes.
        let key = "é".repeat(MAX_LOCK_KEY_LEN - 18);

        assert!(LockKey::new("r", &key).is_ok());
    }
}
