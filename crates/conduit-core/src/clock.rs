//! Time and token sources.
//!
//! Production code uses the system clock and a thread-local RNG; tests and
//! replays inject fixed or recorded implementations.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;

/// Abstraction over system time for deterministic behavior.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of opaque random tokens (lock fencing tokens, root trace ids).
pub trait TokenSource: Send + Sync {
    /// Returns a new token, unique with overwhelming probability.
    fn next_token(&self) -> String;
}

/// Token source backed by the thread-local RNG.
#[derive(Debug, Clone, Copy)]
pub struct RandomTokenSource {
    len: usize,
}

impl RandomTokenSource {
    /// Length of tokens produced by [`RandomTokenSource::default`].
    pub const DEFAULT_LEN: usize = 32;

    /// Creates a token source producing alphanumeric tokens of `len` chars.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Default for RandomTokenSource {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LEN)
    }
}

impl TokenSource for RandomTokenSource {
    fn next_token(&self) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(self.len)
            .map(char::from)
            .collect()
    }
}
