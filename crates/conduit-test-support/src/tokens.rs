//! Test tokens — deterministic `TokenSource` for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use conduit_core::clock::TokenSource;

/// A token source that returns values from a predetermined sequence. Panics if
/// the sequence is exhausted. Used in tests that assert on fencing tokens or
/// generated trace ids.
#[derive(Debug)]
pub struct SequenceTokens {
    values: Mutex<VecDeque<String>>,
}

impl SequenceTokens {
    /// Create a new `SequenceTokens` with the given values.
    #[must_use]
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: Mutex::new(values.into_iter().map(Into::into).collect()),
        }
    }
}

impl TokenSource for SequenceTokens {
    fn next_token(&self) -> String {
        self.values
            .lock()
            .unwrap()
            .pop_front()
            .expect("SequenceTokens exhausted")
    }
}
