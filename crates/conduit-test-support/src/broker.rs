//! Test broker — records the rows handed over after commit.

use std::sync::Mutex;

use async_trait::async_trait;
use conduit_core::error::DomainError;
use conduit_core::outbox::{OutboxBroker, OutboxRow};

/// A broker that records every `enqueue` call. Optionally fails every call to
/// exercise the "committed but not handed over" path.
#[derive(Debug)]
pub struct RecordingBroker {
    version: String,
    fail: bool,
    enqueued: Mutex<Vec<OutboxRow>>,
}

impl RecordingBroker {
    /// Create a broker stamping rows with `version`.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            fail: false,
            enqueued: Mutex::new(Vec::new()),
        }
    }

    /// Create a broker whose `enqueue` always fails.
    #[must_use]
    pub fn failing(version: impl Into<String>) -> Self {
        Self {
            fail: true,
            ..Self::new(version)
        }
    }

    /// Returns a snapshot of all rows handed over so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn enqueued(&self) -> Vec<OutboxRow> {
        self.enqueued.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutboxBroker for RecordingBroker {
    fn version(&self) -> &str {
        &self.version
    }

    async fn enqueue(&self, rows: Vec<OutboxRow>) -> Result<(), DomainError> {
        if self.fail {
            return Err(DomainError::Infrastructure("broker unavailable".into()));
        }
        self.enqueued.lock().unwrap().extend(rows);
        Ok(())
    }
}
