//! Test storage — in-memory `StorageEngine` implementations for tests.
//!
//! `InMemoryStorage` behaves like a small transactional database: writes made
//! through a transaction are invisible to everyone else until commit, commit
//! re-checks optimistic versions against what other transactions committed in
//! the meantime, and a transaction dropped without commit leaves no trace.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conduit_core::error::DomainError;
use conduit_core::outbox::{OutboxRow, RetryScan};
use conduit_core::storage::{AggregateRecord, OutboxStore, StorageEngine, StorageTransaction};
use uuid::Uuid;

type RecordKey = (String, Uuid);

#[derive(Debug, Default)]
struct StoreState {
    aggregates: HashMap<RecordKey, AggregateRecord>,
    outbox: Vec<OutboxRow>,
}

#[derive(Debug, Default)]
struct Counters {
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
    abandoned: AtomicUsize,
}

/// An in-memory storage engine with snapshot-free optimistic transactions.
#[derive(Debug, Clone)]
pub struct InMemoryStorage {
    name: String,
    state: Arc<Mutex<StoreState>>,
    counters: Arc<Counters>,
    fail_commits: bool,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    /// Create an empty storage engine.
    #[must_use]
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create an empty storage engine described as `name` in logs.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(StoreState::default())),
            counters: Arc::new(Counters::default()),
            fail_commits: false,
        }
    }

    /// Create a storage engine whose commits always fail (writes are dropped).
    #[must_use]
    pub fn failing_commits() -> Self {
        Self {
            fail_commits: true,
            ..Self::new()
        }
    }

    /// Insert a committed record directly, bypassing transactions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed(&self, record: AggregateRecord) {
        let key = (record.aggregate_type.clone(), record.id);
        self.state.lock().unwrap().aggregates.insert(key, record);
    }

    /// Overwrite the committed version of a record, simulating a concurrent
    /// writer that committed in between.
    ///
    /// # Panics
    ///
    /// Panics if the record does not exist or the mutex is poisoned.
    pub fn force_version(&self, aggregate_type: &str, id: Uuid, version: i64) {
        let mut state = self.state.lock().unwrap();
        let record = state
            .aggregates
            .get_mut(&(aggregate_type.to_owned(), id))
            .expect("force_version on a missing record");
        record.version = version;
    }

    /// Returns the committed record, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn record(&self, aggregate_type: &str, id: Uuid) -> Option<AggregateRecord> {
        self.state
            .lock()
            .unwrap()
            .aggregates
            .get(&(aggregate_type.to_owned(), id))
            .cloned()
    }

    /// Returns the number of committed aggregate records.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn aggregate_count(&self) -> usize {
        self.state.lock().unwrap().aggregates.len()
    }

    /// Returns a snapshot of every committed outbox row, in append order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn outbox_rows(&self) -> Vec<OutboxRow> {
        self.state.lock().unwrap().outbox.clone()
    }

    /// Number of transactions opened.
    pub fn begun(&self) -> usize {
        self.counters.begun.load(Ordering::SeqCst)
    }

    /// Number of transactions committed.
    pub fn committed(&self) -> usize {
        self.counters.committed.load(Ordering::SeqCst)
    }

    /// Number of transactions explicitly rolled back.
    pub fn rolled_back(&self) -> usize {
        self.counters.rolled_back.load(Ordering::SeqCst)
    }

    /// Number of transactions dropped without commit or rollback.
    pub fn abandoned(&self) -> usize {
        self.counters.abandoned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageEngine for InMemoryStorage {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn begin(&self) -> Result<Box<dyn StorageTransaction>, DomainError> {
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryTransaction {
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
            fail_commit: self.fail_commits,
            writes: HashMap::new(),
            outbox: Vec::new(),
            finished: false,
        }))
    }

    async fn find_aggregate(
        &self,
        aggregate_type: &str,
        id: Uuid,
    ) -> Result<Option<AggregateRecord>, DomainError> {
        Ok(self.record(aggregate_type, id))
    }
}

#[async_trait]
impl OutboxStore for InMemoryStorage {
    async fn fetch_retryable(
        &self,
        scan: &RetryScan,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxRow>, DomainError> {
        let mut rows: Vec<OutboxRow> = self
            .state
            .lock()
            .unwrap()
            .outbox
            .iter()
            .filter(|row| scan.selects(row, now))
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.added);
        rows.truncate(scan.batch_size);
        Ok(rows)
    }
}

#[derive(Debug)]
struct PendingWrite {
    /// Committed version when this transaction first wrote the key.
    base: Option<i64>,
    /// `None` marks a delete.
    record: Option<AggregateRecord>,
}

struct InMemoryTransaction {
    state: Arc<Mutex<StoreState>>,
    counters: Arc<Counters>,
    fail_commit: bool,
    writes: HashMap<RecordKey, PendingWrite>,
    outbox: Vec<OutboxRow>,
    finished: bool,
}

impl InMemoryTransaction {
    fn committed_version(&self, key: &RecordKey) -> Option<i64> {
        self.state
            .lock()
            .unwrap()
            .aggregates
            .get(key)
            .map(|record| record.version)
    }

    fn view(&self, key: &RecordKey) -> Option<AggregateRecord> {
        match self.writes.get(key) {
            Some(write) => write.record.clone(),
            None => self.state.lock().unwrap().aggregates.get(key).cloned(),
        }
    }

    fn write(&mut self, key: RecordKey, record: Option<AggregateRecord>) {
        let base = match self.writes.get(&key) {
            Some(existing) => existing.base,
            None => self.committed_version(&key),
        };
        self.writes.insert(key, PendingWrite { base, record });
    }

    fn check_version(
        &self,
        key: &RecordKey,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        match self.view(key) {
            None => Err(DomainError::AggregateNotFound(key.1)),
            Some(current) if current.version != expected_version => {
                Err(DomainError::ConcurrencyConflict {
                    aggregate_id: key.1,
                    expected: expected_version,
                    actual: current.version,
                })
            }
            Some(_) => Ok(()),
        }
    }
}

#[async_trait]
impl StorageTransaction for InMemoryTransaction {
    async fn find_aggregate(
        &mut self,
        aggregate_type: &str,
        id: Uuid,
    ) -> Result<Option<AggregateRecord>, DomainError> {
        Ok(self.view(&(aggregate_type.to_owned(), id)))
    }

    async fn insert_aggregate(&mut self, record: &AggregateRecord) -> Result<(), DomainError> {
        let key = (record.aggregate_type.clone(), record.id);
        if let Some(existing) = self.view(&key) {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: record.id,
                expected: 0,
                actual: existing.version,
            });
        }
        self.write(key, Some(record.clone()));
        Ok(())
    }

    async fn update_aggregate(
        &mut self,
        record: &AggregateRecord,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        let key = (record.aggregate_type.clone(), record.id);
        self.check_version(&key, expected_version)?;
        self.write(key, Some(record.clone()));
        Ok(())
    }

    async fn delete_aggregate(
        &mut self,
        aggregate_type: &str,
        id: Uuid,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        let key = (aggregate_type.to_owned(), id);
        self.check_version(&key, expected_version)?;
        self.write(key, None);
        Ok(())
    }

    async fn append_outbox(&mut self, row: &OutboxRow) -> Result<(), DomainError> {
        self.outbox.push(row.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), DomainError> {
        self.finished = true;
        if self.fail_commit {
            return Err(DomainError::Infrastructure("commit failed".into()));
        }

        let mut state = self.state.lock().unwrap();
        for (key, write) in &self.writes {
            let current = state.aggregates.get(key).map(|record| record.version);
            if current != write.base {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id: key.1,
                    expected: write.base.unwrap_or(0),
                    actual: current.unwrap_or(0),
                });
            }
        }
        for (key, write) in self.writes.drain() {
            match write.record {
                Some(record) => {
                    state.aggregates.insert(key, record);
                }
                None => {
                    state.aggregates.remove(&key);
                }
            }
        }
        state.outbox.append(&mut self.outbox);
        drop(state);

        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), DomainError> {
        self.finished = true;
        self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.counters.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A storage engine that refuses every connection. Useful for testing
/// infrastructure error paths.
#[derive(Debug)]
pub struct FailingStorage;

#[async_trait]
impl StorageEngine for FailingStorage {
    fn describe(&self) -> String {
        "failing".to_owned()
    }

    async fn begin(&self) -> Result<Box<dyn StorageTransaction>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn find_aggregate(
        &self,
        _aggregate_type: &str,
        _id: Uuid,
    ) -> Result<Option<AggregateRecord>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
