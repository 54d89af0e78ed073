//! Storage engine abstraction.
//!
//! The pipeline only needs "begin/commit/rollback + row CRUD" from a storage
//! engine. Concrete engines live in their own crates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;
use crate::outbox::{OutboxRow, RetryScan};

/// Stored representation of an aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRecord {
    /// Aggregate type name.
    pub aggregate_type: String,
    /// Aggregate identifier.
    pub id: Uuid,
    /// Optimistic-concurrency version.
    pub version: i64,
    /// Serialized aggregate state.
    pub state: serde_json::Value,
    /// Timestamp of the first write.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the latest write.
    pub updated_at: DateTime<Utc>,
}

/// An open storage transaction.
///
/// Dropping a transaction without calling [`StorageTransaction::commit`]
/// must discard every write made through it.
#[async_trait]
pub trait StorageTransaction: Send {
    /// Loads an aggregate record, seeing this transaction's own writes.
    async fn find_aggregate(
        &mut self,
        aggregate_type: &str,
        id: Uuid,
    ) -> Result<Option<AggregateRecord>, DomainError>;

    /// Inserts a new aggregate record.
    ///
    /// Fails with `DomainError::ConcurrencyConflict` (expected version `0`)
    /// when a record with the same identity already exists.
    async fn insert_aggregate(&mut self, record: &AggregateRecord) -> Result<(), DomainError>;

    /// Replaces an aggregate record whose stored version equals
    /// `expected_version`.
    ///
    /// Fails with `DomainError::ConcurrencyConflict` on a version mismatch and
    /// with `DomainError::AggregateNotFound` when no record exists.
    async fn update_aggregate(
        &mut self,
        record: &AggregateRecord,
        expected_version: i64,
    ) -> Result<(), DomainError>;

    /// Deletes an aggregate record whose stored version equals
    /// `expected_version`.
    async fn delete_aggregate(
        &mut self,
        aggregate_type: &str,
        id: Uuid,
        expected_version: i64,
    ) -> Result<(), DomainError>;

    /// Appends an outbox row.
    async fn append_outbox(&mut self, row: &OutboxRow) -> Result<(), DomainError>;

    /// Commits every write made through this transaction.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    /// Discards every write made through this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}

/// A storage target able to open transactions.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Short description of the target, used in logs.
    fn describe(&self) -> String;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Box<dyn StorageTransaction>, DomainError>;

    /// Loads a committed aggregate record outside of any transaction.
    async fn find_aggregate(
        &self,
        aggregate_type: &str,
        id: Uuid,
    ) -> Result<Option<AggregateRecord>, DomainError>;
}

/// Read access to outbox rows for the broker's relay process.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns the rows a retry scan running at `now` must pick up, oldest
    /// first, at most `scan.batch_size` of them.
    async fn fetch_retryable(
        &self,
        scan: &RetryScan,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxRow>, DomainError>;
}
