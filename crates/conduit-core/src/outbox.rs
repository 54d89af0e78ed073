//! Outbox row model and the broker seam.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Delivery status of an outbox row.
///
/// Lifecycle: `Scheduled → (Delayed | Queued) → Succeeded | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutboxStatus {
    /// Appended, waiting for the broker to pick it up.
    Scheduled,
    /// Appended with a delay instant; not deliverable before `expires_at`.
    Delayed,
    /// Handed to the broker for delivery.
    Queued,
    /// Delivered.
    Succeeded,
    /// Delivery failed; eligible for the retry scan.
    Failed,
}

impl OutboxStatus {
    /// Returns the status name stored in the `status_name` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::Delayed => "Delayed",
            Self::Queued => "Queued",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(Self::Scheduled),
            "Delayed" => Ok(Self::Delayed),
            "Queued" => Ok(Self::Queued),
            "Succeeded" => Ok(Self::Succeeded),
            "Failed" => Ok(Self::Failed),
            other => Err(DomainError::Infrastructure(format!(
                "unknown outbox status: {other}"
            ))),
        }
    }
}

/// A durable message row written in the same transaction as business data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRow {
    /// Row identifier (time-ordered).
    pub id: Uuid,
    /// Message name (topic).
    pub name: String,
    /// Serialized message envelope.
    pub content: serde_json::Value,
    /// Delivery attempts so far.
    pub retries: i32,
    /// When the row was appended.
    pub added: DateTime<Utc>,
    /// For delayed rows, the earliest delivery instant.
    pub expires_at: Option<DateTime<Utc>>,
    /// Current delivery status.
    pub status: OutboxStatus,
    /// Version tag of the publishing application.
    pub version: String,
}

/// Parameters of the retry scan run by the broker's relay process.
#[derive(Debug, Clone)]
pub struct RetryScan {
    /// Rows with this many retries or more are left alone.
    pub max_retries: i32,
    /// Rows younger than this are still owned by the request that wrote them.
    pub grace: Duration,
    /// Only rows written under this version tag are selected.
    pub version: String,
    /// Maximum rows returned per scan.
    pub batch_size: usize,
}

impl RetryScan {
    /// Default grace window before a row becomes eligible.
    pub const DEFAULT_GRACE_MINUTES: i64 = 4;
    /// Default number of rows per scan.
    pub const DEFAULT_BATCH_SIZE: usize = 200;
    /// Default retry ceiling.
    pub const DEFAULT_MAX_RETRIES: i32 = 50;

    /// Creates a scan for `version` with the default limits.
    #[must_use]
    pub fn for_version(version: impl Into<String>) -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            grace: Duration::minutes(Self::DEFAULT_GRACE_MINUTES),
            version: version.into(),
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    /// Returns `true` when `row` must be picked up by a scan running at `now`.
    #[must_use]
    pub fn selects(&self, row: &OutboxRow, now: DateTime<Utc>) -> bool {
        matches!(row.status, OutboxStatus::Failed | OutboxStatus::Scheduled)
            && row.retries < self.max_retries
            && row.added < now - self.grace
            && row.version == self.version
    }
}

/// The message broker that takes ownership of committed outbox rows.
///
/// Delivery and retries are the broker's business; the pipeline only hands
/// over rows after the transaction that wrote them has committed.
#[async_trait]
pub trait OutboxBroker: Send + Sync {
    /// Version tag stamped on every row this application appends.
    fn version(&self) -> &str;

    /// Takes over freshly committed rows for delivery.
    async fn enqueue(&self, rows: Vec<OutboxRow>) -> Result<(), DomainError>;
}
