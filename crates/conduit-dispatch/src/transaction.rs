//! Transactions owned by the dispatcher.

use std::sync::Arc;

use conduit_core::error::DomainError;
use conduit_core::outbox::{OutboxBroker, OutboxRow};
use conduit_core::storage::StorageTransaction;
use tracing::{debug, warn};

/// A storage transaction whose outbox rows are handed to a broker once the
/// storage commit succeeds.
///
/// Business writes and outbox rows commit atomically because both go through
/// the same storage transaction. The hand-off happens after commit; if it
/// fails the rows are still durable and the broker's retry scan picks them up.
pub struct JointTransaction {
    storage: Box<dyn StorageTransaction>,
    broker: Arc<dyn OutboxBroker>,
    appended: Vec<OutboxRow>,
}

impl JointTransaction {
    /// Joins `storage` with `broker`.
    #[must_use]
    pub fn new(storage: Box<dyn StorageTransaction>, broker: Arc<dyn OutboxBroker>) -> Self {
        Self {
            storage,
            broker,
            appended: Vec::new(),
        }
    }

    /// Version tag of the joined broker.
    #[must_use]
    pub fn broker_version(&self) -> &str {
        self.broker.version()
    }

    /// Rows appended so far.
    #[must_use]
    pub fn appended(&self) -> &[OutboxRow] {
        &self.appended
    }

    /// Appends `row` through the storage transaction.
    ///
    /// # Errors
    ///
    /// Returns any storage error.
    pub async fn append_outbox(&mut self, row: OutboxRow) -> Result<(), DomainError> {
        self.storage.append_outbox(&row).await?;
        self.appended.push(row);
        Ok(())
    }

    /// Commits storage, then hands the appended rows to the broker.
    ///
    /// Returns the number of rows handed over.
    ///
    /// # Errors
    ///
    /// Returns the storage commit error. A failed hand-off is logged only.
    pub async fn commit(self) -> Result<usize, DomainError> {
        let Self {
            storage,
            broker,
            appended,
        } = self;
        storage.commit().await?;

        if appended.is_empty() {
            return Ok(0);
        }
        let count = appended.len();
        match broker.enqueue(appended).await {
            Ok(()) => {
                debug!(rows = count, "outbox rows handed to broker");
                Ok(count)
            }
            Err(err) => {
                warn!(rows = count, error = %err.detail(), "broker hand-off failed; rows left for the retry scan");
                Ok(0)
            }
        }
    }

    /// Discards storage writes and appended rows.
    ///
    /// # Errors
    ///
    /// Returns the storage rollback error.
    pub async fn rollback(self) -> Result<(), DomainError> {
        self.storage.rollback().await
    }
}

/// The transaction a transactional request runs in.
pub enum TransactionHandle {
    /// Storage only; integration events are not appended.
    Plain(Box<dyn StorageTransaction>),
    /// Storage joined with an outbox broker.
    Joint(JointTransaction),
}

impl TransactionHandle {
    /// The underlying storage transaction.
    pub fn storage(&mut self) -> &mut dyn StorageTransaction {
        match self {
            Self::Plain(tx) => tx.as_mut(),
            Self::Joint(joint) => joint.storage.as_mut(),
        }
    }

    /// The joint transaction, when a broker is attached.
    pub fn joint(&mut self) -> Option<&mut JointTransaction> {
        match self {
            Self::Plain(_) => None,
            Self::Joint(joint) => Some(joint),
        }
    }

    /// Commits the transaction. Returns the number of outbox rows handed to
    /// the broker.
    ///
    /// # Errors
    ///
    /// Returns the storage commit error.
    pub async fn commit(self) -> Result<usize, DomainError> {
        match self {
            Self::Plain(tx) => tx.commit().await.map(|()| 0),
            Self::Joint(joint) => joint.commit().await,
        }
    }

    /// Rolls the transaction back.
    ///
    /// # Errors
    ///
    /// Returns the storage rollback error.
    pub async fn rollback(self) -> Result<(), DomainError> {
        match self {
            Self::Plain(tx) => tx.rollback().await,
            Self::Joint(joint) => joint.rollback().await,
        }
    }
}
