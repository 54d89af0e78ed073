//! The unit of work handed to request and event handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use conduit_core::aggregate::{AggregateMeta, AggregateRoot};
use conduit_core::clock::Clock;
use conduit_core::error::DomainError;
use conduit_core::scope::RequestScope;
use conduit_core::storage::{AggregateRecord, StorageEngine};
use uuid::Uuid;

use crate::transaction::TransactionHandle;

/// Typed access to the request's storage target and scope.
///
/// Inside a transactional request every read and write goes through the open
/// transaction and written aggregates have their events staged in the
/// request scope. Outside one, reads hit committed state and writes are
/// rejected.
pub struct UnitOfWork<'s> {
    scope: &'s mut RequestScope,
    storage: Arc<dyn StorageEngine>,
    tx: Option<TransactionHandle>,
    clock: Arc<dyn Clock>,
}

impl<'s> UnitOfWork<'s> {
    /// A unit of work without a transaction.
    #[must_use]
    pub fn read_only(
        scope: &'s mut RequestScope,
        storage: Arc<dyn StorageEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scope,
            storage,
            tx: None,
            clock,
        }
    }

    /// A unit of work running inside `tx`.
    #[must_use]
    pub fn transactional(
        scope: &'s mut RequestScope,
        storage: Arc<dyn StorageEngine>,
        tx: TransactionHandle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scope,
            storage,
            tx: Some(tx),
            clock,
        }
    }

    /// Whether writes are allowed.
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        self.tx.is_some()
    }

    /// The request scope.
    #[must_use]
    pub fn scope(&self) -> &RequestScope {
        &*self.scope
    }

    /// The request scope, mutably.
    pub fn scope_mut(&mut self) -> &mut RequestScope {
        &mut *self.scope
    }

    /// Current time according to the dispatcher's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The dispatcher's clock.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Description of the storage target, for logs.
    #[must_use]
    pub fn storage_description(&self) -> String {
        self.storage.describe()
    }

    /// Loads an aggregate, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the stored state does not
    /// deserialize, or any storage error.
    pub async fn find<A: AggregateRoot>(&mut self, id: Uuid) -> Result<Option<A>, DomainError> {
        let record = match self.tx.as_mut() {
            Some(tx) => tx.storage().find_aggregate(A::AGGREGATE_TYPE, id).await?,
            None => self.storage.find_aggregate(A::AGGREGATE_TYPE, id).await?,
        };
        record.map(|record| hydrate(&record)).transpose()
    }

    /// Loads an aggregate that must exist.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` when it does not, or any error
    /// raised by [`UnitOfWork::find`].
    pub async fn load<A: AggregateRoot>(&mut self, id: Uuid) -> Result<A, DomainError> {
        self.find(id).await?.ok_or(DomainError::AggregateNotFound(id))
    }

    /// Persists a new aggregate at version 1 and stages its events.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the aggregate was already
    /// persisted or its id is taken, or `DomainError::Infrastructure` outside
    /// a transaction.
    pub async fn insert<A: AggregateRoot>(&mut self, aggregate: &mut A) -> Result<(), DomainError> {
        if aggregate.version() != 0 {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: aggregate.aggregate_id(),
                expected: 0,
                actual: aggregate.version(),
            });
        }
        let now = self.clock.now();
        let previous = aggregate.meta().clone();
        {
            let meta = aggregate.meta_mut();
            meta.version = 1;
            meta.created_at = Some(now);
            meta.updated_at = Some(now);
        }

        let result = match dehydrate(aggregate, now) {
            Ok(record) => match self.transaction(A::AGGREGATE_TYPE) {
                Ok(tx) => tx.storage().insert_aggregate(&record).await,
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            restore(aggregate, previous);
            return Err(err);
        }

        self.stage(aggregate);
        Ok(())
    }

    /// Persists a mutation of a loaded aggregate, bumping its version by one,
    /// and stages its events.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` when the stored version
    /// moved since the aggregate was loaded, or `DomainError::Infrastructure`
    /// outside a transaction.
    pub async fn update<A: AggregateRoot>(&mut self, aggregate: &mut A) -> Result<(), DomainError> {
        let now = self.clock.now();
        let previous = aggregate.meta().clone();
        let expected = previous.version;
        {
            let meta = aggregate.meta_mut();
            meta.version = expected + 1;
            meta.updated_at = Some(now);
        }

        let result = match dehydrate(aggregate, now) {
            Ok(record) => match self.transaction(A::AGGREGATE_TYPE) {
                Ok(tx) => tx.storage().update_aggregate(&record, expected).await,
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            restore(aggregate, previous);
            return Err(err);
        }

        self.stage(aggregate);
        Ok(())
    }

    /// Deletes a loaded aggregate and stages its events.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` when the stored version
    /// moved since the aggregate was loaded, or `DomainError::Infrastructure`
    /// outside a transaction.
    pub async fn delete<A: AggregateRoot>(&mut self, aggregate: &mut A) -> Result<(), DomainError> {
        let id = aggregate.aggregate_id();
        let version = aggregate.version();
        self.transaction(A::AGGREGATE_TYPE)?
            .storage()
            .delete_aggregate(A::AGGREGATE_TYPE, id, version)
            .await?;
        self.stage(aggregate);
        Ok(())
    }

    /// Stages the aggregate's pending events without writing it. Returns the
    /// number of newly staged events.
    pub fn stage<A: AggregateRoot>(&mut self, aggregate: &mut A) -> usize {
        self.scope.events_mut().stage(aggregate)
    }

    pub(crate) fn transaction_mut(&mut self) -> Option<&mut TransactionHandle> {
        self.tx.as_mut()
    }

    pub(crate) fn into_transaction(self) -> Option<TransactionHandle> {
        self.tx
    }

    fn transaction(&mut self, aggregate_type: &str) -> Result<&mut TransactionHandle, DomainError> {
        self.tx.as_mut().ok_or_else(|| {
            DomainError::Infrastructure(format!(
                "cannot write {aggregate_type} outside a transactional request"
            ))
        })
    }
}

fn hydrate<A: AggregateRoot>(record: &AggregateRecord) -> Result<A, DomainError> {
    let mut aggregate: A = serde_json::from_value(record.state.clone()).map_err(|e| {
        DomainError::Infrastructure(format!(
            "{} {} state deserialization failed: {e}",
            record.aggregate_type, record.id
        ))
    })?;
    let meta = aggregate.meta_mut();
    meta.id = record.id;
    meta.version = record.version;
    meta.created_at = Some(record.created_at);
    meta.updated_at = Some(record.updated_at);
    Ok(aggregate)
}

fn dehydrate<A: AggregateRoot>(aggregate: &A, now: DateTime<Utc>) -> Result<AggregateRecord, DomainError> {
    let meta = aggregate.meta();
    let state = serde_json::to_value(aggregate).map_err(|e| {
        DomainError::Infrastructure(format!(
            "{} {} state serialization failed: {e}",
            A::AGGREGATE_TYPE,
            meta.id
        ))
    })?;
    Ok(AggregateRecord {
        aggregate_type: A::AGGREGATE_TYPE.to_owned(),
        id: meta.id,
        version: meta.version,
        state,
        created_at: meta.created_at.unwrap_or(now),
        updated_at: meta.updated_at.unwrap_or(now),
    })
}

fn restore<A: AggregateRoot>(aggregate: &mut A, previous: AggregateMeta) {
    let meta = aggregate.meta_mut();
    meta.version = previous.version;
    meta.created_at = previous.created_at;
    meta.updated_at = previous.updated_at;
}
