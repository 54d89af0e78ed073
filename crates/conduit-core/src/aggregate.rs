//! Aggregate root abstraction.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{DomainEvent, IntegrationEvent};

/// Events raised by an aggregate that have not been staged yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingEvents {
    /// Events to publish in-process.
    pub domain: Vec<DomainEvent>,
    /// Events to append to the outbox.
    pub integration: Vec<IntegrationEvent>,
}

impl PendingEvents {
    /// Returns `true` when neither list holds an event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domain.is_empty() && self.integration.is_empty()
    }
}

/// Identity, version and bookkeeping shared by every aggregate.
///
/// Pending events are never serialized with the aggregate state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateMeta {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Stored version; `0` until the aggregate is first persisted.
    pub version: i64,
    /// When the aggregate was first persisted.
    pub created_at: Option<DateTime<Utc>>,
    /// When the aggregate was last persisted.
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pending: PendingEvents,
}

impl AggregateMeta {
    /// Creates bookkeeping for a new, unsaved aggregate.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            created_at: None,
            updated_at: None,
            pending: PendingEvents::default(),
        }
    }

    /// Returns the events raised since the last staging.
    #[must_use]
    pub fn pending(&self) -> &PendingEvents {
        &self.pending
    }
}

/// Trait for aggregate roots persisted as state snapshots.
///
/// The storage engine keeps the serialized state and the version; the
/// aggregate records events that the dispatch pipeline stages and drains.
pub trait AggregateRoot: Serialize + DeserializeOwned + Send + Sync {
    /// Type name stored next to the state (used for routing and lookups).
    const AGGREGATE_TYPE: &'static str;

    /// Returns the aggregate bookkeeping.
    fn meta(&self) -> &AggregateMeta;

    /// Returns the aggregate bookkeeping mutably.
    fn meta_mut(&mut self) -> &mut AggregateMeta;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid {
        self.meta().id
    }

    /// Returns the current stored version.
    fn version(&self) -> i64 {
        self.meta().version
    }

    /// Records a domain event to be published when the request drains.
    fn record_domain_event(&mut self, event: DomainEvent) {
        self.meta_mut().pending.domain.push(event);
    }

    /// Records an integration event to be appended to the outbox.
    fn record_integration_event(&mut self, event: IntegrationEvent) {
        self.meta_mut().pending.integration.push(event);
    }

    /// Removes and returns every pending event.
    fn take_pending_events(&mut self) -> PendingEvents {
        std::mem::take(&mut self.meta_mut().pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Serialize, Deserialize)]
    struct Ledger {
        meta: AggregateMeta,
        balance: i64,
    }

    impl AggregateRoot for Ledger {
        const AGGREGATE_TYPE: &'static str = "ledger";

        fn meta(&self) -> &AggregateMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut AggregateMeta {
            &mut self.meta
        }
    }

    #[test]
    fn test_pending_events_are_not_serialized() {
        // Arrange
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let id = Uuid::new_v4();
        let mut ledger = Ledger {
            meta: AggregateMeta::new(id),
            balance: 10,
        };
        ledger.record_domain_event(DomainEvent::new("ledger.credited", id, &10, now).unwrap());

        // Act
        let state = serde_json::to_value(&ledger).unwrap();
        let restored: Ledger = serde_json::from_value(state).unwrap();

        // Assert
        assert_eq!(ledger.meta().pending().domain.len(), 1);
        assert!(restored.meta().pending().is_empty());
        assert_eq!(restored.balance, 10);
        assert_eq!(restored.aggregate_id(), id);
    }

    #[test]
    fn test_take_pending_events_empties_the_aggregate() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let id = Uuid::new_v4();
        let mut ledger = Ledger {
            meta: AggregateMeta::new(id),
            balance: 0,
        };
        ledger.record_domain_event(DomainEvent::new("a", id, &1, now).unwrap());
        ledger.record_integration_event(IntegrationEvent::new("b", id, &2, now).unwrap());

        let taken = ledger.take_pending_events();

        assert_eq!(taken.domain.len(), 1);
        assert_eq!(taken.integration.len(), 1);
        assert!(ledger.meta().pending().is_empty());
        assert_eq!(ledger.version(), 0);
    }
}
