//! Domain and integration event types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// The two kinds of events an aggregate can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Published in-process, inside the transaction that raised it.
    Domain,
    /// Routed to other services through the outbox.
    Integration,
}

impl EventKind {
    /// Prefix used when building ambient scope keys.
    #[must_use]
    pub fn key_prefix(self) -> &'static str {
        match self {
            Self::Domain => "DomainEvent",
            Self::Integration => "IntegrationEvent",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key_prefix())
    }
}

/// A business fact recorded by an aggregate and published in-process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Type name used to route the event to its handlers.
    pub event_type: String,
    /// Aggregate that raised the event.
    pub aggregate_id: Uuid,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Free-form metadata (correlation ids, actor, ...).
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Creates a domain event with a fresh identifier and empty metadata.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the payload cannot be
    /// serialized to JSON.
    pub fn new<P: Serialize>(
        event_type: impl Into<String>,
        aggregate_id: Uuid,
        payload: &P,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            aggregate_id,
            payload: to_payload(payload)?,
            metadata: BTreeMap::new(),
            occurred_at,
        })
    }

    /// Attaches a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Deserializes the payload into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the payload does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, DomainError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            DomainError::Infrastructure(format!(
                "payload of {} does not deserialize: {e}",
                self.event_type
            ))
        })
    }
}

/// A message for other services, appended to the outbox at drain time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Routing name of the message (topic).
    pub name: String,
    /// Optional name the consumer should reply to.
    pub callback_name: Option<String>,
    /// Aggregate that raised the event.
    pub aggregate_id: Uuid,
    /// Tenant the message belongs to. Stamped at drain time.
    pub tenant_id: Option<String>,
    /// Application the message originates from. Stamped at drain time.
    pub app_id: Option<String>,
    /// Root trace id of the originating request. Stamped at drain time.
    pub root_trace_id: Option<String>,
    /// When set, the message must not be delivered before this instant.
    pub delay_until: Option<DateTime<Utc>>,
    /// Serialized message payload.
    pub payload: serde_json::Value,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl IntegrationEvent {
    /// Creates an integration event for immediate delivery.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the payload cannot be
    /// serialized to JSON.
    pub fn new<P: Serialize>(
        name: impl Into<String>,
        aggregate_id: Uuid,
        payload: &P,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            name: name.into(),
            callback_name: None,
            aggregate_id,
            tenant_id: None,
            app_id: None,
            root_trace_id: None,
            delay_until: None,
            payload: to_payload(payload)?,
            occurred_at,
        })
    }

    /// Sets the reply name.
    #[must_use]
    pub fn with_callback(mut self, callback_name: impl Into<String>) -> Self {
        self.callback_name = Some(callback_name.into());
        self
    }

    /// Defers delivery until `at`.
    #[must_use]
    pub fn delayed_until(mut self, at: DateTime<Utc>) -> Self {
        self.delay_until = Some(at);
        self
    }

    /// Returns `true` when delivery is deferred past `now`.
    #[must_use]
    pub fn is_delayed(&self, now: DateTime<Utc>) -> bool {
        self.delay_until.is_some_and(|at| at > now)
    }
}

fn to_payload<P: Serialize>(payload: &P) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(payload)
        .map_err(|e| DomainError::Infrastructure(format!("event payload serialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Shipped {
        parcel: String,
    }

    #[test]
    fn test_event_kind_key_prefixes() {
        assert_eq!(EventKind::Domain.to_string(), "DomainEvent");
        assert_eq!(EventKind::Integration.key_prefix(), "IntegrationEvent");
    }

    #[test]
    fn test_domain_event_payload_as_returns_typed_payload() {
        // Arrange
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let payload = Shipped {
            parcel: "p-1".into(),
        };

        // Act
        let event = DomainEvent::new("shipping.shipped", Uuid::new_v4(), &payload, now)
            .unwrap()
            .with_metadata("actor", serde_json::json!("ops"));

        // Assert
        assert_eq!(event.payload_as::<Shipped>().unwrap(), payload);
        assert_eq!(event.metadata["actor"], "ops");
    }

    #[test]
    fn test_payload_as_wrong_type_is_infrastructure_error() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let event = DomainEvent::new("x", Uuid::new_v4(), &42, now).unwrap();

        let result = event.payload_as::<Shipped>();

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }

    #[test]
    fn test_integration_event_delay_is_relative_to_now() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let immediate = IntegrationEvent::new("orders.placed", Uuid::new_v4(), &1, now).unwrap();
        let later = immediate.clone().delayed_until(now + Duration::hours(1));
        let past = immediate.clone().delayed_until(now - Duration::minutes(1));

        assert!(!immediate.is_delayed(now));
        assert!(later.is_delayed(now));
        assert!(!past.is_delayed(now));
    }
}
