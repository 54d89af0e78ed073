//! Outbox appending.
//!
//! An integration event becomes one outbox row whose content is a message
//! envelope: routing headers plus the event payload.

use chrono::{DateTime, Utc};
use conduit_core::error::DomainError;
use conduit_core::event::IntegrationEvent;
use conduit_core::outbox::{OutboxRow, OutboxStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transaction::JointTransaction;

/// Routing headers of an outbox message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EnvelopeHeaders {
    /// Integration event id.
    pub msg_id: String,
    /// Message name (topic).
    pub msg_name: String,
    /// Reply topic, if any.
    pub callback_name: Option<String>,
    /// Originating tenant.
    pub tenant_id: Option<String>,
    /// Originating application.
    pub app_id: Option<String>,
    /// Root trace id of the originating request.
    pub trace_id: Option<String>,
    /// Earliest delivery instant of a delayed message.
    pub delay_time: Option<DateTime<Utc>>,
    /// When the row was appended.
    pub sent_time: DateTime<Utc>,
}

/// Serialized content of an outbox row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEnvelope {
    /// Routing headers.
    pub headers: EnvelopeHeaders,
    /// Event payload.
    pub value: serde_json::Value,
}

impl OutboxEnvelope {
    /// Reads an envelope back from a row's content.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the content is not an envelope.
    pub fn from_row(row: &OutboxRow) -> Result<Self, DomainError> {
        serde_json::from_value(row.content.clone())
            .map_err(|e| DomainError::Infrastructure(format!("malformed outbox envelope: {e}")))
    }
}

/// Turns integration events into outbox rows inside the active transaction.
#[derive(Debug, Clone)]
pub struct OutboxAppender {
    version: String,
}

impl OutboxAppender {
    /// Creates an appender stamping rows with the broker's `version` tag.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    /// Builds the row for `event` as of `now`.
    ///
    /// An event delayed past `now` yields a `Delayed` row that expires at the
    /// delay instant; anything else is `Scheduled` for immediate delivery.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the envelope cannot be
    /// serialized.
    pub fn build_row(&self, event: &IntegrationEvent, now: DateTime<Utc>) -> Result<OutboxRow, DomainError> {
        let delayed = event.is_delayed(now);
        let envelope = OutboxEnvelope {
            headers: EnvelopeHeaders {
                msg_id: event.event_id.to_string(),
                msg_name: event.name.clone(),
                callback_name: event.callback_name.clone(),
                tenant_id: event.tenant_id.clone(),
                app_id: event.app_id.clone(),
                trace_id: event.root_trace_id.clone(),
                delay_time: event.delay_until,
                sent_time: now,
            },
            value: event.payload.clone(),
        };
        let content = serde_json::to_value(&envelope)
            .map_err(|e| DomainError::Infrastructure(format!("outbox envelope serialization failed: {e}")))?;

        Ok(OutboxRow {
            id: Uuid::now_v7(),
            name: event.name.clone(),
            content,
            retries: 0,
            added: now,
            expires_at: if delayed { event.delay_until } else { None },
            status: if delayed {
                OutboxStatus::Delayed
            } else {
                OutboxStatus::Scheduled
            },
            version: self.version.clone(),
        })
    }

    /// Appends `event` through `tx`.
    ///
    /// # Errors
    ///
    /// Returns any serialization or storage error.
    pub async fn append(
        &self,
        tx: &mut JointTransaction,
        event: &IntegrationEvent,
        now: DateTime<Utc>,
    ) -> Result<OutboxRow, DomainError> {
        let row = self.build_row(event, now)?;
        tx.append_outbox(row.clone()).await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn event() -> IntegrationEvent {
        let mut event = IntegrationEvent::new(
            "orders.placed",
            Uuid::new_v4(),
            &serde_json::json!({ "total": 42 }),
            now(),
        )
        .unwrap()
        .with_callback("orders.placed.ack");
        event.tenant_id = Some("acme".into());
        event.app_id = Some("storefront".into());
        event.root_trace_id = Some("trace-1".into());
        event
    }

    #[test]
    fn test_immediate_event_becomes_scheduled_row() {
        // Arrange
        let appender = OutboxAppender::new("v1");

        // Act
        let row = appender.build_row(&event(), now()).unwrap();

        // Assert
        assert_eq!(row.status, OutboxStatus::Scheduled);
        assert_eq!(row.expires_at, None);
        assert_eq!(row.retries, 0);
        assert_eq!(row.version, "v1");
        assert_eq!(row.name, "orders.placed");
    }

    #[test]
    fn test_delayed_event_becomes_delayed_row() {
        let appender = OutboxAppender::new("v1");
        let at = now() + Duration::hours(1);

        let row = appender.build_row(&event().delayed_until(at), now()).unwrap();

        assert_eq!(row.status, OutboxStatus::Delayed);
        assert_eq!(row.expires_at, Some(at));
    }

    #[test]
    fn test_delay_in_the_past_is_delivered_immediately() {
        let appender = OutboxAppender::new("v1");

        let row = appender
            .build_row(&event().delayed_until(now() - Duration::minutes(1)), now())
            .unwrap();

        assert_eq!(row.status, OutboxStatus::Scheduled);
        assert_eq!(row.expires_at, None);
    }

    #[test]
    fn test_envelope_carries_routing_headers_and_payload() {
        // Arrange
        let appender = OutboxAppender::new("v1");
        let event = event();

        // Act
        let row = appender.build_row(&event, now()).unwrap();

        // Assert
        assert_eq!(row.content["headers"]["msg-id"], event.event_id.to_string());
        assert_eq!(row.content["headers"]["callback-name"], "orders.placed.ack");
        assert_eq!(row.content["headers"]["tenant-id"], "acme");
        assert_eq!(row.content["headers"]["trace-id"], "trace-1");
        let envelope = OutboxEnvelope::from_row(&row).unwrap();
        assert_eq!(envelope.headers.app_id.as_deref(), Some("storefront"));
        assert_eq!(envelope.headers.sent_time, now());
        assert_eq!(envelope.value["total"], 42);
    }
}
