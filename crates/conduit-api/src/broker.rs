//! Outbox broker used by the HTTP host.

use async_trait::async_trait;
use conduit_core::error::DomainError;
use conduit_core::outbox::{OutboxBroker, OutboxRow};
use tracing::info;

/// Takes over committed outbox rows by logging them.
///
/// Delivery belongs to the relay process that runs the retry scan over the
/// outbox table; the rows stay durable there whatever this broker does.
#[derive(Debug, Clone)]
pub struct LogRelayBroker {
    version: String,
}

impl LogRelayBroker {
    /// Creates a broker stamping rows with `version`.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

#[async_trait]
impl OutboxBroker for LogRelayBroker {
    fn version(&self) -> &str {
        &self.version
    }

    async fn enqueue(&self, rows: Vec<OutboxRow>) -> Result<(), DomainError> {
        for row in &rows {
            info!(
                outbox_id = %row.id,
                name = %row.name,
                status = %row.status,
                expires_at = ?row.expires_at,
                "outbox row handed over"
            );
        }
        Ok(())
    }
}
