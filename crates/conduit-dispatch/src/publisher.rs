//! In-process domain event publication.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::error::DomainError;
use conduit_core::event::DomainEvent;

use crate::unit_of_work::UnitOfWork;

/// Reacts to one domain event type inside the publishing transaction.
///
/// Handlers may load and mutate further aggregates; whatever those raise is
/// published in the next drain pass.
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    /// Event type this handler subscribes to.
    fn event_type(&self) -> &str;

    /// Handles one event.
    async fn handle(&self, event: &DomainEvent, uow: &mut UnitOfWork<'_>) -> Result<(), DomainError>;
}

/// Registry of domain event handlers, keyed by event type.
///
/// Handlers of the same type run in registration order.
#[derive(Default)]
pub struct DomainEventPublisher {
    handlers: HashMap<String, Vec<Arc<dyn DomainEventHandler>>>,
}

impl std::fmt::Debug for DomainEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("DomainEventPublisher")
            .field("event_types", &types)
            .finish()
    }
}

impl DomainEventPublisher {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to its event type.
    pub fn register(&mut self, handler: Arc<dyn DomainEventHandler>) {
        self.handlers
            .entry(handler.event_type().to_owned())
            .or_default()
            .push(handler);
    }

    /// Handlers subscribed to `event_type`.
    #[must_use]
    pub fn handlers_for(&self, event_type: &str) -> &[Arc<dyn DomainEventHandler>] {
        self.handlers.get(event_type).map_or(&[], Vec::as_slice)
    }

    /// Total number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }
}
