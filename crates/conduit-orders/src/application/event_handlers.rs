//! Domain event handlers for the Orders context.
//!
//! These run inside the transaction of the request that raised the event.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::error::DomainError;
use conduit_core::event::DomainEvent;
use conduit_dispatch::{DomainEventHandler, DomainEventPublisher, UnitOfWork};
use tracing::debug;

use crate::domain::aggregates::{Order, StockItem};
use crate::domain::events::{
    ORDER_CANCELLED, ORDER_PLACED, OrderCancelled, OrderPlaced, STOCK_RESERVED, StockReserved,
};

/// Reserves stock for a freshly placed order.
#[derive(Debug, Default)]
pub struct ReserveStockOnOrderPlaced;

#[async_trait]
impl DomainEventHandler for ReserveStockOnOrderPlaced {
    fn event_type(&self) -> &str {
        ORDER_PLACED
    }

    async fn handle(&self, event: &DomainEvent, uow: &mut UnitOfWork<'_>) -> Result<(), DomainError> {
        let placed: OrderPlaced = event.payload_as()?;
        let mut item: StockItem = uow.load(placed.stock_item_id).await?;
        item.reserve(placed.order_id, placed.quantity, uow.clock())?;
        uow.update(&mut item).await
    }
}

/// Confirms the order stock was reserved for.
#[derive(Debug, Default)]
pub struct ConfirmOrderOnStockReserved;

#[async_trait]
impl DomainEventHandler for ConfirmOrderOnStockReserved {
    fn event_type(&self) -> &str {
        STOCK_RESERVED
    }

    async fn handle(&self, event: &DomainEvent, uow: &mut UnitOfWork<'_>) -> Result<(), DomainError> {
        let reserved: StockReserved = event.payload_as()?;
        let mut order: Order = uow.load(reserved.order_id).await?;
        order.confirm(uow.clock())?;
        uow.update(&mut order).await
    }
}

/// Gives reserved units back when a confirmed order is cancelled.
#[derive(Debug, Default)]
pub struct ReleaseStockOnOrderCancelled;

#[async_trait]
impl DomainEventHandler for ReleaseStockOnOrderCancelled {
    fn event_type(&self) -> &str {
        ORDER_CANCELLED
    }

    async fn handle(&self, event: &DomainEvent, uow: &mut UnitOfWork<'_>) -> Result<(), DomainError> {
        let cancelled: OrderCancelled = event.payload_as()?;
        if !cancelled.was_confirmed {
            debug!(order_id = %cancelled.order_id, "nothing reserved; no stock to release");
            return Ok(());
        }
        let mut item: StockItem = uow.load(cancelled.stock_item_id).await?;
        item.release(cancelled.order_id, cancelled.quantity, uow.clock())?;
        uow.update(&mut item).await
    }
}

/// Subscribes every Orders handler to `publisher`.
pub fn register_event_handlers(publisher: &mut DomainEventPublisher) {
    publisher.register(Arc::new(ReserveStockOnOrderPlaced));
    publisher.register(Arc::new(ConfirmOrderOnStockReserved));
    publisher.register(Arc::new(ReleaseStockOnOrderCancelled));
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use conduit_core::aggregate::AggregateRoot;
    use conduit_core::scope::RequestScope;
    use conduit_core::storage::StorageEngine;
    use conduit_dispatch::TransactionHandle;
    use conduit_test_support::{FixedClock, InMemoryStorage};
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_register_event_handlers_subscribes_the_cascade() {
        let mut publisher = DomainEventPublisher::new();

        register_event_handlers(&mut publisher);

        assert_eq!(publisher.handler_count(), 3);
        assert_eq!(publisher.handlers_for(ORDER_PLACED).len(), 1);
        assert_eq!(publisher.handlers_for(STOCK_RESERVED).len(), 1);
        assert_eq!(publisher.handlers_for(ORDER_CANCELLED).len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_of_pending_order_leaves_stock_alone() {
        // Arrange
        let storage = InMemoryStorage::new();
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap());
        let mut scope = RequestScope::new();
        let tx = TransactionHandle::Plain(storage.begin().await.unwrap());
        let mut uow = UnitOfWork::transactional(&mut scope, Arc::new(storage.clone()), tx, Arc::new(clock));
        let mut order = Order::place(Uuid::new_v4(), Uuid::new_v4(), 1, None, &clock).unwrap();
        order.cancel(&clock).unwrap();
        let events = order.take_pending_events();
        let cancelled = events
            .domain
            .iter()
            .find(|event| event.event_type == ORDER_CANCELLED)
            .unwrap();

        // Act
        let result = ReleaseStockOnOrderCancelled.handle(cancelled, &mut uow).await;

        // Assert
        assert!(result.is_ok());
        assert!(uow.scope().events().is_empty());
    }
}
