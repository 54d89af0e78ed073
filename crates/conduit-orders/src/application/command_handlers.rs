//! Command handlers for the Orders context.
//!
//! Each handler loads or creates an aggregate, executes the command and
//! saves the aggregate through the unit of work. The events it raises are
//! drained by the dispatcher after the handler returns.

use async_trait::async_trait;
use conduit_core::error::DomainError;
use conduit_dispatch::{RequestHandler, UnitOfWork};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::aggregates::{Order, StockItem};
use crate::domain::commands::{CancelOrder, CreateStockItem, PlaceOrder};

/// Handles `CreateStockItem`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CreateStockItemHandler;

#[async_trait]
impl RequestHandler<CreateStockItem> for CreateStockItemHandler {
    #[instrument(skip_all, fields(stock_item_id = %command.stock_item_id))]
    async fn handle(&self, command: &CreateStockItem, uow: &mut UnitOfWork<'_>) -> Result<Uuid, DomainError> {
        let mut item = StockItem::create(command.stock_item_id, &command.sku, command.quantity, uow.clock())?;
        uow.insert(&mut item).await?;
        Ok(command.stock_item_id)
    }
}

/// Handles `PlaceOrder`. Stock reservation and confirmation follow from the
/// `OrderPlaced` cascade.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceOrderHandler;

#[async_trait]
impl RequestHandler<PlaceOrder> for PlaceOrderHandler {
    #[instrument(skip_all, fields(order_id = %command.order_id))]
    async fn handle(&self, command: &PlaceOrder, uow: &mut UnitOfWork<'_>) -> Result<Uuid, DomainError> {
        let mut order = Order::place(
            command.order_id,
            command.stock_item_id,
            command.quantity,
            command.notify_at,
            uow.clock(),
        )?;
        uow.insert(&mut order).await?;
        Ok(command.order_id)
    }
}

/// Handles `CancelOrder`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CancelOrderHandler;

#[async_trait]
impl RequestHandler<CancelOrder> for CancelOrderHandler {
    #[instrument(skip_all, fields(order_id = %command.order_id))]
    async fn handle(&self, command: &CancelOrder, uow: &mut UnitOfWork<'_>) -> Result<(), DomainError> {
        let mut order: Order = uow.load(command.order_id).await?;
        order.cancel(uow.clock())?;
        uow.update(&mut order).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use conduit_core::outbox::OutboxStatus;
    use conduit_core::scope::RequestScope;
    use conduit_dispatch::{DomainEventPublisher, OutboxEnvelope, TransactionalDispatcher};
    use conduit_test_support::{FixedClock, InMemoryStorage, RecordingBroker};

    use super::*;
    use crate::application::register_event_handlers;
    use crate::domain::aggregates::OrderStatus;
    use crate::domain::events::{ORDER_CONFIRMED_MESSAGE, ORDER_PLACED_MESSAGE};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn dispatcher(storage: &InMemoryStorage, broker: Arc<RecordingBroker>) -> TransactionalDispatcher {
        let mut publisher = DomainEventPublisher::new();
        register_event_handlers(&mut publisher);
        TransactionalDispatcher::new(Arc::new(storage.clone()), Arc::new(publisher))
            .with_broker(broker)
            .with_clock(Arc::new(FixedClock(now())))
    }

    async fn create_stock(dispatcher: &TransactionalDispatcher, quantity: u32) -> Uuid {
        let command = CreateStockItem {
            correlation_id: Uuid::new_v4(),
            stock_item_id: Uuid::new_v4(),
            sku: "WIDGET-1".into(),
            quantity,
        };
        dispatcher
            .send(&command, &CreateStockItemHandler, &mut RequestScope::new())
            .await
            .unwrap()
            .response
    }

    fn place(stock_item_id: Uuid, quantity: u32) -> PlaceOrder {
        PlaceOrder {
            correlation_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            stock_item_id,
            quantity,
            notify_at: None,
        }
    }

    #[tokio::test]
    async fn test_place_order_cascades_to_reservation_and_confirmation() {
        // Arrange
        let storage = InMemoryStorage::new();
        let broker = Arc::new(RecordingBroker::new("v1"));
        let dispatcher = dispatcher(&storage, broker.clone());
        let stock_item_id = create_stock(&dispatcher, 10).await;
        let command = place(stock_item_id, 4);
        let mut scope = RequestScope::new().with_tenant("acme").with_app("storefront");

        // Act
        let dispatched = dispatcher.send(&command, &PlaceOrderHandler, &mut scope).await.unwrap();

        // Assert
        // OrderPlaced -> StockReserved -> OrderConfirmed
        assert_eq!(dispatched.report.domain_passes, 3);
        assert_eq!(dispatched.report.domain_events_published, 3);
        let order = storage.record("order", command.order_id).unwrap();
        assert_eq!(order.state["status"], "Confirmed");
        assert_eq!(order.version, 2);
        let stock = storage.record("stock_item", stock_item_id).unwrap();
        assert_eq!(stock.state["available"], 6);
        assert_eq!(stock.state["reserved"], 4);

        let names: Vec<String> = storage.outbox_rows().into_iter().map(|row| row.name).collect();
        assert_eq!(names, vec![ORDER_PLACED_MESSAGE, ORDER_CONFIRMED_MESSAGE]);
        assert_eq!(broker.enqueued().len(), 2);
        let envelope = OutboxEnvelope::from_row(&storage.outbox_rows()[0]).unwrap();
        assert_eq!(envelope.headers.tenant_id.as_deref(), Some("acme"));
        assert_eq!(envelope.value["quantity"], 4);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back_the_whole_order() {
        // Arrange
        let storage = InMemoryStorage::new();
        let broker = Arc::new(RecordingBroker::new("v1"));
        let dispatcher = dispatcher(&storage, broker.clone());
        let stock_item_id = create_stock(&dispatcher, 2).await;
        let outbox_before = storage.outbox_rows().len();
        let command = place(stock_item_id, 3);

        // Act
        let result = dispatcher
            .send(&command, &PlaceOrderHandler, &mut RequestScope::new())
            .await;

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(ref msg)) if msg.contains("insufficient stock")));
        assert!(storage.record("order", command.order_id).is_none());
        assert_eq!(storage.record("stock_item", stock_item_id).unwrap().state["available"], 2);
        assert_eq!(storage.outbox_rows().len(), outbox_before);
        assert!(broker.enqueued().is_empty());
    }

    #[tokio::test]
    async fn test_delayed_notification_is_appended_as_delayed_row() {
        // Arrange
        let storage = InMemoryStorage::new();
        let dispatcher = dispatcher(&storage, Arc::new(RecordingBroker::new("v1")));
        let stock_item_id = create_stock(&dispatcher, 1).await;
        let mut command = place(stock_item_id, 1);
        command.notify_at = Some(now() + Duration::hours(1));

        // Act
        dispatcher
            .send(&command, &PlaceOrderHandler, &mut RequestScope::new())
            .await
            .unwrap();

        // Assert
        let rows = storage.outbox_rows();
        let placed = rows.iter().find(|row| row.name == ORDER_PLACED_MESSAGE).unwrap();
        assert_eq!(placed.status, OutboxStatus::Delayed);
        assert_eq!(placed.expires_at, Some(now() + Duration::hours(1)));
        let confirmed = rows.iter().find(|row| row.name == ORDER_CONFIRMED_MESSAGE).unwrap();
        assert_eq!(confirmed.status, OutboxStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_cancel_releases_reserved_stock() {
        // Arrange
        let storage = InMemoryStorage::new();
        let dispatcher = dispatcher(&storage, Arc::new(RecordingBroker::new("v1")));
        let stock_item_id = create_stock(&dispatcher, 5).await;
        let command = place(stock_item_id, 2);
        dispatcher
            .send(&command, &PlaceOrderHandler, &mut RequestScope::new())
            .await
            .unwrap();

        // Act
        let cancel = CancelOrder {
            correlation_id: Uuid::new_v4(),
            order_id: command.order_id,
        };
        dispatcher
            .send(&cancel, &CancelOrderHandler, &mut RequestScope::new())
            .await
            .unwrap();

        // Assert
        let order = storage.record("order", command.order_id).unwrap();
        let order: Order = serde_json::from_value(order.state).unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        let stock = storage.record("stock_item", stock_item_id).unwrap();
        assert_eq!(stock.state["available"], 5);
        assert_eq!(stock.state["reserved"], 0);
    }

    #[tokio::test]
    async fn test_cancel_unknown_order_is_not_found() {
        let storage = InMemoryStorage::new();
        let dispatcher = dispatcher(&storage, Arc::new(RecordingBroker::new("v1")));
        let cancel = CancelOrder {
            correlation_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
        };

        let result = dispatcher
            .send(&cancel, &CancelOrderHandler, &mut RequestScope::new())
            .await;

        assert!(matches!(result, Err(DomainError::AggregateNotFound(id)) if id == cancel.order_id));
    }
}
