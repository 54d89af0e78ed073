//! Query handlers for the Orders context.
//!
//! Queries are non-transactional requests: the dispatcher runs them without
//! a transaction and without draining events.

use async_trait::async_trait;
use conduit_core::aggregate::AggregateRoot;
use conduit_core::error::DomainError;
use conduit_core::request::Request;
use conduit_dispatch::{RequestHandler, UnitOfWork};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus, StockItem};

/// Read-only view of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    /// The order identifier.
    pub order_id: Uuid,
    /// The stock item ordered.
    pub stock_item_id: Uuid,
    /// Units ordered.
    pub quantity: u32,
    /// Current status.
    pub status: OrderStatus,
    /// Stored version.
    pub version: i64,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.meta().id,
            stock_item_id: order.stock_item_id,
            quantity: order.quantity,
            status: order.status,
            version: order.meta().version,
        }
    }
}

/// Read-only view of a stock item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockItemView {
    /// The stock item identifier.
    pub stock_item_id: Uuid,
    /// Stock keeping unit.
    pub sku: String,
    /// Units free to reserve.
    pub available: u32,
    /// Units held by confirmed orders.
    pub reserved: u32,
    /// Stored version.
    pub version: i64,
}

impl From<&StockItem> for StockItemView {
    fn from(item: &StockItem) -> Self {
        Self {
            stock_item_id: item.meta().id,
            sku: item.sku.clone(),
            available: item.available,
            reserved: item.reserved,
            version: item.meta().version,
        }
    }
}

/// Query for a single order.
#[derive(Debug, Clone)]
pub struct GetOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order to look up.
    pub order_id: Uuid,
}

impl Request for GetOrder {
    type Response = OrderView;

    fn request_type(&self) -> &'static str {
        "orders.get_order"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Query for a single stock item.
#[derive(Debug, Clone)]
pub struct GetStockItem {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The stock item to look up.
    pub stock_item_id: Uuid,
}

impl Request for GetStockItem {
    type Response = StockItemView;

    fn request_type(&self) -> &'static str {
        "orders.get_stock_item"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Handles `GetOrder`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GetOrderHandler;

#[async_trait]
impl RequestHandler<GetOrder> for GetOrderHandler {
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if no order has the ID.
    async fn handle(&self, query: &GetOrder, uow: &mut UnitOfWork<'_>) -> Result<OrderView, DomainError> {
        let order: Order = uow.load(query.order_id).await?;
        Ok(OrderView::from(&order))
    }
}

/// Handles `GetStockItem`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GetStockItemHandler;

#[async_trait]
impl RequestHandler<GetStockItem> for GetStockItemHandler {
    async fn handle(
        &self,
        query: &GetStockItem,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<StockItemView, DomainError> {
        let item: StockItem = uow.load(query.stock_item_id).await?;
        Ok(StockItemView::from(&item))
    }
}
