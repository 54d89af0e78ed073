//! Commands for the Orders context.

use chrono::{DateTime, Utc};
use conduit_core::request::Request;
use uuid::Uuid;

/// Command to create a stock item.
#[derive(Debug, Clone)]
pub struct CreateStockItem {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The new stock item's id.
    pub stock_item_id: Uuid,
    /// Stock keeping unit.
    pub sku: String,
    /// Initial quantity on hand.
    pub quantity: u32,
}

impl Request for CreateStockItem {
    type Response = Uuid;
    const TRANSACTIONAL: bool = true;

    fn request_type(&self) -> &'static str {
        "orders.create_stock_item"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to place an order.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The new order's id.
    pub order_id: Uuid,
    /// The stock item ordered.
    pub stock_item_id: Uuid,
    /// Units ordered.
    pub quantity: u32,
    /// Hold the "order placed" message back until this instant.
    pub notify_at: Option<DateTime<Utc>>,
}

impl Request for PlaceOrder {
    type Response = Uuid;
    const TRANSACTIONAL: bool = true;

    fn request_type(&self) -> &'static str {
        "orders.place_order"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to cancel an order.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order to cancel.
    pub order_id: Uuid,
}

impl Request for CancelOrder {
    type Response = ();
    const TRANSACTIONAL: bool = true;

    fn request_type(&self) -> &'static str {
        "orders.cancel_order"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
