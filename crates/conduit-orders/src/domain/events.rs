//! Domain and integration events for the Orders context.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain event type: a stock item was created.
pub const STOCK_ITEM_CREATED: &str = "orders.stock_item_created";
/// Domain event type: an order was placed.
pub const ORDER_PLACED: &str = "orders.order_placed";
/// Domain event type: stock was reserved for an order.
pub const STOCK_RESERVED: &str = "orders.stock_reserved";
/// Domain event type: an order was confirmed.
pub const ORDER_CONFIRMED: &str = "orders.order_confirmed";
/// Domain event type: an order was cancelled.
pub const ORDER_CANCELLED: &str = "orders.order_cancelled";
/// Domain event type: reserved stock was released.
pub const STOCK_RELEASED: &str = "orders.stock_released";

/// Integration message: an order was placed.
pub const ORDER_PLACED_MESSAGE: &str = "orders.placed";
/// Integration message: an order was confirmed.
pub const ORDER_CONFIRMED_MESSAGE: &str = "orders.confirmed";
/// Integration message: an order was cancelled.
pub const ORDER_CANCELLED_MESSAGE: &str = "orders.cancelled";

/// Emitted when a stock item is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItemCreated {
    /// The stock item.
    pub stock_item_id: Uuid,
    /// Stock keeping unit.
    pub sku: String,
    /// Initial quantity on hand.
    pub quantity: u32,
}

/// Emitted when an order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    /// The order.
    pub order_id: Uuid,
    /// The stock item ordered.
    pub stock_item_id: Uuid,
    /// Units ordered.
    pub quantity: u32,
}

/// Emitted when stock is reserved for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    /// The stock item.
    pub stock_item_id: Uuid,
    /// The order the units are reserved for.
    pub order_id: Uuid,
    /// Units reserved.
    pub quantity: u32,
    /// Units still available afterwards.
    pub available: u32,
}

/// Emitted when an order is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    /// The order.
    pub order_id: Uuid,
}

/// Emitted when an order is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    /// The order.
    pub order_id: Uuid,
    /// The stock item the order held.
    pub stock_item_id: Uuid,
    /// Units to give back.
    pub quantity: u32,
    /// Whether stock had been reserved.
    pub was_confirmed: bool,
}

/// Emitted when reserved units go back on the shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    /// The stock item.
    pub stock_item_id: Uuid,
    /// The order that held the units.
    pub order_id: Uuid,
    /// Units released.
    pub quantity: u32,
}
