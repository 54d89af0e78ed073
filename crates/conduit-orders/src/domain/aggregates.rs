//! Aggregate roots for the Orders context.

use chrono::{DateTime, Utc};
use conduit_core::aggregate::{AggregateMeta, AggregateRoot};
use conduit_core::clock::Clock;
use conduit_core::error::DomainError;
use conduit_core::event::{DomainEvent, IntegrationEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{
    ORDER_CANCELLED, ORDER_CANCELLED_MESSAGE, ORDER_CONFIRMED, ORDER_CONFIRMED_MESSAGE,
    ORDER_PLACED, ORDER_PLACED_MESSAGE, OrderCancelled, OrderConfirmed, OrderPlaced,
    STOCK_ITEM_CREATED, STOCK_RELEASED, STOCK_RESERVED, StockItemCreated, StockReleased,
    StockReserved,
};

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Placed, stock not yet reserved.
    Pending,
    /// Stock reserved.
    Confirmed,
    /// Cancelled; any reserved stock was released.
    Cancelled,
}

/// The aggregate root for an order.
#[derive(Debug, Serialize, Deserialize)]
pub struct Order {
    meta: AggregateMeta,
    /// The stock item ordered.
    pub(crate) stock_item_id: Uuid,
    /// Units ordered.
    pub(crate) quantity: u32,
    /// Current status.
    pub(crate) status: OrderStatus,
}

impl AggregateRoot for Order {
    const AGGREGATE_TYPE: &'static str = "order";

    fn meta(&self) -> &AggregateMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut AggregateMeta {
        &mut self.meta
    }
}

impl Order {
    /// Places a new order, producing `OrderPlaced` and the "orders.placed"
    /// message (held back until `notify_at` when given).
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `quantity` is zero.
    pub fn place(
        id: Uuid,
        stock_item_id: Uuid,
        quantity: u32,
        notify_at: Option<DateTime<Utc>>,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::Validation(
                "an order needs at least one unit".into(),
            ));
        }
        let mut order = Self {
            meta: AggregateMeta::new(id),
            stock_item_id,
            quantity,
            status: OrderStatus::Pending,
        };
        let payload = OrderPlaced {
            order_id: id,
            stock_item_id,
            quantity,
        };
        let now = clock.now();
        order.record_domain_event(DomainEvent::new(ORDER_PLACED, id, &payload, now)?);
        let mut message = IntegrationEvent::new(ORDER_PLACED_MESSAGE, id, &payload, now)?;
        if let Some(at) = notify_at {
            message = message.delayed_until(at);
        }
        order.record_integration_event(message);
        Ok(order)
    }

    /// Confirms a pending order once its stock is reserved.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless the order is pending.
    pub fn confirm(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        if self.status != OrderStatus::Pending {
            return Err(DomainError::Validation(format!(
                "order {} is {:?} and cannot be confirmed",
                self.meta.id, self.status
            )));
        }
        self.status = OrderStatus::Confirmed;
        let payload = OrderConfirmed {
            order_id: self.meta.id,
        };
        let now = clock.now();
        self.record_domain_event(DomainEvent::new(ORDER_CONFIRMED, self.meta.id, &payload, now)?);
        self.record_integration_event(IntegrationEvent::new(
            ORDER_CONFIRMED_MESSAGE,
            self.meta.id,
            &payload,
            now,
        )?);
        Ok(())
    }

    /// Cancels the order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if it is already cancelled.
    pub fn cancel(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        if self.status == OrderStatus::Cancelled {
            return Err(DomainError::Validation(format!(
                "order {} is already cancelled",
                self.meta.id
            )));
        }
        let was_confirmed = self.status == OrderStatus::Confirmed;
        self.status = OrderStatus::Cancelled;
        let payload = OrderCancelled {
            order_id: self.meta.id,
            stock_item_id: self.stock_item_id,
            quantity: self.quantity,
            was_confirmed,
        };
        let now = clock.now();
        self.record_domain_event(DomainEvent::new(ORDER_CANCELLED, self.meta.id, &payload, now)?);
        self.record_integration_event(IntegrationEvent::new(
            ORDER_CANCELLED_MESSAGE,
            self.meta.id,
            &payload,
            now,
        )?);
        Ok(())
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> OrderStatus {
        self.status
    }
}

/// The aggregate root for a stock item.
#[derive(Debug, Serialize, Deserialize)]
pub struct StockItem {
    meta: AggregateMeta,
    /// Stock keeping unit.
    pub(crate) sku: String,
    /// Units free to reserve.
    pub(crate) available: u32,
    /// Units held by confirmed orders.
    pub(crate) reserved: u32,
}

impl AggregateRoot for StockItem {
    const AGGREGATE_TYPE: &'static str = "stock_item";

    fn meta(&self) -> &AggregateMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut AggregateMeta {
        &mut self.meta
    }
}

impl StockItem {
    /// Creates a stock item with `quantity` units on hand.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `sku` is blank.
    pub fn create(id: Uuid, sku: &str, quantity: u32, clock: &dyn Clock) -> Result<Self, DomainError> {
        let sku = sku.trim();
        if sku.is_empty() {
            return Err(DomainError::Validation("sku must not be blank".into()));
        }
        let mut item = Self {
            meta: AggregateMeta::new(id),
            sku: sku.to_owned(),
            available: quantity,
            reserved: 0,
        };
        let payload = StockItemCreated {
            stock_item_id: id,
            sku: item.sku.clone(),
            quantity,
        };
        item.record_domain_event(DomainEvent::new(STOCK_ITEM_CREATED, id, &payload, clock.now())?);
        Ok(item)
    }

    /// Reserves `quantity` units for `order_id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when fewer units are available.
    pub fn reserve(&mut self, order_id: Uuid, quantity: u32, clock: &dyn Clock) -> Result<(), DomainError> {
        if quantity > self.available {
            return Err(DomainError::Validation(format!(
                "insufficient stock for {}: requested {quantity}, available {}",
                self.sku, self.available
            )));
        }
        self.available -= quantity;
        self.reserved += quantity;
        let payload = StockReserved {
            stock_item_id: self.meta.id,
            order_id,
            quantity,
            available: self.available,
        };
        self.record_domain_event(DomainEvent::new(STOCK_RESERVED, self.meta.id, &payload, clock.now())?);
        Ok(())
    }

    /// Puts `quantity` reserved units back on the shelf.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when fewer units are reserved.
    pub fn release(&mut self, order_id: Uuid, quantity: u32, clock: &dyn Clock) -> Result<(), DomainError> {
        if quantity > self.reserved {
            return Err(DomainError::Validation(format!(
                "cannot release {quantity} units of {}: only {} reserved",
                self.sku, self.reserved
            )));
        }
        self.reserved -= quantity;
        self.available += quantity;
        let payload = StockReleased {
            stock_item_id: self.meta.id,
            order_id,
            quantity,
        };
        self.record_domain_event(DomainEvent::new(STOCK_RELEASED, self.meta.id, &payload, clock.now())?);
        Ok(())
    }

    /// Units free to reserve.
    #[must_use]
    pub fn available(&self) -> u32 {
        self.available
    }
}
