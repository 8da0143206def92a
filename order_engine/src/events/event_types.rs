use serde::{Deserialize, Serialize};

use crate::db_types::{Operator, Order, OrderStatusType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    /// The order as it stands after the transition.
    pub order: Order,
    pub from: OrderStatusType,
    pub to: OrderStatusType,
    pub operator: Operator,
}

impl OrderStatusChangedEvent {
    pub fn new(order: Order, from: OrderStatusType, operator: Operator) -> Self {
        let to = order.status;
        Self { order, from, to, operator }
    }
}

/// A product's stock moved. `delta` is negative for sales and positive for restorations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChangedEvent {
    pub product_id: i64,
    pub delta: i64,
}

impl StockChangedEvent {
    pub fn new(product_id: i64, delta: i64) -> Self {
        Self { product_id, delta }
    }
}
