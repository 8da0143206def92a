//! The order lifecycle.
//!
//! ```text
//! pending ──► paid ──► shipped ──► delivered ──► completed
//!    │          │
//!    ▼          ▼
//! cancelled  refund_requested ──► refunded
//! ```
//!
//! Every edge names the operator types that may take it. A request for an edge that is not in the table is an
//! [`OrderEngineError::InvalidTransition`], whoever asks. A request for a legal edge by the wrong kind of operator,
//! or by a user who does not own the order, is [`OrderEngineError::Forbidden`].
use std::collections::BTreeMap;

use crate::{
    db::traits::{OrderChange, OrderEngineError, StockMovement},
    db_types::{NewStatusLog, Operator, OperatorType, Order, OrderItem, OrderStatusType, PaymentStatus},
};

use OperatorType::{Admin, System, User};
use OrderStatusType::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatusType,
    pub to: OrderStatusType,
    pub allowed: &'static [OperatorType],
}

pub const TRANSITIONS: [Transition; 7] = [
    Transition { from: Pending, to: Paid, allowed: &[System, Admin] },
    Transition { from: Pending, to: Cancelled, allowed: &[User, Admin, System] },
    Transition { from: Paid, to: Shipped, allowed: &[Admin, System] },
    Transition { from: Shipped, to: Delivered, allowed: &[Admin, System] },
    Transition { from: Delivered, to: Completed, allowed: &[User, Admin, System] },
    Transition { from: Paid, to: RefundRequested, allowed: &[User, Admin] },
    Transition { from: RefundRequested, to: Refunded, allowed: &[Admin, System] },
];

impl Transition {
    /// Taking this edge hands the order's reserved stock back.
    pub fn restores_stock(&self) -> bool {
        matches!(self.to, Cancelled | Refunded)
    }
}

pub fn find_transition(from: OrderStatusType, to: OrderStatusType) -> Option<&'static Transition> {
    TRANSITIONS.iter().find(|t| t.from == from && t.to == to)
}

/// The states an order in `from` may move to, for any operator.
pub fn next_states(from: OrderStatusType) -> Vec<OrderStatusType> {
    TRANSITIONS.iter().filter(|t| t.from == from).map(|t| t.to).collect()
}

/// Checks that `operator` may move `order` to `to`, and returns the edge.
pub fn check_transition(
    order: &Order,
    to: OrderStatusType,
    operator: &Operator,
) -> Result<&'static Transition, OrderEngineError> {
    let edge =
        find_transition(order.status, to).ok_or(OrderEngineError::InvalidTransition { from: order.status, to })?;
    if !edge.allowed.contains(&operator.kind) {
        return Err(OrderEngineError::Forbidden(format!(
            "{} operators may not move an order from {} to {to}",
            operator.kind, order.status
        )));
    }
    if operator.kind == User && operator.id != order.user_id {
        return Err(OrderEngineError::Forbidden(format!("Order {} does not belong to {}", order.order_no, operator.id)));
    }
    Ok(edge)
}

/// Builds the complete write for a status transition: the new order state, its audit row, and the stock to hand
/// back if the edge releases the order's reservation and it has not been released already.
pub fn plan_transition(
    order: &Order,
    items: &[OrderItem],
    to: OrderStatusType,
    operator: &Operator,
    reason: Option<String>,
) -> Result<OrderChange, OrderEngineError> {
    let edge = check_transition(order, to, operator)?;
    let mut candidate = order.clone();
    candidate.status = to;
    if to == Paid {
        candidate.payment_status = PaymentStatus::Paid;
    }
    let mut restock = Vec::new();
    if edge.restores_stock() && !order.stock_restored {
        restock = stock_movements(items);
        candidate.stock_restored = true;
    }
    let log = NewStatusLog { order_id: order.id, from_status: order.status, to_status: to, operator: operator.clone(), reason };
    Ok(OrderChange { candidate, expected_version: order.version, log: Some(log), restock })
}

/// Quantities per product. Lines for different SKUs of one product are combined.
pub fn stock_movements(items: &[OrderItem]) -> Vec<StockMovement> {
    let mut totals = BTreeMap::<i64, i64>::new();
    for item in items {
        *totals.entry(item.product_id).or_default() += item.quantity;
    }
    totals.into_iter().map(|(product_id, quantity)| StockMovement { product_id, quantity }).collect()
}
