use chrono::{DateTime, Utc};

use crate::{
    db::traits::{OrderChange, OrderEngineError, UpdateOutcome, VersionedRecordStore},
    db_types::{Cart, NewOrder, Order, OrderItem, OrderNo, OrderStatusLog},
};

#[allow(async_fn_in_trait)]
pub trait OrderManagement: VersionedRecordStore<Order> {
    /// Creates the order and everything that goes with it, as one storage transaction:
    ///
    /// * the order row and its item snapshot are inserted,
    /// * stock is deducted for every item, failing with `InsufficientStock` if any product runs short,
    /// * the cart is rewritten as `cart` (normally: without the ordered lines), conditioned on
    ///   `expected_cart_version`.
    ///
    /// If any versioned write loses a race the whole transaction is rolled back and `Conflict` is returned. If the
    /// order number is already taken, `DuplicateOrderNo` is returned.
    async fn place_order(
        &self,
        order: &NewOrder,
        cart: &Cart,
        expected_cart_version: i64,
    ) -> Result<UpdateOutcome<Order>, OrderEngineError>;

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, OrderEngineError> {
        self.fetch_record(id).await
    }

    async fn fetch_order_by_no(&self, order_no: &OrderNo) -> Result<Option<Order>, OrderEngineError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderEngineError>;

    /// The audit trail for the order, oldest first.
    async fn fetch_status_log(&self, order_id: i64) -> Result<Vec<OrderStatusLog>, OrderEngineError>;

    /// Applies a versioned order write, its audit row and any stock restoration as one storage transaction.
    /// Nothing is written unless all of it is.
    async fn apply_order_change(&self, change: &OrderChange) -> Result<UpdateOutcome<Order>, OrderEngineError>;

    /// Orders still `pending` whose `payment_status` is anything but `paid` (unpaid, or a failed attempt), created
    /// before `cutoff`.
    async fn fetch_unpaid_orders_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, OrderEngineError>;
}
