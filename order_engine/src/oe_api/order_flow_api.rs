use std::{collections::HashSet, fmt::Debug, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    config::{EngineConfig, DEFAULT_CHECKOUT_LOCK_TTL_MS, DEFAULT_NODE_ID},
    db::traits::{KeyLockProvider, LockToken, OrderEngineDatabase, OrderEngineError, UpdateOutcome},
    db_types::{
        Cart,
        NewOrder,
        NewOrderItem,
        NewPayment,
        Operator,
        OperatorType,
        Order,
        OrderNo,
        OrderStatusLog,
        OrderStatusType,
        Payment,
        PaymentState,
        PaymentStatus,
        Product,
        ShippingInfo,
    },
    events::{EventProducers, OrderCreatedEvent, OrderStatusChangedEvent, StockChangedEvent},
    helpers::OrderNoGenerator,
    locks::{checkout_lock_key, with_lock},
    oe_api::order_objects::OrderDetails,
    retry::RetryPolicy,
    state_machine::{plan_transition, TRANSITIONS},
};

pub const PAYMENT_TIMEOUT_REASON: &str = "payment timeout";

/// `OrderFlowApi` is the primary API for the order lifecycle: checkout, status transitions, payment initiation and
/// the expiry of unpaid orders.
pub struct OrderFlowApi<B, L> {
    db: B,
    lock: L,
    retry: RetryPolicy,
    order_nos: Arc<OrderNoGenerator>,
    checkout_lock_ttl: Duration,
    producers: EventProducers,
}

impl<B, L> Debug for OrderFlowApi<B, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi (node {})", self.order_nos.node_id())
    }
}

impl<B, L> OrderFlowApi<B, L> {
    pub fn new(db: B, lock: L, producers: EventProducers) -> Self {
        Self {
            db,
            lock,
            retry: RetryPolicy::default(),
            order_nos: Arc::new(OrderNoGenerator::new(DEFAULT_NODE_ID)),
            checkout_lock_ttl: Duration::from_millis(DEFAULT_CHECKOUT_LOCK_TTL_MS),
            producers,
        }
    }

    pub fn from_config(db: B, lock: L, producers: EventProducers, config: &EngineConfig) -> Self {
        Self::new(db, lock, producers)
            .with_retry_policy(config.retry)
            .with_node_id(config.node_id)
            .with_checkout_lock_ttl(config.checkout_lock_ttl)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_node_id(mut self, node_id: u16) -> Self {
        self.order_nos = Arc::new(OrderNoGenerator::new(node_id));
        self
    }

    pub fn with_checkout_lock_ttl(mut self, ttl: Duration) -> Self {
        self.checkout_lock_ttl = ttl;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, L> OrderFlowApi<B, L>
where
    B: OrderEngineDatabase,
    L: KeyLockProvider,
{
    /// Turns the selected cart lines into a pending order.
    ///
    /// Order creation is serialised per user with a lease on `order-creation:<user_id>`. If another checkout for the
    /// same user is in progress, this fails with `TooManyRequests` rather than waiting. Inside the lease, the order,
    /// its item snapshot, the stock deductions and the removal of the ordered lines from the cart commit together or
    /// not at all.
    pub async fn create_order(
        &self,
        user_id: &str,
        cart_item_ids: &[i64],
        shipping: ShippingInfo,
    ) -> Result<Order, OrderEngineError> {
        validate_checkout(user_id, cart_item_ids, &shipping)?;
        let key = checkout_lock_key(user_id);
        let order = with_lock(&self.lock, &key, self.checkout_lock_ttl, |token| {
            self.place_order(user_id, cart_item_ids, &shipping, &key, token)
        })
        .await
        .map_err(|e| match e {
            OrderEngineError::LockBusy(_) => {
                OrderEngineError::TooManyRequests(format!("An order is already being placed for {user_id}"))
            },
            e => e,
        })?;
        info!("🧾️ Order {} created for {user_id}. Total {}", order.order_no, order.total_amount);
        self.producers.publish_order_created(OrderCreatedEvent::new(order.clone()));
        match self.db.fetch_order_items(order.id).await {
            Ok(items) => {
                for item in items {
                    self.producers.publish_stock_changed(StockChangedEvent::new(item.product_id, -item.quantity));
                }
            },
            Err(e) => warn!("🧾️ Could not load the items of order {}. No stock events were sent. {e}", order.order_no),
        }
        Ok(order)
    }

    async fn place_order(
        &self,
        user_id: &str,
        cart_item_ids: &[i64],
        shipping: &ShippingInfo,
        key: &str,
        token: LockToken,
    ) -> Result<Order, OrderEngineError> {
        let token = &token;
        self.retry
            .run("order creation", move || async move {
                let cart = self.db.fetch_cart_for_user(user_id).await?.ok_or_else(|| {
                    OrderEngineError::ValidationError(format!("{user_id} does not have a cart to check out"))
                })?;
                let (order, remaining) = self.draft_order(&cart, cart_item_ids, shipping).await?;
                // The reads above may have been slow. Make sure the lease is still ours before writing.
                if !self.lock.verify(key, token).await? {
                    warn!("🔒️ The checkout lease for {user_id} expired before the order could be written");
                    return Err(OrderEngineError::LockLost(key.to_string()));
                }
                match self.db.place_order(&order, &remaining, cart.version).await {
                    Err(OrderEngineError::DuplicateOrderNo(no)) => {
                        warn!("🧾️ Order number {no} collided with an existing order. Generating a new one.");
                        Ok(UpdateOutcome::Conflict)
                    },
                    result => result,
                }
            })
            .await
    }

    /// Snapshots the chosen cart lines into a new order, and works out what is left in the cart afterwards.
    async fn draft_order(
        &self,
        cart: &Cart,
        cart_item_ids: &[i64],
        shipping: &ShippingInfo,
    ) -> Result<(NewOrder, Cart), OrderEngineError> {
        let mut items = Vec::with_capacity(cart_item_ids.len());
        for id in cart_item_ids {
            let line = cart.item(*id).ok_or_else(|| {
                OrderEngineError::ValidationError(format!("Item {id} is not in {}'s cart", cart.user_id))
            })?;
            let product = self
                .db
                .fetch_product(line.product_id)
                .await?
                .ok_or_else(|| OrderEngineError::not_found::<Product>(line.product_id))?;
            if !product.on_sale {
                return Err(OrderEngineError::ProductUnavailable(product.id));
            }
            // Early out. The authoritative check happens when the stock is deducted.
            if product.stock < line.quantity {
                return Err(OrderEngineError::InsufficientStock {
                    product_id: product.id,
                    requested: line.quantity,
                    available: product.stock,
                });
            }
            items.push(NewOrderItem {
                cart_item_id: line.id,
                product_id: product.id,
                sku_id: line.sku_id,
                product_name: product.name,
                unit_price: product.price,
                quantity: line.quantity,
            });
        }
        let order = NewOrder {
            order_no: self.order_nos.next(),
            user_id: cart.user_id.clone(),
            shipping: shipping.clone(),
            items,
        };
        let mut remaining = cart.clone();
        remaining.items.retain(|i| !cart_item_ids.contains(&i.id));
        Ok((order, remaining))
    }

    /// Moves an order to `target`, on behalf of `operator`.
    ///
    /// The edge must be in the transition table (`InvalidTransition` otherwise), and the operator must be allowed to
    /// take it (`Forbidden` otherwise). The status change, its audit row and, for cancellations and refunds, the
    /// return of the order's stock are written together.
    pub async fn transition_order(
        &self,
        order_no: &OrderNo,
        target: OrderStatusType,
        operator: &Operator,
        reason: Option<String>,
    ) -> Result<Order, OrderEngineError> {
        let operation = format!("transition of order {order_no} to {target}");
        let reason = &reason;
        let (order, from, restock) = self
            .retry
            .run(&operation, move || async move {
                let order = self.fetch_order_row(order_no).await?;
                let items = match target {
                    OrderStatusType::Cancelled | OrderStatusType::Refunded => self.db.fetch_order_items(order.id).await?,
                    _ => Vec::new(),
                };
                let change = plan_transition(&order, &items, target, operator, reason.clone())?;
                let outcome = self.db.apply_order_change(&change).await?;
                Ok(outcome.map(|updated| (updated, order.status, change.restock)))
            })
            .await?;
        info!("🧾️ Order {order_no} moved from {from} to {target} by {operator}");
        self.producers.publish_status_changed(OrderStatusChangedEvent::new(order.clone(), from, operator.clone()));
        for movement in restock {
            debug!("📦️ {} units of product #{} returned to stock", movement.quantity, movement.product_id);
            self.producers.publish_stock_changed(StockChangedEvent::new(movement.product_id, movement.quantity));
        }
        Ok(order)
    }

    pub async fn cancel_order(
        &self,
        order_no: &OrderNo,
        operator: &Operator,
        reason: Option<String>,
    ) -> Result<Order, OrderEngineError> {
        self.transition_order(order_no, OrderStatusType::Cancelled, operator, reason).await
    }

    /// Starts, or resumes, paying for an order.
    ///
    /// If the order already has a payment attempt in flight, that attempt is returned. Otherwise a new one is created
    /// with trade number `<order_no>-<attempt>`, so a failed attempt can be followed by a fresh one.
    pub async fn initiate_payment(&self, order_no: &OrderNo, user_id: &str) -> Result<Payment, OrderEngineError> {
        let order = self.fetch_order_row(order_no).await?;
        if order.user_id != user_id {
            return Err(OrderEngineError::Forbidden(format!("Order {order_no} does not belong to {user_id}")));
        }
        if order.status != OrderStatusType::Pending || order.payment_status == PaymentStatus::Paid {
            return Err(OrderEngineError::ValidationError(format!(
                "Order {order_no} is {} and cannot be paid for",
                order.status
            )));
        }
        let payments = self.db.fetch_payments_for_order(order.id).await?;
        if let Some(pending) = payments.iter().find(|p| p.status == PaymentState::Pending) {
            debug!("💳️ Order {order_no} already has payment {} in flight", pending.trade_no);
            return Ok(pending.clone());
        }
        let trade_no = format!("{}-{}", order_no.as_str(), payments.len() + 1);
        let payment =
            self.db.insert_payment(NewPayment { order_id: order.id, trade_no, amount: order.total_amount }).await?;
        info!("💳️ Payment {} for {} initiated for order {order_no}", payment.trade_no, payment.amount);
        Ok(payment)
    }

    /// Cancels every pending, unpaid order older than `older_than`, returning its stock.
    pub async fn expire_unpaid_orders(&self, older_than: chrono::Duration) -> Result<Vec<Order>, OrderEngineError> {
        self.expire_unpaid_orders_created_before(Utc::now() - older_than).await
    }

    pub async fn expire_unpaid_orders_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderEngineError> {
        let candidates = self.db.fetch_unpaid_orders_created_before(cutoff).await?;
        trace!("🕰️ {} unpaid orders were created before {cutoff}", candidates.len());
        let system = Operator::system();
        let mut expired = Vec::with_capacity(candidates.len());
        for order in candidates {
            let reason = Some(PAYMENT_TIMEOUT_REASON.to_string());
            match self.cancel_order(&order.order_no, &system, reason).await {
                Ok(order) => expired.push(order),
                // Paid, or cancelled by someone else, since the query ran.
                Err(OrderEngineError::InvalidTransition { from, .. }) => {
                    debug!("🕰️ Order {} is now {from}. Not expiring it.", order.order_no)
                },
                Err(e) => warn!("🕰️ Could not expire order {}. {e}", order.order_no),
            }
        }
        if !expired.is_empty() {
            info!("🕰️ {} unpaid orders expired", expired.len());
        }
        Ok(expired)
    }

    pub async fn fetch_order(&self, order_no: &OrderNo) -> Result<OrderDetails, OrderEngineError> {
        let order = self.fetch_order_row(order_no).await?;
        let items = self.db.fetch_order_items(order.id).await?;
        Ok(OrderDetails { order, items })
    }

    /// The order's status transitions, oldest first.
    pub async fn order_history(&self, order_no: &OrderNo) -> Result<Vec<OrderStatusLog>, OrderEngineError> {
        let order = self.fetch_order_row(order_no).await?;
        self.db.fetch_status_log(order.id).await
    }

    pub async fn payments_for_order(&self, order_no: &OrderNo) -> Result<Vec<Payment>, OrderEngineError> {
        let order = self.fetch_order_row(order_no).await?;
        self.db.fetch_payments_for_order(order.id).await
    }

    /// The statuses that `operator` could move the order to right now.
    pub async fn available_transitions(
        &self,
        order_no: &OrderNo,
        operator: &Operator,
    ) -> Result<Vec<OrderStatusType>, OrderEngineError> {
        let order = self.fetch_order_row(order_no).await?;
        let owner_ok = operator.kind != OperatorType::User || operator.id == order.user_id;
        Ok(TRANSITIONS
            .iter()
            .filter(|t| t.from == order.status && owner_ok && t.allowed.contains(&operator.kind))
            .map(|t| t.to)
            .collect())
    }

    async fn fetch_order_row(&self, order_no: &OrderNo) -> Result<Order, OrderEngineError> {
        self.db.fetch_order_by_no(order_no).await?.ok_or_else(|| OrderEngineError::OrderNotFound(order_no.clone()))
    }
}

fn validate_checkout(user_id: &str, cart_item_ids: &[i64], shipping: &ShippingInfo) -> Result<(), OrderEngineError> {
    if user_id.trim().is_empty() {
        return Err(OrderEngineError::ValidationError("A user id is required".into()));
    }
    if cart_item_ids.is_empty() {
        return Err(OrderEngineError::ValidationError("Select at least one cart item to check out".into()));
    }
    let unique = cart_item_ids.iter().collect::<HashSet<_>>();
    if unique.len() != cart_item_ids.len() {
        return Err(OrderEngineError::ValidationError("Cart items may only be listed once".into()));
    }
    shipping.validate().map_err(OrderEngineError::ValidationError)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn checkout_validation() {
        let shipping = ShippingInfo::new("Alice", "13800000000", "1 Main St");
        assert!(validate_checkout("alice", &[1, 2], &shipping).is_ok());
        assert!(validate_checkout(" ", &[1], &shipping).is_err());
        assert!(validate_checkout("alice", &[], &shipping).is_err());
        assert!(validate_checkout("alice", &[1, 1], &shipping).is_err());
        let err = validate_checkout("alice", &[1], &ShippingInfo::default()).unwrap_err();
        assert!(matches!(err, OrderEngineError::ValidationError(_)));
    }
}
