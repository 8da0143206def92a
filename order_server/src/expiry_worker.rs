use std::time::Duration;

use log::*;
use order_engine::{db_types::Order, events::EventProducers, OrderFlowApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `interval`, pending orders that have gone unpaid for longer than `unpaid_expiry` are cancelled and their
/// stock returned.
pub fn start_expiry_worker(
    db: SqliteDatabase,
    producers: EventProducers,
    unpaid_expiry: chrono::Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let lock = db.key_lock();
        let api = OrderFlowApi::new(db, lock, producers);
        info!("🕰️ Unpaid order expiry worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running unpaid order expiry job");
            match api.expire_unpaid_orders(unpaid_expiry).await {
                Ok(expired) if expired.is_empty() => {},
                Ok(expired) => {
                    info!("🕰️ {} orders expired", expired.len());
                    debug!("🕰️ Expired unpaid orders: {}", order_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running unpaid order expiry job: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] order_no: {} user: {}", o.id, o.order_no, o.user_id))
        .collect::<Vec<String>>()
        .join(", ")
}

#[cfg(test)]
mod test {
    use order_engine::{
        db_types::{Money, NewProduct, OrderStatusType, ShippingInfo},
        test_utils::new_test_db,
        CartApi,
        CatalogManagement,
        OrderManagement,
        RetryPolicy,
    };

    use super::*;

    #[tokio::test]
    async fn worker_cancels_stale_orders() {
        let db = new_test_db().await.expect("Error creating test database");
        let product = db.insert_product(NewProduct::new("Lapsang souchong", Money::from(4_200), 5)).await.unwrap();
        let carts = CartApi::new(db.clone(), RetryPolicy::default());
        let cart = carts.add_item("alice", product.id, None, 2).await.unwrap();
        let api = OrderFlowApi::new(db.clone(), db.key_lock(), EventProducers::default());
        let shipping = ShippingInfo::new("Alice", "13800000000", "1 Tea Garden Road");
        let order = api.create_order("alice", &[cart.items[0].id], shipping).await.unwrap();

        // A negative timeout puts the cutoff in the future, so every unpaid order is stale
        let timeout = chrono::Duration::seconds(-5);
        let worker = start_expiry_worker(db.clone(), EventProducers::default(), timeout, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        worker.abort();

        let order = db.fetch_order_by_no(&order.order_no).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Cancelled);
        assert!(order.stock_restored);
        let product = db.fetch_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.stock, 5);
    }
}
