#![allow(dead_code)]
use log::*;
use order_engine::{
    db_types::{Money, NewProduct, Product, ShippingInfo},
    events::EventProducers,
    helpers::calculate_hmac,
    test_utils::new_test_db,
    CartApi,
    CatalogManagement,
    OrderEngineDatabase,
    OrderFlowApi,
    PaymentReconciler,
    RetryPolicy,
    SqliteDatabase,
    SqliteKeyLock,
    StockLedger,
};
use serde_json::json;
use shop_common::Secret;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const GATEWAY_SECRET: &str = "gateway-test-secret";

/// The tests hammer single rows from many tasks at once, so they get a far bigger retry budget than production.
pub fn test_retry() -> RetryPolicy {
    RetryPolicy::default().with_max_attempts(64)
}

pub struct Shop {
    pub db: SqliteDatabase,
    pub ledger: StockLedger<SqliteDatabase>,
    pub carts: CartApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase, SqliteKeyLock>,
    pub reconciler: PaymentReconciler<SqliteDatabase>,
}

pub async fn setup() -> Shop {
    setup_with_producers(EventProducers::default()).await
}

pub async fn setup_with_producers(producers: EventProducers) -> Shop {
    let db = new_test_db().await.expect("Error creating test database");
    let lock = db.key_lock();
    let retry = test_retry();
    Shop {
        ledger: StockLedger::new(db.clone(), retry, producers.clone()),
        carts: CartApi::new(db.clone(), retry),
        orders: OrderFlowApi::new(db.clone(), lock, producers.clone()).with_retry_policy(retry),
        reconciler: PaymentReconciler::new(
            db.clone(),
            retry,
            Secret::new(GATEWAY_SECRET.to_string()),
            producers,
        ),
        db,
    }
}

pub async fn tear_down(shop: Shop) {
    let Shop { mut db, .. } = shop;
    let url = db.url().to_string();
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Could not remove test database {url}: {e}");
    }
}

pub async fn add_product(db: &SqliteDatabase, name: &str, price: i64, stock: i64) -> Product {
    db.insert_product(NewProduct::new(name, Money::from(price), stock)).await.expect("Error adding product")
}

pub fn shipping() -> ShippingInfo {
    ShippingInfo::new("Alice Zhang", "13800000000", "88 Century Avenue, Shanghai")
}

/// A gateway notification body, exactly as the gateway would post it.
pub fn callback_body(out_trade_no: &str, trade_status: &str, amount: Option<Money>) -> Vec<u8> {
    let mut body = json!({
        "out_trade_no": out_trade_no,
        "trade_no": format!("GW{out_trade_no}"),
        "trade_status": trade_status,
    });
    if let Some(amount) = amount {
        body["total_amount"] = json!(amount.to_string());
    }
    serde_json::to_vec(&body).expect("callback body is valid json")
}

pub fn sign(body: &[u8]) -> String {
    calculate_hmac(GATEWAY_SECRET, body)
}
