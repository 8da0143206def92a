use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use log::debug;
use order_engine::{
    db_types::{Money, NewProduct, Order, Product, ShippingInfo},
    events::EventProducers,
    test_utils::new_test_db,
    CartApi,
    CatalogManagement,
    OrderFlowApi,
    PaymentReconciler,
    RetryPolicy,
    SqliteDatabase,
};
use serde_json::json;
use shop_common::Secret;

use crate::server::register_routes;

pub const GATEWAY_SECRET: &str = "endpoint-test-secret";

pub async fn test_db() -> SqliteDatabase {
    new_test_db().await.expect("Error creating test database")
}

fn retry() -> RetryPolicy {
    RetryPolicy::default().with_max_attempts(32)
}

pub fn configure(cfg: &mut ServiceConfig, db: SqliteDatabase) {
    let producers = EventProducers::default();
    let orders = OrderFlowApi::new(db.clone(), db.key_lock(), producers.clone()).with_retry_policy(retry());
    let carts = CartApi::new(db.clone(), retry());
    let reconciler = PaymentReconciler::new(db, retry(), Secret::new(GATEWAY_SECRET.to_string()), producers);
    cfg.app_data(web::Data::new(orders)).app_data(web::Data::new(carts)).app_data(web::Data::new(reconciler));
    register_routes(cfg);
}

/// Sends one request to a fresh app instance backed by `db`, returning the status and the body as text.
pub async fn send(db: &SqliteDatabase, req: TestRequest) -> (StatusCode, String) {
    let db = db.clone();
    let app = App::new().configure(move |cfg| configure(cfg, db));
    let service = test::init_service(app).await;
    let (req, res) = test::call_service(&service, req.to_request()).await.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    debug!("{} {} -> {status} {body}", req.method(), req.path());
    (status, body)
}

pub async fn add_product(db: &SqliteDatabase, name: &str, price: i64, stock: i64) -> Product {
    db.insert_product(NewProduct::new(name, Money::from(price), stock)).await.expect("Error adding product")
}

pub fn shipping() -> ShippingInfo {
    ShippingInfo::new("Li Lei", "13800000000", "88 West Lake Road, Hangzhou")
}

/// Puts `quantity` of the product in the user's cart and checks out that line.
pub async fn place_order(db: &SqliteDatabase, user: &str, product_id: i64, quantity: i64) -> Order {
    let cart = CartApi::new(db.clone(), retry()).add_item(user, product_id, None, quantity).await.unwrap();
    let line = cart.line_for(product_id, None).expect("cart line was just added").id;
    let api = OrderFlowApi::new(db.clone(), db.key_lock(), EventProducers::default());
    api.create_order(user, &[line], shipping()).await.expect("Error placing order")
}

pub fn callback_body(out_trade_no: &str, trade_status: &str, amount: Money) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "out_trade_no": out_trade_no,
        "trade_no": format!("GW{out_trade_no}"),
        "trade_status": trade_status,
        "total_amount": amount.to_string(),
    }))
    .unwrap()
}
