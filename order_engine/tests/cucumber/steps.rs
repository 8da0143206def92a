use std::time::Duration;

use cucumber::{given, then, when};
use order_engine::{
    db_types::{Money, NewProduct, Operator, OrderStatusType, ShippingInfo},
    helpers::calculate_hmac,
    payment_objects::CallbackAck,
    CatalogManagement,
    OrderEngineError,
    OrderManagement,
};
use serde_json::json;

use crate::cucumber::{world::GATEWAY_SECRET, OrderWorld};

fn error_name(e: &OrderEngineError) -> &'static str {
    use OrderEngineError::*;
    match e {
        DatabaseError(_) => "DatabaseError",
        RecordNotFound { .. } => "RecordNotFound",
        OrderNotFound(_) => "OrderNotFound",
        PaymentNotFound(_) => "PaymentNotFound",
        InsufficientStock { .. } => "InsufficientStock",
        ProductUnavailable(_) => "ProductUnavailable",
        InvalidTransition { .. } => "InvalidTransition",
        Forbidden(_) => "Forbidden",
        ValidationError(_) => "ValidationError",
        ConcurrencyExhausted { .. } => "ConcurrencyExhausted",
        LockBusy(_) => "LockBusy",
        LockLost(_) => "LockLost",
        TooManyRequests(_) => "TooManyRequests",
        InvalidCallback(_) => "InvalidCallback",
        DuplicateOrderNo(_) => "DuplicateOrderNo",
    }
}

fn operator(kind: &str, id: String) -> Operator {
    match kind {
        "user" => Operator::user(id),
        "admin" => Operator::admin(id),
        "system" => Operator::system(),
        other => panic!("Unknown operator type {other}"),
    }
}

#[given(expr = "a product {string} priced at {int} with {int} in stock")]
async fn add_product(world: &mut OrderWorld, name: String, price: i64, stock: i64) {
    let system = world.system();
    let product = system
        .db
        .insert_product(NewProduct::new(name.clone(), Money::from(price), stock))
        .await
        .expect("Error adding product");
    system.products.insert(name, product);
}

#[when(expr = "{word} adds {int} of {string} to the cart")]
async fn add_to_cart(world: &mut OrderWorld, user: String, quantity: i64, name: String) {
    let system = world.system();
    let product_id = system.product(&name).id;
    let result = system.carts.add_item(&user, product_id, None, quantity).await;
    system.record(result);
}

#[when(expr = "{word} checks out the whole cart")]
async fn checkout(world: &mut OrderWorld, user: String) {
    let system = world.system();
    let cart = system.carts.cart(&user).await.expect("Error fetching cart");
    let lines = cart.items.iter().map(|i| i.id).collect::<Vec<_>>();
    let shipping = ShippingInfo::new(user.as_str(), "13800000000", "1 Tea Garden Road, Hangzhou");
    let result = system.orders.create_order(&user, &lines, shipping).await;
    if let Some(order) = system.record(result) {
        system.last_order = Some(order);
    }
}

#[when(expr = "the {word} {word} moves the order to {word}")]
async fn transition(world: &mut OrderWorld, kind: String, id: String, target: String) {
    let system = world.system();
    let target = target.parse::<OrderStatusType>().expect("Not an order status");
    let order_no = system.last_order().order_no.clone();
    let result = system.orders.transition_order(&order_no, target, &operator(&kind, id), None).await;
    if let Some(order) = system.record(result) {
        system.last_order = Some(order);
    }
}

#[when(expr = "unpaid orders older than {int} minutes expire")]
async fn expire(world: &mut OrderWorld, minutes: i64) {
    let system = world.system();
    let cutoff = chrono::Utc::now() - chrono::Duration::minutes(minutes);
    system.orders.expire_unpaid_orders_created_before(cutoff).await.expect("Error expiring orders");
    refresh_order(system).await;
}

#[when(expr = "{word} starts paying for the order")]
async fn start_payment(world: &mut OrderWorld, user: String) {
    let system = world.system();
    let order_no = system.last_order().order_no.clone();
    let result = system.orders.initiate_payment(&order_no, &user).await;
    if let Some(payment) = system.record(result) {
        system.last_payment = Some(payment);
    }
}

#[when(expr = "the gateway reports {word} for the payment")]
async fn gateway_callback(world: &mut OrderWorld, status: String) {
    let system = world.system();
    let payment = system.last_payment().clone();
    let body = serde_json::to_vec(&json!({
        "out_trade_no": payment.trade_no,
        "trade_no": format!("GW-{}", payment.id),
        "trade_status": status,
        "total_amount": payment.amount.to_string(),
    }))
    .unwrap();
    let signature = calculate_hmac(GATEWAY_SECRET, &body);
    let result = system.reconciler.reconcile_callback(&body, Some(&signature)).await;
    if let Some(ack) = system.record(result) {
        system.last_ack = Some(ack);
    }
    refresh_order(system).await;
}

#[when(expr = "a forged callback reports {word} for the payment")]
async fn forged_callback(world: &mut OrderWorld, status: String) {
    let system = world.system();
    let trade_no = system.last_payment().trade_no.clone();
    let body = serde_json::to_vec(&json!({ "out_trade_no": trade_no, "trade_status": status })).unwrap();
    let signature = calculate_hmac("guessed-secret", &body);
    let result = system.reconciler.reconcile_callback(&body, Some(&signature)).await;
    system.record(result);
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut OrderWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

async fn refresh_order(system: &mut crate::cucumber::world::OrderEngineSystem) {
    if let Some(order) = &system.last_order {
        let fresh = system.db.fetch_order_by_no(&order.order_no).await.expect("Error fetching order");
        system.last_order = fresh;
    }
}

#[then(expr = "the request fails with {word}")]
async fn request_failed(world: &mut OrderWorld, expected: String) {
    let system = world.system();
    let err = system.last_error.as_ref().expect("The last request succeeded");
    assert_eq!(error_name(err), expected, "Unexpected error: {err}");
}

#[then("the request succeeds")]
async fn request_succeeded(world: &mut OrderWorld) {
    let system = world.system();
    assert!(system.last_error.is_none(), "The last request failed: {:?}", system.last_error);
}

#[then(expr = "{word} has {int} line(s) in the cart")]
async fn cart_lines(world: &mut OrderWorld, user: String, lines: usize) {
    let system = world.system();
    let cart = system.carts.cart(&user).await.expect("Error fetching cart");
    assert_eq!(cart.items.len(), lines);
}

#[then(expr = "{word} has {int} of {string} in the cart")]
async fn cart_line_quantity(world: &mut OrderWorld, user: String, quantity: i64, name: String) {
    let system = world.system();
    let product_id = system.product(&name).id;
    let cart = system.carts.cart(&user).await.expect("Error fetching cart");
    let line = cart.line_for(product_id, None).expect("No cart line for the product");
    assert_eq!(line.quantity, quantity);
}

#[then(expr = "{string} has {int} in stock and {int} sold")]
async fn stock_level(world: &mut OrderWorld, name: String, stock: i64, sold: i64) {
    let system = world.system();
    let product_id = system.product(&name).id;
    let product = system.ledger.product(product_id).await.expect("Error fetching product");
    assert_eq!(product.stock, stock, "Stock is incorrect");
    assert_eq!(product.sold_count, sold, "Sold count is incorrect");
}

#[then(expr = "the order is {word}")]
async fn order_status(world: &mut OrderWorld, status: String) {
    let system = world.system();
    refresh_order(system).await;
    let expected = status.parse::<OrderStatusType>().expect("Not an order status");
    assert_eq!(system.last_order().status, expected);
}

#[then(expr = "the order total is {int}")]
async fn order_total(world: &mut OrderWorld, total: i64) {
    let system = world.system();
    assert_eq!(system.last_order().total_amount, Money::from(total));
}

#[then(expr = "the order history has {int} entries")]
async fn order_history(world: &mut OrderWorld, entries: usize) {
    let system = world.system();
    let order_no = system.last_order().order_no.clone();
    let history = system.orders.order_history(&order_no).await.expect("Error fetching history");
    assert_eq!(history.len(), entries);
}

#[then(expr = "the gateway is told {word}")]
async fn gateway_ack(world: &mut OrderWorld, outcome: String) {
    let system = world.system();
    let ack = system.last_ack.as_ref().expect("No callback has been acknowledged");
    let actual = match ack {
        CallbackAck::Applied { .. } => "applied",
        CallbackAck::Duplicate { .. } => "duplicate",
        CallbackAck::Ignored { .. } => "ignored",
    };
    assert_eq!(actual, outcome);
}
