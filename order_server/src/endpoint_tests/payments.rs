use actix_web::{http::StatusCode, test::TestRequest};
use order_engine::{
    db_types::{Money, Order, OrderStatusType, Payment, PaymentState, PaymentStatus},
    helpers::calculate_hmac,
    order_objects::OrderDetails,
};
use serde_json::json;

use super::helpers::{add_product, callback_body, place_order, send, test_db, GATEWAY_SECRET};
use crate::routes::GATEWAY_SIGNATURE_HEADER;

async fn start_payment(db: &order_engine::SqliteDatabase, order: &Order) -> Payment {
    let req = TestRequest::post()
        .uri(&format!("/orders/{}/payments", order.order_no))
        .set_json(json!({"user_id": order.user_id}));
    let (status, body) = send(db, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    serde_json::from_str(&body).unwrap()
}

fn signed_callback(body: Vec<u8>, secret: &str) -> TestRequest {
    let signature = calculate_hmac(secret, &body);
    TestRequest::post()
        .uri("/payments/callback")
        .insert_header((GATEWAY_SIGNATURE_HEADER, signature))
        .set_payload(body)
}

#[actix_web::test]
async fn starting_a_payment_twice_returns_the_same_payment() {
    let db = test_db().await;
    let product = add_product(&db, "Liu an gua pian", 4_400, 3).await;
    let order = place_order(&db, "alice", product.id, 1).await;
    let first = start_payment(&db, &order).await;
    assert_eq!(first.trade_no, format!("{}-1", order.order_no));
    assert_eq!(first.status, PaymentState::Pending);
    assert_eq!(first.amount, order.total_amount);
    let second = start_payment(&db, &order).await;
    assert_eq!(first.id, second.id);

    let req = TestRequest::post()
        .uri(&format!("/orders/{}/payments", order.order_no))
        .set_json(json!({"user_id": "mallory"}));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&db, TestRequest::get().uri(&format!("/orders/{}/payments", order.order_no))).await;
    assert_eq!(status, StatusCode::OK);
    let payments: Vec<Payment> = serde_json::from_str(&body).unwrap();
    assert_eq!(payments.len(), 1);
}

#[actix_web::test]
async fn gateway_callback_marks_the_order_paid() {
    let db = test_db().await;
    let product = add_product(&db, "Oriental beauty", 5_800, 3).await;
    let order = place_order(&db, "bob", product.id, 2).await;
    let payment = start_payment(&db, &order).await;

    let body = callback_body(&payment.trade_no, "TRADE_SUCCESS", payment.amount);
    let (status, reply) = send(&db, signed_callback(body.clone(), GATEWAY_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, "success");

    let (_, details) = send(&db, TestRequest::get().uri(&format!("/orders/{}", order.order_no))).await;
    let details: OrderDetails = serde_json::from_str(&details).unwrap();
    assert_eq!(details.order.status, OrderStatusType::Paid);
    assert_eq!(details.order.payment_status, PaymentStatus::Paid);

    // Redelivery is acknowledged, and changes nothing
    let (status, reply) = send(&db, signed_callback(body, GATEWAY_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, "success");
    let (_, again) = send(&db, TestRequest::get().uri(&format!("/orders/{}", order.order_no))).await;
    let again: OrderDetails = serde_json::from_str(&again).unwrap();
    assert_eq!(again.order.version, details.order.version);
}

#[actix_web::test]
async fn untrusted_callbacks_are_rejected() {
    let db = test_db().await;
    let product = add_product(&db, "Wuyi rock tea", 7_700, 3).await;
    let order = place_order(&db, "carol", product.id, 1).await;
    let payment = start_payment(&db, &order).await;
    let body = callback_body(&payment.trade_no, "TRADE_SUCCESS", payment.amount);

    let (status, reply) = send(&db, signed_callback(body.clone(), "not-the-secret")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply.contains("Rejected payment callback"), "{reply}");

    let unsigned = TestRequest::post().uri("/payments/callback").set_payload(body);
    let (status, _) = send(&db, unsigned).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, details) = send(&db, TestRequest::get().uri(&format!("/orders/{}", order.order_no))).await;
    let details: OrderDetails = serde_json::from_str(&details).unwrap();
    assert_eq!(details.order.status, OrderStatusType::Pending);
}

#[actix_web::test]
async fn callbacks_for_unknown_trades_are_acknowledged() {
    let db = test_db().await;
    let body = callback_body("no-such-trade-1", "TRADE_SUCCESS", Money::from(100));
    let (status, reply) = send(&db, signed_callback(body, GATEWAY_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, "success");
}
