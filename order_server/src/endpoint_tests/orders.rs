use actix_web::{http::StatusCode, test::TestRequest};
use order_engine::{
    db_types::{Money, Order, OrderStatusLog, OrderStatusType},
    order_objects::{CartSummary, OrderDetails},
};
use serde_json::json;

use super::helpers::{add_product, place_order, send, shipping, test_db};
use crate::data_objects::TransitionsResponse;

#[actix_web::test]
async fn checkout_places_an_order() {
    let db = test_db().await;
    let product = add_product(&db, "Anji white tea", 3_500, 5).await;
    let req = TestRequest::post().uri("/carts/alice/items").set_json(json!({"product_id": product.id, "quantity": 2}));
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::OK);
    let cart: CartSummary = serde_json::from_str(&body).unwrap();
    let line = cart.cart.items[0].id;

    let req = TestRequest::post()
        .uri("/checkout")
        .set_json(json!({"user_id": "alice", "cart_item_ids": [line], "shipping": shipping()}));
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let order: Order = serde_json::from_str(&body).unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.total_amount, Money::from(7_000));
    assert_eq!(order.user_id, "alice");

    let (status, body) = send(&db, TestRequest::get().uri(&format!("/orders/{}", order.order_no))).await;
    assert_eq!(status, StatusCode::OK);
    let details: OrderDetails = serde_json::from_str(&body).unwrap();
    assert_eq!(details.total_quantity(), 2);
    assert_eq!(details.items[0].product_name, "Anji white tea");

    // The ordered line has left the cart
    let (_, body) = send(&db, TestRequest::get().uri("/carts/alice")).await;
    let cart: CartSummary = serde_json::from_str(&body).unwrap();
    assert!(cart.cart.items.is_empty());
}

#[actix_web::test]
async fn checkout_without_enough_stock_is_a_conflict() {
    let db = test_db().await;
    let product = add_product(&db, "Huangshan maofeng", 2_000, 2).await;
    let req = TestRequest::post().uri("/carts/bob/items").set_json(json!({"product_id": product.id, "quantity": 2}));
    let (_, body) = send(&db, req).await;
    let cart: CartSummary = serde_json::from_str(&body).unwrap();
    // Someone else gets there first
    place_order(&db, "alice", product.id, 1).await;

    let req = TestRequest::post()
        .uri("/checkout")
        .set_json(json!({"user_id": "bob", "cart_item_ids": [cart.cart.items[0].id], "shipping": shipping()}));
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("Insufficient stock"), "{body}");
    // Bob's cart is untouched
    let (_, body) = send(&db, TestRequest::get().uri("/carts/bob")).await;
    let cart: CartSummary = serde_json::from_str(&body).unwrap();
    assert_eq!(cart.cart.items[0].quantity, 2);
}

#[actix_web::test]
async fn checkout_rejects_bad_shipping_details() {
    let db = test_db().await;
    let product = add_product(&db, "Junshan yinzhen", 9_000, 3).await;
    let req = TestRequest::post().uri("/carts/carol/items").set_json(json!({"product_id": product.id, "quantity": 1}));
    let (_, body) = send(&db, req).await;
    let cart: CartSummary = serde_json::from_str(&body).unwrap();
    let req = TestRequest::post().uri("/checkout").set_json(json!({
        "user_id": "carol",
        "cart_item_ids": [cart.cart.items[0].id],
        "shipping": {"receiver_name": "", "receiver_phone": "123", "address": ""}
    }));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn unknown_orders_are_not_found() {
    let db = test_db().await;
    let (status, body) = send(&db, TestRequest::get().uri("/orders/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The requested order does-not-exist does not exist"}"#);
}

#[actix_web::test]
async fn status_changes_follow_the_state_machine() {
    let db = test_db().await;
    let product = add_product(&db, "Keemun", 1_800, 4).await;
    let order = place_order(&db, "dave", product.id, 1).await;
    let uri = format!("/orders/{}/status", order.order_no);

    // Users cannot ship their own orders
    let req = TestRequest::post()
        .uri(&uri)
        .set_json(json!({"target": "shipped", "operator_id": "dave", "operator_type": "user"}));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Nor cancel someone else's
    let req = TestRequest::post()
        .uri(&uri)
        .set_json(json!({"target": "cancelled", "operator_id": "eve", "operator_type": "user"}));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = TestRequest::post().uri(&uri).set_json(json!({
        "target": "cancelled",
        "operator_id": "dave",
        "operator_type": "user",
        "reason": "Ordered the wrong tea"
    }));
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let cancelled: Order = serde_json::from_str(&body).unwrap();
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);
    assert!(cancelled.stock_restored);

    let req = TestRequest::post()
        .uri(&uri)
        .set_json(json!({"target": "paid", "operator_id": "ops", "operator_type": "admin"}));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&db, TestRequest::get().uri(&format!("/orders/{}/history", order.order_no))).await;
    assert_eq!(status, StatusCode::OK);
    let history: Vec<OrderStatusLog> = serde_json::from_str(&body).unwrap();
    let last = history.last().expect("history is empty");
    assert_eq!(last.to_status, OrderStatusType::Cancelled);
    assert_eq!(last.reason.as_deref(), Some("Ordered the wrong tea"));
}

#[actix_web::test]
async fn available_transitions_depend_on_the_operator() {
    let db = test_db().await;
    let product = add_product(&db, "Pu'er", 6_600, 2).await;
    let order = place_order(&db, "frank", product.id, 1).await;
    let uri = format!("/orders/{}/transitions?operator_id=ops&operator_type=admin", order.order_no);
    let (status, body) = send(&db, TestRequest::get().uri(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    let res: TransitionsResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(res.status, OrderStatusType::Pending);
    assert!(res.available.contains(&OrderStatusType::Paid));
    assert!(res.available.contains(&OrderStatusType::Cancelled));

    let uri = format!("/orders/{}/transitions?operator_id=frank&operator_type=user", order.order_no);
    let (_, body) = send(&db, TestRequest::get().uri(&uri)).await;
    let res: TransitionsResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(res.available, vec![OrderStatusType::Cancelled]);

    let uri = format!("/orders/{}/transitions?operator_id=frank&operator_type=robot", order.order_no);
    let (status, _) = send(&db, TestRequest::get().uri(&uri)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
