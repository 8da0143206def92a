use actix_web::{http::StatusCode, test::TestRequest};
use order_engine::{db_types::Money, order_objects::CartSummary};
use serde_json::json;

use super::helpers::{add_product, send, test_db};

fn summary(body: &str) -> CartSummary {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Not a cart: {body}. {e}"))
}

#[actix_web::test]
async fn adding_the_same_product_merges_lines() {
    let db = test_db().await;
    let product = add_product(&db, "Bi luo chun", 2_500, 10).await;
    for qty in [2, 3] {
        let req =
            TestRequest::post().uri("/carts/alice/items").set_json(json!({"product_id": product.id, "quantity": qty}));
        let (status, _) = send(&db, req).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&db, TestRequest::get().uri("/carts/alice")).await;
    assert_eq!(status, StatusCode::OK);
    let cart = summary(&body);
    assert_eq!(cart.cart.items.len(), 1);
    assert_eq!(cart.cart.items[0].quantity, 5);
    assert_eq!(cart.totals.total_amount, Money::from(12_500));
}

#[actix_web::test]
async fn editing_cart_lines() {
    let db = test_db().await;
    let green = add_product(&db, "Longjing", 3_000, 10).await;
    let black = add_product(&db, "Dian hong", 1_000, 10).await;
    for id in [green.id, black.id] {
        let req = TestRequest::post().uri("/carts/bob/items").set_json(json!({"product_id": id, "quantity": 1}));
        send(&db, req).await;
    }
    let (_, body) = send(&db, TestRequest::get().uri("/carts/bob")).await;
    let cart = summary(&body);
    let green_line = cart.cart.line_for(green.id, None).unwrap().id;
    let black_line = cart.cart.line_for(black.id, None).unwrap().id;

    let req = TestRequest::patch()
        .uri(&format!("/carts/bob/items/{green_line}"))
        .set_json(json!({"quantity": 4, "selected": false}));
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::OK);
    let cart = summary(&body);
    let line = cart.cart.item(green_line).unwrap();
    assert_eq!(line.quantity, 4);
    assert!(!line.selected);
    // Deselected lines do not count towards the totals
    assert_eq!(cart.totals.total_amount, Money::from(1_000));

    let req = TestRequest::patch().uri(&format!("/carts/bob/items/{green_line}")).set_json(json!({}));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = TestRequest::patch().uri(&format!("/carts/bob/items/{green_line}")).set_json(json!({"quantity": 0}));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&db, TestRequest::delete().uri(&format!("/carts/bob/items/{black_line}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary(&body).cart.items.len(), 1);

    let (status, _) = send(&db, TestRequest::delete().uri("/carts/bob")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&db, TestRequest::get().uri("/carts/bob")).await;
    assert!(summary(&body).cart.items.is_empty());
}

#[actix_web::test]
async fn unknown_products_cannot_be_added() {
    let db = test_db().await;
    let req = TestRequest::post().uri("/carts/carol/items").set_json(json!({"product_id": 9999, "quantity": 1}));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
