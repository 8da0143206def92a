use std::fmt::Display;

use order_engine::db_types::{Operator, OperatorType, OrderStatusType, ShippingInfo};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }
}

/// Body of `POST /checkout`. Only the listed cart lines are ordered; the rest of the cart is left alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub cart_item_ids: Vec<i64>,
    pub shipping: ShippingInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    pub target: OrderStatusType,
    pub operator_id: String,
    pub operator_type: OperatorType,
    #[serde(default)]
    pub reason: Option<String>,
}

impl StatusChangeRequest {
    pub fn operator(&self) -> Operator {
        Operator { id: self.operator_id.clone(), kind: self.operator_type }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCartItemRequest {
    pub product_id: i64,
    #[serde(default)]
    pub sku_id: Option<i64>,
    pub quantity: i64,
}

/// Either field may be left out. Both may be set in one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCartItemRequest {
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub selected: Option<bool>,
}

/// Query string identifying who is asking, e.g. `?operator_id=alice&operator_type=user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorQuery {
    pub operator_id: String,
    pub operator_type: OperatorType,
}

impl From<OperatorQuery> for Operator {
    fn from(q: OperatorQuery) -> Self {
        Operator { id: q.operator_id, kind: q.operator_type }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionsResponse {
    pub order_no: String,
    pub status: OrderStatusType,
    pub available: Vec<OrderStatusType>,
}
