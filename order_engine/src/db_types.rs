use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
pub use shop_common::Money;
use sqlx::{FromRow, Type};
use thiserror::Error;

use crate::db::traits::OrderEngineError;

//--------------------------------------      Versioned      ---------------------------------------------------------
/// A record whose writes are ordered by a monotonically increasing version counter.
///
/// Every accepted write increments the version by exactly one. Writers present the version they read, and the write
/// is only applied if it still matches.
pub trait Versioned {
    /// A human-readable name for the entity, used in error messages.
    const ENTITY: &'static str;

    fn record_id(&self) -> i64;

    fn version(&self) -> i64;
}

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {field}: {value}")]
pub struct ConversionError {
    pub field: &'static str,
    pub value: String,
}

impl ConversionError {
    pub fn new(field: &'static str, value: &str) -> Self {
        Self { field, value: value.to_string() }
    }
}

macro_rules! string_enum {
    ($name:ident, $field:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $s),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    s => Err(ConversionError::new($field, s)),
                }
            }
        }
    };
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// The order has been placed and stock reserved, but it has not been paid for yet.
    Pending,
    /// The payment gateway confirmed payment in full.
    Paid,
    /// The merchant has handed the goods to the carrier.
    Shipped,
    /// The carrier reported delivery.
    Delivered,
    /// The customer confirmed receipt, or the confirmation window lapsed.
    Completed,
    /// The order was cancelled before payment, by the customer, an admin, or the expiry worker.
    Cancelled,
    /// The customer asked for their money back after paying.
    RefundRequested,
    /// The refund has been paid out.
    Refunded,
}

string_enum!(OrderStatusType, "order status", {
    Pending => "pending",
    Paid => "paid",
    Shipped => "shipped",
    Delivered => "delivered",
    Completed => "completed",
    Cancelled => "cancelled",
    RefundRequested => "refund_requested",
    Refunded => "refunded",
});

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 8] = [
        OrderStatusType::Pending,
        OrderStatusType::Paid,
        OrderStatusType::Shipped,
        OrderStatusType::Delivered,
        OrderStatusType::Completed,
        OrderStatusType::Cancelled,
        OrderStatusType::RefundRequested,
        OrderStatusType::Refunded,
    ];

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Completed | OrderStatusType::Cancelled | OrderStatusType::Refunded)
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

//--------------------------------------    PaymentStatus      ---------------------------------------------------------
/// The payment state of an order, as seen from the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Failed,
    Cancelled,
}

string_enum!(PaymentStatus, "payment status", {
    Unpaid => "unpaid",
    Paid => "paid",
    Failed => "failed",
    Cancelled => "cancelled",
});

//--------------------------------------     PaymentState      ---------------------------------------------------------
/// The state of a single payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Success,
    Failed,
    Cancelled,
}

string_enum!(PaymentState, "payment state", {
    Pending => "pending",
    Success => "success",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentState::Pending)
    }
}

//--------------------------------------     OperatorType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperatorType {
    User,
    Admin,
    System,
}

string_enum!(OperatorType, "operator type", {
    User => "user",
    Admin => "admin",
    System => "system",
});

impl OperatorType {
    pub const ALL: [OperatorType; 3] = [OperatorType::User, OperatorType::Admin, OperatorType::System];
}

/// Who is asking for a state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: String,
    pub kind: OperatorType,
}

impl Operator {
    pub const SYSTEM_ID: &'static str = "system";

    pub fn user<S: Into<String>>(id: S) -> Self {
        Self { id: id.into(), kind: OperatorType::User }
    }

    pub fn admin<S: Into<String>>(id: S) -> Self {
        Self { id: id.into(), kind: OperatorType::Admin }
    }

    pub fn system() -> Self {
        Self { id: Self::SYSTEM_ID.to_string(), kind: OperatorType::System }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

//--------------------------------------        OrderNo        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderNo(pub String);

impl FromStr for OrderNo {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNo {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNo {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderNo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        Product        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Money,
    pub on_sale: bool,
    pub stock: i64,
    pub sold_count: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Versioned for Product {
    const ENTITY: &'static str = "product";

    fn record_id(&self) -> i64 {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

impl Product {
    /// The product after `quantity` units have been sold. Stock never goes below zero.
    pub fn deducted(&self, quantity: i64) -> Result<Product, OrderEngineError> {
        if quantity <= 0 {
            return Err(OrderEngineError::ValidationError(format!("Cannot deduct {quantity} units of stock")));
        }
        if self.stock < quantity {
            return Err(OrderEngineError::InsufficientStock {
                product_id: self.id,
                requested: quantity,
                available: self.stock,
            });
        }
        Ok(Product { stock: self.stock - quantity, sold_count: self.sold_count + quantity, ..self.clone() })
    }

    /// The product after `quantity` units have been returned to stock.
    pub fn restored(&self, quantity: i64) -> Result<Product, OrderEngineError> {
        if quantity <= 0 {
            return Err(OrderEngineError::ValidationError(format!("Cannot restore {quantity} units of stock")));
        }
        let sold_count = (self.sold_count - quantity).max(0);
        Ok(Product { stock: self.stock + quantity, sold_count, ..self.clone() })
    }
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub stock: i64,
    pub on_sale: bool,
}

impl NewProduct {
    pub fn new<S: Into<String>>(name: S, price: Money, stock: i64) -> Self {
        Self { name: name.into(), price, stock, on_sale: true }
    }

    pub fn off_sale(mut self) -> Self {
        self.on_sale = false;
        self
    }
}

//--------------------------------------         Cart          ---------------------------------------------------------
/// A user's cart together with all of its lines. The cart row's version covers the whole item set.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Cart {
    pub id: i64,
    pub user_id: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<CartItem>,
}

impl Versioned for Cart {
    const ENTITY: &'static str = "cart";

    fn record_id(&self) -> i64 {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

/// Quantity and amount over the selected lines of a cart. Always derived, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub line_count: usize,
    pub selected_count: usize,
    pub total_quantity: i64,
    pub total_amount: Money,
}

impl Cart {
    pub fn totals(&self) -> CartTotals {
        let selected = self.items.iter().filter(|i| i.selected);
        let (selected_count, total_quantity, total_amount) =
            selected.fold((0usize, 0i64, Money::default()), |(n, q, a), item| (n + 1, q + item.quantity, a + item.line_total()));
        CartTotals { line_count: self.items.len(), selected_count, total_quantity, total_amount }
    }

    pub fn item(&self, item_id: i64) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn line_for(&self, product_id: i64, sku_id: Option<i64>) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id && i.sku_id == sku_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CartItem {
    /// Zero for lines that have not been written yet.
    pub id: i64,
    pub cart_id: i64,
    pub product_id: i64,
    pub sku_id: Option<i64>,
    pub quantity: i64,
    pub unit_price: Money,
    pub selected: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new_line(cart_id: i64, product_id: i64, sku_id: Option<i64>, quantity: i64, unit_price: Money) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            cart_id,
            product_id,
            sku_id,
            quantity,
            unit_price,
            selected: true,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id == 0
    }

    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }

    /// True if the stored columns differ, i.e. the line needs to be written.
    pub fn differs_from(&self, other: &CartItem) -> bool {
        self.quantity != other.quantity || self.selected != other.selected || self.unit_price != other.unit_price
    }
}

//--------------------------------------     ShippingInfo      ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub receiver_name: String,
    pub receiver_phone: String,
    pub address: String,
}

impl ShippingInfo {
    pub fn new<S: Into<String>>(receiver_name: S, receiver_phone: S, address: S) -> Self {
        Self { receiver_name: receiver_name.into(), receiver_phone: receiver_phone.into(), address: address.into() }
    }

    /// Returns a description of the first problem found, if any.
    pub fn validate(&self) -> Result<(), String> {
        if self.receiver_name.trim().is_empty() {
            return Err("receiver name is required".into());
        }
        let phone = self.receiver_phone.trim();
        if phone.len() < 5 || !phone.chars().all(|c| c.is_ascii_digit() || c == '+' || c == '-' || c == ' ') {
            return Err(format!("'{phone}' is not a valid phone number"));
        }
        if self.address.trim().is_empty() {
            return Err("shipping address is required".into());
        }
        Ok(())
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_no: OrderNo,
    pub user_id: String,
    pub total_amount: Money,
    pub status: OrderStatusType,
    pub payment_status: PaymentStatus,
    /// Set, in the same write as the cancelling or refunding transition, once reserved stock has been returned.
    pub stock_restored: bool,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub shipping_address: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Versioned for Order {
    const ENTITY: &'static str = "order";

    fn record_id(&self) -> i64 {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub sku_id: Option<i64>,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: i64,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }
}

/// A snapshot of one cart line, frozen into an order at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub cart_item_id: i64,
    pub product_id: i64,
    pub sku_id: Option<i64>,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_no: OrderNo,
    pub user_id: String,
    pub shipping: ShippingInfo,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    pub fn total_amount(&self) -> Money {
        self.items.iter().map(|i| i.unit_price * i.quantity).sum()
    }
}

//--------------------------------------    OrderStatusLog     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderStatusLog {
    pub id: i64,
    pub order_id: i64,
    pub from_status: OrderStatusType,
    pub to_status: OrderStatusType,
    pub operator_id: String,
    pub operator_type: OperatorType,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStatusLog {
    pub order_id: i64,
    pub from_status: OrderStatusType,
    pub to_status: OrderStatusType,
    pub operator: Operator,
    pub reason: Option<String>,
}

//--------------------------------------        Payment        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    /// The merchant-side trade id sent to the gateway, and echoed back in callbacks.
    pub trade_no: String,
    pub status: PaymentState,
    pub third_party_transaction_id: Option<String>,
    pub amount: Money,
    pub paid_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Versioned for Payment {
    const ENTITY: &'static str = "payment";

    fn record_id(&self) -> i64 {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: i64,
    pub trade_no: String,
    pub amount: Money,
}
