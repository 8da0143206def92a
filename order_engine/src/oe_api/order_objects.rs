use serde::{Deserialize, Serialize};

use crate::db_types::{Cart, CartTotals, Order, OrderItem};

/// An order together with its item snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderDetails {
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// A cart with its derived totals, as shown at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub cart: Cart,
    pub totals: CartTotals,
}

impl From<Cart> for CartSummary {
    fn from(cart: Cart) -> Self {
        let totals = cart.totals();
        Self { cart, totals }
    }
}
