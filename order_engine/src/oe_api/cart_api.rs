use std::fmt::Debug;

use log::*;

use crate::{
    db::traits::{CartManagement, CatalogManagement, OrderEngineError},
    db_types::{Cart, CartItem, Product},
    oe_api::order_objects::CartSummary,
    retry::RetryPolicy,
};

/// Cart operations. Every change rewrites the cart under its version, so two tabs editing the same cart never lose
/// each other's changes.
pub struct CartApi<B> {
    db: B,
    retry: RetryPolicy,
}

impl<B> Debug for CartApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CartApi")
    }
}

fn line_not_found(item_id: i64) -> OrderEngineError {
    OrderEngineError::RecordNotFound { entity: "cart item", id: item_id }
}

fn check_quantity(quantity: i64) -> Result<(), OrderEngineError> {
    if quantity < 1 {
        return Err(OrderEngineError::ValidationError(format!("Quantity must be at least 1, not {quantity}")));
    }
    Ok(())
}

impl<B> CartApi<B> {
    pub fn new(db: B, retry: RetryPolicy) -> Self {
        Self { db, retry }
    }
}

impl<B> CartApi<B>
where B: CartManagement + CatalogManagement
{
    pub async fn cart(&self, user_id: &str) -> Result<Cart, OrderEngineError> {
        self.db.fetch_or_create_cart(user_id).await
    }

    pub async fn cart_summary(&self, user_id: &str) -> Result<CartSummary, OrderEngineError> {
        self.cart(user_id).await.map(CartSummary::from)
    }

    /// Adds `quantity` units of a product to the cart. If the cart already has a line for the same product and SKU,
    /// the quantity is added to that line and it is selected again; its unit price is left as it was.
    pub async fn add_item(
        &self,
        user_id: &str,
        product_id: i64,
        sku_id: Option<i64>,
        quantity: i64,
    ) -> Result<Cart, OrderEngineError> {
        check_quantity(quantity)?;
        let product = self.product_on_sale(product_id).await?;
        let cart = self.cart(user_id).await?;
        let cart = self
            .retry
            .update_record(&self.db, cart.id, |cart: &Cart| {
                let mut next = cart.clone();
                let total = match next.items.iter_mut().find(|i| i.product_id == product_id && i.sku_id == sku_id) {
                    Some(line) => {
                        line.quantity += quantity;
                        line.selected = true;
                        line.quantity
                    },
                    None => {
                        next.items.push(CartItem::new_line(cart.id, product_id, sku_id, quantity, product.price));
                        quantity
                    },
                };
                check_stock(&product, total)?;
                Ok(next)
            })
            .await?;
        debug!("🛒️ {user_id} added {quantity} of product #{product_id} to their cart");
        Ok(cart)
    }

    pub async fn update_quantity(&self, user_id: &str, item_id: i64, quantity: i64) -> Result<Cart, OrderEngineError> {
        check_quantity(quantity)?;
        let cart = self.cart(user_id).await?;
        let line = cart.item(item_id).ok_or_else(|| line_not_found(item_id))?;
        let product = self.product_on_sale(line.product_id).await?;
        check_stock(&product, quantity)?;
        let cart = self
            .edit_line(cart.id, item_id, |line| {
                line.quantity = quantity;
            })
            .await?;
        debug!("🛒️ {user_id} set cart line #{item_id} to {quantity} units");
        Ok(cart)
    }

    pub async fn set_selected(&self, user_id: &str, item_id: i64, selected: bool) -> Result<Cart, OrderEngineError> {
        let cart = self.cart(user_id).await?;
        self.edit_line(cart.id, item_id, |line| line.selected = selected).await
    }

    pub async fn remove_item(&self, user_id: &str, item_id: i64) -> Result<Cart, OrderEngineError> {
        let cart = self.cart(user_id).await?;
        let cart = self
            .retry
            .update_record(&self.db, cart.id, |cart: &Cart| {
                cart.item(item_id).ok_or_else(|| line_not_found(item_id))?;
                let mut next = cart.clone();
                next.items.retain(|i| i.id != item_id);
                Ok(next)
            })
            .await?;
        debug!("🛒️ {user_id} removed line #{item_id} from their cart");
        Ok(cart)
    }

    pub async fn clear(&self, user_id: &str) -> Result<Cart, OrderEngineError> {
        let cart = self.cart(user_id).await?;
        let cart = self
            .retry
            .update_record(&self.db, cart.id, |cart: &Cart| {
                let mut next = cart.clone();
                next.items.clear();
                Ok(next)
            })
            .await?;
        debug!("🛒️ {user_id} emptied their cart");
        Ok(cart)
    }

    async fn edit_line<F>(&self, cart_id: i64, item_id: i64, edit: F) -> Result<Cart, OrderEngineError>
    where F: Fn(&mut CartItem) {
        self.retry
            .update_record(&self.db, cart_id, |cart: &Cart| {
                let mut next = cart.clone();
                let line = next.items.iter_mut().find(|i| i.id == item_id).ok_or_else(|| line_not_found(item_id))?;
                edit(line);
                Ok(next)
            })
            .await
    }

    async fn product_on_sale(&self, product_id: i64) -> Result<Product, OrderEngineError> {
        let product =
            self.db.fetch_product(product_id).await?.ok_or_else(|| OrderEngineError::not_found::<Product>(product_id))?;
        if !product.on_sale {
            return Err(OrderEngineError::ProductUnavailable(product_id));
        }
        Ok(product)
    }
}

/// Carts do not reserve stock, but a line can never ask for more than is on the shelf right now.
fn check_stock(product: &Product, quantity: i64) -> Result<(), OrderEngineError> {
    if quantity > product.stock {
        return Err(OrderEngineError::InsufficientStock {
            product_id: product.id,
            requested: quantity,
            available: product.stock,
        });
    }
    Ok(())
}
