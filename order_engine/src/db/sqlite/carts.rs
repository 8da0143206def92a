use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db::traits::OrderEngineError,
    db_types::{Cart, CartItem},
};

/// Creates an empty cart for the user unless one exists already. Safe under concurrent callers.
pub async fn create_if_missing(user_id: &str, conn: &mut SqliteConnection) -> Result<(), OrderEngineError> {
    let result = sqlx::query("INSERT INTO carts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(conn)
        .await?;
    if result.rows_affected() > 0 {
        debug!("🛒️ Created a new cart for {user_id}");
    }
    Ok(())
}

pub async fn fetch_cart(id: i64, conn: &mut SqliteConnection) -> Result<Option<Cart>, OrderEngineError> {
    let cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE id = $1").bind(id).fetch_optional(&mut *conn).await?;
    with_items(cart, conn).await
}

pub async fn fetch_cart_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<Option<Cart>, OrderEngineError> {
    let cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    with_items(cart, conn).await
}

async fn with_items(cart: Option<Cart>, conn: &mut SqliteConnection) -> Result<Option<Cart>, OrderEngineError> {
    match cart {
        Some(mut cart) => {
            cart.items = fetch_items(cart.id, conn).await?;
            Ok(Some(cart))
        },
        None => Ok(None),
    }
}

pub async fn fetch_items(cart_id: i64, conn: &mut SqliteConnection) -> Result<Vec<CartItem>, OrderEngineError> {
    let items = sqlx::query_as::<_, CartItem>("SELECT * FROM cart_items WHERE cart_id = $1 ORDER BY id")
        .bind(cart_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Replaces the cart's item set with `candidate.items`, on condition that the cart is still at `expected_version`.
///
/// The cart row is bumped first, which takes the write lock for the rest of the transaction. Lines missing from the
/// candidate are deleted, lines with id 0 are inserted and changed lines are rewritten under their own version guard.
/// `None` means a guard failed, and the caller must roll back the transaction.
pub async fn write_versioned(
    candidate: &Cart,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Cart>, OrderEngineError> {
    let bumped = sqlx::query_as::<_, Cart>(
        r#"
            UPDATE carts SET version = version + 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND version = $2
            RETURNING *;
        "#,
    )
    .bind(candidate.id)
    .bind(expected_version)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(mut cart) = bumped else {
        trace!("🗃️ Versioned write to cart #{} at version {expected_version} lost the race", candidate.id);
        return Ok(None);
    };
    let existing = fetch_items(cart.id, &mut *conn).await?;
    for item in &existing {
        if candidate.item(item.id).is_none() {
            sqlx::query("DELETE FROM cart_items WHERE id = $1").bind(item.id).execute(&mut *conn).await?;
        }
    }
    for item in candidate.items.iter().filter(|i| !i.is_new()) {
        let Some(stored) = existing.iter().find(|e| e.id == item.id) else {
            trace!("🗃️ Cart line #{} has gone away", item.id);
            return Ok(None);
        };
        if !item.differs_from(stored) {
            continue;
        }
        let result = sqlx::query(
            r#"
                UPDATE cart_items SET
                    quantity = $1,
                    unit_price = $2,
                    selected = $3,
                    version = version + 1,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = $4 AND version = $5
            "#,
        )
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.selected)
        .bind(item.id)
        .bind(item.version)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            trace!("🗃️ Cart line #{} at version {} lost the race", item.id, item.version);
            return Ok(None);
        }
    }
    for item in candidate.items.iter().filter(|i| i.is_new()) {
        sqlx::query(
            r#"
                INSERT INTO cart_items (cart_id, product_id, sku_id, quantity, unit_price, selected)
                VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(cart.id)
        .bind(item.product_id)
        .bind(item.sku_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.selected)
        .execute(&mut *conn)
        .await?;
    }
    cart.items = fetch_items(cart.id, conn).await?;
    Ok(Some(cart))
}
