use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db::traits::OrderEngineError,
    db_types::{NewProduct, Product},
};

pub async fn insert_product(product: NewProduct, conn: &mut SqliteConnection) -> Result<Product, OrderEngineError> {
    let product = sqlx::query_as::<_, Product>(
        r#"
            INSERT INTO products (name, price, on_sale, stock)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(product.name)
    .bind(product.price)
    .bind(product.on_sale)
    .bind(product.stock)
    .fetch_one(conn)
    .await?;
    Ok(product)
}

pub async fn fetch_product(id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, OrderEngineError> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(product)
}

/// Writes the mutable columns of `candidate` if the stored version is still `expected_version`.
/// Returns `None` if someone else wrote first.
pub async fn write_versioned(
    candidate: &Product,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Product>, OrderEngineError> {
    let product = sqlx::query_as::<_, Product>(
        r#"
            UPDATE products SET
                stock = $1,
                sold_count = $2,
                on_sale = $3,
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $4 AND version = $5
            RETURNING *;
        "#,
    )
    .bind(candidate.stock)
    .bind(candidate.sold_count)
    .bind(candidate.on_sale)
    .bind(candidate.id)
    .bind(expected_version)
    .fetch_optional(conn)
    .await?;
    if product.is_none() {
        trace!("🗃️ Versioned write to product #{} at version {expected_version} lost the race", candidate.id);
    }
    Ok(product)
}

/// Reads the product and writes `f(product)` back under a version guard, on the given connection.
///
/// Meant for use inside a transaction that has already taken the write lock, so the read and the guarded write see
/// the same state. `None` means the guard failed, and the caller must roll back.
pub async fn apply_stock_change<F>(
    product_id: i64,
    conn: &mut SqliteConnection,
    f: F,
) -> Result<Option<Product>, OrderEngineError>
where
    F: FnOnce(&Product) -> Result<Product, OrderEngineError>,
{
    let current = fetch_product(product_id, &mut *conn)
        .await?
        .ok_or_else(|| OrderEngineError::not_found::<Product>(product_id))?;
    let candidate = f(&current)?;
    write_versioned(&candidate, current.version, conn).await
}
