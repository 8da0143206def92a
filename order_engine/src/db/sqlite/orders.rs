use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db::{
        sqlite::{errors::is_unique_violation, products},
        traits::{OrderChange, OrderEngineError},
    },
    db_types::{NewOrder, NewStatusLog, Order, OrderItem, OrderNo, OrderStatusLog},
};

/// Inserts the order row and its item snapshot. This is not atomic. Embed it in a transaction and pass `&mut *tx`.
pub async fn insert_order(order: &NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderEngineError> {
    let inserted = sqlx::query_as::<_, Order>(
        r#"
            INSERT INTO orders (
                order_no,
                user_id,
                total_amount,
                receiver_name,
                receiver_phone,
                shipping_address
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(&order.order_no)
    .bind(&order.user_id)
    .bind(order.total_amount())
    .bind(&order.shipping.receiver_name)
    .bind(&order.shipping.receiver_phone)
    .bind(&order.shipping.address)
    .fetch_one(&mut *conn)
    .await;
    let inserted = match inserted {
        Ok(o) => o,
        Err(e) if is_unique_violation(&e) => return Err(OrderEngineError::DuplicateOrderNo(order.order_no.clone())),
        Err(e) => return Err(e.into()),
    };
    for item in &order.items {
        sqlx::query(
            r#"
                INSERT INTO order_items (order_id, product_id, sku_id, product_name, unit_price, quantity)
                VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(inserted.id)
        .bind(item.product_id)
        .bind(item.sku_id)
        .bind(&item.product_name)
        .bind(item.unit_price)
        .bind(item.quantity)
        .execute(&mut *conn)
        .await?;
    }
    debug!("🧾️ Inserted order {} with {} lines", inserted.order_no, order.items.len());
    Ok(inserted)
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, OrderEngineError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_no(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<Option<Order>, OrderEngineError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_no = $1")
        .bind(order_no)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, OrderEngineError> {
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

pub async fn fetch_status_log(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderStatusLog>, OrderEngineError> {
    let log = sqlx::query_as::<_, OrderStatusLog>("SELECT * FROM order_status_log WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(log)
}

/// Pending orders that have not been paid for, created strictly before `cutoff`. Oldest first. Orders whose last
/// payment attempt failed count as unpaid.
pub async fn fetch_unpaid_created_before(
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, OrderEngineError> {
    let orders = sqlx::query_as::<_, Order>(
        r#"
            SELECT * FROM orders
            WHERE status = 'pending'
              AND payment_status <> 'paid'
              AND CAST(strftime('%s', created_at) AS INTEGER) < $1
            ORDER BY created_at, id
        "#,
    )
    .bind(cutoff.timestamp())
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// Writes the mutable columns of `candidate` if the stored version is still `expected_version`.
pub async fn write_versioned(
    candidate: &Order,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderEngineError> {
    let order = sqlx::query_as::<_, Order>(
        r#"
            UPDATE orders SET
                status = $1,
                payment_status = $2,
                stock_restored = $3,
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $4 AND version = $5
            RETURNING *;
        "#,
    )
    .bind(candidate.status)
    .bind(candidate.payment_status)
    .bind(candidate.stock_restored)
    .bind(candidate.id)
    .bind(expected_version)
    .fetch_optional(conn)
    .await?;
    if order.is_none() {
        trace!("🗃️ Versioned write to order #{} at version {expected_version} lost the race", candidate.id);
    }
    Ok(order)
}

pub async fn insert_status_log(log: &NewStatusLog, conn: &mut SqliteConnection) -> Result<(), OrderEngineError> {
    sqlx::query(
        r#"
            INSERT INTO order_status_log (order_id, from_status, to_status, operator_id, operator_type, reason)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(log.order_id)
    .bind(log.from_status)
    .bind(log.to_status)
    .bind(&log.operator.id)
    .bind(log.operator.kind)
    .bind(&log.reason)
    .execute(conn)
    .await?;
    Ok(())
}

/// Applies the order write first, then the audit row and any stock restoration. Not atomic on its own.
/// `None` means one of the guarded writes lost a race, and the caller must roll back.
pub async fn apply_change(change: &OrderChange, conn: &mut SqliteConnection) -> Result<Option<Order>, OrderEngineError> {
    let Some(order) = write_versioned(&change.candidate, change.expected_version, &mut *conn).await? else {
        return Ok(None);
    };
    if let Some(log) = &change.log {
        insert_status_log(log, &mut *conn).await?;
    }
    for movement in &change.restock {
        let restored = products::apply_stock_change(movement.product_id, &mut *conn, |p| p.restored(movement.quantity)).await?;
        if restored.is_none() {
            return Ok(None);
        }
    }
    Ok(Some(order))
}
