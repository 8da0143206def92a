use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db::traits::OrderEngineError,
    db_types::{NewPayment, Payment},
};

/// Inserts the payment unless its trade number is taken, in which case the existing row is returned.
pub async fn idempotent_insert(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, OrderEngineError> {
    let inserted = sqlx::query_as::<_, Payment>(
        r#"
            INSERT INTO payments (order_id, trade_no, amount)
            VALUES ($1, $2, $3)
            ON CONFLICT (trade_no) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(payment.order_id)
    .bind(&payment.trade_no)
    .bind(payment.amount)
    .fetch_optional(&mut *conn)
    .await?;
    match inserted {
        Some(p) => Ok(p),
        None => {
            debug!("💳️ Payment {} already exists", payment.trade_no);
            fetch_payment_by_trade_no(&payment.trade_no, conn)
                .await?
                .ok_or_else(|| OrderEngineError::PaymentNotFound(payment.trade_no.clone()))
        },
    }
}

pub async fn fetch_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, OrderEngineError> {
    let payment =
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn fetch_payment_by_trade_no(
    trade_no: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, OrderEngineError> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE trade_no = $1")
        .bind(trade_no)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_payments_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Payment>, OrderEngineError> {
    let payments = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}

pub async fn write_versioned(
    candidate: &Payment,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, OrderEngineError> {
    let payment = sqlx::query_as::<_, Payment>(
        r#"
            UPDATE payments SET
                status = $1,
                third_party_transaction_id = $2,
                paid_at = $3,
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $4 AND version = $5
            RETURNING *;
        "#,
    )
    .bind(candidate.status)
    .bind(&candidate.third_party_transaction_id)
    .bind(candidate.paid_at)
    .bind(candidate.id)
    .bind(expected_version)
    .fetch_optional(conn)
    .await?;
    if payment.is_none() {
        trace!("🗃️ Versioned write to payment {} at version {expected_version} lost the race", candidate.trade_no);
    }
    Ok(payment)
}
