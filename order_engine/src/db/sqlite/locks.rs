use std::time::Duration;

use chrono::Utc;
use log::{debug, trace};
use sqlx::SqlitePool;

use crate::db::traits::{KeyLockProvider, LockToken, OrderEngineError};

/// A [`KeyLockProvider`] backed by the `key_locks` table, so that every engine instance sharing the database sees the
/// same leases.
#[derive(Clone)]
pub struct SqliteKeyLock {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteKeyLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteKeyLock")
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry(ttl: Duration) -> i64 {
    now_millis() + i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX / 2)
}

impl SqliteKeyLock {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl KeyLockProvider for SqliteKeyLock {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockToken, OrderEngineError> {
        let token = LockToken::random();
        // Takes over the row only if the previous lease has lapsed.
        let result = sqlx::query(
            r#"
                INSERT INTO key_locks (key, token, expires_at) VALUES ($1, $2, $3)
                ON CONFLICT (key) DO UPDATE SET token = excluded.token, expires_at = excluded.expires_at
                WHERE key_locks.expires_at <= $4
            "#,
        )
        .bind(key)
        .bind(token.as_str())
        .bind(expiry(ttl))
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            debug!("🔒️ Lock {key} is busy");
            return Err(OrderEngineError::LockBusy(key.to_string()));
        }
        trace!("🔒️ Acquired lock {key} for {}ms", ttl.as_millis());
        Ok(token)
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let expires_at: Option<i64> =
            sqlx::query_scalar("DELETE FROM key_locks WHERE key = $1 AND token = $2 RETURNING expires_at")
                .bind(key)
                .bind(token.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        tx.commit().await?;
        // A lease that had already lapsed still gets cleaned up, but the caller learns it was not held to the end.
        let released = expires_at.is_some_and(|t| t > now_millis());
        trace!("🔒️ Released lock {key}: {released}");
        Ok(released)
    }

    async fn renew(&self, key: &str, token: &LockToken, ttl: Duration) -> Result<bool, OrderEngineError> {
        let result =
            sqlx::query("UPDATE key_locks SET expires_at = $1 WHERE key = $2 AND token = $3 AND expires_at > $4")
                .bind(expiry(ttl))
                .bind(key)
                .bind(token.as_str())
                .bind(now_millis())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn verify(&self, key: &str, token: &LockToken) -> Result<bool, OrderEngineError> {
        let held: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM key_locks WHERE key = $1 AND token = $2 AND expires_at > $3")
                .bind(key)
                .bind(token.as_str())
                .bind(now_millis())
                .fetch_one(&self.pool)
                .await?;
        Ok(held > 0)
    }
}
