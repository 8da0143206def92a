//! SQLite backend for the order engine.
//!
//! Each submodule holds the SQL for one table family as free functions over a `&mut SqliteConnection`. The functions
//! are not atomic on their own; [`SqliteDatabase`] strings them together inside transactions. Every transaction opens
//! with a write so that SQLite takes the write lock up front instead of upgrading a read lock half-way through.
mod db;
mod errors;

pub mod carts;
pub mod locks;
pub mod orders;
pub mod payments;
pub mod products;

use std::env;

pub use db::SqliteDatabase;
pub use errors::SqliteDatabaseError;
pub use locks::SqliteKeyLock;
use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

const SQLITE_DB_URL: &str = "sqlite://data/order_engine.db";

pub fn db_url() -> String {
    let result = env::var("OE_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ OE_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqliteDatabaseError> {
    let options = url
        .parse::<SqliteConnectOptions>()?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(10))
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
