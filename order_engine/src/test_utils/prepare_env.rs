use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

use crate::{
    db::{sqlite::SqliteDatabaseError, traits::OrderEngineError},
    SqliteDatabase,
};

/// Enough connections for the concurrency tests to actually run in parallel.
const TEST_POOL_SIZE: u32 = 16;

pub async fn prepare_test_env(url: &str) -> Result<(), SqliteDatabaseError> {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await?;
    run_migrations(url).await
}

/// Creates a fresh, migrated database in the temp directory and connects to it.
pub async fn new_test_db() -> Result<SqliteDatabase, OrderEngineError> {
    let url = random_db_path();
    prepare_test_env(&url).await?;
    SqliteDatabase::new_with_url(&url, TEST_POOL_SIZE).await
}

pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/order_engine_test_{}.db", dir.display(), rand::random::<u64>())
}

pub async fn run_migrations(url: &str) -> Result<(), SqliteDatabaseError> {
    let pool = crate::db::sqlite::new_pool(url, 1).await?;
    migrate!("./src/db/sqlite/migrations").run(&pool).await?;
    pool.close().await;
    info!("🚀️ Migrations complete");
    Ok(())
}

pub async fn create_database(url: &str) -> Result<(), SqliteDatabaseError> {
    if Sqlite::database_exists(url).await? {
        if let Err(e) = Sqlite::drop_database(url).await {
            warn!("🚀️ Error dropping database {url}: {e:?}");
        }
    }
    Sqlite::create_database(url).await?;
    info!("🚀️ Created Sqlite database {url}");
    Ok(())
}
