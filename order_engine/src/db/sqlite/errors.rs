use thiserror::Error;

use crate::db::traits::OrderEngineError;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Could not run database migrations: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}

impl From<SqliteDatabaseError> for OrderEngineError {
    fn from(e: SqliteDatabaseError) -> Self {
        OrderEngineError::DatabaseError(e.to_string())
    }
}

/// True if the error is a UNIQUE constraint violation, e.g. a duplicate order number.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
