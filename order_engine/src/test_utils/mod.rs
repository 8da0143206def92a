//! Helpers for tests that need a real database: a throwaway SQLite file with the engine's migrations applied.
pub mod prepare_env;

pub use prepare_env::{create_database, new_test_db, prepare_test_env, random_db_path, run_migrations};
