//! SQLite pool, embedded migrations, and per-table query modules.

pub mod airtime;
pub mod customers;
pub mod events;
pub mod order_flow;
pub mod orders;
pub mod products;
pub mod tickets;
pub mod webhook_events;
pub mod zesa;

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};

use crate::error::AppError;

/// Embedded migrations, shared by the server boot path and the test suites.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| AppError::internal(format!("invalid DATABASE_URL: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .pragma("foreign_keys", "ON")
        .optimize_on_close(true, None);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(&pool)
        .await?;

    tracing::info!("Database connection established (WAL, busy_timeout=5000ms)");

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| AppError::internal(format!("failed to apply migrations: {e}")))?;

    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// True when the error is a UNIQUE constraint violation, e.g. an order-number
/// collision worth retrying with a regenerated number.
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => {
            matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
        }
        _ => false,
    }
}
