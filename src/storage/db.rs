//! SQLite backend setup using sqlx.
//!
//! Provides connection pool construction with sensible defaults for
//! WAL mode and bounded connection acquisition.

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::storage::StorageError;

/// Default maximum connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default connection acquire timeout.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Open a SQLite connection pool.
///
/// # Arguments
///
/// * `url` - SQLite connection URL, e.g., `sqlite:data/vitals.db`
///
/// # Configuration
///
/// - WAL journal mode for better concurrency
/// - Normal synchronous mode for performance with durability
/// - Create database file if not exists
/// - Bounded acquire timeout so a saturated pool fails instead of hanging
pub async fn connect(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::from_str(url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect_with(options)
        .await?;

    Ok(pool)
}
