//! SQLite connection setup shared by the durable session store and the
//! reference call-log sink

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use tracing::info;

use crate::error::{DialerError, Result};

/// Open a pool for `database_url` (`sqlite:path.db` or `sqlite::memory:`)
pub async fn open_pool(database_url: &str) -> Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:");
    let mut options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| DialerError::configuration(format!("invalid database url '{}': {}", database_url, e)))?
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);
    if !in_memory {
        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
    }

    // An in-memory database lives and dies with its connection, so keep exactly one alive.
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(4)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| DialerError::storage(format!("failed to connect to {}: {}", database_url, e)))?;
    info!(url = %database_url, "sqlite pool opened");
    Ok(pool)
}

/// Single-connection in-memory pool, for tests and throwaway runs
pub async fn open_in_memory() -> Result<SqlitePool> {
    open_pool("sqlite::memory:").await
}
