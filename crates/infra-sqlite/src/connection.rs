// SQLite Connection Pool Setup

use fifoq_core::domain::Location;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

/// Busy timeout for writers waiting on the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool size for file-backed stores
const FILE_MAX_CONNECTIONS: u32 = 4;

/// Create the connection pool for a queue location.
///
/// File stores run in WAL mode (synchronous = NORMAL) and are created if
/// missing (the parent directory must exist). The in-memory store lives
/// inside a single connection that the pool never recycles, so its contents
/// last until the pool is closed.
pub async fn create_pool(location: &Location) -> Result<SqlitePool, sqlx::Error> {
    let pool = match location {
        Location::Memory => {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?
                .busy_timeout(BUSY_TIMEOUT);

            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        }
        Location::File(path) => {
            let options = SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(BUSY_TIMEOUT)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(FILE_MAX_CONNECTIONS)
                .connect_with(options)
                .await?
        }
    };

    Ok(pool)
}
