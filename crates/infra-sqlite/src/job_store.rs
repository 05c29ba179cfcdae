// SQLite JobStore Implementation

use crate::{create_pool, run_migrations};
use async_trait::async_trait;
use fifoq_core::domain::{JobId, Location};
use fifoq_core::error::{QueueError, Result};
use fifoq_core::port::{JobStore, StoredJob};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

// Helper to convert sqlx::Error to QueueError with structured information
fn map_sqlx_error(err: sqlx::Error) -> QueueError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "5" => QueueError::Io(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => QueueError::Io(format!("Database full: {}", db_err.message())),
                    "8" => QueueError::Io(format!("Database is read-only: {}", db_err.message())),
                    _ => QueueError::Io(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                QueueError::Io(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => QueueError::Io("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => QueueError::Io(format!("Column not found: {}", col)),
        sqlx::Error::PoolClosed => QueueError::Io("Connection pool is closed".to_string()),
        _ => QueueError::Io(err.to_string()),
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    payload: String,
}

impl From<JobRow> for StoredJob {
    fn from(row: JobRow) -> Self {
        StoredJob::new(row.id, row.payload)
    }
}

/// JobStore over an SQLite `jobs` table.
///
/// Ids come from `INTEGER PRIMARY KEY AUTOINCREMENT`, so they grow strictly
/// and are never reused after deletion.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteJobStore;

impl SqliteJobStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    type Handle = SqlitePool;

    async fn connect(&self, location: &Location) -> Result<Self::Handle> {
        let pool = create_pool(location)
            .await
            .map_err(|e| QueueError::Open(format!("{}: {}", location, e)))?;

        if let Err(e) = run_migrations(&pool).await {
            pool.close().await;
            return Err(QueueError::Open(format!(
                "{}: schema setup failed: {}",
                location, e
            )));
        }

        debug!(store = %location, "Store connected");
        Ok(pool)
    }

    async fn count_live(&self, pool: &Self::Handle) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count.max(0) as u64)
    }

    async fn insert(&self, pool: &Self::Handle, payload: &str) -> Result<JobId> {
        let result = sqlx::query("INSERT INTO jobs (payload) VALUES (?)")
            .bind(payload)
            .execute(pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.last_insert_rowid())
    }

    async fn select_batch(
        &self,
        pool: &Self::Handle,
        after_or_equal: JobId,
        limit: usize,
        exclude: &[JobId],
    ) -> Result<Vec<StoredJob>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, payload FROM jobs WHERE id >= ");
        query.push_bind(after_or_equal);

        if !exclude.is_empty() {
            query.push(" AND id NOT IN (");
            let mut separated = query.separated(", ");
            for id in exclude {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }

        query.push(" ORDER BY id ASC LIMIT ");
        query.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows: Vec<JobRow> = query
            .build_query_as()
            .fetch_all(pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(StoredJob::from).collect())
    }

    async fn delete_by_id(&self, pool: &Self::Handle, id: JobId) -> Result<()> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            debug!(job_id = id, "Job row already gone on delete");
        }

        Ok(())
    }

    async fn search_all(&self, pool: &Self::Handle) -> Result<Vec<StoredJob>> {
        let rows: Vec<JobRow> = sqlx::query_as("SELECT id, payload FROM jobs ORDER BY id ASC")
            .fetch_all(pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(StoredJob::from).collect())
    }

    async fn disconnect(&self, pool: Self::Handle) -> Result<()> {
        pool.close().await;
        Ok(())
    }
}
