// Job Store Port (Interface)

use crate::domain::{JobId, Location};
use crate::error::Result;
use async_trait::async_trait;

/// A persisted row: id plus encoded payload text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredJob {
    pub id: JobId,
    pub payload: String,
}

impl StoredJob {
    pub fn new(id: JobId, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// Durable store interface for the queue table `(id, payload)`.
///
/// The store itself is a stateless factory; `connect` hands out the
/// connection `Handle` that every other call runs against. The queue owns
/// the handle exclusively between `open` and `close`.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Connection handle (exposed to callers through `Queue::handle`)
    type Handle: Clone + Send + Sync + 'static;

    /// Connect and make sure the schema exists.
    /// Failures are reported as `QueueError::Open`.
    async fn connect(&self, location: &Location) -> Result<Self::Handle>;

    /// Count live rows
    async fn count_live(&self, handle: &Self::Handle) -> Result<u64>;

    /// Insert an encoded payload, returning the assigned id
    async fn insert(&self, handle: &Self::Handle, payload: &str) -> Result<JobId>;

    /// Up to `limit` rows with `id >= after_or_equal`, skipping `exclude`, ascending by id
    async fn select_batch(
        &self,
        handle: &Self::Handle,
        after_or_equal: JobId,
        limit: usize,
        exclude: &[JobId],
    ) -> Result<Vec<StoredJob>>;

    /// Delete one row. A missing row counts as already done.
    async fn delete_by_id(&self, handle: &Self::Handle, id: JobId) -> Result<()>;

    /// All live rows, ascending by id
    async fn search_all(&self, handle: &Self::Handle) -> Result<Vec<StoredJob>>;

    /// Release the connection
    async fn disconnect(&self, handle: Self::Handle) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::QueueError;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    /// Shared state behind [`MockJobStore`]; survives disconnects like a file would.
    #[derive(Debug, Default)]
    pub struct MockDb {
        rows: BTreeMap<JobId, String>,
        last_id: JobId,
        connected: bool,
        connects: usize,
        selects: usize,
        fail_connect: bool,
        fail_insert: bool,
        fail_delete: bool,
        fail_select: bool,
    }

    impl MockDb {
        fn ensure_connected(&self) -> Result<()> {
            if self.connected {
                Ok(())
            } else {
                Err(QueueError::Io("mock store is not connected".to_string()))
            }
        }
    }

    /// In-memory JobStore with failure injection
    #[derive(Debug, Clone, Default)]
    pub struct MockJobStore {
        db: Arc<Mutex<MockDb>>,
    }

    impl MockJobStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Write a raw row directly, bypassing codec and connection state
        pub fn seed(&self, payload: impl Into<String>) -> JobId {
            let mut db = self.db.lock().unwrap();
            db.last_id += 1;
            let id = db.last_id;
            db.rows.insert(id, payload.into());
            id
        }

        pub fn rows(&self) -> Vec<StoredJob> {
            let db = self.db.lock().unwrap();
            db.rows
                .iter()
                .map(|(id, payload)| StoredJob::new(*id, payload.clone()))
                .collect()
        }

        pub fn connect_count(&self) -> usize {
            self.db.lock().unwrap().connects
        }

        /// Number of `select_batch` calls served
        pub fn select_count(&self) -> usize {
            self.db.lock().unwrap().selects
        }

        pub fn is_connected(&self) -> bool {
            self.db.lock().unwrap().connected
        }

        pub fn set_fail_connect(&self, fail: bool) {
            self.db.lock().unwrap().fail_connect = fail;
        }

        pub fn set_fail_insert(&self, fail: bool) {
            self.db.lock().unwrap().fail_insert = fail;
        }

        pub fn set_fail_delete(&self, fail: bool) {
            self.db.lock().unwrap().fail_delete = fail;
        }

        pub fn set_fail_select(&self, fail: bool) {
            self.db.lock().unwrap().fail_select = fail;
        }
    }

    #[async_trait]
    impl JobStore for MockJobStore {
        type Handle = Arc<Mutex<MockDb>>;

        async fn connect(&self, location: &Location) -> Result<Self::Handle> {
            let mut db = self.db.lock().unwrap();
            if db.fail_connect {
                return Err(QueueError::Open(format!(
                    "permission denied: {}",
                    location
                )));
            }
            db.connected = true;
            db.connects += 1;
            Ok(Arc::clone(&self.db))
        }

        async fn count_live(&self, handle: &Self::Handle) -> Result<u64> {
            let db = handle.lock().unwrap();
            db.ensure_connected()?;
            Ok(db.rows.len() as u64)
        }

        async fn insert(&self, handle: &Self::Handle, payload: &str) -> Result<JobId> {
            let mut db = handle.lock().unwrap();
            db.ensure_connected()?;
            if db.fail_insert {
                return Err(QueueError::Io("disk I/O error".to_string()));
            }
            db.last_id += 1;
            let id = db.last_id;
            db.rows.insert(id, payload.to_string());
            Ok(id)
        }

        async fn select_batch(
            &self,
            handle: &Self::Handle,
            after_or_equal: JobId,
            limit: usize,
            exclude: &[JobId],
        ) -> Result<Vec<StoredJob>> {
            let mut db = handle.lock().unwrap();
            db.ensure_connected()?;
            db.selects += 1;
            if db.fail_select {
                return Err(QueueError::Io("disk I/O error".to_string()));
            }
            Ok(db
                .rows
                .range(after_or_equal..)
                .filter(|(id, _)| !exclude.contains(*id))
                .take(limit)
                .map(|(id, payload)| StoredJob::new(*id, payload.clone()))
                .collect())
        }

        async fn delete_by_id(&self, handle: &Self::Handle, id: JobId) -> Result<()> {
            let mut db = handle.lock().unwrap();
            db.ensure_connected()?;
            if db.fail_delete {
                return Err(QueueError::Io("disk I/O error".to_string()));
            }
            db.rows.remove(&id);
            Ok(())
        }

        async fn search_all(&self, handle: &Self::Handle) -> Result<Vec<StoredJob>> {
            let db = handle.lock().unwrap();
            db.ensure_connected()?;
            if db.fail_select {
                return Err(QueueError::Io("disk I/O error".to_string()));
            }
            Ok(db
                .rows
                .iter()
                .map(|(id, payload)| StoredJob::new(*id, payload.clone()))
                .collect())
        }

        async fn disconnect(&self, handle: Self::Handle) -> Result<()> {
            handle.lock().unwrap().connected = false;
            Ok(())
        }
    }
}
