//! Shared helpers for the end-to-end suites

#![allow(dead_code)]

use fifoq_core::application::QueueEvent;
use fifoq_core::{Job, Queue, QueueOptions};
use fifoq_infra_sqlite::SqliteJobStore;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

/// A database path inside a fresh temporary directory
pub fn temp_store() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    (dir, path)
}

pub fn file_options(path: &Path) -> QueueOptions {
    QueueOptions::new(path.to_string_lossy().into_owned())
}

pub async fn open_queue(options: QueueOptions) -> Queue<SqliteJobStore> {
    let queue = Queue::new(SqliteJobStore::new(), options).unwrap();
    queue.open().await.unwrap();
    queue
}

/// Start the queue and acknowledge every delivery until `empty`
pub async fn consume_all(
    queue: &Queue<SqliteJobStore>,
    events: &mut UnboundedReceiver<QueueEvent>,
) -> Vec<Job> {
    let mut delivered = Vec::new();
    queue.start().await.unwrap();

    while let Some(event) = events.recv().await {
        match event {
            QueueEvent::Next(job) => {
                delivered.push(job);
                queue.done().await.unwrap();
            }
            QueueEvent::Empty => break,
            QueueEvent::Error(e) => panic!("unexpected queue error: {}", e),
            _ => {}
        }
    }

    delivered
}
