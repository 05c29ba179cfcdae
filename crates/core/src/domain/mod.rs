// Domain Layer - Jobs and queue options

pub mod job;
pub mod queue;

// Re-exports
pub use job::{Job, JobId, JobPayload};
pub use queue::{Location, QueueConfig, QueueOptions, MEMORY_LOCATION};
