// Port Layer - Interfaces for external dependencies

pub mod codec;
pub mod job_store;

// Re-exports
pub use codec::{Codec, JsonCodec};
pub use job_store::{JobStore, StoredJob};
