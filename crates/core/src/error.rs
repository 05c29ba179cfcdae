// Central Error Type for the Queue

use thiserror::Error;

/// Queue-level error type
///
/// Every variant carries owned data only, so errors can be cloned into
/// [`QueueEvent::Error`](crate::application::QueueEvent::Error) notifications.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Bad constructor options (batch size, delay, unparsable config source)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation requires an open queue
    #[error("Queue is not open")]
    NotOpen,

    /// Store connect failure (permission, path, corruption, migration)
    #[error("Failed to open store: {0}")]
    Open(String),

    /// A stored payload could not be decoded by the codec
    #[error("Decode error: {0}")]
    Decode(String),

    /// A payload could not be encoded by the codec
    #[error("Encode error: {0}")]
    Encode(String),

    /// Store failure during insert/select/delete
    #[error("Store I/O error: {0}")]
    Io(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// `done()` called with no job awaiting acknowledgement
    #[error("No job is awaiting acknowledgement")]
    NotProcessing,
}

impl QueueError {
    pub fn is_decode(&self) -> bool {
        matches!(self, QueueError::Decode(_))
    }
}

/// Result type alias using QueueError
pub type Result<T> = std::result::Result<T, QueueError>;

// Note: sqlx::Error conversion lives in the infra-sqlite crate
// (map_sqlx_error), core never sees database types.
