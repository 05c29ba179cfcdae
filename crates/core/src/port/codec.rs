// Codec Port (payload <-> store text)

use crate::domain::JobPayload;
use crate::error::{QueueError, Result};

/// Payload codec. Stateless, shareable across queues.
pub trait Codec: Send + Sync {
    fn encode(&self, payload: &JobPayload) -> Result<String>;

    /// Fails with `QueueError::Decode` on malformed text
    fn decode(&self, text: &str) -> Result<JobPayload>;
}

/// JSON codec (production default)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, payload: &JobPayload) -> Result<String> {
        serde_json::to_string(payload.as_value()).map_err(|e| QueueError::Encode(e.to_string()))
    }

    fn decode(&self, text: &str) -> Result<JobPayload> {
        serde_json::from_str(text)
            .map(JobPayload::new)
            .map_err(|e| QueueError::Decode(e.to_string()))
    }
}
