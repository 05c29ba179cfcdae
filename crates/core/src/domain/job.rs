// Job Domain Model

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job ID (assigned by the store, strictly increasing, never reused)
pub type JobId = i64;

/// Job Payload (JSON value, opaque to the engine except for criteria search)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobPayload(Value);

impl JobPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Structural containment match.
    ///
    /// An object `criteria` matches when every one of its keys exists in the
    /// payload with a deep-equal value; extra payload keys are ignored. An
    /// empty object matches every payload. Any other `criteria` value must
    /// equal the whole payload.
    pub fn matches(&self, criteria: &Value) -> bool {
        match (criteria, &self.0) {
            (Value::Object(wanted), _) if wanted.is_empty() => true,
            (Value::Object(wanted), Value::Object(have)) => wanted
                .iter()
                .all(|(key, value)| have.get(key) == Some(value)),
            (Value::Object(_), _) => false,
            (other, value) => other == value,
        }
    }
}

impl From<Value> for JobPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Job Entity
///
/// Created by `Queue::add`, destroyed by `Queue::done`. Never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub payload: JobPayload,
}

impl Job {
    pub fn new(id: JobId, payload: impl Into<JobPayload>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}
