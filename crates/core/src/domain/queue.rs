// Queue Domain Model (location + options)

use crate::error::{QueueError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Reserved store value selecting a process-local, non-durable store
pub const MEMORY_LOCATION: &str = ":memory:";

/// Default prefetch window
pub const DEFAULT_BATCH_SIZE: i64 = 10;

/// Default pause between acknowledging one job and delivering the next (ms)
pub const DEFAULT_AFTER_PROCESS_DELAY_MS: i64 = 0;

/// Environment variables read by [`QueueOptions::from_env`]
pub const ENV_STORE: &str = "FIFOQ_STORE";
pub const ENV_BATCH_SIZE: &str = "FIFOQ_BATCH_SIZE";
pub const ENV_AFTER_PROCESS_DELAY_MS: &str = "FIFOQ_AFTER_PROCESS_DELAY_MS";

/// Where the durable store lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Process-local store, lost on close
    Memory,
    /// File-backed store
    File(PathBuf),
}

impl Location {
    /// Empty string and `:memory:` select the in-memory store.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == MEMORY_LOCATION {
            Location::Memory
        } else {
            Location::File(PathBuf::from(trimmed))
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, Location::File(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Memory => write!(f, "{}", MEMORY_LOCATION),
            Location::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Raw queue options, as a caller or config source supplies them.
///
/// Validated into [`QueueConfig`] when the queue is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct QueueOptions {
    /// Store location (file path, or `""` / `:memory:`)
    pub store: String,
    /// Prefetch window, must be >= 1
    pub batch_size: i64,
    /// Milliseconds to wait after `done` before the next delivery, must be >= 0
    pub after_process_delay: i64,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            store: MEMORY_LOCATION.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            after_process_delay: DEFAULT_AFTER_PROCESS_DELAY_MS,
        }
    }
}

impl QueueOptions {
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            ..Self::default()
        }
    }

    pub fn batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn after_process_delay(mut self, millis: i64) -> Self {
        self.after_process_delay = millis;
        self
    }

    /// Parse options from JSON. A bare JSON string is shorthand for `{"store": ...}`.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| QueueError::InvalidConfig(format!("malformed options: {}", e)))?;

        match value {
            Value::String(store) => Ok(Self::new(store)),
            other => serde_json::from_value(other)
                .map_err(|e| QueueError::InvalidConfig(e.to_string())),
        }
    }

    /// Read options from `FIFOQ_*` environment variables; absent ones keep defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injected variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::default();

        if let Some(store) = lookup(ENV_STORE) {
            options.store = store;
        }
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            options.batch_size = parse_integer(ENV_BATCH_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_AFTER_PROCESS_DELAY_MS) {
            options.after_process_delay = parse_integer(ENV_AFTER_PROCESS_DELAY_MS, &raw)?;
        }

        Ok(options)
    }

    pub fn validate(&self) -> Result<QueueConfig> {
        QueueConfig::try_from(self.clone())
    }
}

fn parse_integer(key: &str, raw: &str) -> Result<i64> {
    raw.trim().parse().map_err(|_| {
        QueueError::InvalidConfig(format!("{} must be an integer, got {:?}", key, raw))
    })
}

impl From<&str> for QueueOptions {
    fn from(store: &str) -> Self {
        Self::new(store)
    }
}

impl From<String> for QueueOptions {
    fn from(store: String) -> Self {
        Self::new(store)
    }
}

/// Validated queue configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub location: Location,
    pub batch_size: usize,
    pub after_process_delay: Duration,
}

impl TryFrom<QueueOptions> for QueueConfig {
    type Error = QueueError;

    fn try_from(options: QueueOptions) -> Result<Self> {
        if options.batch_size < 1 {
            return Err(QueueError::InvalidConfig(format!(
                "batchSize must be a positive integer, got {}",
                options.batch_size
            )));
        }
        let batch_size = usize::try_from(options.batch_size).map_err(|_| {
            QueueError::InvalidConfig(format!("batchSize {} is too large", options.batch_size))
        })?;

        if options.after_process_delay < 0 {
            return Err(QueueError::InvalidConfig(format!(
                "afterProcessDelay must not be negative, got {}",
                options.after_process_delay
            )));
        }

        Ok(Self {
            location: Location::parse(&options.store),
            batch_size,
            after_process_delay: Duration::from_millis(options.after_process_delay as u64),
        })
    }
}
