// fifoq Core - Queue Engine, Domain & Ports
// NO infrastructure dependencies: stores plug in through port::JobStore

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{Queue, QueueEvent};
pub use domain::{Job, JobId, JobPayload, Location, QueueOptions};
pub use error::{QueueError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
