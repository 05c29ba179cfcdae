// Application Layer - Queue engine and its event channel

pub mod events;
pub mod queue;

// Re-exports
pub use events::{Dispatcher, EventKind, QueueEvent, SubscriptionId};
pub use queue::{Connection, Delivery, Lifecycle, Queue, Running, Transition};
