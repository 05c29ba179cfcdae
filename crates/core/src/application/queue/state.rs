// Queue Lifecycle State Machine

use crate::error::{QueueError, Result};

/// Connection axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Closed,
    /// `open()` is awaiting the store
    Opening,
    Open,
}

/// Running axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Running {
    Stopped,
    Started,
}

/// Delivery axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Idle,
    /// Exactly one job delivered, awaiting `done()`
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BeginOpen,
    FinishOpen,
    AbortOpen,
    Close,
    Start,
    Stop,
    Deliver,
    Acknowledge,
}

/// The three lifecycle axes. All changes go through [`Lifecycle::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    connection: Connection,
    running: Running,
    delivery: Delivery,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            connection: Connection::Closed,
            running: Running::Stopped,
            delivery: Delivery::Idle,
        }
    }
}

impl Lifecycle {
    pub fn connection(&self) -> Connection {
        self.connection
    }

    pub fn running(&self) -> Running {
        self.running
    }

    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    pub fn is_open(&self) -> bool {
        self.connection == Connection::Open
    }

    pub fn is_started(&self) -> bool {
        self.running == Running::Started
    }

    pub fn is_idle(&self) -> bool {
        self.delivery == Delivery::Idle
    }

    pub fn require_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(QueueError::NotOpen)
        }
    }

    pub fn apply(&mut self, transition: Transition) -> Result<()> {
        match transition {
            Transition::BeginOpen => match self.connection {
                Connection::Closed => self.connection = Connection::Opening,
                Connection::Opening => {
                    return Err(QueueError::InvalidState(
                        "open already in progress".to_string(),
                    ))
                }
                Connection::Open => {
                    return Err(QueueError::InvalidState("queue is already open".to_string()))
                }
            },
            Transition::FinishOpen | Transition::AbortOpen => {
                if self.connection != Connection::Opening {
                    return Err(QueueError::InvalidState(format!(
                        "{:?} outside of an open in progress",
                        transition
                    )));
                }
                *self = Self::default();
                if transition == Transition::FinishOpen {
                    self.connection = Connection::Open;
                }
            }
            Transition::Close => {
                self.require_open()?;
                *self = Self::default();
            }
            Transition::Start => {
                self.require_open()?;
                self.running = Running::Started;
            }
            Transition::Stop => {
                self.require_open()?;
                self.running = Running::Stopped;
            }
            Transition::Deliver => {
                self.require_open()?;
                if self.delivery == Delivery::Processing {
                    return Err(QueueError::InvalidState(
                        "a job is already awaiting acknowledgement".to_string(),
                    ));
                }
                self.delivery = Delivery::Processing;
            }
            Transition::Acknowledge => {
                self.require_open()?;
                if self.delivery == Delivery::Idle {
                    return Err(QueueError::NotProcessing);
                }
                self.delivery = Delivery::Idle;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened() -> Lifecycle {
        let mut lifecycle = Lifecycle::default();
        lifecycle.apply(Transition::BeginOpen).unwrap();
        lifecycle.apply(Transition::FinishOpen).unwrap();
        lifecycle
    }

    #[test]
    fn test_starts_closed_stopped_idle() {
        let lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.connection(), Connection::Closed);
        assert_eq!(lifecycle.running(), Running::Stopped);
        assert_eq!(lifecycle.delivery(), Delivery::Idle);
    }

    #[test]
    fn test_open_sequence() {
        let mut lifecycle = Lifecycle::default();
        lifecycle.apply(Transition::BeginOpen).unwrap();
        assert_eq!(lifecycle.connection(), Connection::Opening);
        assert!(!lifecycle.is_open());

        // Second open while the first is in flight
        assert!(matches!(
            lifecycle.apply(Transition::BeginOpen),
            Err(QueueError::InvalidState(_))
        ));

        lifecycle.apply(Transition::FinishOpen).unwrap();
        assert!(lifecycle.is_open());
        assert!(matches!(
            lifecycle.apply(Transition::BeginOpen),
            Err(QueueError::InvalidState(_))
        ));
    }

    #[test]
    fn test_aborted_open_returns_to_closed() {
        let mut lifecycle = Lifecycle::default();
        lifecycle.apply(Transition::BeginOpen).unwrap();
        lifecycle.apply(Transition::AbortOpen).unwrap();
        assert_eq!(lifecycle, Lifecycle::default());
    }

    #[test]
    fn test_requires_open() {
        let mut lifecycle = Lifecycle::default();
        for transition in [
            Transition::Close,
            Transition::Start,
            Transition::Stop,
            Transition::Deliver,
            Transition::Acknowledge,
        ] {
            assert_eq!(lifecycle.apply(transition), Err(QueueError::NotOpen));
        }
        assert_eq!(lifecycle, Lifecycle::default());
    }

    #[test]
    fn test_deliver_and_acknowledge() {
        let mut lifecycle = opened();
        lifecycle.apply(Transition::Start).unwrap();

        lifecycle.apply(Transition::Deliver).unwrap();
        assert_eq!(lifecycle.delivery(), Delivery::Processing);
        assert!(lifecycle.apply(Transition::Deliver).is_err());

        lifecycle.apply(Transition::Acknowledge).unwrap();
        assert!(lifecycle.is_idle());
        assert_eq!(
            lifecycle.apply(Transition::Acknowledge),
            Err(QueueError::NotProcessing)
        );
    }

    #[test]
    fn test_stop_keeps_delivery() {
        let mut lifecycle = opened();
        lifecycle.apply(Transition::Start).unwrap();
        lifecycle.apply(Transition::Deliver).unwrap();
        lifecycle.apply(Transition::Stop).unwrap();

        assert!(!lifecycle.is_started());
        assert_eq!(lifecycle.delivery(), Delivery::Processing);
    }

    #[test]
    fn test_close_resets_every_axis() {
        let mut lifecycle = opened();
        lifecycle.apply(Transition::Start).unwrap();
        lifecycle.apply(Transition::Deliver).unwrap();
        lifecycle.apply(Transition::Close).unwrap();

        assert_eq!(lifecycle, Lifecycle::default());
    }
}
