// Event Channel - synchronous, ordered observer notification

use crate::domain::Job;
use crate::error::QueueError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Events emitted by the queue engine
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Open,
    Close,
    Start,
    Stop,
    /// A job was persisted
    Add(Job),
    /// A job was delivered and awaits `done()`
    Next(Job),
    /// A delivered job was acknowledged and deleted
    Done(Job),
    /// No job left to deliver
    Empty,
    /// A dequeue step triggered in the background failed
    Error(QueueError),
}

impl QueueEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            QueueEvent::Open => EventKind::Open,
            QueueEvent::Close => EventKind::Close,
            QueueEvent::Start => EventKind::Start,
            QueueEvent::Stop => EventKind::Stop,
            QueueEvent::Add(_) => EventKind::Add,
            QueueEvent::Next(_) => EventKind::Next,
            QueueEvent::Done(_) => EventKind::Done,
            QueueEvent::Empty => EventKind::Empty,
            QueueEvent::Error(_) => EventKind::Error,
        }
    }
}

/// Event name, used to filter subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Close,
    Start,
    Stop,
    Add,
    Next,
    Done,
    Empty,
    Error,
}

/// Handle returned by `subscribe`/`on`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&QueueEvent) + Send + Sync>;

struct Registration {
    id: SubscriptionId,
    filter: Option<EventKind>,
    observer: Observer,
}

/// Ordered list of observers.
///
/// `emit` calls observers synchronously in registration order. The list is
/// snapshotted before delivery, so observers may (un)subscribe from inside a
/// callback; an observer added during an emit sees the next event only.
#[derive(Default)]
pub struct Dispatcher {
    observers: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe every event
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(observer))
    }

    /// Observe one kind of event
    pub fn on<F>(&self, kind: EventKind, observer: F) -> SubscriptionId
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(observer))
    }

    /// Forward every event into an unbounded channel.
    ///
    /// The subscription stays registered until the receiver is dropped and the
    /// next event fails to send.
    pub fn channel(self: &Arc<Self>) -> mpsc::UnboundedReceiver<QueueEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let weak = Arc::downgrade(self);
        let id_cell: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let id_for_observer = Arc::clone(&id_cell);

        let id = self.subscribe(move |event| {
            if tx.send(event.clone()).is_err() {
                // Receiver gone: drop this registration
                let id = *id_for_observer.lock().unwrap_or_else(|e| e.into_inner());
                if let (Some(id), Some(dispatcher)) = (id, weak.upgrade()) {
                    dispatcher.unsubscribe(id);
                }
            }
        });
        *id_cell.lock().unwrap_or_else(|e| e.into_inner()) = Some(id);
        rx
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.lock();
        let before = observers.len();
        observers.retain(|r| r.id != id);
        observers.len() != before
    }

    #[cfg(test)]
    pub fn observer_count(&self) -> usize {
        self.lock().len()
    }

    pub fn emit(&self, event: QueueEvent) {
        let kind = event.kind();
        let snapshot: Vec<Observer> = self
            .lock()
            .iter()
            .filter(|r| r.filter.map_or(true, |k| k == kind))
            .map(|r| Arc::clone(&r.observer))
            .collect();

        for observer in snapshot {
            observer(&event);
        }
    }

    fn register(&self, filter: Option<EventKind>, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Registration {
            id,
            filter,
            observer,
        });
        id
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Registration>> {
        // A panicking observer never holds this lock, recover the list as-is
        self.observers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
