// Queue Engine - lifecycle, dequeue loop, acknowledgement, throttle, search

mod prefetch;
mod search;
pub mod state;


use prefetch::PrefetchCache;
pub use state::{Connection, Delivery, Lifecycle, Running, Transition};

use crate::application::events::{Dispatcher, EventKind, QueueEvent, SubscriptionId};
use crate::domain::{Job, JobId, JobPayload, QueueConfig, QueueOptions};
use crate::error::{QueueError, Result};
use crate::port::{Codec, JobStore, JsonCodec, StoredJob};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, trace, warn};

/// Mutable engine state. Guarded by one mutex that is never held across an
/// `.await` nor while observers run.
struct EngineState<H> {
    lifecycle: Lifecycle,
    handle: Option<H>,
    length: u64,
    cache: PrefetchCache,
    /// Delivered, not yet acknowledged
    in_flight: Option<Job>,
    /// Lowest id the next refill asks for
    cursor: JobId,
    /// Bumped on every open/close; store results from an older connection are dropped
    generation: u64,
    dequeue_in_progress: bool,
    /// An add landed while a refill was reading the store
    wake_requested: bool,
    acknowledging: bool,
    empty_notified: bool,
    delay_timer: Option<AbortHandle>,
    timer_seq: u64,
}

impl<H> EngineState<H> {
    fn new(batch_size: usize) -> Self {
        Self {
            lifecycle: Lifecycle::default(),
            handle: None,
            length: 0,
            cache: PrefetchCache::new(batch_size),
            in_flight: None,
            cursor: 0,
            generation: 0,
            dequeue_in_progress: false,
            wake_requested: false,
            acknowledging: false,
            empty_notified: false,
            delay_timer: None,
            timer_seq: 0,
        }
    }

    fn cancel_timer(&mut self) {
        self.timer_seq += 1;
        if let Some(timer) = self.delay_timer.take() {
            timer.abort();
        }
    }

    fn can_dequeue(&self) -> bool {
        self.lifecycle.is_open()
            && self.lifecycle.is_started()
            && self.lifecycle.is_idle()
            && self.delay_timer.is_none()
    }

    /// Drop everything tied to the current connection
    fn reset_connection(&mut self) {
        self.cancel_timer();
        self.cache.clear();
        self.in_flight = None;
        self.cursor = 0;
        self.generation += 1;
        self.dequeue_in_progress = false;
        self.wake_requested = false;
        self.acknowledging = false;
        self.empty_notified = false;
    }
}

struct Inner<S: JobStore> {
    config: QueueConfig,
    store: S,
    codec: Arc<dyn Codec>,
    events: Arc<Dispatcher>,
    state: Mutex<EngineState<S::Handle>>,
}

enum AfterAcknowledge {
    Idle,
    DequeueNow,
    DelayArmed,
}

/// Durable single-consumer FIFO queue.
///
/// Producers call [`add`](Queue::add). The consumer listens for
/// [`QueueEvent::Next`] and confirms each job with [`done`](Queue::done);
/// the next job is delivered only after that (optionally after
/// `afterProcessDelay`). Cloning yields another handle to the same queue.
pub struct Queue<S: JobStore> {
    inner: Arc<Inner<S>>,
}

impl<S: JobStore> Clone for Queue<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: JobStore> Queue<S> {
    /// Create a closed queue using the JSON codec.
    ///
    /// Fails with `InvalidConfig` when the options don't validate.
    pub fn new(store: S, options: impl Into<QueueOptions>) -> Result<Self> {
        Self::with_codec(store, options, Arc::new(JsonCodec))
    }

    pub fn with_codec(
        store: S,
        options: impl Into<QueueOptions>,
        codec: Arc<dyn Codec>,
    ) -> Result<Self> {
        let config = options.into().validate()?;
        let state = EngineState::new(config.batch_size);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                codec,
                events: Arc::new(Dispatcher::new()),
                state: Mutex::new(state),
            }),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(observer)
    }

    pub fn on<F>(&self, kind: EventKind, observer: F) -> SubscriptionId
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Receive every future event through a channel
    pub fn events(&self) -> mpsc::UnboundedReceiver<QueueEvent> {
        self.inner.events.channel()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Connect the store, count live jobs and prefetch the first batch.
    pub async fn open(&self) -> Result<()> {
        self.inner.state().lifecycle.apply(Transition::BeginOpen)?;

        let location = &self.inner.config.location;
        info!(location = %location, "Opening queue");

        let handle = match self.inner.store.connect(location).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(location = %location, error = %e, "Failed to connect store");
                self.inner.abort_open();
                return Err(into_open_error(e));
            }
        };

        let (length, jobs) = match self.inner.hydrate(&handle).await {
            Ok(hydrated) => hydrated,
            Err(e) => {
                error!(location = %location, error = %e, "Failed to load queue");
                if let Err(disconnect_err) = self.inner.store.disconnect(handle).await {
                    warn!(error = %disconnect_err, "Failed to disconnect after open failure");
                }
                self.inner.abort_open();
                return Err(into_open_error(e));
            }
        };

        {
            let mut st = self.inner.state();
            st.lifecycle.apply(Transition::FinishOpen)?;
            st.reset_connection();
            st.cache.refill(jobs);
            st.length = length;
            st.handle = Some(handle);
        }

        info!(location = %location, length, "Queue opened");
        self.inner.events.emit(QueueEvent::Open);
        Ok(())
    }

    /// Disconnect the store. A job awaiting `done()` is redelivered after the next open.
    pub async fn close(&self) -> Result<()> {
        let handle = {
            let mut st = self.inner.state();
            st.lifecycle.apply(Transition::Close)?;
            if let Some(job) = &st.in_flight {
                debug!(job_id = job.id, "Closing with an unacknowledged job");
            }
            st.reset_connection();
            st.handle.take()
        };

        let disconnected = match handle {
            Some(handle) => self.inner.store.disconnect(handle).await,
            None => Ok(()),
        };
        if let Err(e) = &disconnected {
            warn!(error = %e, "Store disconnect failed");
        }

        info!(location = %self.inner.config.location, "Queue closed");
        self.inner.events.emit(QueueEvent::Close);
        disconnected
    }

    /// Begin delivering jobs
    pub async fn start(&self) -> Result<()> {
        let should_dequeue = {
            let mut st = self.inner.state();
            st.lifecycle.apply(Transition::Start)?;
            st.can_dequeue() && st.length > 0
        };

        debug!("Queue started");
        self.inner.events.emit(QueueEvent::Start);
        if should_dequeue {
            self.inner.run_dequeue().await;
        }
        Ok(())
    }

    /// Stop delivering after the current job. Cancels a pending delay.
    pub fn stop(&self) -> Result<()> {
        {
            let mut st = self.inner.state();
            st.lifecycle.apply(Transition::Stop)?;
            st.cancel_timer();
        }

        debug!("Queue stopped");
        self.inner.events.emit(QueueEvent::Stop);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Producer / consumer
    // ------------------------------------------------------------------

    /// Persist a job; delivers it right away when the queue is started and idle.
    pub async fn add(&self, payload: impl Into<JobPayload>) -> Result<Job> {
        let payload = payload.into();
        let text = self.inner.codec.encode(&payload)?;

        // The row is committed before insert returns and may be delivered and
        // acknowledged meanwhile, so it is counted up front
        let (handle, generation) = {
            let mut st = self.inner.state();
            st.lifecycle.require_open()?;
            let handle = st.handle.clone().ok_or(QueueError::NotOpen)?;
            st.length += 1;
            (handle, st.generation)
        };

        let id = match self.inner.store.insert(&handle, &text).await {
            Ok(id) => id,
            Err(e) => {
                let mut st = self.inner.state();
                if st.generation == generation {
                    st.length = st.length.saturating_sub(1);
                }
                return Err(e);
            }
        };
        let job = Job::new(id, payload);

        let should_dequeue = {
            let mut st = self.inner.state();
            if st.generation != generation {
                // Closed while inserting: the row is stored, the next open counts it
                return Ok(job);
            }
            if st.dequeue_in_progress {
                st.wake_requested = true;
            }
            st.can_dequeue()
        };

        trace!(job_id = id, "Job added");
        self.inner.events.emit(QueueEvent::Add(job.clone()));
        if should_dequeue {
            self.inner.run_dequeue().await;
        }
        Ok(job)
    }

    /// Acknowledge the delivered job: delete it and move on to the next one.
    ///
    /// Returns `NotProcessing` when no job is awaiting acknowledgement. On a
    /// store failure nothing changes and the job stays in flight.
    pub async fn done(&self) -> Result<()> {
        let (handle, job, generation) = {
            let mut st = self.inner.state();
            st.lifecycle.require_open()?;
            if st.acknowledging {
                return Err(QueueError::InvalidState(
                    "acknowledgement already in progress".to_string(),
                ));
            }
            let job = match (st.lifecycle.delivery(), &st.in_flight) {
                (Delivery::Processing, Some(job)) => job.clone(),
                _ => return Err(QueueError::NotProcessing),
            };
            let handle = st.handle.clone().ok_or(QueueError::NotOpen)?;
            st.acknowledging = true;
            (handle, job, st.generation)
        };

        let deleted = self.inner.store.delete_by_id(&handle, job.id).await;

        let next = {
            let mut st = self.inner.state();
            if st.generation != generation {
                return deleted;
            }
            st.acknowledging = false;
            if let Err(e) = deleted {
                warn!(job_id = job.id, error = %e, "Failed to acknowledge job");
                return Err(e);
            }
            st.lifecycle.apply(Transition::Acknowledge)?;
            st.in_flight = None;
            st.length = st.length.saturating_sub(1);

            let delay = self.inner.config.after_process_delay;
            if !st.lifecycle.is_started() {
                AfterAcknowledge::Idle
            } else if delay > Duration::ZERO {
                Inner::arm_delay_timer(&self.inner, &mut st, delay);
                AfterAcknowledge::DelayArmed
            } else {
                AfterAcknowledge::DequeueNow
            }
        };

        debug!(job_id = job.id, "Job acknowledged");
        self.inner.events.emit(QueueEvent::Done(job));
        match next {
            AfterAcknowledge::DequeueNow => self.inner.run_dequeue().await,
            AfterAcknowledge::DelayArmed | AfterAcknowledge::Idle => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Live jobs whose payload contains `criteria`, ascending by id
    pub async fn find_jobs(&self, criteria: &Value) -> Result<Vec<Job>> {
        let (handle, resident) = {
            let st = self.inner.state();
            st.lifecycle.require_open()?;
            let handle = st.handle.clone().ok_or(QueueError::NotOpen)?;
            let resident: Vec<Job> = st
                .cache
                .iter()
                .cloned()
                .chain(st.in_flight.clone())
                .collect();
            (handle, resident)
        };

        let rows = self.inner.store.search_all(&handle).await?;
        let stored = self.inner.decode_rows(rows)?;
        Ok(search::matching_jobs(stored, resident, criteria))
    }

    pub async fn job_ids(&self, criteria: &Value) -> Result<Vec<JobId>> {
        let jobs = self.find_jobs(criteria).await?;
        Ok(jobs.into_iter().map(|job| job.id).collect())
    }

    pub async fn first_job_id(&self, criteria: &Value) -> Result<Option<JobId>> {
        let jobs = self.find_jobs(criteria).await?;
        Ok(jobs.first().map(|job| job.id))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn is_open(&self) -> bool {
        self.inner.state().lifecycle.is_open()
    }

    pub fn is_started(&self) -> bool {
        self.inner.state().lifecycle.is_started()
    }

    /// Snapshot of the three lifecycle axes
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.state().lifecycle
    }

    /// Number of live (not yet acknowledged) jobs
    pub fn length(&self) -> Result<u64> {
        let st = self.inner.state();
        st.lifecycle.require_open()?;
        Ok(st.length)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.length()? == 0)
    }

    /// The store connection (the SQLite pool for the SQLite adapter)
    pub fn handle(&self) -> Result<S::Handle> {
        Ok(self.inner.connection()?.0)
    }

    /// Job delivered and awaiting `done()`, if any
    pub fn in_flight(&self) -> Result<Option<Job>> {
        let st = self.inner.state();
        st.lifecycle.require_open()?;
        Ok(st.in_flight.clone())
    }
}

impl<S: JobStore> Inner<S> {
    fn state(&self) -> MutexGuard<'_, EngineState<S::Handle>> {
        // State stays consistent between statements, recover it after a panic elsewhere
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn connection(&self) -> Result<(S::Handle, u64)> {
        let st = self.state();
        st.lifecycle.require_open()?;
        let handle = st.handle.clone().ok_or(QueueError::NotOpen)?;
        Ok((handle, st.generation))
    }

    fn abort_open(&self) {
        if let Err(e) = self.state().lifecycle.apply(Transition::AbortOpen) {
            warn!(error = %e, "Unexpected state while aborting open");
        }
    }

    async fn hydrate(&self, handle: &S::Handle) -> Result<(u64, Vec<Job>)> {
        let length = self.store.count_live(handle).await?;
        let jobs = self.fetch_batch(handle, 0, &[]).await?;
        Ok((length, jobs))
    }

    async fn fetch_batch(
        &self,
        handle: &S::Handle,
        cursor: JobId,
        exclude: &[JobId],
    ) -> Result<Vec<Job>> {
        let rows = self
            .store
            .select_batch(handle, cursor, self.config.batch_size, exclude)
            .await?;
        self.decode_rows(rows)
    }

    fn decode_rows(&self, rows: Vec<StoredJob>) -> Result<Vec<Job>> {
        rows.into_iter()
            .map(|row| match self.codec.decode(&row.payload) {
                Ok(payload) => Ok(Job::new(row.id, payload)),
                Err(QueueError::Decode(reason)) => {
                    Err(QueueError::Decode(format!("job {}: {}", row.id, reason)))
                }
                Err(other) => Err(other),
            })
            .collect()
    }

    /// Dequeue step run as a side effect; failures become `Error` events.
    async fn run_dequeue(&self) {
        if let Err(e) = self.dequeue().await {
            error!(error = %e, "Dequeue step failed");
            self.events.emit(QueueEvent::Error(e));
        }
    }

    async fn dequeue(&self) -> Result<()> {
        loop {
            let (generation, refill) = {
                let mut st = self.state();
                if !st.can_dequeue() || st.dequeue_in_progress {
                    return Ok(());
                }
                let refill = if st.cache.is_empty() {
                    let handle = st.handle.clone().ok_or(QueueError::NotOpen)?;
                    Some((handle, st.cursor, st.cache.ids()))
                } else {
                    None
                };
                st.wake_requested = false;
                st.dequeue_in_progress = true;
                (st.generation, refill)
            };

            let fetched = match refill {
                Some((handle, cursor, exclude)) => {
                    let fetched = self.fetch_batch(&handle, cursor, &exclude).await;
                    match fetched {
                        Ok(jobs) => Some(jobs),
                        Err(e) => {
                            let mut st = self.state();
                            if st.generation == generation {
                                st.dequeue_in_progress = false;
                            }
                            return Err(e);
                        }
                    }
                }
                None => None,
            };

            let event = {
                let mut st = self.state();
                if st.generation != generation {
                    return Ok(());
                }
                st.dequeue_in_progress = false;
                if let Some(jobs) = fetched {
                    let taken = st.cache.refill(jobs);
                    debug!(taken, cursor = st.cursor, "Prefetch cache refilled");
                }
                if !st.can_dequeue() {
                    // Stopped while the store was read
                    return Ok(());
                }

                match st.cache.pop_front() {
                    Some(job) => {
                        st.lifecycle.apply(Transition::Deliver)?;
                        st.cursor = job.id + 1;
                        st.in_flight = Some(job.clone());
                        st.empty_notified = false;
                        QueueEvent::Next(job)
                    }
                    None if st.wake_requested => continue,
                    None if st.empty_notified => return Ok(()),
                    None => {
                        st.empty_notified = true;
                        QueueEvent::Empty
                    }
                }
            };

            match &event {
                QueueEvent::Next(job) => trace!(job_id = job.id, "Delivering job"),
                _ => debug!("Queue drained"),
            }
            self.events.emit(event);
            return Ok(());
        }
    }

    /// Schedule the next dequeue step after `delay`. Caller holds the state lock.
    fn arm_delay_timer(this: &Arc<Self>, st: &mut EngineState<S::Handle>, delay: Duration) {
        st.cancel_timer();
        let seq = st.timer_seq;
        let inner = Arc::clone(this);

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut st = inner.state();
                if st.timer_seq != seq {
                    return;
                }
                st.delay_timer = None;
            }
            inner.run_dequeue().await;
        });
        st.delay_timer = Some(task.abort_handle());
    }
}

/// Store failures while opening surface as `Open`; decode failures keep their kind.
fn into_open_error(err: QueueError) -> QueueError {
    match err {
        QueueError::Io(reason) => QueueError::Open(reason),
        other => other,
    }
}
