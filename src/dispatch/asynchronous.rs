//! # Queued dispatch through a worker pool.
//!
//! ## Architecture
//! ```text
//! publish(holder) ──► [bounded mpsc queue] ──► Mutex<Receiver> ──┬─► worker 1 ──► Publisher::dispatch
//!  (many producers)     capacity N, FIFO        single claim     ├─► worker 2 ──► Publisher::dispatch
//!                                                                └─► worker K ──► Publisher::dispatch
//! ```
//!
//! ## Rules
//! - **Back-pressure**: a full queue blocks the publisher, or with an enqueue
//!   timeout rejects it with [`PublishError::Timeout`]
//! - **No silent drops**: every rejection is reported to the funnel
//! - **Ordering**: same-producer FIFO into the queue only; K workers drain
//!   concurrently, so there is no global delivery order
//! - **Shutdown**: intake stops at once; workers drain within `grace`, then
//!   are cancelled between claims and leftovers are reported as discarded
//!
//! ## Sharing
//! [`AsyncDispatch::share`] hands the same queue and workers to another bus.
//! Every queued holder carries the publisher of the bus that queued it, so
//! each bus keeps its own subscriptions and error handlers. Only the bus
//! that created the pool stops the workers; shutting down a sharer only
//! rejects its own later publications.
//!
//! ## Startup
//! Workers are spawned on the current Tokio runtime. Without one, the failure
//! is reported to the funnel and every publish is rejected with
//! [`PublishError::NotRunning`]; subscriptions keep working.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::PublishError;
use crate::funnel::PublicationError;

use super::worker::{Queued, Worker, WorkerState};
use super::{Delivery, Dispatch, MessageHolder, Publisher, report_rejection};

/// Queue and workers, shared by every bus that shares the dispatch.
struct Pool {
    intake: parking_lot::Mutex<Option<mpsc::Sender<Queued>>>,
    queue: Arc<Mutex<mpsc::Receiver<Queued>>>,
    workers: Vec<Arc<Worker>>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    pending: Arc<AtomicUsize>,
    enqueue_timeout: Option<Duration>,
    running: bool,
    shutdown: AtomicBool,
}

pub(crate) struct AsyncDispatch {
    pool: Arc<Pool>,
    publisher: Arc<Publisher>,
    owner: bool,
    detached: AtomicBool,
}

impl AsyncDispatch {
    /// Creates the queue and spawns `workers` dispatch workers.
    ///
    /// ### Notes
    /// - `capacity` and `workers` are expected to be clamped to at least 1
    /// - Must be called within a Tokio runtime for workers to start
    pub(crate) fn new(
        publisher: Publisher,
        workers: usize,
        capacity: usize,
        enqueue_timeout: Option<Duration>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Arc::new(Mutex::new(rx));
        let pending = Arc::new(AtomicUsize::new(0));
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let crew: Vec<Arc<Worker>> = (0..workers.max(1)).map(|i| Arc::new(Worker::new(i))).collect();

        let running = match Handle::try_current() {
            Ok(handle) => {
                for worker in &crew {
                    tracker.spawn_on(
                        Arc::clone(worker).run(Arc::clone(&queue), Arc::clone(&pending), cancel.clone()),
                        &handle,
                    );
                }
                debug!(workers = crew.len(), capacity, "asynchronous dispatch started");
                true
            }
            Err(err) => {
                warn!(error = %err, "asynchronous dispatch failed to start");
                publisher.errors().handle_error(
                    &PublicationError::new("failed to start asynchronous dispatch workers")
                        .with_cause(err),
                );
                false
            }
        };

        Self {
            pool: Arc::new(Pool {
                intake: parking_lot::Mutex::new(Some(tx)),
                queue,
                workers: crew,
                tracker,
                cancel,
                pending,
                enqueue_timeout,
                running,
                shutdown: AtomicBool::new(false),
            }),
            publisher: Arc::new(publisher),
            owner: true,
            detached: AtomicBool::new(false),
        }
    }

    /// Same queue and workers, delivering through `publisher`.
    pub(crate) fn sharing(&self, publisher: Publisher) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            publisher: Arc::new(publisher),
            owner: false,
            detached: AtomicBool::new(false),
        }
    }

    fn reject(&self, error: PublishError, holder: &MessageHolder) -> Result<Delivery, PublishError> {
        report_rejection(self.publisher.errors(), &error, holder);
        Err(error)
    }

    async fn discard_leftovers(&self) {
        let mut rx = self.pool.queue.lock().await;
        rx.close();
        let mut discarded = 0usize;
        while let Ok(job) = rx.try_recv() {
            self.pool.pending.fetch_sub(1, Ordering::AcqRel);
            discarded += 1;
            job.publisher.errors().handle_error(
                &PublicationError::new("message discarded at shutdown")
                    .with_published(job.holder.messages()),
            );
        }
        if discarded > 0 {
            warn!(discarded, "undelivered messages discarded at shutdown");
        }
    }
}

#[async_trait]
impl Dispatch for AsyncDispatch {
    async fn publish(&self, holder: MessageHolder) -> Result<Delivery, PublishError> {
        if self.is_shutdown() {
            return self.reject(PublishError::Shutdown, &holder);
        }
        if !self.pool.running {
            return self.reject(PublishError::NotRunning, &holder);
        }
        let sender = self.pool.intake.lock().clone();
        let Some(sender) = sender else {
            return self.reject(PublishError::Shutdown, &holder);
        };

        let job = Queued {
            publisher: Arc::clone(&self.publisher),
            holder,
        };
        self.pool.pending.fetch_add(1, Ordering::AcqRel);
        let sent = match self.pool.enqueue_timeout {
            None => sender
                .send(job)
                .await
                .map_err(|e| (PublishError::Closed, e.0)),
            Some(timeout) => sender.send_timeout(job, timeout).await.map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(j) => (PublishError::Timeout { timeout }, j),
                mpsc::error::SendTimeoutError::Closed(j) => (PublishError::Closed, j),
            }),
        };

        match sent {
            Ok(()) => Ok(Delivery::Queued),
            Err((error, job)) => {
                self.pool.pending.fetch_sub(1, Ordering::AcqRel);
                self.reject(error, &job.holder)
            }
        }
    }

    /// Pending work of the whole pool, sharers included.
    fn has_pending_messages(&self) -> bool {
        self.pool.pending.load(Ordering::Acquire) > 0
    }

    async fn shutdown(&self, grace: Duration) {
        if self.detached.swap(true, Ordering::AcqRel) || !self.owner {
            debug!("shared asynchronous dispatch detached");
            return;
        }
        let pool = &self.pool;
        if pool.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        drop(pool.intake.lock().take());
        for worker in &pool.workers {
            worker.request_shutdown();
        }
        pool.tracker.close();

        if !pool.running {
            return;
        }
        match tokio::time::timeout(grace, pool.tracker.wait()).await {
            Ok(()) => debug!("asynchronous dispatch drained within grace"),
            Err(_) => {
                warn!(?grace, "grace exceeded; cancelling idle dispatch workers");
                pool.cancel.cancel();
                self.discard_leftovers().await;
            }
        }
    }

    fn is_shutdown(&self) -> bool {
        self.detached.load(Ordering::Acquire) || self.pool.shutdown.load(Ordering::Acquire)
    }

    fn worker_states(&self) -> Vec<WorkerState> {
        self.pool.workers.iter().map(|w| w.state()).collect()
    }

    fn share(&self, publisher: Publisher) -> Arc<dyn Dispatch> {
        Arc::new(self.sharing(publisher))
    }
}
