//! # Dispatch worker.
//!
//! One worker of the asynchronous pool. Workers are stateless: each loop
//! iteration claims one holder from the shared queue and dispatches it
//! through the publisher of the bus that queued it.
//!
//! ## State machine
//! ```text
//! Created ──► Started ──► Running ──► ShutdownRequested ──► Stopped
//! ```
//! `ShutdownRequested` is set by the pool; a worker never moves back from it.
//!
//! ## Rules
//! - The receiver lock is held only while waiting for the next holder
//! - Cancellation is observed between claims, never during a dispatch
//! - A claimed holder always runs to completion

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::holder::MessageHolder;
use super::publisher::Publisher;

/// A queued publication and the publisher of the bus it belongs to.
pub(crate) struct Queued {
    pub(crate) publisher: Arc<Publisher>,
    pub(crate) holder: MessageHolder,
}

/// Lifecycle state of a dispatch worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Created = 0,
    Started = 1,
    Running = 2,
    ShutdownRequested = 3,
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Created,
            1 => WorkerState::Started,
            2 => WorkerState::Running,
            3 => WorkerState::ShutdownRequested,
            _ => WorkerState::Stopped,
        }
    }
}

pub(crate) struct Worker {
    index: usize,
    state: AtomicU8,
}

impl Worker {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            state: AtomicU8::new(WorkerState::Created as u8),
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True once shutdown was requested or the worker stopped.
    pub(crate) fn is_shutdown(&self) -> bool {
        matches!(
            self.state(),
            WorkerState::ShutdownRequested | WorkerState::Stopped
        )
    }

    /// Moves to `ShutdownRequested` unless already stopped.
    pub(crate) fn request_shutdown(&self) {
        let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
            (s < WorkerState::ShutdownRequested as u8).then_some(WorkerState::ShutdownRequested as u8)
        });
    }

    /// Advances `from → to` only if still in `from`.
    fn advance(&self, from: WorkerState, to: WorkerState) {
        let _ = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire);
    }

    fn stop(&self) {
        self.state.store(WorkerState::Stopped as u8, Ordering::Release);
    }

    /// Claim-and-dispatch loop; exits when the queue closes or on cancellation.
    pub(crate) async fn run(
        self: Arc<Self>,
        queue: Arc<Mutex<mpsc::Receiver<Queued>>>,
        pending: Arc<AtomicUsize>,
        cancel: CancellationToken,
    ) {
        self.advance(WorkerState::Created, WorkerState::Started);
        debug!(worker = self.index, "dispatch worker started");
        self.advance(WorkerState::Started, WorkerState::Running);

        loop {
            let next = {
                let mut rx = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    rx = queue.lock() => rx,
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = rx.recv() => next,
                }
            };
            let Some(job) = next else { break };

            job.publisher.dispatch(&job.holder).await;
            pending.fetch_sub(1, Ordering::AcqRel);
        }

        self.stop();
        debug!(worker = self.index, "dispatch worker stopped");
    }
}
