//! Dispatch strategies.
//!
//! ```text
//! MessageBus::publish*
//!        │ MessageHolder
//!        ▼
//!   dyn Dispatch ──┬─► SyncDispatch  ─► Publisher::dispatch on the caller's task
//!                  └─► AsyncDispatch ─► bounded queue ─► worker pool ─► Publisher::dispatch
//! ```
//!
//! Both strategies reject publications after shutdown and report every
//! rejection to the error funnel before returning it.

mod asynchronous;
mod holder;
mod publisher;
mod sync;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::PublishError;
use crate::funnel::{ErrorHandler, PublicationError};

pub(crate) use asynchronous::AsyncDispatch;
pub(crate) use holder::MessageHolder;
pub(crate) use publisher::Publisher;
pub(crate) use sync::SyncDispatch;
pub use worker::WorkerState;

/// Outcome of an accepted publication.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Delivered inline; `invocations` handlers were invoked.
    Delivered { invocations: usize },
    /// Accepted by the asynchronous queue.
    Queued,
}

#[async_trait]
pub(crate) trait Dispatch: Send + Sync {
    async fn publish(&self, holder: MessageHolder) -> Result<Delivery, PublishError>;

    fn has_pending_messages(&self) -> bool;

    /// Stops intake and drains within `grace`. Idempotent.
    async fn shutdown(&self, grace: Duration);

    fn is_shutdown(&self) -> bool;

    /// States of the dispatch workers; empty for inline dispatch.
    fn worker_states(&self) -> Vec<WorkerState> {
        Vec::new()
    }

    /// A dispatch of the same kind delivering through `publisher`.
    fn share(&self, publisher: Publisher) -> Arc<dyn Dispatch>;
}

/// Reports a rejected publication to the funnel.
pub(crate) fn report_rejection(errors: &ErrorHandler, error: &PublishError, holder: &MessageHolder) {
    warn!(reason = error.as_label(), kind = holder.kind(), "publication rejected");
    errors.handle_error(
        &PublicationError::new("publication rejected")
            .with_published(holder.messages())
            .with_cause(error.clone()),
    );
}
