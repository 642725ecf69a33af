//! Inline dispatch on the publishing task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::PublishError;

use super::{Delivery, Dispatch, MessageHolder, Publisher, report_rejection};

/// Resolves and invokes every matching handler before `publish` returns,
/// in registry order.
pub(crate) struct SyncDispatch {
    publisher: Publisher,
    shutdown: AtomicBool,
}

impl SyncDispatch {
    pub(crate) fn new(publisher: Publisher) -> Self {
        Self {
            publisher,
            shutdown: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Dispatch for SyncDispatch {
    async fn publish(&self, holder: MessageHolder) -> Result<Delivery, PublishError> {
        if self.is_shutdown() {
            let err = PublishError::Shutdown;
            report_rejection(self.publisher.errors(), &err, &holder);
            return Err(err);
        }
        let invocations = self.publisher.dispatch(&holder).await;
        Ok(Delivery::Delivered { invocations })
    }

    fn has_pending_messages(&self) -> bool {
        false
    }

    async fn shutdown(&self, _grace: Duration) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            debug!("synchronous dispatch shut down");
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn share(&self, publisher: Publisher) -> Arc<dyn Dispatch> {
        Arc::new(SyncDispatch::new(publisher))
    }
}
