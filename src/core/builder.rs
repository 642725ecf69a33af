use std::sync::Arc;

use crate::core::{Config, Synchrony};
use crate::dispatch::{AsyncDispatch, Dispatch, Publisher, SyncDispatch};
use crate::funnel::{ErrorHandler, PublicationErrorHandler};
use crate::subscriptions::SubscriptionRegistry;

use super::bus::MessageBus;

/// Builder for constructing a [`MessageBus`] with error handlers installed
/// before anything can fail.
pub struct MessageBusBuilder {
    cfg: Config,
    handlers: Vec<Arc<dyn PublicationErrorHandler>>,
}

impl MessageBusBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            handlers: Vec::new(),
        }
    }

    /// Appends one error handler.
    ///
    /// Handlers added here also observe startup failures of the asynchronous
    /// dispatch workers.
    #[must_use]
    pub fn with_error_handler(mut self, handler: Arc<dyn PublicationErrorHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Appends several error handlers, in order.
    #[must_use]
    pub fn with_error_handlers(mut self, handlers: Vec<Arc<dyn PublicationErrorHandler>>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    /// Builds the bus.
    ///
    /// This consumes the builder and initializes:
    /// - The error funnel (with the configured handlers)
    /// - The subscription registry
    /// - The dispatch strategy (spawning workers for [`Synchrony::Async`])
    pub fn build(self) -> MessageBus {
        let cfg = self.cfg.clone();
        self.assemble(|publisher| -> Arc<dyn Dispatch> {
            match cfg.synchrony {
                Synchrony::Sync => Arc::new(SyncDispatch::new(publisher)),
                Synchrony::Async => Arc::new(AsyncDispatch::new(
                    publisher,
                    cfg.worker_count(),
                    cfg.queue_capacity_clamped(),
                    cfg.enqueue_timeout(),
                )),
            }
        })
    }

    /// Builds a bus with its own funnel and registry, delivering through a
    /// dispatch shared with `dispatch`.
    pub(crate) fn build_sharing(self, dispatch: &dyn Dispatch) -> MessageBus {
        self.assemble(|publisher| dispatch.share(publisher))
    }

    fn assemble(self, dispatch: impl FnOnce(Publisher) -> Arc<dyn Dispatch>) -> MessageBus {
        let errors = Arc::new(ErrorHandler::new());
        for handler in self.handlers {
            errors.add_handler(handler);
        }

        let registry = Arc::new(SubscriptionRegistry::new(
            self.cfg.reference_mode,
            Arc::clone(&errors),
        ));
        let publisher = Publisher::new(
            Arc::clone(&registry),
            Arc::clone(&errors),
            self.cfg.dispatch_mode,
        );

        MessageBus::new_internal(self.cfg, registry, errors, dispatch(publisher))
    }
}
