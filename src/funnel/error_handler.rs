//! # Error funnel.
//!
//! [`ErrorHandler`] fans every [`PublicationError`] out to the registered
//! [`PublicationErrorHandler`]s, in registration order.
//!
//! ## Rules
//! - `add_handler` appends and marks the funnel as configured
//! - The first error on an unconfigured funnel installs [`ConsoleLogger`] and
//!   prints a one-time notice; this happens at most once per funnel
//! - Adding a handler before any error suppresses the fallback entirely
//! - Handlers are called outside the lock, so a handler may add handlers
//! - A panicking handler is caught; the remaining handlers still run

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::console::ConsoleLogger;
use super::handler::PublicationErrorHandler;
use super::publication::PublicationError;

struct FunnelState {
    handlers: Vec<Arc<dyn PublicationErrorHandler>>,
    configured: bool,
}

/// Ordered collection of error callbacks with a lazy console fallback.
pub struct ErrorHandler {
    state: Mutex<FunnelState>,
}

impl ErrorHandler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FunnelState {
                handlers: Vec::new(),
                configured: false,
            }),
        }
    }

    /// Appends a handler and marks the funnel as configured.
    pub fn add_handler(&self, handler: Arc<dyn PublicationErrorHandler>) {
        let mut state = self.state.lock();
        state.handlers.push(handler);
        state.configured = true;
    }

    /// Delivers `error` to every handler.
    pub fn handle_error(&self, error: &PublicationError) {
        for handler in self.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| handler.handle_error(error))).is_err() {
                warn!(error = %error, "error handler panicked");
            }
        }
    }

    /// Delivers a listener-type failure to every handler.
    pub fn handle_listener_error(&self, message: &str, listener_class: &'static str) {
        for handler in self.snapshot() {
            let call = AssertUnwindSafe(|| handler.handle_listener_error(message, listener_class));
            if catch_unwind(call).is_err() {
                warn!(detail = message, listener = listener_class, "error handler panicked");
            }
        }
    }

    /// Number of installed handlers (including the fallback once installed).
    pub fn handler_count(&self) -> usize {
        self.state.lock().handlers.len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn PublicationErrorHandler>> {
        let mut state = self.state.lock();
        if !state.configured {
            state.configured = true;
            state.handlers.push(Arc::new(ConsoleLogger::new()));
            ConsoleLogger::notice();
        }
        state.handlers.clone()
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}
