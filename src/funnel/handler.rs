//! # Pluggable error handlers.
//!
//! Provides [`PublicationErrorHandler`], the extension point for observing
//! failures the bus isolates from publishers.
//!
//! ## Example
//! ```rust
//! use messagebus::{PublicationError, PublicationErrorHandler};
//!
//! struct Alerts;
//!
//! impl PublicationErrorHandler for Alerts {
//!     fn handle_error(&self, error: &PublicationError) {
//!         eprintln!("alert: {error}");
//!     }
//! }
//!
//! // Closures work too:
//! let _counter = |e: &PublicationError| eprintln!("{}", e.message());
//! ```

use super::publication::PublicationError;

/// Callback receiving every [`PublicationError`] of a bus.
///
/// ### Implementation requirements
/// - Return quickly; handlers run on the thread or task that hit the failure.
/// - A panicking handler is caught and skipped; the others still run.
pub trait PublicationErrorHandler: Send + Sync + 'static {
    /// Handles one captured failure.
    fn handle_error(&self, error: &PublicationError);

    /// Handles a failure attributed to a listener type rather than a publication.
    ///
    /// Default: forwards to [`handle_error`](Self::handle_error).
    fn handle_listener_error(&self, message: &str, listener_class: &'static str) {
        self.handle_error(&PublicationError::new(message).with_listener(listener_class));
    }
}

impl<F> PublicationErrorHandler for F
where
    F: Fn(&PublicationError) + Send + Sync + 'static,
{
    fn handle_error(&self, error: &PublicationError) {
        self(error)
    }
}
