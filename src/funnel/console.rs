//! # ConsoleLogger: fallback error printer
//!
//! Installed lazily by [`ErrorHandler`](super::ErrorHandler) when an error
//! occurs and no handler was ever configured.
//!
//! ## Example output
//! ```text
//! [publication-error] handler failed listener=app::Audit cause="disk full" published=[app::Order]
//! [publication-error] publish rejected cause="message bus is shut down" published=[app::Order]
//! ```

use super::handler::PublicationErrorHandler;
use super::publication::PublicationError;

/// Prints publication errors to stdout.
#[derive(Default)]
pub struct ConsoleLogger;

impl ConsoleLogger {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// One-time notice printed when the logger is installed.
    pub(crate) fn notice() {
        println!(
            "[messagebus] no error handler configured; printing errors to stdout. \
             Install one with MessageBus::add_error_handler to suppress this fallback."
        );
    }
}

impl PublicationErrorHandler for ConsoleLogger {
    fn handle_error(&self, error: &PublicationError) {
        let published: Vec<String> = error
            .published()
            .iter()
            .map(|m| m.message_type().to_string())
            .collect();
        if published.is_empty() {
            println!("[publication-error] {error}");
        } else {
            println!("[publication-error] {error} published=[{}]", published.join(", "));
        }
    }
}
