//! Error funnel.
//!
//! Handler failures never reach the publisher; they are captured as
//! [`PublicationError`]s and delivered here.
//!
//! ```text
//! handler Err / panic ──┐
//! rejected publish ─────┼──► PublicationError ──► ErrorHandler ──► handler 1..N
//! startup / discard ────┘                                     └──► ConsoleLogger (fallback)
//! ```

mod console;
mod error_handler;
mod handler;
mod publication;

pub use console::ConsoleLogger;
pub use error_handler::ErrorHandler;
pub use handler::PublicationErrorHandler;
pub use publication::PublicationError;
