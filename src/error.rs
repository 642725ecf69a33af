//! Error types used by the message bus.
//!
//! This module defines two main error enums:
//!
//! - [`PublishError`] : a publication could not be accepted by the bus.
//! - [`InvocationError`] : a single handler invocation failed during dispatch.
//!
//! Both types provide [`as_label`](PublishError::as_label) for logging/metrics.
//! Neither is ever propagated out of a handler into the publishing caller:
//! invocation failures only reach the error funnel, and publish failures are
//! both returned and reported to the funnel.

use std::time::Duration;
use thiserror::Error;

/// Error returned by user handlers.
///
/// Boxed so handlers can use `?` on any error type.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Errors produced when a publication is rejected.
///
/// A rejected publication is never silently dropped: the same error is
/// reported to the error funnel before it is returned.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The bus has been shut down; no further publications are accepted.
    #[error("message bus is shut down")]
    Shutdown,

    /// Asynchronous dispatch workers could not be started.
    #[error("asynchronous dispatch is not running")]
    NotRunning,

    /// The dispatch queue stayed full for the whole enqueue timeout.
    #[error("dispatch queue full; enqueue timed out after {timeout:?}")]
    Timeout {
        /// The configured enqueue timeout.
        timeout: Duration,
    },

    /// The dispatch queue was closed while the publication was waiting for space.
    #[error("dispatch queue closed")]
    Closed,
}

impl PublishError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use messagebus::PublishError;
    /// use std::time::Duration;
    ///
    /// let err = PublishError::Timeout { timeout: Duration::from_millis(5) };
    /// assert_eq!(err.as_label(), "publish_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PublishError::Shutdown => "publish_shutdown",
            PublishError::NotRunning => "publish_not_running",
            PublishError::Timeout { .. } => "publish_timeout",
            PublishError::Closed => "publish_closed",
        }
    }
}

/// # Errors produced by a single handler invocation.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum InvocationError {
    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Failed(#[source] HandlerError),

    /// The handler panicked; the payload is rendered as text.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The published message cannot be viewed as the handler's declared type.
    #[error("message `{actual}` cannot be viewed as `{expected}`")]
    Incompatible {
        /// Declared handler parameter type.
        expected: &'static str,
        /// Runtime type of the published message.
        actual: &'static str,
    },

    /// The bound listener is not of the type the handler was declared on.
    #[error("listener is not a `{expected}`")]
    ListenerMismatch {
        /// Listener type the handler belongs to.
        expected: &'static str,
    },
}

impl InvocationError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            InvocationError::Failed(_) => "invocation_failed",
            InvocationError::Panicked(_) => "invocation_panicked",
            InvocationError::Incompatible { .. } => "invocation_incompatible",
            InvocationError::ListenerMismatch { .. } => "invocation_listener_mismatch",
        }
    }

    /// Converts an error returned by a handler, unwrapping errors that the
    /// typed invokers raise themselves.
    pub(crate) fn from_handler(err: HandlerError) -> Self {
        match err.downcast::<InvocationError>() {
            Ok(own) => *own,
            Err(other) => InvocationError::Failed(other),
        }
    }

    /// Renders a panic payload caught from a handler.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let info = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        InvocationError::Panicked(info)
    }
}
