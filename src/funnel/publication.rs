//! # Publication errors.
//!
//! A [`PublicationError`] is the value every captured failure is turned into
//! before it reaches the error funnel: a handler failure, a rejected
//! publication, a startup problem or a discarded message.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::types::AnyMessage;

/// A captured failure routed to the error funnel instead of the caller.
///
/// Immutable once constructed; built with consuming `with_*` methods.
#[derive(Clone)]
pub struct PublicationError {
    message: String,
    cause: Option<Arc<dyn Error + Send + Sync + 'static>>,
    listener_class: Option<&'static str>,
    published: Vec<Arc<dyn AnyMessage>>,
}

impl PublicationError {
    /// Creates an error with a descriptive message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            listener_class: None,
            published: Vec::new(),
        }
    }

    /// Attaches the causing failure.
    #[must_use]
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Attaches the offending listener type.
    #[must_use]
    pub fn with_listener(mut self, class: &'static str) -> Self {
        self.listener_class = Some(class);
        self
    }

    /// Attaches the messages of the publication.
    #[must_use]
    pub fn with_published(mut self, messages: &[Arc<dyn AnyMessage>]) -> Self {
        self.published = messages.to_vec();
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn listener_class(&self) -> Option<&'static str> {
        self.listener_class
    }

    pub fn published(&self) -> &[Arc<dyn AnyMessage>] {
        &self.published
    }
}

impl fmt::Display for PublicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(class) = self.listener_class {
            write!(f, " listener={class}")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, " cause=\"{cause}\"")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PublicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let published: Vec<_> = self.published.iter().map(|m| m.message_type()).collect();
        f.debug_struct("PublicationError")
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .field("listener_class", &self.listener_class)
            .field("published", &published)
            .finish()
    }
}

impl Error for PublicationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn Error + 'static))
    }
}
