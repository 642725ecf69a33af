//! Unit of work crossing the asynchronous boundary.

use std::sync::Arc;

use crate::types::{AnyMessage, MessageType};

/// Payloads of one publication, tagged by publish shape.
///
/// Carries payloads only; subscriptions are resolved when the holder is
/// dispatched, so a listener subscribed while the holder waits in the queue
/// still receives it.
pub(crate) enum MessageHolder {
    One([Arc<dyn AnyMessage>; 1]),
    Two([Arc<dyn AnyMessage>; 2]),
    Three([Arc<dyn AnyMessage>; 3]),
    Array([Arc<dyn AnyMessage>; 1]),
}

impl MessageHolder {
    pub(crate) fn messages(&self) -> &[Arc<dyn AnyMessage>] {
        match self {
            MessageHolder::One(m) => m,
            MessageHolder::Two(m) => m,
            MessageHolder::Three(m) => m,
            MessageHolder::Array(m) => m,
        }
    }

    pub(crate) fn signature(&self) -> Vec<MessageType> {
        self.messages().iter().map(|m| m.message_type()).collect()
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            MessageHolder::One(_) => "one",
            MessageHolder::Two(_) => "two",
            MessageHolder::Three(_) => "three",
            MessageHolder::Array(_) => "array",
        }
    }
}
