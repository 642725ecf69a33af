//! Listeners and their handlers.
//!
//! - [`Listener`] declares the handlers of a listener type
//! - [`HandlerDescriptor`] one handler: message types, flags, invoker
//! - [`Invoke`] capability that runs a handler on an instance
//! - [`ReferenceMode`] / [`ListenerRef`] strong or weak retention

mod handler;
mod listener;

pub use handler::{HandlerDescriptor, Invoke};
pub use listener::{Listener, ListenerRef, ReferenceMode};

pub(crate) use handler::ErasedHandler;
pub(crate) use listener::{ListenerSlot, instance_id};
