//! Message types and their hierarchy.
//!
//! - [`Message`] / [`AnyMessage`] publishable values and their erased view
//! - [`MessageType`] runtime type key (element `TypeId` plus array rank)
//! - [`MessageArray`] array-of-messages publication
//! - [`DeadMessage`] wrapper for publications that reached no handler
//! - [`TypeHierarchyResolver`] memoized ancestor lookup

mod hierarchy;
mod message;

pub use hierarchy::TypeHierarchyResolver;
pub use message::{AnyMessage, DeadMessage, Message, MessageArray, MessageType};
