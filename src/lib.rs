//! # messagebus
//!
//! **messagebus** is an in-process, typed publish/subscribe bus for Rust.
//!
//! Listeners declare handlers for one to three message types (or an array of
//! a type). Publications are routed by the runtime types of their messages
//! and, optionally, by every ancestor type those messages declare.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Listener A  │   │  Listener B  │   │  Listener C  │
//!     │ (handlers()) │   │ (handlers()) │   │ (handlers()) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼ subscribe        ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  MessageBus (facade)                                              │
//! │  - SubscriptionRegistry (exact + super routes, ArcSwap snapshots) │
//! │  - TypeHierarchyResolver (memoized ancestors)                     │
//! │  - ErrorHandler (publication error funnel)                        │
//! │  - Dispatch (Sync: inline / Async: bounded queue + workers)       │
//! └──────┬──────────────────────────────────────────────────┬─────────┘
//!        ▼ publish*                                         │ errors
//!  ┌──────────────┐       ┌──────────────┐                  ▼
//!  │ MessageHolder│ ────► │  Publisher   │ ──► Subscription::publish
//!  └──────────────┘       └──────────────┘        │ Err / panic
//!                                                 ▼
//!                                   PublicationErrorHandler(s)
//!                                   ConsoleLogger (fallback)
//! ```
//!
//! ### Routing
//! ```text
//! publish(Ring) where Ring ◄ Circle ◄ Shape
//!
//!   exact:   handlers declared for Ring
//!   super:   accept_subtypes handlers for Circle, Shape, any
//!   nothing: handlers declared for DeadMessage receive DeadMessage[Ring]
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Messages**      | Typed messages with declared supertypes and arrays.          | [`Message`], [`MessageType`], [`MessageArray`] |
//! | **Listeners**     | Handler declarations with subtype/synchronized/enabled flags.| [`Listener`], [`HandlerDescriptor`], [`Invoke`] |
//! | **Bus**           | Subscribe, publish, shutdown.                                | [`MessageBus`], [`MessageBusBuilder`]       |
//! | **Errors**        | Handler failures funneled to observers, never the publisher. | [`PublicationError`], [`PublicationErrorHandler`] |
//! | **Configuration** | Synchrony, dispatch mode, retention, queue sizing.           | [`Config`]                                  |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use messagebus::{Config, HandlerDescriptor, Listener, Message, MessageBus, PublicationError};
//!
//! struct Ping(u32);
//! impl Message for Ping {}
//!
//! struct Printer;
//! impl Listener for Printer {
//!     fn handlers() -> Vec<HandlerDescriptor<Self>> {
//!         vec![HandlerDescriptor::on(|_: &Printer, p: &Ping| {
//!             println!("ping {}", p.0);
//!             Ok(())
//!         })]
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = MessageBus::builder(Config::asynchronous())
//!         .with_error_handler(Arc::new(|e: &PublicationError| eprintln!("{e}")))
//!         .build();
//!
//!     bus.subscribe(&Arc::new(Printer));
//!     bus.publish(Ping(1)).await?;
//!
//!     // Drain the queue before exiting
//!     bus.shutdown().await;
//!     Ok(())
//! }
//! ```
mod core;
mod dispatch;
mod error;
mod funnel;
mod listeners;
mod subscriptions;
mod types;

// ---- Public re-exports ----

pub use core::{Config, DispatchMode, MessageBus, MessageBusBuilder, Synchrony};
pub use dispatch::{Delivery, WorkerState};
pub use error::{HandlerError, InvocationError, PublishError};
pub use funnel::{ConsoleLogger, ErrorHandler, PublicationError, PublicationErrorHandler};
pub use listeners::{HandlerDescriptor, Invoke, Listener, ListenerRef, ReferenceMode};
pub use types::{AnyMessage, DeadMessage, Message, MessageArray, MessageType, TypeHierarchyResolver};
