//! # Subscription: one handler bound to its listener instances.
//!
//! ```text
//! Subscription ─┬─ ErasedHandler (signature, flags, invoker)   immutable
//!               └─ listeners: ArcSwap<Vec<Arc<ListenerSlot>>>  copy-on-write
//!
//! publish(messages)
//!   for slot in snapshot:
//!     ├─ inactive            ─► skip
//!     ├─ reclaimed (weak)    ─► skip, prune after the loop
//!     ├─ synchronized        ─► lock slot monitor
//!     ├─ inactive by now     ─► skip (last check before invoking)
//!     └─ invoke (catch_unwind) ─► Err/panic ─► PublicationError ─► funnel
//! ```
//!
//! ## Rules
//! - Membership changes republish a new list; a publish iterates the
//!   snapshot it loaded and never sees a half-updated list
//! - The monitor belongs to the listener instance, so two instances of one
//!   type run concurrently while one instance never overlaps itself
//! - A reclaimed listener raises the shared reclaim signal so the registry
//!   can drop its bookkeeping for it
//! - An unsubscribe that completes before the last activity check wins;
//!   an invocation already past that check runs to completion
//! - Monitors are not reentrant: a synchronized handler that publishes
//!   synchronously to another synchronized handler of the same instance
//!   waits forever
//!
//! **Warning**: `AssertUnwindSafe` is used, a handler panicking while holding
//! a lock of its own can leave that state poisoned or inconsistent.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use futures::FutureExt;

use crate::error::InvocationError;
use crate::funnel::{ErrorHandler, PublicationError};
use crate::listeners::{ErasedHandler, ListenerSlot};
use crate::types::{AnyMessage, MessageType};

pub(crate) struct Subscription {
    handler: ErasedHandler,
    listener_class: &'static str,
    listeners: ArcSwap<Vec<Arc<ListenerSlot>>>,
    reclaimed: Arc<AtomicBool>,
}

impl Subscription {
    pub(crate) fn new(handler: ErasedHandler, listener_class: &'static str) -> Self {
        Self {
            handler,
            listener_class,
            listeners: ArcSwap::from_pointee(Vec::new()),
            reclaimed: Arc::default(),
        }
    }

    /// Shares `signal` with the owner; it is set whenever a publish prunes a
    /// reclaimed listener.
    pub(crate) fn with_reclaim_signal(mut self, signal: Arc<AtomicBool>) -> Self {
        self.reclaimed = signal;
        self
    }

    #[inline]
    pub(crate) fn signature(&self) -> &[MessageType] {
        &self.handler.signature
    }

    #[inline]
    pub(crate) fn accepts_subtypes(&self) -> bool {
        self.handler.accept_subtypes
    }

    pub(crate) fn add(&self, slot: Arc<ListenerSlot>) {
        self.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&slot));
            next
        });
    }

    pub(crate) fn remove(&self, slot: &Arc<ListenerSlot>) {
        self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|s| !Arc::ptr_eq(s, slot))
                .cloned()
                .collect::<Vec<_>>()
        });
    }

    /// Drops reclaimed and deactivated entries.
    pub(crate) fn prune(&self) {
        self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|s| s.is_live())
                .cloned()
                .collect::<Vec<_>>()
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.load().len()
    }

    /// Invokes the handler on every bound listener.
    ///
    /// Returns the number of invocations attempted (failed ones included).
    pub(crate) async fn publish(&self, messages: &[Arc<dyn AnyMessage>], errors: &ErrorHandler) -> usize {
        let snapshot = self.listeners.load_full();
        let mut invoked = 0;
        let mut reclaimed = false;

        for slot in snapshot.iter() {
            if !slot.is_active() {
                continue;
            }
            let Some(target) = slot.target().upgrade() else {
                reclaimed = true;
                continue;
            };

            let guard = if self.handler.synchronized {
                Some(slot.monitor().lock().await)
            } else {
                None
            };
            // unsubscribe may have completed while the target was upgraded
            // or the monitor awaited
            if !slot.is_active() {
                continue;
            }

            invoked += 1;
            let fut = self.handler.invoker.invoke(&*target, messages);
            let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(InvocationError::from_panic(panic)),
            };
            drop(guard);

            if let Err(cause) = outcome {
                let error = PublicationError::new(format!(
                    "error during invocation of handler for {}",
                    describe(messages)
                ))
                .with_listener(slot.class())
                .with_published(messages)
                .with_cause(cause);
                errors.handle_error(&error);
            }
        }

        if reclaimed {
            self.prune();
            self.reclaimed.store(true, Ordering::Release);
        }
        invoked
    }
}

fn describe(messages: &[Arc<dyn AnyMessage>]) -> String {
    messages
        .iter()
        .map(|m| m.message_type().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("listener_class", &self.listener_class)
            .field("signature", &self.handler.signature)
            .field("accept_subtypes", &self.handler.accept_subtypes)
            .field("synchronized", &self.handler.synchronized)
            .field("listeners", &self.len())
            .finish()
    }
}
