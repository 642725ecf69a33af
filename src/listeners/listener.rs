//! # Listener contract and retention.
//!
//! A [`Listener`] is any type that declares its handlers. The registry asks a
//! listener type for its [`HandlerDescriptor`]s once, the first time an
//! instance of that type is subscribed, and keeps them for the lifetime of
//! the bus.
//!
//! ## Reference modes
//! ```text
//! ReferenceMode::Strong ──► ListenerRef::Owned(Arc)   bus keeps the listener alive
//! ReferenceMode::Weak   ──► ListenerRef::Tracked(Weak) listener is skipped and pruned
//!                                                     once the last Arc is dropped
//! ```
//! The mode is chosen per listener type ([`Listener::reference_mode`]) and
//! falls back to [`Config::reference_mode`](crate::Config::reference_mode).
//!
//! ## Example
//! ```rust
//! use messagebus::{HandlerDescriptor, Listener, Message, ReferenceMode};
//!
//! struct Ping;
//! impl Message for Ping {}
//!
//! struct Pong;
//! impl Listener for Pong {
//!     fn handlers() -> Vec<HandlerDescriptor<Self>> {
//!         vec![HandlerDescriptor::on(|_: &Pong, _: &Ping| Ok(()))]
//!     }
//!     fn reference_mode() -> Option<ReferenceMode> {
//!         Some(ReferenceMode::Weak)
//!     }
//! }
//! ```

use std::any::{Any, type_name};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::handler::HandlerDescriptor;

/// A type whose instances can be subscribed to the bus.
pub trait Listener: Send + Sync + Sized + 'static {
    /// Handlers declared by this listener type.
    fn handlers() -> Vec<HandlerDescriptor<Self>>;

    /// Per-type override of the bus default reference mode.
    fn reference_mode() -> Option<ReferenceMode> {
        None
    }

    /// Name used in diagnostics and publication errors.
    fn name() -> &'static str {
        type_name::<Self>()
    }
}

/// How the bus retains a subscribed listener.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReferenceMode {
    /// The bus owns a strong reference; the listener lives until unsubscribed.
    #[default]
    Strong,
    /// The bus holds a non-owning reference; a dropped listener is
    /// automatically unsubscribed.
    Weak,
}

/// Capability-tagged reference to a listener instance.
#[derive(Clone)]
pub enum ListenerRef {
    Owned(Arc<dyn Any + Send + Sync>),
    Tracked(Weak<dyn Any + Send + Sync>),
}

impl ListenerRef {
    pub(crate) fn new<L: Listener>(listener: &Arc<L>, mode: ReferenceMode) -> Self {
        let erased: Arc<dyn Any + Send + Sync> = listener.clone();
        match mode {
            ReferenceMode::Strong => ListenerRef::Owned(erased),
            ReferenceMode::Weak => ListenerRef::Tracked(Arc::downgrade(&erased)),
        }
    }

    /// Returns a strong handle, or `None` once a tracked listener was reclaimed.
    pub fn upgrade(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        match self {
            ListenerRef::Owned(strong) => Some(Arc::clone(strong)),
            ListenerRef::Tracked(weak) => weak.upgrade(),
        }
    }

    /// Returns true while the listener can still be invoked.
    pub fn is_live(&self) -> bool {
        match self {
            ListenerRef::Owned(_) => true,
            ListenerRef::Tracked(weak) => weak.strong_count() > 0,
        }
    }
}

/// Identity of a listener instance: the address of its `Arc` allocation.
pub(crate) fn instance_id<L>(listener: &Arc<L>) -> usize {
    Arc::as_ptr(listener) as *const () as usize
}

/// One subscribed listener instance, shared by every subscription of its type.
///
/// The monitor serializes `synchronized` handlers for this instance only.
pub(crate) struct ListenerSlot {
    id: usize,
    class: &'static str,
    target: ListenerRef,
    active: AtomicBool,
    monitor: tokio::sync::Mutex<()>,
}

impl ListenerSlot {
    pub(crate) fn new(id: usize, class: &'static str, target: ListenerRef) -> Self {
        Self {
            id,
            class,
            target,
            active: AtomicBool::new(true),
            monitor: tokio::sync::Mutex::new(()),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub(crate) fn class(&self) -> &'static str {
        self.class
    }

    #[inline]
    pub(crate) fn target(&self) -> &ListenerRef {
        &self.target
    }

    pub(crate) fn monitor(&self) -> &tokio::sync::Mutex<()> {
        &self.monitor
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Active and not reclaimed.
    pub(crate) fn is_live(&self) -> bool {
        self.is_active() && self.target.is_live()
    }
}
