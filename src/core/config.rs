//! # Bus configuration.
//!
//! Provides [`Config`], the construction-time settings of a [`MessageBus`](crate::MessageBus).
//! Nothing here is process-global: every bus carries its own copy.
//!
//! ## Sentinel values
//! - `workers = 0` → half the available parallelism (at least 1)
//! - `enqueue_timeout = 0s` → a full queue blocks the publisher until space frees
//! - `grace = 0s` → shutdown does not wait for the queue to drain

use std::thread::available_parallelism;
use std::time::Duration;

use crate::listeners::ReferenceMode;

/// How publications reach handlers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Synchrony {
    /// Handlers run on the publishing task before `publish` returns.
    #[default]
    Sync,
    /// Publications are queued and delivered by a pool of worker tasks.
    Async,
}

/// Which subscriptions a publication is matched against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Only handlers declared for the exact runtime types.
    Exact,
    /// Exact handlers first, then subtype-accepting handlers of every ancestor.
    #[default]
    ExactWithSuperTypes,
}

impl DispatchMode {
    #[inline]
    pub fn includes_supertypes(&self) -> bool {
        matches!(self, DispatchMode::ExactWithSuperTypes)
    }
}

/// Construction-time configuration of a bus.
///
/// ## Field semantics
/// - `synchrony`: inline or queued delivery
/// - `dispatch_mode`: exact-only or exact-and-supertype matching
/// - `reference_mode`: retention for listener types that do not choose one
/// - `workers`: asynchronous worker pool size (`0` = auto)
/// - `queue_capacity`: asynchronous queue capacity (min 1)
/// - `enqueue_timeout`: how long a publisher waits for queue space (`0s` = forever)
/// - `grace`: how long shutdown waits for the queue to drain
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over checking the
/// sentinels directly.
#[derive(Clone, Debug)]
pub struct Config {
    pub synchrony: Synchrony,
    pub dispatch_mode: DispatchMode,

    /// Default reference mode; [`Listener::reference_mode`](crate::Listener::reference_mode)
    /// overrides it per listener type.
    pub reference_mode: ReferenceMode,

    /// Number of asynchronous dispatch workers.
    ///
    /// - `0` = half of `available_parallelism()`, at least 1
    /// - `n > 0` = exactly `n` workers
    pub workers: usize,

    /// Capacity of the asynchronous queue. Minimum value is 1.
    pub queue_capacity: usize,

    /// Maximum wait for queue space before a publication is rejected.
    ///
    /// - `Duration::ZERO` = wait until space is available
    /// - `> 0` = reject with `PublishError::Timeout` after this long
    pub enqueue_timeout: Duration,

    /// Maximum time shutdown waits for queued publications to be delivered.
    ///
    /// Past the grace, idle workers are cancelled and undelivered
    /// publications are reported as discarded. An in-progress handler is
    /// never interrupted.
    pub grace: Duration,
}

impl Config {
    /// Returns the resolved worker pool size.
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            let cores = available_parallelism().map(|n| n.get()).unwrap_or(1);
            (cores / 2).max(1)
        } else {
            self.workers
        }
    }

    /// Returns a queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Returns the enqueue timeout as an `Option`.
    ///
    /// - `None` → block until space frees
    /// - `Some(d)` → reject after `d`
    #[inline]
    pub fn enqueue_timeout(&self) -> Option<Duration> {
        if self.enqueue_timeout == Duration::ZERO {
            None
        } else {
            Some(self.enqueue_timeout)
        }
    }

    /// Shorthand for a default config with asynchronous delivery.
    #[must_use]
    pub fn asynchronous() -> Self {
        Self {
            synchrony: Synchrony::Async,
            ..Self::default()
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `synchrony = Sync`
    /// - `dispatch_mode = ExactWithSuperTypes`
    /// - `reference_mode = Strong`
    /// - `workers = 0` (auto)
    /// - `queue_capacity = 1024`
    /// - `enqueue_timeout = 0s` (block)
    /// - `grace = 10s`
    fn default() -> Self {
        Self {
            synchrony: Synchrony::default(),
            dispatch_mode: DispatchMode::default(),
            reference_mode: ReferenceMode::default(),
            workers: 0,
            queue_capacity: 1024,
            enqueue_timeout: Duration::ZERO,
            grace: Duration::from_secs(10),
        }
    }
}
