//! Subscription bookkeeping.
//!
//! ```text
//! subscribe(&Arc<L>) ──► SubscriptionRegistry (single writer, parking_lot::Mutex)
//!                          ├─► ListenerClass: one Subscription per enabled handler of L
//!                          └─► RouteTable (ArcSwap): signature → [Subscription]
//!
//! publish ──► subscriptions_for(signature)   (lock-free snapshot reads)
//!               ├─► exact routes
//!               └─► super routes, cached per route-table generation
//! ```

mod registry;
mod subscription;

pub(crate) use registry::SubscriptionRegistry;
