//! # Subscription registry.
//!
//! Maps a publication signature (the runtime types of its arguments) to the
//! ordered subscriptions that must receive it.
//!
//! ## Architecture
//! ```text
//! subscribe / unsubscribe ──► writer: Mutex<WriterState>    (rare, exclusive)
//!                                 │ classes:   TypeId ─► per-class subscriptions
//!                                 │ instances: addr   ─► ListenerSlot
//!                                 ▼
//!                      routes: ArcSwap<RouteTable>          (generation, exact map)
//!
//! subscriptions_for(sig) ──► routes.load()  exact hit
//!                        └─► supers.load()  cached exact+super list for `generation`
//!                                └─ miss: compute from resolver, publish via rcu
//! ```
//!
//! ## Rules
//! - Readers never take the writer lock
//! - A listener type's subscriptions are built once and never removed; an
//!   empty subscription delivers to nobody
//! - A subscription is filed under exactly its declared signature; the super
//!   lookup only ever adds subscriptions that accept subtypes
//! - A new listener type bumps the route generation, so super routes cached
//!   for an older generation are never served
//! - Subscribing a live instance twice is a no-op returning `false`
//! - Reclaimed weak listeners are swept after a publish that noticed them,
//!   and before every subscribe
//! - Listener diagnostics are reported after the writer lock is released,
//!   so an error handler may call back into the registry

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use crate::funnel::ErrorHandler;
use crate::listeners::{Listener, ListenerRef, ListenerSlot, ReferenceMode, instance_id};
use crate::types::{MessageType, TypeHierarchyResolver};

use super::subscription::Subscription;

type Signature = Box<[MessageType]>;
type Routes = Arc<[Arc<Subscription>]>;

/// Highest number of arguments a handler may declare.
const MAX_ARITY: usize = 3;

struct ListenerClass {
    subscriptions: Arc<[Arc<Subscription>]>,
    mode: ReferenceMode,
}

struct Instance {
    class: TypeId,
    slot: Arc<ListenerSlot>,
}

struct WriterState {
    classes: HashMap<TypeId, ListenerClass>,
    instances: HashMap<usize, Instance>,
}

#[derive(Default)]
struct RouteTable {
    generation: u64,
    exact: HashMap<Signature, Routes>,
}

#[derive(Default)]
struct SuperRoutes {
    generation: u64,
    entries: HashMap<Signature, Routes>,
}

pub(crate) struct SubscriptionRegistry {
    resolver: TypeHierarchyResolver,
    default_mode: ReferenceMode,
    errors: Arc<ErrorHandler>,
    writer: Mutex<WriterState>,
    routes: ArcSwap<RouteTable>,
    supers: ArcSwap<SuperRoutes>,
    reclaimed: Arc<AtomicBool>,
}

impl SubscriptionRegistry {
    pub(crate) fn new(default_mode: ReferenceMode, errors: Arc<ErrorHandler>) -> Self {
        Self {
            resolver: TypeHierarchyResolver::new(),
            default_mode,
            errors,
            writer: Mutex::new(WriterState {
                classes: HashMap::new(),
                instances: HashMap::new(),
            }),
            routes: ArcSwap::from_pointee(RouteTable::default()),
            supers: ArcSwap::from_pointee(SuperRoutes::default()),
            reclaimed: Arc::default(),
        }
    }

    /// Binds `listener` to every enabled handler of its type.
    ///
    /// Returns `false` if this live instance is already subscribed.
    pub(crate) fn subscribe<L: Listener>(&self, listener: &Arc<L>) -> bool {
        let (subscribed, rejected) = self.bind(listener);
        for detail in rejected {
            self.errors.handle_listener_error(&detail, L::name());
        }
        subscribed
    }

    /// Writer half of [`subscribe`](Self::subscribe); returns the handler
    /// diagnostics to report once the lock is released.
    fn bind<L: Listener>(&self, listener: &Arc<L>) -> (bool, Vec<String>) {
        let id = instance_id(listener);
        let class_id = TypeId::of::<L>();
        let mut rejected = Vec::new();
        let mut guard = self.writer.lock();
        let state = &mut *guard;

        if self.reclaimed.swap(false, Ordering::AcqRel) {
            sweep(state);
        }
        if let Some(existing) = state.instances.get(&id) {
            if existing.slot.is_live() {
                return (false, rejected);
            }
            // address reused after a weak listener was reclaimed
            if let Some(stale) = state.instances.remove(&id) {
                detach(&state.classes, &stale);
            }
        }

        if !state.classes.contains_key(&class_id) {
            let class = self.build_class::<L>(&mut rejected);
            self.publish_routes(&class.subscriptions);
            state.classes.insert(class_id, class);
        }
        let Some(class) = state.classes.get(&class_id) else {
            return (false, rejected);
        };

        let slot = Arc::new(ListenerSlot::new(id, L::name(), ListenerRef::new(listener, class.mode)));
        for sub in class.subscriptions.iter() {
            sub.add(Arc::clone(&slot));
        }
        state.instances.insert(id, Instance { class: class_id, slot });

        debug!(listener = L::name(), "listener subscribed");
        (true, rejected)
    }

    /// Removes every binding of `listener`. No-op if it is not subscribed.
    pub(crate) fn unsubscribe<L: Listener>(&self, listener: &Arc<L>) -> bool {
        let id = instance_id(listener);
        let mut guard = self.writer.lock();
        let state = &mut *guard;

        let matches = state
            .instances
            .get(&id)
            .is_some_and(|i| i.class == TypeId::of::<L>());
        if !matches {
            return false;
        }
        let Some(instance) = state.instances.remove(&id) else {
            return false;
        };
        detach(&state.classes, &instance);

        debug!(listener = L::name(), "listener unsubscribed");
        true
    }

    /// Ordered subscriptions for a publication signature.
    ///
    /// Exact matches first; with `include_super`, then every subtype-accepting
    /// subscription declared for an ancestor combination, in resolver order.
    pub(crate) fn subscriptions_for(&self, signature: &[MessageType], include_super: bool) -> Routes {
        let routes = self.routes.load();
        if !include_super {
            return routes.exact.get(signature).cloned().unwrap_or_else(empty);
        }

        {
            let supers = self.supers.load();
            if supers.generation == routes.generation {
                if let Some(hit) = supers.entries.get(signature) {
                    return Arc::clone(hit);
                }
            }
        }

        let computed = self.compute_super(&routes, signature);
        let generation = routes.generation;
        self.supers.rcu(|current| {
            if current.generation > generation {
                return Arc::clone(current);
            }
            let mut entries = if current.generation == generation {
                current.entries.clone()
            } else {
                HashMap::new()
            };
            entries.insert(signature.into(), Arc::clone(&computed));
            Arc::new(SuperRoutes { generation, entries })
        });
        computed
    }

    /// Live subscribed listeners; reclaimed weak listeners are pruned first.
    pub(crate) fn listener_count(&self) -> usize {
        let mut guard = self.writer.lock();
        self.reclaimed.store(false, Ordering::Release);
        sweep(&mut guard);
        guard.instances.len()
    }

    /// Drops bookkeeping for listeners a publish found reclaimed.
    ///
    /// A single atomic check unless a reclaim was signalled.
    pub(crate) fn sweep_reclaimed(&self) {
        if self.reclaimed.swap(false, Ordering::AcqRel) {
            let reclaimed = sweep(&mut self.writer.lock());
            debug!(reclaimed, "reclaimed listeners swept");
        }
    }

    fn build_class<L: Listener>(&self, rejected: &mut Vec<String>) -> ListenerClass {
        let mut subscriptions = Vec::new();
        for descriptor in L::handlers() {
            if !descriptor.is_enabled() {
                continue;
            }
            let arity = descriptor.message_types().len();
            if arity == 0 || arity > MAX_ARITY {
                rejected.push(format!(
                    "handler declares {arity} message types; expected 1 to {MAX_ARITY}"
                ));
                continue;
            }
            subscriptions.push(Arc::new(
                Subscription::new(descriptor.erase(), L::name()).with_reclaim_signal(Arc::clone(&self.reclaimed)),
            ));
        }

        debug!(
            listener = L::name(),
            handlers = subscriptions.len(),
            "listener type registered"
        );
        ListenerClass {
            subscriptions: Arc::from(subscriptions),
            mode: L::reference_mode().unwrap_or(self.default_mode),
        }
    }

    /// Files new subscriptions under their signatures and bumps the generation.
    /// Called with the writer lock held.
    fn publish_routes(&self, added: &[Arc<Subscription>]) {
        let current = self.routes.load();
        let mut exact = current.exact.clone();
        for sub in added {
            let entry = exact.entry(sub.signature().into()).or_insert_with(empty);
            let mut next = entry.to_vec();
            next.push(Arc::clone(sub));
            *entry = Arc::from(next);
        }
        self.routes.store(Arc::new(RouteTable {
            generation: current.generation + 1,
            exact,
        }));
    }

    fn compute_super(&self, routes: &RouteTable, signature: &[MessageType]) -> Routes {
        let mut out: Vec<Arc<Subscription>> = routes
            .exact
            .get(signature)
            .map(|r| r.to_vec())
            .unwrap_or_default();

        let choices: Vec<Vec<MessageType>> = signature
            .iter()
            .map(|ty| {
                let mut c = vec![*ty];
                c.extend(self.resolver.ancestors_of(*ty).iter().copied());
                c
            })
            .collect();

        // odometer over per-position choices, first position varying slowest
        let mut index = vec![0usize; choices.len()];
        let mut combo: Vec<MessageType> = signature.to_vec();
        while advance(&mut index, &choices) {
            for (pos, &i) in index.iter().enumerate() {
                combo[pos] = choices[pos][i];
            }
            if let Some(found) = routes.exact.get(combo.as_slice()) {
                out.extend(found.iter().filter(|s| s.accepts_subtypes()).cloned());
            }
        }
        Arc::from(out)
    }
}

/// Removes every instance whose listener was reclaimed; returns how many.
fn sweep(state: &mut WriterState) -> usize {
    let dead: Vec<usize> = state
        .instances
        .iter()
        .filter(|(_, i)| !i.slot.is_live())
        .map(|(id, _)| *id)
        .collect();
    for id in &dead {
        if let Some(instance) = state.instances.remove(id) {
            detach(&state.classes, &instance);
        }
    }
    dead.len()
}

fn detach(classes: &HashMap<TypeId, ListenerClass>, instance: &Instance) {
    instance.slot.deactivate();
    if let Some(class) = classes.get(&instance.class) {
        for sub in class.subscriptions.iter() {
            sub.remove(&instance.slot);
        }
    }
}

fn advance(index: &mut [usize], choices: &[Vec<MessageType>]) -> bool {
    for pos in (0..index.len()).rev() {
        index[pos] += 1;
        if index[pos] < choices[pos].len() {
            return true;
        }
        index[pos] = 0;
    }
    false
}

fn empty() -> Routes {
    Arc::from(Vec::new())
}
