//! # MessageBus: the public facade.
//!
//! The [`MessageBus`] owns the subscription registry, the error funnel and the
//! dispatch strategy chosen by [`Config::synchrony`].
//!
//! ## High-level architecture
//! ```text
//! subscribe(&Arc<L>) ──► SubscriptionRegistry (L::handlers() cached per type)
//!
//! publish(m) / publish2 / publish3 / publish_array / publish_shared
//!        │ MessageHolder::{One, Two, Three, Array}
//!        ▼
//!   dyn Dispatch ──► Publisher ──► subscriptions_for(signature)
//!                                     └─► Subscription::publish ──► handlers
//!                                               │ Err / panic
//!                                               ▼
//!                                         ErrorHandler ──► registered handlers
//!                                                     └──► ConsoleLogger (fallback)
//! ```
//!
//! ## Rules
//! - A handler failure never reaches the publisher; it reaches the funnel
//! - A rejected publication is reported to the funnel and returned as `Err`
//! - After [`shutdown`](MessageBus::shutdown) every publish is rejected with
//!   [`PublishError::Shutdown`]; subscribe and unsubscribe keep working
//! - Subscribing the same live instance twice is a no-op returning `false`
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use messagebus::{Config, Delivery, HandlerDescriptor, Listener, Message, MessageBus};
//!
//! struct Greeting(&'static str);
//! impl Message for Greeting {}
//!
//! #[derive(Default)]
//! struct Greeter { seen: AtomicUsize }
//! impl Listener for Greeter {
//!     fn handlers() -> Vec<HandlerDescriptor<Self>> {
//!         vec![HandlerDescriptor::on(|g: &Greeter, _: &Greeting| {
//!             g.seen.fetch_add(1, Ordering::SeqCst);
//!             Ok(())
//!         })]
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let bus = MessageBus::new(Config::default());
//!     let greeter = Arc::new(Greeter::default());
//!     bus.subscribe(&greeter);
//!
//!     let delivery = bus.publish(Greeting("hello")).await;
//!     assert_eq!(delivery, Ok(Delivery::Delivered { invocations: 1 }));
//!     assert_eq!(greeter.seen.load(Ordering::SeqCst), 1);
//!
//!     bus.shutdown().await;
//! }
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::core::{Config, MessageBusBuilder};
use crate::dispatch::{Delivery, Dispatch, MessageHolder, WorkerState};
use crate::error::PublishError;
use crate::funnel::{ErrorHandler, PublicationErrorHandler};
use crate::listeners::Listener;
use crate::subscriptions::SubscriptionRegistry;
use crate::types::{AnyMessage, Message, MessageArray};

struct Inner {
    cfg: Config,
    registry: Arc<SubscriptionRegistry>,
    errors: Arc<ErrorHandler>,
    dispatch: Arc<dyn Dispatch>,
}

/// In-process publish/subscribe bus. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<Inner>,
}

impl MessageBus {
    /// Creates a bus with the given configuration.
    ///
    /// ### Notes
    /// With [`Synchrony::Async`](crate::Synchrony::Async) this must be called
    /// inside a Tokio runtime; otherwise the startup failure is reported and
    /// every publish is rejected with [`PublishError::NotRunning`].
    #[must_use]
    pub fn new(cfg: Config) -> Self {
        MessageBusBuilder::new(cfg).build()
    }

    /// Returns a builder for installing error handlers before construction.
    #[must_use]
    pub fn builder(cfg: Config) -> MessageBusBuilder {
        MessageBusBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        registry: Arc<SubscriptionRegistry>,
        errors: Arc<ErrorHandler>,
        dispatch: Arc<dyn Dispatch>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                registry,
                errors,
                dispatch,
            }),
        }
    }

    /// Configuration the bus was built with.
    pub fn config(&self) -> &Config {
        &self.inner.cfg
    }

    /// Subscribes a listener to every enabled handler of its type.
    ///
    /// Returns `false` if this instance is already subscribed (no-op).
    pub fn subscribe<L: Listener>(&self, listener: &Arc<L>) -> bool {
        self.inner.registry.subscribe(listener)
    }

    /// Removes every binding of a listener.
    ///
    /// Returns `false` if it was not subscribed. Once this returns, the
    /// listener's handlers are not started again, provided a running
    /// publication on another task has not already passed its last activity
    /// check for this listener; such an invocation runs to completion.
    pub fn unsubscribe<L: Listener>(&self, listener: &Arc<L>) -> bool {
        self.inner.registry.unsubscribe(listener)
    }

    /// Publishes one message.
    pub async fn publish<M: Message>(&self, message: M) -> Result<Delivery, PublishError> {
        self.dispatch(MessageHolder::One([Arc::new(message)])).await
    }

    /// Publishes two messages to handlers declared for both, in this order.
    pub async fn publish2<A, B>(&self, first: A, second: B) -> Result<Delivery, PublishError>
    where
        A: Message,
        B: Message,
    {
        self.dispatch(MessageHolder::Two([Arc::new(first), Arc::new(second)]))
            .await
    }

    /// Publishes three messages to handlers declared for all three, in this order.
    pub async fn publish3<A, B, C>(&self, first: A, second: B, third: C) -> Result<Delivery, PublishError>
    where
        A: Message,
        B: Message,
        C: Message,
    {
        self.dispatch(MessageHolder::Three([
            Arc::new(first),
            Arc::new(second),
            Arc::new(third),
        ]))
        .await
    }

    /// Publishes an array of `M`, routed as the array type of `M`.
    pub async fn publish_array<M: Message>(&self, items: Vec<M>) -> Result<Delivery, PublishError> {
        self.dispatch(MessageHolder::Array([Arc::new(MessageArray::new(items))]))
            .await
    }

    /// Publishes an already shared message (a [`MessageArray`] included).
    pub async fn publish_shared(&self, message: Arc<dyn AnyMessage>) -> Result<Delivery, PublishError> {
        let holder = if message.is::<MessageArray>() {
            MessageHolder::Array([message])
        } else {
            MessageHolder::One([message])
        };
        self.dispatch(holder).await
    }

    async fn dispatch(&self, holder: MessageHolder) -> Result<Delivery, PublishError> {
        self.inner.dispatch.publish(holder).await
    }

    /// Appends an error handler to the funnel.
    ///
    /// Adding one before any error occurs suppresses the console fallback.
    pub fn add_error_handler<H: PublicationErrorHandler>(&self, handler: H) {
        self.inner.errors.add_handler(Arc::new(handler));
    }

    /// True while asynchronous publications are queued or being delivered.
    pub fn has_pending_messages(&self) -> bool {
        self.inner.dispatch.has_pending_messages()
    }

    /// Number of live subscribed listeners (reclaimed weak listeners excluded).
    pub fn listener_count(&self) -> usize {
        self.inner.registry.listener_count()
    }

    /// States of the asynchronous dispatch workers, in spawn order.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.inner.dispatch.worker_states()
    }

    /// Creates a bus with its own subscriptions and error handlers that
    /// delivers through this bus's dispatch.
    ///
    /// With [`Synchrony::Async`](crate::Synchrony::Async) both buses feed the
    /// same queue and workers. Shutting down the new bus only rejects its own
    /// later publications; the workers stop when this bus shuts down, after
    /// which both reject publications.
    pub fn with_shared_dispatch(&self) -> MessageBus {
        MessageBusBuilder::new(self.inner.cfg.clone()).build_sharing(&*self.inner.dispatch)
    }

    /// Stops accepting publications and drains the queue within [`Config::grace`].
    ///
    /// Idempotent. Does not interrupt a handler that is already running.
    pub async fn shutdown(&self) {
        debug!("message bus shutting down");
        self.inner.dispatch.shutdown(self.inner.cfg.grace).await;
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.dispatch.is_shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Synchrony;
    use crate::error::HandlerError;
    use crate::funnel::PublicationError;
    use crate::listeners::{HandlerDescriptor, Invoke, ReferenceMode};
    use crate::types::{DeadMessage, MessageType};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::any::{Any, TypeId};
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // Shape ◄── Circle ◄── Ring ; Label unrelated
    struct Shape {
        id: u32,
    }
    impl Message for Shape {}

    struct Circle {
        shape: Shape,
    }
    impl Message for Circle {
        fn supertypes() -> Vec<MessageType> {
            vec![MessageType::of::<Shape>()]
        }
        fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
            self.shape.view_raw(target)
        }
    }

    struct Ring {
        circle: Circle,
    }
    impl Message for Ring {
        fn supertypes() -> Vec<MessageType> {
            vec![MessageType::of::<Circle>()]
        }
        fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
            self.circle.view_raw(target)
        }
    }

    struct Label;
    impl Message for Label {}

    fn circle(id: u32) -> Circle {
        Circle { shape: Shape { id } }
    }

    fn ring(id: u32) -> Ring {
        Ring { circle: circle(id) }
    }

    #[derive(Default)]
    struct ShapeListener {
        ids: Mutex<Vec<u32>>,
    }
    impl Listener for ShapeListener {
        fn handlers() -> Vec<HandlerDescriptor<Self>> {
            vec![HandlerDescriptor::on(|l: &Self, s: &Shape| {
                l.ids.lock().push(s.id);
                Ok(())
            })]
        }
    }

    #[derive(Default)]
    struct ExactShapeListener {
        hits: AtomicUsize,
    }
    impl Listener for ExactShapeListener {
        fn handlers() -> Vec<HandlerDescriptor<Self>> {
            vec![
                HandlerDescriptor::on(|l: &Self, _: &Shape| {
                    l.hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .accept_subtypes(false),
            ]
        }
    }

    #[derive(Default)]
    struct DefaultListener {
        hits: AtomicUsize,
    }
    impl Listener for DefaultListener {
        fn handlers() -> Vec<HandlerDescriptor<Self>> {
            vec![HandlerDescriptor::on(|l: &Self, _: &Label| {
                l.hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })]
        }
    }

    #[derive(Default)]
    struct DisabledListener {
        hits: AtomicUsize,
    }
    impl Listener for DisabledListener {
        fn handlers() -> Vec<HandlerDescriptor<Self>> {
            vec![
                HandlerDescriptor::on(|l: &Self, _: &Label| {
                    l.hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .disabled(),
            ]
        }
    }

    struct FailingListener;
    impl Listener for FailingListener {
        fn handlers() -> Vec<HandlerDescriptor<Self>> {
            vec![
                HandlerDescriptor::on(|_: &Self, _: &Label| Err("label rejected".into())),
                HandlerDescriptor::on_any(MessageType::of::<Label>(), |_: &Self, _: &dyn AnyMessage| {
                    panic!("label handler crashed")
                }),
            ]
        }
    }

    #[derive(Default)]
    struct DeadLetters {
        dead: AtomicUsize,
    }
    impl Listener for DeadLetters {
        fn handlers() -> Vec<HandlerDescriptor<Self>> {
            vec![HandlerDescriptor::on(|l: &Self, d: &DeadMessage| {
                assert_eq!(d.messages().len(), 1);
                l.dead.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })]
        }
    }

    /// Async handler recording how many invocations overlap on one instance.
    #[derive(Default)]
    struct Exclusive {
        inside: AtomicUsize,
        max_inside: AtomicUsize,
        calls: AtomicUsize,
    }

    struct Overlap;

    #[async_trait]
    impl Invoke<Exclusive> for Overlap {
        async fn invoke(&self, l: &Exclusive, _: &[Arc<dyn AnyMessage>]) -> Result<(), HandlerError> {
            let now = l.inside.fetch_add(1, Ordering::SeqCst) + 1;
            l.max_inside.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            l.inside.fetch_sub(1, Ordering::SeqCst);
            l.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Listener for Exclusive {
        fn handlers() -> Vec<HandlerDescriptor<Self>> {
            vec![HandlerDescriptor::new(vec![MessageType::of::<Label>()], Overlap).synchronized()]
        }
    }

    fn error_counter(bus: &MessageBus) -> Arc<Mutex<Vec<PublicationError>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        bus.add_error_handler(move |e: &PublicationError| s.lock().push(e.clone()));
        seen
    }

    #[tokio::test]
    async fn test_hierarchy_matching() {
        let bus = MessageBus::new(Config::default());
        let listener = Arc::new(ShapeListener::default());
        bus.subscribe(&listener);

        bus.publish(Shape { id: 1 }).await.unwrap();
        bus.publish(circle(2)).await.unwrap();
        bus.publish(ring(3)).await.unwrap();
        let unrelated = bus.publish(Label).await.unwrap();

        assert_eq!(*listener.ids.lock(), vec![1, 2, 3]);
        assert_eq!(unrelated, Delivery::Delivered { invocations: 0 });
    }

    #[tokio::test]
    async fn test_subtype_rejection() {
        let bus = MessageBus::new(Config::default());
        let listener = Arc::new(ExactShapeListener::default());
        bus.subscribe(&listener);

        bus.publish(circle(1)).await.unwrap();
        bus.publish(ring(2)).await.unwrap();
        assert_eq!(listener.hits.load(Ordering::SeqCst), 0);

        bus.publish(Shape { id: 3 }).await.unwrap();
        assert_eq!(listener.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_handlers_never_invoked() {
        let bus = MessageBus::new(Config::default());
        let default = Arc::new(DefaultListener::default());
        let disabled = Arc::new(DisabledListener::default());
        bus.subscribe(&default);
        bus.subscribe(&disabled);

        for _ in 0..3 {
            bus.publish(Label).await.unwrap();
        }
        assert_eq!(default.hits.load(Ordering::SeqCst), 3);
        assert_eq!(disabled.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_synchronized_exclusivity_per_instance() {
        let mut cfg = Config::asynchronous();
        cfg.workers = 4;
        let bus = MessageBus::new(cfg);
        let listener = Arc::new(Exclusive::default());
        bus.subscribe(&listener);

        let publishers: Vec<_> = (0..4)
            .map(|_| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    for _ in 0..5 {
                        bus.publish(Label).await.unwrap();
                    }
                })
            })
            .collect();
        for p in publishers {
            p.await.unwrap();
        }
        bus.shutdown().await;

        assert_eq!(listener.calls.load(Ordering::SeqCst), 20);
        assert_eq!(listener.max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_instances_run_concurrently() {
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        struct Twin(Arc<AtomicUsize>, Arc<AtomicUsize>);
        impl Listener for Twin {
            fn handlers() -> Vec<HandlerDescriptor<Self>> {
                vec![HandlerDescriptor::new(vec![MessageType::of::<Label>()], TwinInvoke).synchronized()]
            }
        }
        struct TwinInvoke;
        #[async_trait]
        impl Invoke<Twin> for TwinInvoke {
            async fn invoke(&self, l: &Twin, _: &[Arc<dyn AnyMessage>]) -> Result<(), HandlerError> {
                let now = l.0.fetch_add(1, Ordering::SeqCst) + 1;
                l.1.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                l.0.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let mut cfg = Config::asynchronous();
        cfg.workers = 2;
        let bus = MessageBus::new(cfg);
        let a = Arc::new(Twin(Arc::clone(&inside), Arc::clone(&max_inside)));
        let b = Arc::new(Twin(Arc::clone(&inside), Arc::clone(&max_inside)));
        bus.subscribe(&a);
        bus.subscribe(&b);

        let (x, y) = tokio::join!(bus.publish(Label), bus.publish(Label));
        x.unwrap();
        y.unwrap();
        bus.shutdown().await;

        assert!(max_inside.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_error_isolation() {
        let bus = MessageBus::new(Config::default());
        let errors = error_counter(&bus);
        let ok = Arc::new(DefaultListener::default());
        bus.subscribe(&Arc::new(FailingListener));
        bus.subscribe(&ok);

        let delivery = bus.publish(Label).await;
        assert_eq!(delivery, Ok(Delivery::Delivered { invocations: 3 }));
        assert_eq!(ok.hits.load(Ordering::SeqCst), 1);

        let errors = errors.lock();
        assert_eq!(errors.len(), 2);
        let causes: Vec<String> = errors
            .iter()
            .map(|e| e.cause().map(|c| c.to_string()).unwrap_or_default())
            .collect();
        assert!(causes.contains(&"handler failed: label rejected".to_string()));
        assert!(causes.contains(&"handler panicked: label handler crashed".to_string()));
        assert!(errors.iter().all(|e| e.listener_class() == Some(FailingListener::name())));
    }

    #[tokio::test]
    async fn test_async_back_pressure_rejects_and_reports() {
        struct Slow(Arc<tokio::sync::Semaphore>);
        impl Listener for Slow {
            fn handlers() -> Vec<HandlerDescriptor<Self>> {
                vec![HandlerDescriptor::new(vec![MessageType::of::<Label>()], SlowInvoke)]
            }
        }
        struct SlowInvoke;
        #[async_trait]
        impl Invoke<Slow> for SlowInvoke {
            async fn invoke(&self, l: &Slow, _: &[Arc<dyn AnyMessage>]) -> Result<(), HandlerError> {
                l.0.acquire().await?.forget();
                Ok(())
            }
        }

        let mut cfg = Config::asynchronous();
        cfg.workers = 1;
        cfg.queue_capacity = 1;
        cfg.enqueue_timeout = Duration::from_millis(40);
        let bus = MessageBus::new(cfg);
        let errors = error_counter(&bus);
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        bus.subscribe(&Arc::new(Slow(Arc::clone(&gate))));

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            outcomes.push(bus.publish(Label).await);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(outcomes[0], Ok(Delivery::Queued));
        assert_eq!(outcomes[1], Ok(Delivery::Queued));
        assert_eq!(
            outcomes[2],
            Err(PublishError::Timeout {
                timeout: Duration::from_millis(40)
            })
        );
        assert_eq!(errors.lock().len(), 1);

        gate.add_permits(2);
        bus.shutdown().await;
        assert!(!bus.has_pending_messages());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = MessageBus::new(Config::default());
        let listener = Arc::new(DefaultListener::default());
        bus.subscribe(&listener);
        bus.publish(Label).await.unwrap();

        assert!(bus.unsubscribe(&listener));
        assert!(!bus.unsubscribe(&listener));
        bus.publish(Label).await.unwrap();
        assert_eq!(listener.hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_mid_publication_skips_pending_invocation() {
        #[derive(Default)]
        struct Peer {
            hits: AtomicUsize,
            evict: OnceLock<(MessageBus, Arc<Peer>)>,
        }
        impl Listener for Peer {
            fn handlers() -> Vec<HandlerDescriptor<Self>> {
                vec![HandlerDescriptor::on(|l: &Self, _: &Label| {
                    l.hits.fetch_add(1, Ordering::SeqCst);
                    if let Some((bus, peer)) = l.evict.get() {
                        bus.unsubscribe(peer);
                    }
                    Ok(())
                })]
            }
        }

        let bus = MessageBus::new(Config::default());
        let first = Arc::new(Peer::default());
        let second = Arc::new(Peer::default());
        let _ = first.evict.set((bus.clone(), Arc::clone(&second)));
        bus.subscribe(&first);
        bus.subscribe(&second);

        // both share one subscription snapshot; the second is evicted before its turn
        let delivery = bus.publish(Label).await;
        assert_eq!(delivery, Ok(Delivery::Delivered { invocations: 1 }));
        assert_eq!(second.hits.load(Ordering::SeqCst), 0);

        bus.publish(Label).await.unwrap();
        assert_eq!(first.hits.load(Ordering::SeqCst), 2);
        assert_eq!(second.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unsubscribe_during_async_publishing() {
        let mut cfg = Config::asynchronous();
        cfg.workers = 4;
        let bus = MessageBus::new(cfg);
        let listener = Arc::new(DefaultListener::default());
        bus.subscribe(&listener);

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    bus.publish(Label).await.unwrap();
                }
            })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        bus.unsubscribe(&listener);
        let after_unsubscribe = listener.hits.load(Ordering::SeqCst);

        publisher.await.unwrap();
        bus.shutdown().await;

        // in-flight invocations may finish, but nothing new starts
        let settled = listener.hits.load(Ordering::SeqCst);
        assert!(settled <= after_unsubscribe + 4);
        assert!(settled <= 200);
    }

    #[tokio::test]
    async fn test_shared_dispatch_keeps_subscriptions_apart() {
        let mut cfg = Config::asynchronous();
        cfg.workers = 2;
        let origin = MessageBus::new(cfg);
        let sibling = origin.with_shared_dispatch();

        let mine = Arc::new(DefaultListener::default());
        let theirs = Arc::new(DefaultListener::default());
        origin.subscribe(&mine);
        sibling.subscribe(&theirs);
        sibling.subscribe(&Arc::new(DefaultListener::default()));
        assert_eq!(origin.listener_count(), 1);
        assert_eq!(sibling.listener_count(), 2);

        origin.publish(Label).await.unwrap();
        sibling.publish(Label).await.unwrap();
        sibling.publish(Label).await.unwrap();
        for _ in 0..200 {
            if !origin.has_pending_messages() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(mine.hits.load(Ordering::SeqCst), 1);
        assert_eq!(theirs.hits.load(Ordering::SeqCst), 2);

        sibling.shutdown().await;
        assert_eq!(sibling.publish(Label).await, Err(PublishError::Shutdown));
        assert!(!origin.is_shutdown());
        assert_eq!(origin.publish(Label).await, Ok(Delivery::Queued));

        origin.shutdown().await;
        assert_eq!(mine.hits.load(Ordering::SeqCst), 2);
        let late = origin.with_shared_dispatch();
        assert!(late.is_shutdown());
        assert_eq!(late.publish(Label).await, Err(PublishError::Shutdown));
    }

    #[tokio::test]
    async fn test_weak_listener_reclamation() {
        let mut cfg = Config::default();
        cfg.reference_mode = ReferenceMode::Weak;
        let bus = MessageBus::new(cfg);
        let errors = error_counter(&bus);

        let listener = Arc::new(DefaultListener::default());
        bus.subscribe(&listener);
        assert_eq!(bus.listener_count(), 1);

        drop(listener);
        let delivery = bus.publish(Label).await;
        assert_eq!(delivery, Ok(Delivery::Delivered { invocations: 0 }));
        assert_eq!(bus.listener_count(), 0);
        assert!(errors.lock().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_delivers_once() {
        let bus = MessageBus::new(Config::default());
        let listener = Arc::new(DefaultListener::default());
        assert!(bus.subscribe(&listener));
        assert!(!bus.subscribe(&listener));

        bus.publish(Label).await.unwrap();
        assert_eq!(listener.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dead_messages() {
        let bus = MessageBus::new(Config::default());
        let dead = Arc::new(DeadLetters::default());
        bus.subscribe(&dead);

        bus.publish(Label).await.unwrap();
        assert_eq!(dead.dead.load(Ordering::SeqCst), 1);

        bus.subscribe(&Arc::new(DefaultListener::default()));
        bus.publish(Label).await.unwrap();
        assert_eq!(dead.dead.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exact_mode_skips_supertypes() {
        let mut cfg = Config::default();
        cfg.dispatch_mode = crate::core::DispatchMode::Exact;
        let bus = MessageBus::new(cfg);
        let listener = Arc::new(ShapeListener::default());
        bus.subscribe(&listener);

        bus.publish(circle(1)).await.unwrap();
        bus.publish(Shape { id: 2 }).await.unwrap();
        assert_eq!(*listener.ids.lock(), vec![2]);
    }

    #[tokio::test]
    async fn test_multi_argument_and_array_publish() {
        #[derive(Default)]
        struct Combined {
            pairs: AtomicUsize,
            triples: AtomicUsize,
            arrays: Mutex<Vec<u32>>,
        }
        impl Listener for Combined {
            fn handlers() -> Vec<HandlerDescriptor<Self>> {
                vec![
                    HandlerDescriptor::on2(|l: &Self, _: &Shape, _: &Label| {
                        l.pairs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                    HandlerDescriptor::on3(|l: &Self, _: &Label, _: &Label, _: &Label| {
                        l.triples.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                    HandlerDescriptor::on_array::<Shape, _>(|l: &Self, a: &MessageArray| {
                        l.arrays.lock().extend(a.views::<Shape>().map(|s| s.id));
                        Ok(())
                    }),
                ]
            }
        }

        let bus = MessageBus::new(Config::default());
        let listener = Arc::new(Combined::default());
        bus.subscribe(&listener);

        bus.publish2(ring(1), Label).await.unwrap();
        bus.publish2(Label, ring(1)).await.unwrap();
        bus.publish3(Label, Label, Label).await.unwrap();
        bus.publish_array(vec![circle(4), circle(5)]).await.unwrap();
        bus.publish_shared(Arc::new(MessageArray::new(vec![Shape { id: 6 }])))
            .await
            .unwrap();

        assert_eq!(listener.pairs.load(Ordering::SeqCst), 1);
        assert_eq!(listener.triples.load(Ordering::SeqCst), 1);
        assert_eq!(*listener.arrays.lock(), vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_is_rejected() {
        for synchrony in [Synchrony::Sync, Synchrony::Async] {
            let cfg = Config {
                synchrony,
                ..Config::default()
            };
            let bus = MessageBus::new(cfg);
            let errors = error_counter(&bus);
            let listener = Arc::new(DefaultListener::default());
            bus.subscribe(&listener);

            bus.shutdown().await;
            bus.shutdown().await;
            assert!(bus.is_shutdown());
            assert_eq!(bus.publish(Label).await, Err(PublishError::Shutdown));
            assert_eq!(listener.hits.load(Ordering::SeqCst), 0);
            assert_eq!(errors.lock().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_sync_delivery_order_follows_registry() {
        let order = Arc::new(Mutex::new(Vec::new()));

        struct Tagged(&'static str, Arc<Mutex<Vec<&'static str>>>);
        impl Listener for Tagged {
            fn handlers() -> Vec<HandlerDescriptor<Self>> {
                vec![
                    HandlerDescriptor::on(|l: &Self, _: &Circle| {
                        l.1.lock().push(l.0);
                        Ok(())
                    }),
                    HandlerDescriptor::on(|l: &Self, _: &Shape| {
                        l.1.lock().push("shape");
                        Ok(())
                    }),
                ]
            }
        }

        let bus = MessageBus::new(Config::default());
        bus.subscribe(&Arc::new(Tagged("first", Arc::clone(&order))));
        bus.subscribe(&Arc::new(Tagged("second", Arc::clone(&order))));

        bus.publish(ring(1)).await.unwrap();
        assert_eq!(*order.lock(), vec!["first", "second", "shape", "shape"]);
    }
}
