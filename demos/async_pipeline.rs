//! # Asynchronous pipeline
//!
//! Demonstrates:
//! - Queued delivery via a worker pool
//! - Synchronized handlers (one invocation per instance at a time)
//! - Back-pressure with an enqueue timeout
//! - Draining on shutdown

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use messagebus::{
    AnyMessage, Config, HandlerDescriptor, HandlerError, Invoke, Listener, Message, MessageBus, MessageType,
    PublicationError,
};

struct Job(u64);
impl Message for Job {}

#[derive(Default)]
struct Accumulator {
    total: AtomicU64,
}

/// Simulates slow work per job
struct Work;

#[async_trait]
impl Invoke<Accumulator> for Work {
    async fn invoke(&self, acc: &Accumulator, messages: &[Arc<dyn AnyMessage>]) -> Result<(), HandlerError> {
        let Some(job) = messages[0].view::<Job>() else {
            return Err("not a job".into());
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let total = acc.total.fetch_add(job.0, Ordering::SeqCst) + job.0;
        println!("⚙️  Accumulator: job {} done, total = {}", job.0, total);
        Ok(())
    }
}

impl Listener for Accumulator {
    fn handlers() -> Vec<HandlerDescriptor<Self>> {
        vec![HandlerDescriptor::new(vec![MessageType::of::<Job>()], Work).synchronized()]
    }
}

#[tokio::main]
async fn main() {
    let mut cfg = Config::asynchronous();
    cfg.workers = 2;
    cfg.queue_capacity = 4;
    cfg.enqueue_timeout = Duration::from_millis(50);
    cfg.grace = Duration::from_secs(2);

    let bus = MessageBus::builder(cfg)
        .with_error_handler(Arc::new(|e: &PublicationError| {
            println!("⚠️  Rejected: {e}");
        }))
        .build();

    let acc = Arc::new(Accumulator::default());
    bus.subscribe(&acc);

    for n in 1..=12 {
        match bus.publish(Job(n)).await {
            Ok(delivery) => println!("📨 Job {n}: {delivery:?}"),
            Err(e) => println!("📨 Job {n}: {e} ({})", e.as_label()),
        }
    }

    println!("👷 Workers: {:?}", bus.worker_states());
    bus.shutdown().await;
    println!("✅ Done: total = {}, pending = {}", acc.total.load(Ordering::SeqCst), bus.has_pending_messages());
}
