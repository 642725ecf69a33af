//! # Publication error handling
//!
//! Demonstrates:
//! - Handler errors and panics are isolated from the publisher
//! - Custom error handlers receive every failure
//! - Weak listeners disappear once dropped

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use messagebus::{
    Config, HandlerDescriptor, Listener, Message, MessageBus, PublicationError, PublicationErrorHandler, ReferenceMode,
};

struct Order {
    qty: u32,
}
impl Message for Order {}

/// Rejects empty orders, crashes on huge ones
struct Validator;
impl Listener for Validator {
    fn handlers() -> Vec<HandlerDescriptor<Self>> {
        vec![HandlerDescriptor::on(|_: &Validator, o: &Order| {
            if o.qty == 0 {
                return Err("empty order".into());
            }
            if o.qty > 1000 {
                panic!("quantity overflow");
            }
            println!("✔️  Validator: order of {} accepted", o.qty);
            Ok(())
        })]
    }
}

/// Tracked weakly: the bus does not keep it alive
struct Tracker;
impl Listener for Tracker {
    fn handlers() -> Vec<HandlerDescriptor<Self>> {
        vec![HandlerDescriptor::on(|_: &Tracker, o: &Order| {
            println!("👀 Tracker: saw order of {}", o.qty);
            Ok(())
        })]
    }
    fn reference_mode() -> Option<ReferenceMode> {
        Some(ReferenceMode::Weak)
    }
}

#[derive(Default)]
struct Counting {
    failures: AtomicUsize,
}

impl PublicationErrorHandler for Counting {
    fn handle_error(&self, error: &PublicationError) {
        let n = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        println!("🚨 Failure #{n}: {error}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let counting = Arc::new(Counting::default());
    let bus = MessageBus::builder(Config::default())
        .with_error_handler(counting.clone())
        .build();

    bus.subscribe(&Arc::new(Validator));
    let tracker = Arc::new(Tracker);
    bus.subscribe(&tracker);
    println!("🧮 Listeners: {}", bus.listener_count());

    for qty in [3, 0, 5000] {
        let delivery = bus.publish(Order { qty }).await?;
        println!("➡️  Order {qty}: {delivery:?}");
    }

    drop(tracker);
    bus.publish(Order { qty: 7 }).await?;
    println!("🧮 Listeners after drop: {}", bus.listener_count());
    println!("🚨 Total failures: {}", counting.failures.load(Ordering::SeqCst));

    bus.shutdown().await;
    Ok(())
}
