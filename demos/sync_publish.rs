//! # Synchronous publishing with a type hierarchy
//!
//! Demonstrates:
//! - Declaring supertypes and upcasting embedded ancestors
//! - Exact vs subtype-accepting handlers
//! - Dead messages for publications nobody handles

use std::any::{Any, TypeId};
use std::sync::Arc;

use messagebus::{AnyMessage, Config, DeadMessage, HandlerDescriptor, Listener, Message, MessageBus, MessageType};

/// Base event
struct Event {
    id: u64,
}
impl Message for Event {}

/// An event raised by a user
struct UserEvent {
    event: Event,
    user: &'static str,
}
impl Message for UserEvent {
    fn supertypes() -> Vec<MessageType> {
        vec![MessageType::of::<Event>()]
    }
    fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
        self.event.view_raw(target)
    }
}

/// Nobody listens to this one
struct Heartbeat;
impl Message for Heartbeat {}

struct Audit;
impl Listener for Audit {
    fn handlers() -> Vec<HandlerDescriptor<Self>> {
        vec![
            // receives Event and every subtype
            HandlerDescriptor::on(|_: &Audit, e: &Event| {
                println!("📋 Audit: event #{}", e.id);
                Ok(())
            }),
            // receives exactly UserEvent
            HandlerDescriptor::on(|_: &Audit, e: &UserEvent| {
                println!("📋 Audit: user {} raised #{}", e.user, e.event.id);
                Ok(())
            })
            .accept_subtypes(false),
            HandlerDescriptor::on(|_: &Audit, d: &DeadMessage| {
                for m in d.messages() {
                    println!("💀 Audit: nobody handled {}", m.type_name());
                }
                Ok(())
            }),
        ]
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MessageBus::new(Config::default());
    bus.subscribe(&Arc::new(Audit));

    let delivery = bus.publish(Event { id: 1 }).await?;
    println!("➡️  Event: {delivery:?}");

    let delivery = bus
        .publish(UserEvent {
            event: Event { id: 2 },
            user: "alice",
        })
        .await?;
    println!("➡️  UserEvent: {delivery:?}");

    let delivery = bus.publish(Heartbeat).await?;
    println!("➡️  Heartbeat: {delivery:?}");

    bus.shutdown().await;
    Ok(())
}
