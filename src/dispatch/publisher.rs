//! # Publisher: resolve, invoke, dead-message fallback.
//!
//! ```text
//! dispatch(holder)
//!   ├─► registry.subscriptions_for(signature, mode)
//!   ├─► subscription.publish(messages) for each, in order
//!   ├─► nothing invoked and not already dead
//!   │     └─► DeadMessage(messages) ─► exact DeadMessage subscriptions only
//!   └─► registry.sweep_reclaimed()
//! ```

use std::sync::Arc;

use crate::core::DispatchMode;
use crate::funnel::ErrorHandler;
use crate::subscriptions::SubscriptionRegistry;
use crate::types::{AnyMessage, DeadMessage, MessageType};

use super::holder::MessageHolder;

/// Shared resolve-and-invoke step of both dispatch strategies.
pub(crate) struct Publisher {
    registry: Arc<SubscriptionRegistry>,
    errors: Arc<ErrorHandler>,
    mode: DispatchMode,
}

impl Publisher {
    pub(crate) fn new(registry: Arc<SubscriptionRegistry>, errors: Arc<ErrorHandler>, mode: DispatchMode) -> Self {
        Self { registry, errors, mode }
    }

    pub(crate) fn errors(&self) -> &Arc<ErrorHandler> {
        &self.errors
    }

    /// Delivers one publication; returns the number of handler invocations.
    ///
    /// Dead-message deliveries are not counted.
    pub(crate) async fn dispatch(&self, holder: &MessageHolder) -> usize {
        let messages = holder.messages();
        let signature = holder.signature();
        let routes = self
            .registry
            .subscriptions_for(&signature, self.mode.includes_supertypes());

        let mut invocations = 0;
        for sub in routes.iter() {
            invocations += sub.publish(messages, &self.errors).await;
        }

        if invocations == 0 && !is_dead(messages) {
            let dead: Arc<dyn AnyMessage> = Arc::new(DeadMessage::new(messages.to_vec()));
            let routes = self
                .registry
                .subscriptions_for(&[MessageType::of::<DeadMessage>()], false);
            for sub in routes.iter() {
                sub.publish(std::slice::from_ref(&dead), &self.errors).await;
            }
        }
        self.registry.sweep_reclaimed();
        invocations
    }
}

fn is_dead(messages: &[Arc<dyn AnyMessage>]) -> bool {
    matches!(messages, [only] if only.is::<DeadMessage>())
}
