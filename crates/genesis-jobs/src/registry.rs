//! Event-type to handler dispatch for webhook processing.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::Result;

/// Business logic for one webhook event type.
///
/// Delivery is at-least-once, so implementations must be idempotent: a
/// handler may see the same event twice and has to converge to the same
/// state.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    /// Processes one event for a project.
    async fn handle(&self, project_id: &str, payload: &Value) -> Result<()>;
}

/// Maps event type strings to their handlers.
///
/// Unknown event types are not an error; the processor logs and
/// completes them so a new remote event type never wedges the queue.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn WebhookHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in Genesis event handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("payment.completed", Arc::new(PaymentCompletedHandler));
        registry.register("user.created", Arc::new(UserCreatedHandler));
        registry.register("subscription.updated", Arc::new(SubscriptionUpdatedHandler));
        registry
    }

    /// Registers a handler, replacing any existing one for the type.
    pub fn register(&mut self, event_type: &str, handler: Arc<dyn WebhookHandler>) {
        self.handlers.insert(event_type.to_string(), handler);
    }

    /// Looks up the handler for an event type.
    pub fn get(&self, event_type: &str) -> Option<Arc<dyn WebhookHandler>> {
        self.handlers.get(event_type).cloned()
    }

    /// Registered event types, for diagnostics.
    pub fn event_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

/// Acknowledges completed payments.
pub struct PaymentCompletedHandler;

#[async_trait]
impl WebhookHandler for PaymentCompletedHandler {
    async fn handle(&self, project_id: &str, payload: &Value) -> Result<()> {
        let payment_id = payload.get("payment_id").and_then(Value::as_str).unwrap_or("unknown");
        info!(project_id, payment_id, "processing completed payment");
        Ok(())
    }
}

/// Provisions newly created users.
pub struct UserCreatedHandler;

#[async_trait]
impl WebhookHandler for UserCreatedHandler {
    async fn handle(&self, project_id: &str, payload: &Value) -> Result<()> {
        let user_id = payload.get("user_id").and_then(Value::as_str).unwrap_or("unknown");
        info!(project_id, user_id, "processing created user");
        Ok(())
    }
}

/// Applies subscription plan changes.
pub struct SubscriptionUpdatedHandler;

#[async_trait]
impl WebhookHandler for SubscriptionUpdatedHandler {
    async fn handle(&self, project_id: &str, payload: &Value) -> Result<()> {
        let subscription_id =
            payload.get("subscription_id").and_then(Value::as_str).unwrap_or("unknown");
        info!(project_id, subscription_id, "processing updated subscription");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_registry_covers_genesis_events() {
        let registry = HandlerRegistry::with_defaults();

        assert!(registry.get("payment.completed").is_some());
        assert!(registry.get("user.created").is_some());
        assert!(registry.get("subscription.updated").is_some());
        assert!(registry.get("invoice.voided").is_none());
    }

    #[test]
    fn register_replaces_existing_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register("payment.completed", Arc::new(PaymentCompletedHandler));
        registry.register("payment.completed", Arc::new(UserCreatedHandler));

        assert_eq!(registry.event_types(), vec!["payment.completed"]);
    }

    #[tokio::test]
    async fn built_in_handlers_accept_partial_payloads() {
        let registry = HandlerRegistry::with_defaults();
        let handler = registry.get("user.created").unwrap();

        handler.handle("p1", &json!({})).await.unwrap();
        handler.handle("p1", &json!({"user_id": "u-7"})).await.unwrap();
    }
}
