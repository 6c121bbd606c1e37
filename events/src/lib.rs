//! Event system infrastructure for the Notification Platform.
//!
//! This crate provides the event system that enables loose coupling between
//! the producer-facing API and infrastructure concerns (like the live
//! notification fan-out).
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing all notification events in the system
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, avoiding circular
//! dependencies. Producers depend on it to emit events; delivery backends
//! depend on it to consume them.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// A type alias that represents a user's internal id field data type.
pub type Id = Uuid;

/// Domain events that represent notification requests flowing through the
/// system. These events are emitted when a producer asks for something to be
/// pushed to connected clients.
///
/// Events include user IDs for routing. The producer is responsible for
/// determining which users should be notified; the delivery layer routes
/// events only to those users' active connections.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// Emitted when a producer requests a notification for specific users.
    /// Triggers delivery to every active connection of each listed user.
    NotificationRequested {
        /// Human-readable notification body, forwarded to clients unchanged.
        text: String,
        /// User IDs to receive the notification (determined by the producer).
        notify_user_ids: Vec<Id>,
    },
    /// Emitted when an operator posts a system notice.
    /// With no topic, triggers delivery to every active connection. With a
    /// topic, delivery is limited to connections subscribed to that topic.
    SystemNoticePosted {
        /// Human-readable notice body, forwarded to clients unchanged.
        text: String,
        /// Optional topic name restricting who receives the notice.
        topic: Option<String>,
    },
}

/// Trait for handling domain events.
/// Implementations can perform side effects like pushing notifications to
/// live connections, updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    /// Handlers are called sequentially in registration order. Handlers are
    /// expected to absorb their own failures; publishing itself cannot fail.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
