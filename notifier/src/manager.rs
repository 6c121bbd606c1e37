use log::*;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::Error;
use crate::message::{EventType, NotificationEvent, OutboundMessage, PublishScope};
use crate::registry::{ChannelRegistry, GroupKey};

/// Default bound for each connection's outbound buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 64;

/// Default number of dropped events after which a connection is evicted.
pub const DEFAULT_SLOW_CLIENT_DROP_LIMIT: u64 = 100;

/// Facade tying the registry and dispatcher together.
///
/// Transports register connections here; producers publish through here. The
/// manager owns serialization: an event is rendered to JSON exactly once per
/// publish and the same allocation is shared across all recipients.
pub struct Manager {
    registry: Arc<ChannelRegistry>,
    dispatcher: Dispatcher,
    buffer_capacity: usize,
}

impl Manager {
    pub fn new(buffer_capacity: usize, slow_client_drop_limit: u64) -> Self {
        let registry = Arc::new(ChannelRegistry::new());
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry), slow_client_drop_limit),
            registry,
            buffer_capacity,
        }
    }

    /// Buffer capacity transports should use for the outbound channel they
    /// hand to [`register_connection`](Self::register_connection).
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Register a new connection subscribed to the given groups.
    ///
    /// The returned handle is already `Active`. Subscribing to no groups is
    /// allowed; such a connection receives broadcasts only.
    pub fn register_connection(
        &self,
        groups: Vec<GroupKey>,
        sink: mpsc::Sender<Arc<str>>,
    ) -> Result<Arc<ConnectionHandle>, Error> {
        let handle = Arc::new(ConnectionHandle::new(sink));
        handle.activate();

        for group in groups {
            self.registry.subscribe(group, &handle)?;
        }

        info!("Registered new connection {}", handle.id().as_str());
        Ok(handle)
    }

    /// Tear down a connection: leave every group, drop its record, close its
    /// handle. Safe to call more than once; later calls are no-ops, so a
    /// disconnecting transport and a slow-client eviction can race here.
    pub fn unregister_connection(&self, connection_id: &ConnectionId) {
        if self.registry.unsubscribe_all(connection_id) {
            info!("Unregistered connection {}", connection_id.as_str());
        }
    }

    /// Serialize a message once and fan it out according to its scope.
    ///
    /// Never blocks and never fails the caller: delivery problems are
    /// absorbed per connection and show up only in the returned counts (and
    /// the logs). Publishing to a group nobody listens to is a no-op.
    pub fn publish(&self, message: OutboundMessage) -> DispatchOutcome {
        let event_type = message.event.event_type();

        let payload: Arc<str> = match serde_json::to_string(&message.event) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!("Failed to serialize {event_type} event: {e}");
                return DispatchOutcome::default();
            }
        };

        let outcome = match message.scope {
            PublishScope::Group { key } => self.dispatcher.dispatch_to_group(&key, payload),
            PublishScope::Broadcast => self.dispatcher.dispatch_broadcast(payload),
        };

        debug!(
            "Published {event_type} event: {} delivered, {} dropped",
            outcome.delivered, outcome.dropped
        );
        outcome
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Number of groups with at least one member.
    pub fn group_count(&self) -> usize {
        self.registry.group_count()
    }

    /// Broadcast a final notice, then close and drop every connection.
    pub fn shutdown(&self, reason: &str) {
        info!("Shutting down notifier: {reason}");
        self.publish(OutboundMessage {
            event: NotificationEvent::system_shutdown(reason),
            scope: PublishScope::Broadcast,
        });
        self.registry.clear_all();
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, DEFAULT_SLOW_CLIENT_DROP_LIMIT)
    }
}
