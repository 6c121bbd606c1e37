use log::*;
use std::sync::Arc;

use crate::connection::{ConnectionHandle, ConnectionState};
use crate::registry::{ChannelRegistry, GroupKey};

/// Summary of a single fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Events queued onto member sinks.
    pub delivered: usize,
    /// Events dropped because a sink was full, closing, or gone.
    pub dropped: usize,
}

/// Fans serialized events out to group members with per-connection failure
/// isolation: one slow or vanished member never blocks the rest of a group,
/// and never blocks the publishing caller.
pub struct Dispatcher {
    registry: Arc<ChannelRegistry>,
    /// Connections whose drop count crosses this limit are evicted.
    slow_client_drop_limit: u64,
}

impl Dispatcher {
    pub fn new(registry: Arc<ChannelRegistry>, slow_client_drop_limit: u64) -> Self {
        Self {
            registry,
            slow_client_drop_limit,
        }
    }

    /// Deliver a serialized event to every member of a group.
    /// A group nobody is subscribed to is a silent no-op.
    pub fn dispatch_to_group(&self, group: &GroupKey, payload: Arc<str>) -> DispatchOutcome {
        let members = self.registry.members(group);
        if members.is_empty() {
            debug!("No members in group {group}, nothing to deliver");
            return DispatchOutcome::default();
        }

        self.deliver_to(members, payload)
    }

    /// Deliver a serialized event to every live connection - O(n)
    pub fn dispatch_broadcast(&self, payload: Arc<str>) -> DispatchOutcome {
        self.deliver_to(self.registry.all_connections(), payload)
    }

    fn deliver_to(
        &self,
        members: Vec<Arc<ConnectionHandle>>,
        payload: Arc<str>,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for handle in members {
            match handle.deliver(Arc::clone(&payload)) {
                Ok(true) => outcome.delivered += 1,
                Ok(false) => {
                    outcome.dropped += 1;
                    debug!("Dropped event for connection {}", handle.id().as_str());
                    self.evict_if_saturated(&handle);
                }
                Err(e) => {
                    // Only reachable when a handle is dispatched before it was
                    // activated; registered connections are always Active.
                    outcome.dropped += 1;
                    error!(
                        "Refusing delivery to connection {}: {e}",
                        handle.id().as_str()
                    );
                }
            }
        }

        outcome
    }

    /// Evict a connection that keeps falling behind. Removal drops the last
    /// long-lived reference to the handle, which closes the transport channel
    /// and lets the client's stream task finish its own teardown.
    fn evict_if_saturated(&self, handle: &Arc<ConnectionHandle>) {
        if handle.dropped_events() < self.slow_client_drop_limit {
            return;
        }
        if handle.state() != ConnectionState::Active {
            return;
        }
        if self.registry.unsubscribe_all(handle.id()) {
            warn!(
                "Evicted slow connection {} after {} dropped events",
                handle.id().as_str(),
                handle.dropped_events()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn registry_with_dispatcher(drop_limit: u64) -> (Arc<ChannelRegistry>, Dispatcher) {
        let registry = Arc::new(ChannelRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), drop_limit);
        (registry, dispatcher)
    }

    fn subscribed_handle(
        registry: &ChannelRegistry,
        group: &GroupKey,
        capacity: usize,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Arc::new(ConnectionHandle::new(tx));
        assert!(handle.activate());
        registry.subscribe(group.clone(), &handle).unwrap();
        (handle, rx)
    }

    #[test]
    fn dispatch_to_an_empty_group_is_a_no_op() {
        let (_registry, dispatcher) = registry_with_dispatcher(100);

        let outcome = dispatcher.dispatch_to_group(&GroupKey::user(404), Arc::from("{}"));
        assert_eq!(outcome, DispatchOutcome::default());
    }

    #[tokio::test]
    async fn every_member_receives_the_same_payload_allocation() {
        let (registry, dispatcher) = registry_with_dispatcher(100);
        let group = GroupKey::user(42);
        let (_h1, mut rx1) = subscribed_handle(&registry, &group, 8);
        let (_h2, mut rx2) = subscribed_handle(&registry, &group, 8);

        let payload: Arc<str> = Arc::from(r#"{"type":"notify"}"#);
        let outcome = dispatcher.dispatch_to_group(&group, Arc::clone(&payload));

        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.dropped, 0);

        let received_1 = rx1.recv().await.unwrap();
        let received_2 = rx2.recv().await.unwrap();
        // The event is serialized once and shared, never re-serialized per member.
        assert!(Arc::ptr_eq(&received_1, &payload));
        assert!(Arc::ptr_eq(&received_2, &payload));
    }

    #[tokio::test]
    async fn a_full_member_does_not_block_the_rest_of_the_group() {
        let (registry, dispatcher) = registry_with_dispatcher(100);
        let group = GroupKey::user(42);
        let (slow, _slow_rx) = subscribed_handle(&registry, &group, 1);
        let (_fast, mut fast_rx) = subscribed_handle(&registry, &group, 8);

        // Saturate the slow member's buffer without draining it.
        assert!(slow.deliver(Arc::from("filler")).unwrap());

        let outcome = dispatcher.dispatch_to_group(&group, Arc::from("fan-out"));

        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(&*fast_rx.recv().await.unwrap(), "fan-out");
    }

    #[tokio::test]
    async fn a_vanished_receiver_is_isolated_too() {
        let (registry, dispatcher) = registry_with_dispatcher(100);
        let group = GroupKey::user(42);
        let (_gone, gone_rx) = subscribed_handle(&registry, &group, 8);
        let (_live, mut live_rx) = subscribed_handle(&registry, &group, 8);
        drop(gone_rx);

        let outcome = dispatcher.dispatch_to_group(&group, Arc::from("still flowing"));

        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(&*live_rx.recv().await.unwrap(), "still flowing");
    }

    #[tokio::test]
    async fn chronically_slow_connections_are_evicted() {
        let (registry, dispatcher) = registry_with_dispatcher(2);
        let group = GroupKey::user(42);
        let (slow, _slow_rx) = subscribed_handle(&registry, &group, 1);

        // First dispatch fills the buffer, the next two cross the drop limit.
        dispatcher.dispatch_to_group(&group, Arc::from("a"));
        dispatcher.dispatch_to_group(&group, Arc::from("b"));
        dispatcher.dispatch_to_group(&group, Arc::from("c"));

        assert_eq!(registry.connection_count(), 0);
        assert_ne!(slow.state(), ConnectionState::Active);

        // Later dispatches see an empty group.
        let outcome = dispatcher.dispatch_to_group(&group, Arc::from("d"));
        assert_eq!(outcome, DispatchOutcome::default());
    }

    #[tokio::test]
    async fn broadcast_reaches_members_of_different_groups() {
        let (registry, dispatcher) = registry_with_dispatcher(100);
        let (_h1, mut rx1) = subscribed_handle(&registry, &GroupKey::user(1), 8);
        let (_h2, mut rx2) = subscribed_handle(&registry, &GroupKey::user(2), 8);

        let outcome = dispatcher.dispatch_broadcast(Arc::from("to everyone"));

        assert_eq!(outcome.delivered, 2);
        assert_eq!(&*rx1.recv().await.unwrap(), "to everyone");
        assert_eq!(&*rx2.recv().await.unwrap(), "to everyone");
    }

    #[tokio::test]
    async fn dispatches_preserve_per_connection_order() {
        let (registry, dispatcher) = registry_with_dispatcher(100);
        let group = GroupKey::user(42);
        let (_h, mut rx) = subscribed_handle(&registry, &group, 8);

        for payload in ["one", "two", "three"] {
            dispatcher.dispatch_to_group(&group, Arc::from(payload));
        }

        assert_eq!(&*rx.recv().await.unwrap(), "one");
        assert_eq!(&*rx.recv().await.unwrap(), "two");
        assert_eq!(&*rx.recv().await.unwrap(), "three");
    }
}
