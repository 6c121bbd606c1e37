use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::connection::{ConnectionHandle, ConnectionId, ConnectionState};
use crate::error::{group_error, subscription_error};
use crate::error::{Error, GroupErrorKind, SubscriptionErrorKind};

/// Opaque routing key naming a delivery group.
///
/// Keys are namespaced so identity-derived groups and free-form topics cannot
/// collide: `user:<id>` for a user's personal group, `topic:<name>` for
/// shared topics. Keys never change for a given identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey(String);

impl GroupKey {
    /// The group holding every live connection of one user.
    pub fn user(id: impl fmt::Display) -> Self {
        Self(format!("user:{id}"))
    }

    /// A free-form topic group. The name must be non-empty.
    pub fn topic(name: &str) -> Result<Self, Error> {
        if name.trim().is_empty() {
            return Err(group_error(
                GroupErrorKind::EmptyKey,
                "topic group keys require a non-empty name",
            ));
        }
        Ok(Self(format!("topic:{name}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection information tracked per live connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub handle: Arc<ConnectionHandle>,
    /// Groups this connection belongs to, mirrored for O(g) cleanup.
    pub groups: HashSet<GroupKey>,
}

/// High-performance channel registry with dual indices for O(1) lookups
pub struct ChannelRegistry {
    /// Primary storage: lookup by connection_id for subscription bookkeeping
    /// and cleanup - O(1)
    connections: DashMap<ConnectionId, ConnectionInfo>,

    /// Secondary index: fast lookup by group key for message routing - O(1)
    group_index: DashMap<GroupKey, HashSet<ConnectionId>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            group_index: DashMap::new(),
        }
    }

    /// Subscribe a connection to a group - O(1).
    ///
    /// Idempotent: subscribing an already-subscribed connection is a no-op.
    /// The handle must be `Active`; subscribing a connection that has not
    /// finished establishment (or is already closing) is a caller bug.
    pub fn subscribe(&self, group: GroupKey, handle: &Arc<ConnectionHandle>) -> Result<(), Error> {
        if handle.state() != ConnectionState::Active {
            return Err(subscription_error(
                SubscriptionErrorKind::ConnectionNotActive,
                handle.id().as_str(),
            ));
        }

        let connection_id = handle.id().clone();

        // Record the membership on the primary entry first, then mirror it
        // into the routing index. Shard locks are held one at a time.
        let mut info = self
            .connections
            .entry(connection_id.clone())
            .or_insert_with(|| ConnectionInfo {
                handle: Arc::clone(handle),
                groups: HashSet::new(),
            });
        info.groups.insert(group.clone());
        drop(info);

        self.group_index
            .entry(group)
            .or_default()
            .insert(connection_id);

        Ok(())
    }

    /// Remove a connection from one group - O(1). Unknown groups and
    /// connections that were never subscribed are silent no-ops.
    pub fn unsubscribe(&self, group: &GroupKey, connection_id: &ConnectionId) {
        if let Some(mut info) = self.connections.get_mut(connection_id) {
            info.groups.remove(group);
        }

        if let Some(mut members) = self.group_index.get_mut(group) {
            members.remove(connection_id);

            if members.is_empty() {
                drop(members); // Release lock before removal
                // Re-checked under the entry lock: a concurrent subscribe may
                // have repopulated the group in the meantime.
                self.group_index.remove_if(group, |_, members| members.is_empty());
            }
        }
    }

    /// Remove a connection from every group and drop its record - O(g).
    ///
    /// Flips the handle to `Closing`/`Closed` as part of removal, so the
    /// transition happens exactly once no matter how many callers race here.
    /// Returns true if the connection was still registered.
    pub fn unsubscribe_all(&self, connection_id: &ConnectionId) -> bool {
        let Some((_, info)) = self.connections.remove(connection_id) else {
            return false;
        };

        info.handle.begin_close();

        for group in &info.groups {
            if let Some(mut members) = self.group_index.get_mut(group) {
                members.remove(connection_id);

                if members.is_empty() {
                    drop(members); // Release lock before removal
                    self.group_index.remove_if(group, |_, members| members.is_empty());
                }
            }
        }

        info.handle.mark_closed();
        true
    }

    /// Snapshot the handles currently subscribed to a group - O(k).
    ///
    /// The member set is copied under the group's entry lock, so the snapshot
    /// is consistent: it never mixes the before and after of a concurrent
    /// subscribe or unsubscribe on that group.
    pub fn members(&self, group: &GroupKey) -> Vec<Arc<ConnectionHandle>> {
        let member_ids: Vec<ConnectionId> = match self.group_index.get(group) {
            Some(members) => members.iter().cloned().collect(),
            None => return Vec::new(),
        };

        member_ids
            .iter()
            .filter_map(|id| {
                self.connections
                    .get(id)
                    .map(|info| Arc::clone(&info.handle))
            })
            .collect()
    }

    /// Snapshot every live connection - O(n). Used for broadcasts.
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(&entry.value().handle))
            .collect()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of groups with at least one member.
    pub fn group_count(&self) -> usize {
        self.group_index.len()
    }

    /// Number of members in a group. Unknown groups have zero members.
    pub fn group_size(&self, group: &GroupKey) -> usize {
        self.group_index
            .get(group)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Close every handle and drop all records. Used during shutdown.
    pub fn clear_all(&self) {
        for entry in self.connections.iter() {
            entry.value().handle.begin_close();
            entry.value().handle.mark_closed();
        }
        self.connections.clear();
        self.group_index.clear();
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tokio::sync::mpsc;

    fn active_handle() -> (Arc<ConnectionHandle>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = Arc::new(ConnectionHandle::new(tx));
        assert!(handle.activate());
        (handle, rx)
    }

    #[test]
    fn user_keys_are_namespaced() {
        assert_eq!(GroupKey::user(42).as_str(), "user:42");
        assert_eq!(GroupKey::topic("billing").unwrap().as_str(), "topic:billing");
        // A user id that happens to look like a topic still cannot collide.
        assert_ne!(
            GroupKey::user("billing"),
            GroupKey::topic("billing").unwrap()
        );
    }

    #[test]
    fn empty_topic_name_is_rejected() {
        let err = GroupKey::topic("  ").unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Group(GroupErrorKind::EmptyKey));
    }

    #[test]
    fn subscribe_then_members_returns_the_handle() {
        let registry = ChannelRegistry::new();
        let (handle, _rx) = active_handle();
        let group = GroupKey::user(42);

        registry.subscribe(group.clone(), &handle).unwrap();

        let members = registry.members(&group);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id(), handle.id());
        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.group_count(), 1);
    }

    #[test]
    fn subscribe_is_idempotent() {
        let registry = ChannelRegistry::new();
        let (handle, _rx) = active_handle();
        let group = GroupKey::user(42);

        registry.subscribe(group.clone(), &handle).unwrap();
        registry.subscribe(group.clone(), &handle).unwrap();

        assert_eq!(registry.members(&group).len(), 1);
        assert_eq!(registry.group_size(&group), 1);
    }

    #[test]
    fn subscribe_requires_an_active_connection() {
        let registry = ChannelRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let connecting = Arc::new(ConnectionHandle::new(tx));

        let err = registry
            .subscribe(GroupKey::user(1), &connecting)
            .unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Subscription(SubscriptionErrorKind::ConnectionNotActive)
        );
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn members_of_an_unknown_group_is_empty() {
        let registry = ChannelRegistry::new();
        assert!(registry.members(&GroupKey::user(404)).is_empty());
        assert_eq!(registry.group_size(&GroupKey::user(404)), 0);
    }

    #[test]
    fn unsubscribe_removes_membership_and_cleans_empty_groups() {
        let registry = ChannelRegistry::new();
        let (handle, _rx) = active_handle();
        let group = GroupKey::user(42);

        registry.subscribe(group.clone(), &handle).unwrap();
        registry.unsubscribe(&group, handle.id());

        assert!(registry.members(&group).is_empty());
        assert_eq!(registry.group_count(), 0);
        // The connection record itself survives an individual unsubscribe.
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn unsubscribe_from_an_unknown_group_is_a_no_op() {
        let registry = ChannelRegistry::new();
        let (handle, _rx) = active_handle();

        registry.unsubscribe(&GroupKey::user(404), handle.id());
        assert_eq!(registry.group_count(), 0);
    }

    #[test]
    fn a_connection_can_join_multiple_groups() {
        let registry = ChannelRegistry::new();
        let (handle, _rx) = active_handle();
        let personal = GroupKey::user(42);
        let topic = GroupKey::topic("deploys").unwrap();

        registry.subscribe(personal.clone(), &handle).unwrap();
        registry.subscribe(topic.clone(), &handle).unwrap();

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.group_count(), 2);
        assert_eq!(registry.members(&personal).len(), 1);
        assert_eq!(registry.members(&topic).len(), 1);
    }

    #[test]
    fn a_group_can_hold_multiple_connections() {
        let registry = ChannelRegistry::new();
        let (first, _rx1) = active_handle();
        let (second, _rx2) = active_handle();
        let group = GroupKey::user(42);

        registry.subscribe(group.clone(), &first).unwrap();
        registry.subscribe(group.clone(), &second).unwrap();

        assert_eq!(registry.group_size(&group), 2);
        assert_eq!(registry.connection_count(), 2);
    }

    #[test]
    fn unsubscribe_all_cleans_both_indices_and_closes_the_handle() {
        let registry = ChannelRegistry::new();
        let (handle, _rx) = active_handle();
        let personal = GroupKey::user(42);
        let topic = GroupKey::topic("deploys").unwrap();

        registry.subscribe(personal.clone(), &handle).unwrap();
        registry.subscribe(topic.clone(), &handle).unwrap();

        assert!(registry.unsubscribe_all(handle.id()));
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.group_count(), 0);
        assert_eq!(handle.state(), ConnectionState::Closed);

        // Second teardown is a no-op.
        assert!(!registry.unsubscribe_all(handle.id()));
    }

    #[test]
    fn unsubscribe_all_leaves_other_members_in_place() {
        let registry = ChannelRegistry::new();
        let (leaving, _rx1) = active_handle();
        let (staying, _rx2) = active_handle();
        let group = GroupKey::user(42);

        registry.subscribe(group.clone(), &leaving).unwrap();
        registry.subscribe(group.clone(), &staying).unwrap();

        registry.unsubscribe_all(leaving.id());

        let members = registry.members(&group);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id(), staying.id());
        assert_eq!(staying.state(), ConnectionState::Active);
    }

    #[test]
    fn clear_all_closes_every_handle() {
        let registry = ChannelRegistry::new();
        let (first, _rx1) = active_handle();
        let (second, _rx2) = active_handle();

        registry.subscribe(GroupKey::user(1), &first).unwrap();
        registry.subscribe(GroupKey::user(2), &second).unwrap();

        registry.clear_all();

        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.group_count(), 0);
        assert_eq!(first.state(), ConnectionState::Closed);
        assert_eq!(second.state(), ConnectionState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_churn_keeps_indices_consistent() {
        let registry = Arc::new(ChannelRegistry::new());
        let group = GroupKey::topic("churn").unwrap();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let group = group.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let (tx, _rx) = mpsc::channel(4);
                    let handle = Arc::new(ConnectionHandle::new(tx));
                    handle.activate();

                    registry.subscribe(group.clone(), &handle).unwrap();

                    // Reads taken mid-churn must never observe a torn entry.
                    for member in registry.members(&group) {
                        assert!(!member.id().as_str().is_empty());
                    }

                    registry.unsubscribe_all(handle.id());
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.group_count(), 0);
        assert!(registry.members(&group).is_empty());
    }
}
