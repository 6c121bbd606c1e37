use crate::message::{NotificationEvent, OutboundMessage, PublishScope};
use crate::registry::GroupKey;
use crate::Manager;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler};
use log::*;
use std::sync::Arc;

/// Handles domain events by converting them to notification events and
/// fanning them out to the affected connections.
///
/// The producer decides who should be notified and lists the user IDs in the
/// event; this handler only routes. Each listed user maps to their personal
/// group, so every connection that user holds receives a copy.
pub struct NotificationFanout {
    manager: Arc<Manager>,
}

impl NotificationFanout {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self { manager }
    }

    /// Publish one event to every listed user's personal group.
    fn send_to_users(&self, event: NotificationEvent, user_ids: &[events::Id]) {
        for user_id in user_ids {
            self.manager.publish(OutboundMessage {
                event: event.clone(),
                scope: PublishScope::Group {
                    key: GroupKey::user(user_id),
                },
            });
        }

        debug!("Routed event to {} user group(s)", user_ids.len());
    }
}

#[async_trait]
impl EventHandler for NotificationFanout {
    async fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::NotificationRequested {
                text,
                notify_user_ids,
            } => {
                debug!(
                    "Handling NotificationRequested event for {} user(s)",
                    notify_user_ids.len()
                );
                self.send_to_users(NotificationEvent::notify(text.clone()), notify_user_ids);
            }

            DomainEvent::SystemNoticePosted { text, topic } => {
                debug!("Handling SystemNoticePosted event");
                let scope = match topic.as_deref().map(GroupKey::topic) {
                    Some(Ok(key)) => PublishScope::Group { key },
                    Some(Err(e)) => {
                        error!("Dropping system notice with invalid topic: {e}");
                        return;
                    }
                    None => PublishScope::Broadcast,
                };
                self.manager.publish(OutboundMessage {
                    event: NotificationEvent::system_notice(text.clone()),
                    scope,
                });
            }
        }
    }
}
