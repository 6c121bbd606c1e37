use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::registry::GroupKey;

/// Trait for getting the wire-level event type name
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

/// Events pushed to connected clients.
///
/// Serialized as `{"type": "<kind>", "data": {...}}` so clients can switch on
/// the `type` tag. Each event captures its creation timestamp when built and
/// is immutable afterwards; use the constructors rather than building
/// variants by hand.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum NotificationEvent {
    /// A notification addressed to one user's connections.
    #[serde(rename = "notify")]
    Notify {
        text: String,
        created_at: DateTime<Utc>,
    },

    /// An operator notice shown to everyone currently connected.
    #[serde(rename = "system_notice")]
    SystemNotice {
        text: String,
        created_at: DateTime<Utc>,
    },

    /// Sent to all connections right before the server stops serving.
    #[serde(rename = "system_shutdown")]
    SystemShutdown {
        reason: String,
        created_at: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn notify(text: impl Into<String>) -> Self {
        Self::Notify {
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    pub fn system_notice(text: impl Into<String>) -> Self {
        Self::SystemNotice {
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    pub fn system_shutdown(reason: impl Into<String>) -> Self {
        Self::SystemShutdown {
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }
}

impl EventType for NotificationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            NotificationEvent::Notify { .. } => "notify",
            NotificationEvent::SystemNotice { .. } => "system_notice",
            NotificationEvent::SystemShutdown { .. } => "system_shutdown",
        }
    }
}

/// An event paired with the scope deciding who receives it.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub event: NotificationEvent,
    pub scope: PublishScope,
}

#[derive(Debug, Clone)]
pub enum PublishScope {
    /// Send to all connections subscribed to a specific group
    Group { key: GroupKey },
    /// Send to all connected clients
    Broadcast,
}
