//! Real-time notification delivery for connected clients.
//!
//! This crate is the in-process core of the notification platform: it tracks
//! which client connections belong to which delivery groups and fans
//! published events out to them without ever blocking the publisher.
//!
//! # Architecture
//!
//! - **Dual-index registry**: O(1) lookups for both connection cleanup and
//!   group-scoped routing via separate DashMap indices.
//! - **Group and Broadcast scopes**: Events can be sent to one group (for
//!   example a user's personal `user:<id>` group) or to every connection.
//! - **Bounded, non-blocking sinks**: Each connection owns a bounded channel.
//!   Delivery uses `try_send`; a full buffer drops the event for that
//!   connection only, and chronically slow connections are evicted.
//! - **Serialize once**: A published event is rendered to JSON a single time
//!   and the same allocation is shared across every recipient.
//! - **Ephemeral events**: Nothing is persisted. A client that is offline
//!   misses the event and resynchronizes through the regular API on its next
//!   request.
//!
//! # Message Flow
//!
//! 1. A transport (the SSE endpoint in `web`) creates a bounded channel and
//!    registers the sender half via `Manager::register_connection`, naming
//!    the groups the connection should join.
//! 2. A producer publishes a [`message::OutboundMessage`], directly or by
//!    emitting an `events::DomainEvent` routed through
//!    [`event_fanout::NotificationFanout`].
//! 3. The manager serializes the event once and the dispatcher walks the
//!    group's member snapshot, queueing the payload per connection.
//! 4. The transport task drains its receiver and writes frames to the wire.
//! 5. On disconnect the transport unregisters the connection, which leaves
//!    every group exactly once.
//!
//! # Example: Publishing an event
//!
//! ```rust,ignore
//! use notifier::message::{NotificationEvent, OutboundMessage, PublishScope};
//! use notifier::registry::GroupKey;
//!
//! // In a controller after accepting a producer request
//! app_state.notifier.publish(OutboundMessage {
//!     event: NotificationEvent::notify("you have a new task"),
//!     scope: PublishScope::Group { key: GroupKey::user(recipient_id) },
//! });
//! ```
//!
//! # Modules
//!
//! - `connection`: per-connection handle with lifecycle state and bounded sink
//! - `registry`: ChannelRegistry with dual-index architecture and GroupKey
//! - `dispatch`: fan-out with per-connection failure isolation and eviction
//! - `manager`: high-level facade (register, publish, shutdown)
//! - `message`: type-safe event and scope definitions
//! - `event_fanout`: bridge from `events::DomainEvent` to live delivery
//! - `error`: structured error kinds for caller mistakes

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod event_fanout;
pub mod manager;
pub mod message;
pub mod registry;

pub use manager::Manager;
