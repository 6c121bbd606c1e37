use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{delivery_error, DeliveryErrorKind, Error};

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle states of a connection.
///
/// Transitions are monotonic: `Connecting -> Active -> Closing -> Closed`.
/// The discriminant ordering is relied upon for the state machine (a state
/// never moves to a smaller discriminant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Active,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// A live client connection wrapping the sender half of the transport's
/// bounded outbound channel.
///
/// The handle is shared (via `Arc`) between the registry, the dispatcher and
/// the transport task draining the receiver half. All state lives in atomics
/// so delivery never takes a lock and never blocks.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sink: mpsc::Sender<Arc<str>>,
    state: AtomicU8,
    dropped_events: AtomicU64,
}

impl ConnectionHandle {
    /// Create a handle in the `Connecting` state.
    pub fn new(sink: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id: ConnectionId::new(),
            sink,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            dropped_events: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Mark the connection established. Returns false if the connection was
    /// already past `Connecting` (a racing close is never undone).
    pub fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Begin teardown. Returns true for exactly one caller, so cleanup that
    /// must run once (leaving groups, logging) can key off the return value
    /// even when eviction races a client disconnect.
    pub fn begin_close(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= ConnectionState::Closing as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Final state, entered once the registry record is gone.
    pub fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }

    /// Queue a serialized event for the transport without blocking.
    ///
    /// Returns `Ok(true)` when the event was queued and `Ok(false)` when it
    /// was dropped: either the buffer is full, the receiver is gone, or the
    /// connection is already closing. Drops caused by a saturated or vanished
    /// sink are counted so the dispatcher can evict chronically slow clients.
    ///
    /// Delivering to a `Connecting` handle is a caller bug and the only case
    /// that returns an error.
    pub fn deliver(&self, payload: Arc<str>) -> Result<bool, Error> {
        match self.state() {
            ConnectionState::Connecting => Err(delivery_error(
                DeliveryErrorKind::ConnectionNotReady,
                "deliver called before the connection was activated",
            )),
            ConnectionState::Closing | ConnectionState::Closed => Ok(false),
            ConnectionState::Active => match self.sink.try_send(payload) {
                Ok(()) => Ok(true),
                Err(mpsc::error::TrySendError::Full(_))
                | Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.dropped_events.fetch_add(1, Ordering::Relaxed);
                    Ok(false)
                }
            },
        }
    }

    /// Events dropped so far because the sink was full or gone.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}
