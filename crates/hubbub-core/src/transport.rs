use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle to one live duplex transport. Ids are never
/// reused, so a stale id held by an in-flight fanout can at worst
/// name a connection that no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("transport send buffer full")]
    Backpressure,
}

/// The two primitives the hub needs from a connection's wire layer.
///
/// Sends are fire-and-forget and must not block: the production
/// implementation enqueues onto a per-connection channel drained by a
/// writer task, which also gives the required per-connection ordering.
/// Any error means the connection is dead and will be reaped.
pub trait Transport: Send + Sync + 'static {
    fn send_text(&self, payload: &str) -> Result<(), TransportError>;
    fn send_binary(&self, payload: Bytes) -> Result<(), TransportError>;
}
