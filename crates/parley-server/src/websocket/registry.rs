//! The live-connection set and room-scoped fanout.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use parking_lot::Mutex;
use parley_core::{ConnectionId, Envelope, EnvelopeError};
use tracing::{debug, info, warn};

use super::connection::{Connection, OutboundFrame};
use crate::errors::ConnectionError;
use crate::metrics::{BROADCAST_RECIPIENTS, WS_BROADCAST_DROPS_TOTAL};

/// Outcome of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fanout {
    /// Connections in the room when the broadcast started.
    pub matched: usize,
    /// Recipients whose queue accepted the event.
    pub delivered: usize,
    /// Recipients whose queue stayed full past the enqueue bound.
    pub dropped: usize,
}

/// Owns every live connection.
///
/// The map is only touched under its lock, and the lock is never held across
/// an await.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    enqueue_timeout: Duration,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new(enqueue_timeout: Duration) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            enqueue_timeout,
        }
    }

    /// Add a connection. Returns `false` (and changes nothing) if the id is
    /// already registered.
    pub fn register(&self, connection: Arc<Connection>) -> bool {
        let mut conns = self.connections.lock();
        if conns.contains_key(&connection.id()) {
            warn!(conn_id = %connection.id(), "duplicate registration ignored");
            return false;
        }
        let _ = conns.insert(connection.id(), connection);
        true
    }

    /// Close and remove a connection.
    ///
    /// Safe to call any number of times; only the first call for a registered
    /// connection has an effect, and it returns `true`.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let mut conns = self.connections.lock();
        match conns.remove(id) {
            Some(conn) => {
                let _ = conn.close();
                true
            }
            None => false,
        }
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Connections per occupied room.
    pub fn room_counts(&self) -> BTreeMap<String, usize> {
        let conns = self.connections.lock();
        let mut counts = BTreeMap::new();
        for conn in conns.values() {
            *counts.entry(conn.room()).or_insert(0) += 1;
        }
        counts
    }

    /// Connections currently in `room`, as of one consistent snapshot.
    pub fn members(&self, room: &str) -> Vec<Arc<Connection>> {
        self.connections
            .lock()
            .values()
            .filter(|c| c.is_in(room))
            .cloned()
            .collect()
    }

    /// Send `envelope` to every connection currently in `room`.
    ///
    /// Recipients are snapshotted under the lock; the lock is released before
    /// any enqueue. Each enqueue waits at most the configured bound. A full
    /// queue past that bound drops the event for that recipient only.
    pub async fn broadcast(&self, envelope: &Envelope, room: &str) -> Result<Fanout, EnvelopeError> {
        let frame: OutboundFrame = Arc::from(envelope.encode()?);
        let recipients = self.members(room);

        let mut fanout = Fanout {
            matched: recipients.len(),
            ..Fanout::default()
        };
        #[allow(clippy::cast_precision_loss)]
        histogram!(BROADCAST_RECIPIENTS).record(recipients.len() as f64);

        let timeout = self.enqueue_timeout;
        let sends = recipients.iter().map(|conn| {
            let frame = frame.clone();
            async move { (conn, conn.enqueue(frame, timeout).await) }
        });
        for (conn, result) in futures::future::join_all(sends).await {
            match result {
                Ok(()) => fanout.delivered += 1,
                Err(ConnectionError::QueueFull(waited)) => {
                    fanout.dropped += 1;
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                    warn!(conn_id = %conn.id(), room, ?waited, "outbound queue full, event dropped");
                }
                Err(e) => debug!(conn_id = %conn.id(), room, error = %e, "recipient closed during broadcast"),
            }
        }

        debug!(
            kind = envelope.kind(),
            room,
            matched = fanout.matched,
            delivered = fanout.delivered,
            dropped = fanout.dropped,
            "broadcast event to room"
        );
        Ok(fanout)
    }

    /// Close and remove every connection. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut conns = self.connections.lock();
            conns.drain().map(|(_, conn)| conn).collect()
        };
        for conn in &drained {
            let _ = conn.close();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "closed all connections");
        }
        drained.len()
    }
}
