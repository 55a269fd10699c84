//! WebSocket client connection state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use parley_core::{ConnectionId, Identity};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::errors::ConnectionError;

/// A serialized text frame, shared by every recipient of a broadcast.
pub type OutboundFrame = Arc<str>;

/// One live socket.
///
/// The registry decides when a connection is closed; the connection's own
/// read pump is the only writer of `room`.
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    room: Mutex<String>,
    outbound: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
    closed: CancellationToken,
    connected_at: Instant,
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue.
    pub fn new(
        id: ConnectionId,
        identity: Identity,
        room: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            id,
            identity,
            room: Mutex::new(room.into()),
            outbound: Mutex::new(Some(tx)),
            closed: CancellationToken::new(),
            connected_at: Instant::now(),
        });
        (conn, rx)
    }

    /// Unique id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The user this connection was upgraded for.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Current room.
    pub fn room(&self) -> String {
        self.room.lock().clone()
    }

    /// Whether the connection is currently in `room`.
    pub fn is_in(&self, room: &str) -> bool {
        *self.room.lock() == room
    }

    /// Move to another room.
    pub fn set_room(&self, room: impl Into<String>) {
        *self.room.lock() = room.into();
    }

    /// Queue a frame for the write pump.
    ///
    /// Waits up to `timeout` for space. Fails immediately once the connection
    /// is closed, including while waiting.
    pub async fn enqueue(
        &self,
        frame: OutboundFrame,
        timeout: Duration,
    ) -> Result<(), ConnectionError> {
        let Some(tx) = self.outbound.lock().clone() else {
            return Err(ConnectionError::Closed);
        };
        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(ConnectionError::Closed),
            sent = tokio::time::timeout(timeout, tx.send(frame)) => match sent {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(ConnectionError::Closed),
                Err(_) => Err(ConnectionError::QueueFull(timeout)),
            },
        }
    }

    /// Close the outbound queue and signal both pumps.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let tx = self.outbound.lock().take();
        self.closed.cancel();
        tx.is_some()
    }

    /// Whether [`Connection::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("email", &self.identity.email)
            .field("room", &self.room())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
