//! Server-level errors.

use std::time::Duration;

use parley_core::EnvelopeError;
use parley_core::EventKind;
use parley_store::StoreError;
use thiserror::Error;

/// Why a connection's pump stopped.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection was closed by the registry.
    #[error("connection closed")]
    Closed,

    /// An outbound queue stayed full past the enqueue bound.
    #[error("outbound queue full for {0:?}")]
    QueueFull(Duration),

    /// No pong arrived within the read deadline.
    #[error("no pong within {0:?}")]
    HeartbeatTimeout(Duration),

    /// An inbound frame exceeded the size limit.
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge {
        /// Received size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// An inbound frame was not a valid envelope.
    #[error(transparent)]
    Protocol(#[from] EnvelopeError),

    /// The socket failed to read or write.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure inside a single event handler. Never fatal to the connection.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload did not match the handler's expected shape.
    #[error(transparent)]
    Payload(#[from] EnvelopeError),

    /// The persistence collaborator failed.
    #[error("failed to persist message: {0}")]
    Persistence(#[from] StoreError),

    /// The outbound event could not be serialized.
    #[error("failed to encode outbound event: {0}")]
    Encode(#[source] EnvelopeError),
}

/// Failure routing one inbound envelope.
#[derive(Debug, Error)]
pub enum RouteError {
    /// No handler is registered for the envelope's kind.
    #[error("no handler for event kind '{0}'")]
    UnknownKind(String),

    /// The handler ran and failed.
    #[error("{kind} handler failed: {source}")]
    Handler {
        /// Kind being handled.
        kind: EventKind,
        /// Handler failure.
        #[source]
        source: HandlerError,
    },
}

impl RouteError {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::UnknownKind(_) => "unknown_kind",
            Self::Handler {
                source: HandlerError::Payload(_),
                ..
            } => "bad_payload",
            Self::Handler {
                source: HandlerError::Persistence(_),
                ..
            } => "persistence",
            Self::Handler {
                source: HandlerError::Encode(_),
                ..
            } => "encode",
        }
    }
}

/// Server startup failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
