//! Event kind → handler dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use parley_core::{Envelope, EventKind};
use parley_store::MessageStore;
use tracing::debug;

use super::connection::Connection;
use super::handlers::{ChangeRoomHandler, SendMessageHandler};
use super::registry::ConnectionRegistry;
use crate::errors::{HandlerError, RouteError};
use crate::metrics::{EVENT_ERRORS_TOTAL, EVENTS_ROUTED_TOTAL};

/// Collaborators available to every handler.
#[derive(Clone)]
pub struct HandlerContext {
    /// Live connections, for fanout.
    pub registry: Arc<ConnectionRegistry>,
    /// Chat persistence.
    pub messages: Arc<dyn MessageStore>,
}

/// Interprets one event kind.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle `envelope`, which arrived on `source`.
    async fn handle(
        &self,
        envelope: &Envelope,
        source: &Arc<Connection>,
        ctx: &HandlerContext,
    ) -> Result<(), HandlerError>;
}

/// Read-only handler table, built once at startup.
pub struct EventRouter {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl EventRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Router with the `change_room` and `send_message` handlers.
    pub fn with_default_handlers() -> Self {
        let mut router = Self::new();
        router.register(EventKind::ChangeRoom, ChangeRoomHandler);
        router.register(EventKind::SendMessage, SendMessageHandler);
        router
    }

    /// Register the handler for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: EventKind, handler: impl EventHandler + 'static) {
        let _ = self.handlers.insert(kind, Arc::new(handler));
    }

    /// Kinds with a handler, in declaration order.
    pub fn kinds(&self) -> Vec<EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(|kind| self.handlers.contains_key(kind))
            .collect()
    }

    /// Dispatch `envelope` to its handler on the caller's task.
    ///
    /// The payload is never inspected here.
    pub async fn route(
        &self,
        envelope: &Envelope,
        source: &Arc<Connection>,
        ctx: &HandlerContext,
    ) -> Result<EventKind, RouteError> {
        let Some((kind, handler)) = envelope
            .event_kind()
            .and_then(|kind| self.handlers.get(&kind).map(|h| (kind, h)))
        else {
            counter!(EVENT_ERRORS_TOTAL, "error_type" => "unknown_kind").increment(1);
            return Err(RouteError::UnknownKind(envelope.kind().to_owned()));
        };

        counter!(EVENTS_ROUTED_TOTAL, "kind" => kind.as_str()).increment(1);
        debug!(%kind, "routing event");
        handler
            .handle(envelope, source, ctx)
            .await
            .map_err(|e| {
                let err = RouteError::Handler { kind, source: e };
                counter!(EVENT_ERRORS_TOTAL, "error_type" => err.label()).increment(1);
                err
            })?;
        Ok(kind)
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}
