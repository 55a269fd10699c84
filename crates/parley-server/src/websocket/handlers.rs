//! The `change_room` and `send_message` handlers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use parley_core::{
    ChangeRoomPayload, Envelope, EventKind, NewMessagePayload, SendMessagePayload,
};
use parley_store::NewChat;
use tracing::{debug, warn};

use super::connection::Connection;
use super::router::{EventHandler, HandlerContext};
use crate::errors::HandlerError;
use crate::metrics::MESSAGES_PERSISTED_TOTAL;

/// Moves the source connection to the named room.
///
/// The name is trimmed; a blank name leaves the room unchanged.
pub struct ChangeRoomHandler;

#[async_trait]
impl EventHandler for ChangeRoomHandler {
    async fn handle(
        &self,
        envelope: &Envelope,
        source: &Arc<Connection>,
        _ctx: &HandlerContext,
    ) -> Result<(), HandlerError> {
        let payload: ChangeRoomPayload = envelope.decode_payload()?;
        let name = payload.name.trim();
        if name.is_empty() {
            return Ok(());
        }
        debug!(from = %source.room(), to = name, "changing room");
        source.set_room(name);
        Ok(())
    }
}

/// Persists a chat message and fans it out to the target room as
/// `new_message`.
///
/// An empty body is ignored. A persistence failure aborts before the
/// broadcast. The stored sender is the payload's `email`; a mismatch with
/// the connection's identity is logged, not rejected.
pub struct SendMessageHandler;

#[async_trait]
impl EventHandler for SendMessageHandler {
    async fn handle(
        &self,
        envelope: &Envelope,
        source: &Arc<Connection>,
        ctx: &HandlerContext,
    ) -> Result<(), HandlerError> {
        let mut payload: SendMessagePayload = envelope.decode_payload()?;
        if payload.message.is_empty() {
            return Ok(());
        }
        if payload.chatroom.trim().is_empty() {
            payload.chatroom = source.room();
        }
        if payload.email != source.identity().email {
            warn!(
                conn = %source.id(),
                claimed = %payload.email,
                authenticated = %source.identity().email,
                "sender email differs from connection identity"
            );
        }

        ctx.messages
            .insert_message(NewChat {
                chatroom: payload.chatroom.clone(),
                sender: payload.email.clone(),
                private: false,
                message: payload.message.clone(),
                username: payload.from.clone(),
            })
            .await?;
        counter!(MESSAGES_PERSISTED_TOTAL).increment(1);

        source.set_room(payload.chatroom.clone());

        let room = payload.chatroom.clone();
        let outbound = Envelope::new(
            EventKind::NewMessage,
            &NewMessagePayload::from_send(payload, Utc::now()),
        )
        .map_err(HandlerError::Encode)?;
        let fanout = ctx
            .registry
            .broadcast(&outbound, &room)
            .await
            .map_err(HandlerError::Encode)?;
        if fanout.dropped > 0 {
            warn!(
                room = %room,
                dropped = fanout.dropped,
                "message not delivered to every recipient"
            );
        }
        Ok(())
    }
}
