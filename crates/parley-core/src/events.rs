//! Event kinds and their payloads.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of event kinds understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Client → server: post a chat message to a room.
    SendMessage,
    /// Server → client: a chat message was posted to the client's room.
    NewMessage,
    /// Client → server: move this connection to another room.
    ChangeRoom,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 3] = [Self::SendMessage, Self::NewMessage, Self::ChangeRoom];

    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SendMessage => "send_message",
            Self::NewMessage => "new_message",
            Self::ChangeRoom => "change_room",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not a known event kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_owned()))
    }
}

/// Payload of `send_message`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendMessagePayload {
    /// Message body.
    pub message: String,
    /// Sender display name.
    pub from: String,
    /// Sender email.
    pub email: String,
    /// Target room.
    pub chatroom: String,
}

/// Payload of `new_message`: the sent message plus a server timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessagePayload {
    /// Message body.
    pub message: String,
    /// Sender display name.
    pub from: String,
    /// Sender email.
    pub email: String,
    /// Room the message was posted to.
    pub chatroom: String,
    /// When the server accepted the message.
    pub sent: DateTime<Utc>,
}

impl NewMessagePayload {
    /// Enrich an inbound message with the time it was accepted.
    pub fn from_send(message: SendMessagePayload, sent: DateTime<Utc>) -> Self {
        Self {
            message: message.message,
            from: message.from,
            email: message.email,
            chatroom: message.chatroom,
            sent,
        }
    }
}

/// Payload of `change_room`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeRoomPayload {
    /// Name of the room to join.
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn kind_serde_matches_as_str() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "SendMessage".parse::<EventKind>().unwrap_err();
        assert_eq!(err, UnknownEventKind("SendMessage".into()));
        assert_eq!(err.to_string(), "unknown event kind: SendMessage");
    }

    #[test]
    fn send_message_missing_fields_default_to_empty() {
        let payload: SendMessagePayload = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(payload.message, "hi");
        assert!(payload.from.is_empty());
        assert!(payload.chatroom.is_empty());
    }

    #[test]
    fn new_message_keeps_source_fields() {
        let sent = DateTime::parse_from_rfc3339("2026-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let out = NewMessagePayload::from_send(
            SendMessagePayload {
                message: "hi".into(),
                from: "alice".into(),
                email: "a@x.com".into(),
                chatroom: "general".into(),
            },
            sent,
        );
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["message"], "hi");
        assert_eq!(value["from"], "alice");
        assert_eq!(value["email"], "a@x.com");
        assert_eq!(value["chatroom"], "general");
        assert_eq!(value["sent"], "2026-01-01T12:00:00Z");
    }
}
