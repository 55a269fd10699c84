//! Event envelope, the typed, tagged wrapper for every message on the wire.
//!
//! Wire shape (text frame, both directions):
//!
//! ```json
//! {"kind": "send_message", "payload": {"message": "hi", ...}}
//! ```
//!
//! The payload is held as raw JSON and is only interpreted by the handler
//! registered for the envelope's kind. Routing never looks inside it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;

use crate::events::EventKind;

/// Errors produced while encoding or decoding envelopes and their payloads.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame was not a well-formed envelope.
    #[error("malformed envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// The envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload did not match the shape expected for its kind.
    #[error("bad payload for '{kind}': {source}")]
    Payload {
        /// Envelope kind whose payload failed to decode.
        kind: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Typed, tagged payload used for inbound and outbound messages.
///
/// Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Stable event kind key. Older clients send it as `type`.
    #[serde(alias = "type")]
    kind: String,
    /// Kind-specific payload, kept verbatim.
    #[serde(default = "null_payload")]
    payload: Box<RawValue>,
}

fn null_payload() -> Box<RawValue> {
    RawValue::NULL.to_owned()
}

impl Envelope {
    /// Build an envelope for a known kind from a serializable payload.
    pub fn new<T: Serialize>(kind: EventKind, payload: &T) -> Result<Self, EnvelopeError> {
        let payload = serde_json::value::to_raw_value(payload).map_err(EnvelopeError::Encode)?;
        Ok(Self {
            kind: kind.as_str().to_owned(),
            payload,
        })
    }

    /// Decode a frame body into an envelope.
    pub fn decode(frame: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(frame).map_err(EnvelopeError::Decode)
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Encode)
    }

    /// The raw kind string.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The kind as a known [`EventKind`], if it is one.
    pub fn event_kind(&self) -> Option<EventKind> {
        self.kind.parse().ok()
    }

    /// Decode the payload as `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        serde_json::from_str(self.payload.get()).map_err(|source| EnvelopeError::Payload {
            kind: self.kind.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChangeRoomPayload, SendMessagePayload};
    use assert_matches::assert_matches;

    #[test]
    fn decode_send_message() {
        let frame = br#"{"kind":"send_message","payload":{"message":"hi","from":"alice","email":"a@x.com","chatroom":"general"}}"#;
        let env = Envelope::decode(frame).unwrap();
        assert_eq!(env.kind(), "send_message");
        assert_eq!(env.event_kind(), Some(EventKind::SendMessage));
        let payload: SendMessagePayload = env.decode_payload().unwrap();
        assert_eq!(payload.message, "hi");
        assert_eq!(payload.chatroom, "general");
    }

    #[test]
    fn type_is_accepted_as_kind_alias() {
        let env = Envelope::decode(br#"{"type":"change_room","payload":{"name":"ops"}}"#).unwrap();
        assert_eq!(env.event_kind(), Some(EventKind::ChangeRoom));
        let encoded = env.encode().unwrap();
        assert!(encoded.starts_with(r#"{"kind":"change_room""#));
    }

    #[test]
    fn missing_payload_is_null() {
        let env = Envelope::decode(br#"{"kind":"change_room"}"#).unwrap();
        assert_eq!(env.payload.get(), "null");
    }

    #[test]
    fn malformed_frame_is_decode_error() {
        assert_matches!(Envelope::decode(b"not json"), Err(EnvelopeError::Decode(_)));
        assert_matches!(Envelope::decode(b"[1,2]"), Err(EnvelopeError::Decode(_)));
        assert_matches!(
            Envelope::decode(br#"{"payload":{}}"#),
            Err(EnvelopeError::Decode(_))
        );
    }

    #[test]
    fn unknown_kind_still_decodes() {
        let env = Envelope::decode(br#"{"kind":"dance","payload":{}}"#).unwrap();
        assert_eq!(env.kind(), "dance");
        assert!(env.event_kind().is_none());
    }

    #[test]
    fn payload_is_kept_verbatim() {
        let frame = br#"{"kind":"x","payload":{"b": 1,  "a":[true]}}"#;
        let env = Envelope::decode(frame).unwrap();
        assert_eq!(env.payload.get(), r#"{"b": 1,  "a":[true]}"#);
    }

    #[test]
    fn payload_shape_mismatch_names_kind() {
        let env = Envelope::decode(br#"{"kind":"change_room","payload":{"name":42}}"#).unwrap();
        let err = env.decode_payload::<ChangeRoomPayload>().unwrap_err();
        assert_matches!(&err, EnvelopeError::Payload { kind, .. } if kind == "change_room");
        assert!(err.to_string().contains("change_room"));
    }

    #[test]
    fn new_encodes_typed_payload() {
        let env = Envelope::new(
            EventKind::ChangeRoom,
            &ChangeRoomPayload {
                name: "ops".into(),
            },
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(value["kind"], "change_room");
        assert_eq!(value["payload"]["name"], "ops");
    }
}
