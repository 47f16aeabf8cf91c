//! Codec for decoding requests and encoding envelopes.
//!
//! Frames are UTF-8 JSON text. Decoding is two-step: the frame must first
//! parse as an object with a string `type`; known types are then decoded
//! into their typed [`Request`] variant, unknown ones become
//! [`Request::Unknown`].

use serde_json::Value;
use thiserror::Error;

use crate::envelope::{Envelope, Request};

/// Message sent back to a client whose frame could not be decoded.
pub const INVALID_MESSAGE_FORMAT: &str = "Invalid message format";

/// Errors that can occur while decoding or encoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON, or a known request is missing fields.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is JSON but has no string `type` field.
    #[error("Envelope has no string `type` field")]
    MissingType,
}

/// Decode an inbound frame into a request.
///
/// # Errors
///
/// Returns an error if the frame is not a JSON object with a string `type`,
/// or if a known request type is missing its required fields.
pub fn decode(frame: &[u8]) -> Result<Request, ProtocolError> {
    let value: Value = serde_json::from_slice(frame)?;

    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind,
        _ => return Err(ProtocolError::MissingType),
    };

    if !Request::is_known(kind) {
        return Ok(Request::Unknown {
            kind: kind.clone(),
        });
    }

    Ok(serde_json::from_value(value)?)
}

/// Encode an envelope to a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(envelope)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Event;
    use serde_json::json;

    #[test]
    fn test_decode_known_requests() {
        assert_eq!(
            decode(br#"{"type":"join","room":"lobby"}"#).unwrap(),
            Request::Join {
                room: "lobby".into()
            }
        );
        assert_eq!(
            decode(br#"{"type":"broadcast","room":"lobby","data":{"x":1}}"#).unwrap(),
            Request::Broadcast {
                room: "lobby".into(),
                data: json!({"x": 1}),
            }
        );
        assert_eq!(decode(br#"{"type":"ping"}"#).unwrap(), Request::Ping);
        assert_eq!(
            decode(br#"{"type":"get_stats"}"#).unwrap(),
            Request::GetStats
        );
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        assert_eq!(
            decode(br#"{"type":"ping","nonce":7}"#).unwrap(),
            Request::Ping
        );
        assert_eq!(
            decode(br#"{"type":"leave","room":"a","reason":"bye"}"#).unwrap(),
            Request::Leave { room: "a".into() }
        );
    }

    #[test]
    fn test_decode_unknown_type() {
        assert_eq!(
            decode(br#"{"type":"typing","room":"lobby"}"#).unwrap(),
            Request::Unknown {
                kind: "typing".into()
            }
        );
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode(b"not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(
            decode(br#"{"room":"lobby"}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            decode(br#"{"type":5}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(decode(b"[1,2]"), Err(ProtocolError::MissingType)));
    }

    #[test]
    fn test_decode_missing_required_field() {
        assert!(matches!(
            decode(br#"{"type":"join"}"#),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            decode(br#"{"type":"broadcast","room":"lobby"}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_encode_error_reply() {
        let text = encode(&Envelope::error(INVALID_MESSAGE_FORMAT)).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "Invalid message format");
    }

    #[test]
    fn test_encode_broadcast_in_room() {
        let envelope = Envelope::new(Event::Broadcast {
            data: json!({"x": 1}),
        })
        .in_room("lobby");
        let value: Value = serde_json::from_str(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(value["type"], "broadcast");
        assert_eq!(value["data"], json!({"x": 1}));
        assert_eq!(value["room"], "lobby");
    }
}
