//! Frame codec.
//!
//! Pure transforms between frames and transport text. Inbound classification
//! is structural: a response carries both `id` and `ok`, an event carries a
//! string `event`. Anything else is rejected rather than guessed at, so a
//! corrupted message is never half-read as the wrong kind of frame.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::frames::{EventFrame, Frame, RequestFrame, ResponseFrame};
use crate::errors::ClientError;
use crate::ids::RequestId;

/// Why an inbound message could not be turned into a frame.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Binary message that is not UTF-8.
    #[error("message is not valid UTF-8: {0}")]
    InvalidUtf8(String),
    /// Text that is not JSON.
    #[error("message is not valid JSON: {0}")]
    InvalidJson(String),
    /// JSON that is not an object.
    #[error("frame must be a JSON object")]
    NotAnObject,
    /// Object with neither response nor event markers.
    #[error("unrecognized frame shape")]
    UnrecognizedShape,
    /// Object with the right markers but bad field types.
    #[error("malformed {kind} frame: {reason}")]
    Malformed {
        /// Frame kind the markers pointed at.
        kind: &'static str,
        /// Deserializer message.
        reason: String,
    },
}

/// Outgoing request as written to the socket.
///
/// Gateways route frames on a `"type": "req"` tag, so it is always sent even
/// though [`decode_text`] classifies frames by shape and never needs it.
#[derive(Serialize)]
struct WireRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: &'a RequestId,
    method: &'a str,
    params: &'a Option<Value>,
}

/// Serialize a request frame to transport text.
pub fn encode_request(frame: &RequestFrame) -> Result<String, ClientError> {
    let wire = WireRequest {
        kind: "req",
        id: &frame.id,
        method: &frame.method,
        params: &frame.params,
    };
    serde_json::to_string(&wire).map_err(|e| ClientError::Encoding(e.to_string()))
}

/// Classify a binary transport message.
pub fn decode_bytes(bytes: &[u8]) -> Result<Frame, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8(e.to_string()))?;
    decode_text(text)
}

/// Classify a text transport message as a response or event.
pub fn decode_text(text: &str) -> Result<Frame, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    let Value::Object(map) = &value else {
        return Err(DecodeError::NotAnObject);
    };

    if map.contains_key("id") && map.contains_key("ok") {
        return serde_json::from_value::<ResponseFrame>(value)
            .map(Frame::Response)
            .map_err(|e| DecodeError::Malformed {
                kind: "response",
                reason: e.to_string(),
            });
    }

    if map.get("event").is_some_and(Value::is_string) {
        return serde_json::from_value::<EventFrame>(value)
            .map(Frame::Event)
            .map_err(|e| DecodeError::Malformed {
                kind: "event",
                reason: e.to_string(),
            });
    }

    Err(DecodeError::UnrecognizedShape)
}

/// Parse a request frame, as a gateway (or a test peer) sees it.
pub fn decode_request(text: &str) -> Result<RequestFrame, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    serde_json::from_value(value).map_err(|e| DecodeError::Malformed {
        kind: "request",
        reason: e.to_string(),
    })
}
