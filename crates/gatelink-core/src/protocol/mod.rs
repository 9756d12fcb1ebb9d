//! Gateway wire protocol.
//!
//! Every transport message carries exactly one JSON frame:
//!
//! - request: `{"type":"req","id","method","params"}` (client → gateway)
//! - response: `{"id","ok","payload","error"}` (gateway → client)
//! - event: `{"event","payload"}` (gateway → client, unsolicited)
//!
//! [`codec`] turns requests into text and classifies inbound messages;
//! [`handshake`] holds the payloads exchanged during `connect`.

pub mod codec;
pub mod frames;
pub mod handshake;

pub use codec::{DecodeError, decode_bytes, decode_request, decode_text, encode_request};
pub use frames::{ErrorShape, EventFrame, Frame, RequestFrame, ResponseFrame};
pub use handshake::{
    ChallengePayload, ClientInfo, ConnectAuth, ConnectParams, HelloOk, HelloPolicy, ServerInfo,
};
