//! Duplex message transport.
//!
//! The client only needs a pipe of discrete text/binary messages that signals
//! closure. [`Connector`] opens one; [`ws::WsConnector`] does it over a real
//! WebSocket and [`memory`] wires a client to an in-process gateway.

pub mod memory;
pub mod ws;

use async_trait::async_trait;
use gatelink_core::constants::DEFAULT_MAX_MESSAGE_BYTES;
use gatelink_core::errors::ClientError;
use gatelink_core::protocol::{DecodeError, Frame, decode_bytes, decode_text};
use url::Url;

pub use memory::{MemoryConnector, MemoryListener, MemoryPeer, memory_gateway};
pub use ws::WsConnector;

/// One discrete transport message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportMessage {
    /// UTF-8 text message.
    Text(String),
    /// Binary message; decoded as UTF-8 text.
    Binary(Vec<u8>),
}

impl TransportMessage {
    /// Classify the message as a protocol frame.
    pub fn decode(&self) -> Result<Frame, DecodeError> {
        match self {
            Self::Text(text) => decode_text(text),
            Self::Binary(bytes) => decode_bytes(bytes),
        }
    }

    /// Size of the message body in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the message body is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outbound half of a transport.
#[async_trait]
pub trait TransportSink: Send {
    /// Write one message.
    async fn send(&mut self, message: TransportMessage) -> Result<(), ClientError>;

    /// Close the transport. Idempotent.
    async fn close(&mut self);
}

/// Inbound half of a transport.
#[async_trait]
pub trait TransportStream: Send {
    /// Next message; `None` once the transport is closed.
    async fn recv(&mut self) -> Option<Result<TransportMessage, ClientError>>;
}

/// An open transport, split into its two halves.
pub struct Transport {
    /// Write half.
    pub sink: Box<dyn TransportSink>,
    /// Read half.
    pub stream: Box<dyn TransportStream>,
}

impl Transport {
    /// Pair two halves.
    pub fn new(sink: impl TransportSink + 'static, stream: impl TransportStream + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            stream: Box::new(stream),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Options applied when a transport is opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportOptions {
    /// Largest accepted message and frame, in bytes.
    pub max_message_bytes: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Opens transports to a gateway URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new transport.
    async fn connect(&self, url: &Url, options: &TransportOptions)
    -> Result<Transport, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn text_message_decodes() {
        let msg = TransportMessage::Text(r#"{"event":"tick","payload":null}"#.into());
        assert_matches!(msg.decode(), Ok(Frame::Event(ev)) if ev.event == "tick");
    }

    #[test]
    fn binary_message_decodes_as_text() {
        let msg = TransportMessage::Binary(br#"{"id":"r1","ok":true}"#.to_vec());
        assert_matches!(msg.decode(), Ok(Frame::Response(resp)) if resp.ok);
    }

    #[test]
    fn invalid_utf8_binary_is_an_error() {
        let msg = TransportMessage::Binary(vec![0xff, 0xfe, 0xfd]);
        assert_matches!(msg.decode(), Err(DecodeError::InvalidUtf8(_)));
    }

    #[test]
    fn message_len() {
        assert_eq!(TransportMessage::Text("abc".into()).len(), 3);
        assert!(TransportMessage::Binary(Vec::new()).is_empty());
    }

    #[test]
    fn default_options_use_large_limit() {
        assert_eq!(
            TransportOptions::default().max_message_bytes,
            128 * 1024 * 1024
        );
    }
}
