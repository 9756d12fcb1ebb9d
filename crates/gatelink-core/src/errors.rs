//! Error hierarchy for the gateway client.
//!
//! [`ClientError`] is the single error type callers of the client see. It is
//! `Clone` because one transport failure has to be reported to every pending
//! caller at once.

use thiserror::Error;

use crate::protocol::codec::DecodeError;
use crate::protocol::frames::ErrorShape;

/// Errors surfaced by the gateway client.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ClientError {
    /// The handshake has not completed, or the link is gone.
    #[error("not connected to gateway")]
    NotConnected,

    /// The connection profile does not resolve to a usable URL.
    #[error("invalid gateway endpoint: {0}")]
    InvalidEndpoint(String),

    /// Challenge/connect/hello negotiation failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The gateway answered `ok=false`.
    #[error("request failed: {0}")]
    RequestFailed(ErrorShape),

    /// No response arrived in time.
    #[error("request '{method}' timed out after {seconds}s")]
    Timeout {
        /// Method of the timed-out request.
        method: String,
        /// Timeout that elapsed, in seconds.
        seconds: f64,
    },

    /// A request or payload could not be (de)serialized.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The caller cancelled, or the link dropped while the request was pending.
    #[error("request cancelled")]
    Cancelled,

    /// An inbound message was not a valid frame.
    #[error("malformed frame: {0}")]
    Decode(#[from] DecodeError),

    /// The underlying socket failed to open, read, or write.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Timeout error for a method and duration.
    pub fn timeout(method: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            method: method.into(),
            seconds: timeout.as_secs_f64(),
        }
    }

    /// Whether the failure came from the link rather than the gateway's
    /// answer. Such failures usually clear up once the client reconnects.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Timeout { .. } | Self::Cancelled | Self::Transport(_)
        )
    }

    /// The gateway's structured error, for `RequestFailed`.
    pub fn server_error(&self) -> Option<&ErrorShape> {
        match self {
            Self::RequestFailed(shape) => Some(shape),
            _ => None,
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
