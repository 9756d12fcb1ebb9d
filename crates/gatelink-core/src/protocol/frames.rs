//! Frame types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::RequestId;

/// One discrete protocol message.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Client → gateway call.
    Request(RequestFrame),
    /// Gateway answer to a request.
    Response(ResponseFrame),
    /// Unsolicited gateway push.
    Event(EventFrame),
}

impl Frame {
    /// Short name of the frame kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::Event(_) => "event",
        }
    }
}

/// Request frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation id, unique among pending requests.
    pub id: RequestId,
    /// RPC method name (e.g. `chat.send`).
    pub method: String,
    /// Untyped parameters; serialized as `null` when absent.
    #[serde(default)]
    pub params: Option<Value>,
}

impl RequestFrame {
    /// Build a request with a fresh id.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: RequestId::new(),
            method: method.into(),
            params,
        }
    }
}

/// Response frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Id of the request this answers.
    pub id: RequestId,
    /// Whether the call succeeded.
    pub ok: bool,
    /// Result payload on success.
    #[serde(default)]
    pub payload: Option<Value>,
    /// Structured error on failure.
    #[serde(default)]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    /// Successful response.
    pub fn success(id: impl Into<RequestId>, payload: Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Failed response.
    pub fn failure(id: impl Into<RequestId>, error: ErrorShape) -> Self {
        Self {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }

    /// The error to surface for a non-`ok` response.
    ///
    /// Gateways occasionally answer `ok=false` without an error body; that
    /// still has to reach the caller as a failure.
    pub fn error_or_default(&self) -> ErrorShape {
        self.error
            .clone()
            .unwrap_or_else(|| ErrorShape::new("request failed without error details"))
    }
}

/// Structured gateway error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorShape {
    /// Machine-readable code (e.g. `INVALID_REQUEST`).
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Extra structured context.
    #[serde(default)]
    pub details: Option<Value>,
    /// Whether the gateway considers the call safe to retry.
    #[serde(default)]
    pub retryable: Option<bool>,
    /// Suggested wait before retrying.
    #[serde(default)]
    pub retry_after_ms: Option<u64>,
}

impl ErrorShape {
    /// Error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attach a code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// `retryable` flag, defaulting to `false`.
    pub fn is_retryable(&self) -> bool {
        self.retryable.unwrap_or(false)
    }

    /// `retryAfterMs` as a duration.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }
}

impl fmt::Display for ErrorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Event frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrame {
    /// Event name (e.g. `chat`, `presence`, `tick`).
    pub event: String,
    /// Untyped payload.
    #[serde(default)]
    pub payload: Option<Value>,
    /// Gateway-assigned sequence number, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Gateway state version, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_version: Option<Value>,
}

impl EventFrame {
    /// Event with a payload and no sequencing metadata.
    pub fn new(event: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            event: event.into(),
            payload,
            seq: None,
            state_version: None,
        }
    }
}
