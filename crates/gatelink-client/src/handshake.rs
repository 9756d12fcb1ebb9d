//! Opening handshake.
//!
//! ```text
//! gateway ── event connect.challenge ──► client
//! client  ── req   connect {min/maxProtocol, client, role, scopes, auth} ──► gateway
//! gateway ── res   {ok, payload: hello-ok} ──► client
//! ```
//!
//! The exchange runs directly on a fresh transport, before any reader task
//! exists, and the whole sequence (socket open included) is bounded by one
//! deadline. Any deviation fails the attempt and closes the socket.

use std::fmt;
use std::time::Duration;

use gatelink_core::constants::{CHALLENGE_EVENT, CONNECT_METHOD, PROTOCOL_VERSION};
use gatelink_core::errors::ClientError;
use gatelink_core::protocol::{
    ChallengePayload, ConnectParams, Frame, HelloOk, RequestFrame, encode_request,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::transport::{Connector, Transport, TransportMessage, TransportOptions};

/// Where the exchange stands; used in failure messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Waiting for `connect.challenge`.
    AwaitingChallenge,
    /// Writing the `connect` request.
    ConnectSent,
    /// Waiting for the `connect` response.
    AwaitingHello,
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AwaitingChallenge => "awaiting challenge",
            Self::ConnectSent => "sending connect",
            Self::AwaitingHello => "awaiting hello",
        })
    }
}

/// Everything needed to run one handshake.
#[derive(Clone, Debug)]
pub struct HandshakeConfig {
    /// Resolved gateway URL.
    pub url: Url,
    /// Transport limits.
    pub transport: TransportOptions,
    /// `connect` params.
    pub params: ConnectParams,
    /// Bound on the whole exchange.
    pub timeout: Duration,
}

fn failed(phase: HandshakePhase, reason: impl fmt::Display) -> ClientError {
    ClientError::HandshakeFailed(format!("{phase}: {reason}"))
}

/// Open a transport and complete the handshake on it.
///
/// On success the transport is handed back ready for requests.
pub async fn establish(
    connector: &dyn Connector,
    config: &HandshakeConfig,
) -> Result<(Transport, HelloOk), ClientError> {
    let attempt = async {
        let mut transport = connector.connect(&config.url, &config.transport).await?;
        match exchange(&mut transport, &config.params).await {
            Ok(hello) => Ok((transport, hello)),
            Err(e) => {
                transport.sink.close().await;
                Err(e)
            }
        }
    };

    // Dropping the attempt on timeout drops (and so closes) the transport.
    let result = tokio::time::timeout(config.timeout, attempt)
        .await
        .map_err(|_| {
            ClientError::HandshakeFailed(format!(
                "timed out after {}ms",
                config.timeout.as_millis()
            ))
        })?;

    match &result {
        Ok((_, hello)) => info!(
            url = %config.url,
            conn_id = %hello.conn_id(),
            protocol = hello.protocol_version,
            "handshake complete"
        ),
        Err(e) => warn!(url = %config.url, error = %e, "handshake failed"),
    }
    result
}

/// Run challenge → connect → hello on an open transport.
pub async fn exchange(
    transport: &mut Transport,
    params: &ConnectParams,
) -> Result<HelloOk, ClientError> {
    match next_frame(transport, HandshakePhase::AwaitingChallenge).await? {
        Frame::Event(event) if event.event == CHALLENGE_EVENT => {
            let challenge: ChallengePayload = event
                .payload
                .and_then(|p| serde_json::from_value(p).ok())
                .unwrap_or_default();
            debug!(nonce = ?challenge.nonce, "received connect challenge");
        }
        Frame::Event(event) => {
            return Err(failed(
                HandshakePhase::AwaitingChallenge,
                format!("expected {CHALLENGE_EVENT}, got event '{}'", event.event),
            ));
        }
        other => {
            return Err(failed(
                HandshakePhase::AwaitingChallenge,
                format!("expected {CHALLENGE_EVENT}, got {}", other.kind()),
            ));
        }
    }

    let params = serde_json::to_value(params)
        .map_err(|e| ClientError::Encoding(format!("connect params: {e}")))?;
    let request = RequestFrame::new(CONNECT_METHOD, Some(params));
    let text = encode_request(&request)?;
    transport
        .sink
        .send(TransportMessage::Text(text))
        .await
        .map_err(|e| failed(HandshakePhase::ConnectSent, e))?;
    debug!(request_id = %request.id, "sent connect request");

    let response = match next_frame(transport, HandshakePhase::AwaitingHello).await? {
        Frame::Response(response) if response.id == request.id => response,
        Frame::Response(response) => {
            return Err(failed(
                HandshakePhase::AwaitingHello,
                format!("response for unknown request '{}'", response.id),
            ));
        }
        other => {
            return Err(failed(
                HandshakePhase::AwaitingHello,
                format!("expected connect response, got {}", other.kind()),
            ));
        }
    };

    if !response.ok {
        let error = response.error_or_default();
        return Err(failed(
            HandshakePhase::AwaitingHello,
            format!("gateway rejected connect: {error}"),
        ));
    }

    let payload = response
        .payload
        .ok_or_else(|| failed(HandshakePhase::AwaitingHello, "hello payload missing"))?;
    let hello: HelloOk = serde_json::from_value(payload)
        .map_err(|e| failed(HandshakePhase::AwaitingHello, format!("malformed hello: {e}")))?;

    if hello.protocol_version != PROTOCOL_VERSION {
        return Err(failed(
            HandshakePhase::AwaitingHello,
            format!(
                "gateway chose protocol {}, client speaks {PROTOCOL_VERSION}",
                hello.protocol_version
            ),
        ));
    }
    Ok(hello)
}

async fn next_frame(transport: &mut Transport, phase: HandshakePhase) -> Result<Frame, ClientError> {
    match transport.stream.recv().await {
        Some(Ok(message)) => message
            .decode()
            .map_err(|e| failed(phase, format!("malformed frame: {e}"))),
        Some(Err(e)) => Err(failed(phase, e)),
        None => Err(failed(phase, "connection closed")),
    }
}
