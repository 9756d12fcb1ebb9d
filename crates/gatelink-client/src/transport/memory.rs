//! In-process transport.
//!
//! [`memory_gateway`] returns a [`MemoryConnector`] to hand to the client and
//! a [`MemoryListener`] that yields one [`MemoryPeer`] per opened transport.
//! The peer plays the gateway side: it reads the client's frames and writes
//! challenge, response and event frames back.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use gatelink_core::constants::{CHALLENGE_EVENT, CONNECT_METHOD};
use gatelink_core::errors::ClientError;
use gatelink_core::protocol::{EventFrame, RequestFrame, ResponseFrame, decode_request};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::warn;
use url::Url;

use super::{Connector, Transport, TransportMessage, TransportOptions, TransportSink, TransportStream};

type ToClient = mpsc::UnboundedSender<Result<TransportMessage, ClientError>>;

/// Create a connected connector/listener pair.
pub fn memory_gateway() -> (MemoryConnector, MemoryListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryConnector {
            accept: tx,
            opened: Arc::new(AtomicUsize::new(0)),
        },
        MemoryListener { rx },
    )
}

/// Client side: every `connect` hands a new peer to the listener.
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    accept: mpsc::UnboundedSender<MemoryPeer>,
    opened: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// Number of transports opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        url: &Url,
        _options: &TransportOptions,
    ) -> Result<Transport, ClientError> {
        let (to_client, from_peer) = mpsc::unbounded_channel();
        let (to_peer, from_client) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            url: url.clone(),
            tx: Some(to_client),
            rx: from_client,
        };
        self.accept
            .send(peer)
            .map_err(|_| ClientError::Transport(format!("connect {url}: gateway unavailable")))?;
        let _ = self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Transport::new(
            MemorySink { tx: Some(to_peer) },
            MemorySource { rx: from_peer },
        ))
    }
}

/// Gateway side: yields a peer per opened transport.
#[derive(Debug)]
pub struct MemoryListener {
    rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Wait for the next transport. `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.rx.recv().await
    }

    /// A transport opened since the last call, if any.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.rx.try_recv().ok()
    }
}

/// The gateway end of one in-process transport.
#[derive(Debug)]
pub struct MemoryPeer {
    url: Url,
    tx: Option<ToClient>,
    rx: mpsc::UnboundedReceiver<TransportMessage>,
}

impl MemoryPeer {
    /// URL the client connected to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Write a raw message. Returns `false` when the client side is gone.
    pub fn send(&self, message: TransportMessage) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(message)).is_ok())
    }

    /// Write a text message.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(TransportMessage::Text(text.into()))
    }

    /// Write a JSON value as a text message.
    pub fn send_json(&self, value: &Value) -> bool {
        self.send_text(value.to_string())
    }

    /// Push an event frame.
    pub fn send_event(&self, event: impl Into<String>, payload: Value) -> bool {
        self.send_frame(&EventFrame::new(event, Some(payload)))
    }

    /// Answer a request.
    pub fn send_response(&self, response: &ResponseFrame) -> bool {
        self.send_frame(response)
    }

    fn send_frame(&self, frame: &impl serde::Serialize) -> bool {
        match serde_json::to_string(frame) {
            Ok(text) => self.send_text(text),
            Err(e) => {
                warn!(error = %e, "failed to encode frame");
                false
            }
        }
    }

    /// Next message from the client; `None` once the client closed.
    pub async fn recv(&mut self) -> Option<TransportMessage> {
        self.rx.recv().await
    }

    /// Next request from the client, skipping anything that is not one.
    pub async fn recv_request(&mut self) -> Option<RequestFrame> {
        loop {
            let message = self.recv().await?;
            let decoded = match &message {
                TransportMessage::Text(text) => decode_request(text),
                TransportMessage::Binary(bytes) => match std::str::from_utf8(bytes) {
                    Ok(text) => decode_request(text),
                    Err(_) => continue,
                },
            };
            match decoded {
                Ok(request) => return Some(request),
                Err(e) => warn!(error = %e, "peer dropped non-request message"),
            }
        }
    }

    /// Run the gateway half of the handshake: send the challenge, read the
    /// `connect` request and answer it with `hello`.
    ///
    /// Returns the `connect` request, or `None` if the client went away.
    pub async fn accept_handshake(&mut self, hello: Value) -> Option<RequestFrame> {
        if !self.send_event(CHALLENGE_EVENT, json!({ "nonce": "memory", "ts": 0 })) {
            return None;
        }
        let request = self.recv_request().await?;
        if request.method != CONNECT_METHOD {
            warn!(method = %request.method, "expected connect request");
            return None;
        }
        let _ = self.send_response(&ResponseFrame::success(request.id.clone(), hello));
        Some(request)
    }

    /// Fail the transport with an error, then close it.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(ClientError::Transport(reason.into())));
        }
    }

    /// Close the transport from the gateway side.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Whether the client has closed its side.
    pub fn is_closed_by_client(&self) -> bool {
        self.rx.is_closed()
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<TransportMessage>>,
}

#[async_trait]
impl TransportSink for MemorySink {
    async fn send(&mut self, message: TransportMessage) -> Result<(), ClientError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ClientError::Transport("socket closed".into()))?;
        tx.send(message)
            .map_err(|_| ClientError::Transport("peer closed".into()))
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<Result<TransportMessage, ClientError>>,
}

#[async_trait]
impl TransportStream for MemorySource {
    async fn recv(&mut self) -> Option<Result<TransportMessage, ClientError>> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn url() -> Url {
        Url::parse("ws://memory:1/").unwrap()
    }

    #[tokio::test]
    async fn messages_flow_both_ways() {
        let (connector, mut listener) = memory_gateway();
        let mut transport = connector
            .connect(&url(), &TransportOptions::default())
            .await
            .unwrap();
        let mut peer = listener.accept().await.unwrap();
        assert_eq!(peer.url().as_str(), "ws://memory:1/");
        assert_eq!(connector.opened(), 1);

        transport
            .sink
            .send(TransportMessage::Text("hi".into()))
            .await
            .unwrap();
        assert_eq!(peer.recv().await, Some(TransportMessage::Text("hi".into())));

        assert!(peer.send_text("back"));
        assert_matches!(
            transport.stream.recv().await,
            Some(Ok(TransportMessage::Text(t))) if t == "back"
        );
    }

    #[tokio::test]
    async fn peer_close_ends_stream() {
        let (connector, mut listener) = memory_gateway();
        let mut transport = connector
            .connect(&url(), &TransportOptions::default())
            .await
            .unwrap();
        let mut peer = listener.accept().await.unwrap();
        peer.close();
        assert!(transport.stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn peer_fail_yields_error_then_end() {
        let (connector, mut listener) = memory_gateway();
        let mut transport = connector
            .connect(&url(), &TransportOptions::default())
            .await
            .unwrap();
        let mut peer = listener.accept().await.unwrap();
        peer.fail("reset");
        assert_matches!(transport.stream.recv().await, Some(Err(ClientError::Transport(r))) if r == "reset");
        assert!(transport.stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn client_close_is_seen_by_peer() {
        let (connector, mut listener) = memory_gateway();
        let mut transport = connector
            .connect(&url(), &TransportOptions::default())
            .await
            .unwrap();
        let mut peer = listener.accept().await.unwrap();
        transport.sink.close().await;
        assert!(peer.recv().await.is_none());
        assert!(peer.is_closed_by_client());
        assert_matches!(
            transport.sink.send(TransportMessage::Text("late".into())).await,
            Err(ClientError::Transport(_))
        );
    }

    #[tokio::test]
    async fn dropped_listener_refuses_connect() {
        let (connector, listener) = memory_gateway();
        drop(listener);
        let result = connector.connect(&url(), &TransportOptions::default()).await;
        assert_matches!(result, Err(ClientError::Transport(_)));
        assert_eq!(connector.opened(), 0);
    }
}
