//! Behaviour when the transport stops accepting writes.
//!
//! The gateway side is the in-process memory gateway; the client's write half
//! is wrapped so that it either hangs or fails once its write budget is spent.
//! The `connect` frame of the handshake uses one write.

use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::timeout;
use url::Url;

use gatelink_client::transport::{
    Connector, MemoryListener, MemoryPeer, Transport, TransportMessage, TransportOptions,
    TransportSink,
};
use gatelink_client::{
    CancellationToken, ClientError, ConnectionState, GatewayClient, MemoryConnector,
    memory_gateway,
};
use gatelink_settings::GatelinkSettings;

#[derive(Clone, Copy, Debug)]
enum Wedge {
    /// Writes past the budget never complete.
    Hang,
    /// Writes past the budget fail.
    Fail,
}

#[derive(Clone)]
struct WedgedConnector {
    inner: MemoryConnector,
    budget: usize,
    wedge: Wedge,
}

#[async_trait]
impl Connector for WedgedConnector {
    async fn connect(&self, url: &Url, options: &TransportOptions) -> Result<Transport, ClientError> {
        let Transport { sink, stream } = self.inner.connect(url, options).await?;
        Ok(Transport {
            sink: Box::new(WedgedSink {
                inner: sink,
                remaining: self.budget,
                wedge: self.wedge,
            }),
            stream,
        })
    }
}

struct WedgedSink {
    inner: Box<dyn TransportSink>,
    remaining: usize,
    wedge: Wedge,
}

#[async_trait]
impl TransportSink for WedgedSink {
    async fn send(&mut self, message: TransportMessage) -> Result<(), ClientError> {
        if self.remaining == 0 {
            return match self.wedge {
                Wedge::Hang => std::future::pending().await,
                Wedge::Fail => Err(ClientError::Transport("broken pipe".into())),
            };
        }
        self.remaining -= 1;
        self.inner.send(message).await
    }

    async fn close(&mut self) {
        self.inner.close().await;
    }
}

fn hello(conn_id: &str) -> Value {
    json!({
        "type": "hello-ok",
        "protocol": 3,
        "server": { "connId": conn_id }
    })
}

async fn connected(budget: usize, wedge: Wedge) -> (GatewayClient, MemoryListener, MemoryPeer) {
    let (inner, mut listener) = memory_gateway();
    let connector = WedgedConnector {
        inner,
        budget,
        wedge,
    };
    let mut settings = GatelinkSettings::default();
    settings.gateway.host = "gateway.test".into();
    let client = GatewayClient::with_connector(&settings, connector);

    let (result, peer) = tokio::join!(client.connect(), async {
        let mut peer = listener.accept().await.unwrap();
        let _ = peer.accept_handshake(hello("conn-1")).await.unwrap();
        peer
    });
    assert_eq!(result.unwrap().conn_id(), "conn-1");
    (client, listener, peer)
}

#[tokio::test(start_paused = true)]
async fn hung_write_does_not_hold_up_timeouts() {
    // Handshake plus one request get through; the next write hangs.
    let (client, _listener, mut peer) = connected(2, Wedge::Hang).await;

    let answered_never = {
        let client = client.clone();
        tokio::spawn(async move { client.send("health", None, Duration::from_millis(50)).await })
    };
    assert_eq!(peer.recv_request().await.unwrap().method, "health");

    let stuck = {
        let client = client.clone();
        tokio::spawn(async move { client.send("status", None, Duration::from_millis(200)).await })
    };

    let result = timeout(Duration::from_secs(5), answered_never).await.unwrap().unwrap();
    assert_matches!(result, Err(ClientError::Timeout { method, .. }) if method == "health");
    let result = timeout(Duration::from_secs(5), stuck).await.unwrap().unwrap();
    assert_matches!(result, Err(ClientError::Timeout { method, .. }) if method == "status");
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn hung_write_does_not_hold_up_cancel_or_disconnect() {
    let (client, _listener, mut peer) = connected(1, Wedge::Hang).await;

    let cancel = CancellationToken::new();
    let cancelled = {
        let client = client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            client
                .send_with_cancel("chat.history", None, Duration::from_secs(30), &cancel)
                .await
        })
    };
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.send("status", None, Duration::from_secs(30)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    cancel.cancel();
    let result = timeout(Duration::from_secs(1), cancelled).await.unwrap().unwrap();
    assert_matches!(result, Err(ClientError::Cancelled));

    timeout(Duration::from_secs(1), client.disconnect()).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    let result = timeout(Duration::from_secs(1), pending).await.unwrap().unwrap();
    assert_matches!(result, Err(ClientError::Cancelled));

    // The wedged writer is abandoned and the socket is closed.
    assert!(timeout(Duration::from_secs(5), peer.recv()).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_write_is_treated_as_link_loss() {
    let (client, mut listener, _peer) = connected(1, Wedge::Fail).await;

    let result = timeout(
        Duration::from_secs(5),
        client.send("health", None, Duration::from_secs(30)),
    )
    .await
    .unwrap();
    assert_matches!(result, Err(ClientError::Cancelled));
    assert_ne!(client.state(), ConnectionState::Connected);

    // The supervisor opens a fresh transport after the first backoff step.
    let mut peer = listener.accept().await.unwrap();
    let _ = peer.accept_handshake(hello("conn-2")).await.unwrap();
    let mut signal = client.state_signal();
    let _ = signal
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(client.hello().unwrap().conn_id(), "conn-2");
}
