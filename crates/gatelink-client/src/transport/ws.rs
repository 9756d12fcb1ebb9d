//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use gatelink_core::errors::ClientError;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tracing::{debug, trace};
use url::Url;

use super::{Connector, Transport, TransportMessage, TransportOptions, TransportSink, TransportStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://` and `wss://` connections.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        url: &Url,
        options: &TransportOptions,
    ) -> Result<Transport, ClientError> {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(options.max_message_bytes);
        config.max_frame_size = Some(options.max_message_bytes);

        let (ws, response) = connect_async_with_config(url.as_str(), Some(config), true)
            .await
            .map_err(|e| ClientError::Transport(format!("connect {url}: {e}")))?;
        debug!(%url, status = %response.status(), "websocket open");

        let (sink, stream) = ws.split();
        Ok(Transport::new(
            WsSink {
                inner: sink,
                closed: false,
            },
            WsSource { inner: stream },
        ))
    }
}

struct WsSink {
    inner: SplitSink<WsStream, Message>,
    closed: bool,
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send(&mut self, message: TransportMessage) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::Transport("socket closed".into()));
        }
        let message = match message {
            TransportMessage::Text(text) => Message::Text(text.into()),
            TransportMessage::Binary(bytes) => Message::Binary(bytes.into()),
        };
        self.inner
            .send(message)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.inner.close().await {
            trace!(error = %e, "websocket close");
        }
    }
}

struct WsSource {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl TransportStream for WsSource {
    async fn recv(&mut self) -> Option<Result<TransportMessage, ClientError>> {
        loop {
            let message = match self.inner.next().await? {
                Ok(message) => message,
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(ClientError::Transport(e.to_string()))),
            };
            match message {
                Message::Text(text) => {
                    return Some(Ok(TransportMessage::Text(text.as_str().to_owned())));
                }
                Message::Binary(bytes) => return Some(Ok(TransportMessage::Binary(bytes.to_vec()))),
                Message::Close(frame) => {
                    debug!(?frame, "websocket closed by peer");
                    return None;
                }
                // Pings are answered by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}
