//! Public client handle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use gatelink_core::errors::{ClientError, Result};
use gatelink_core::ids::RequestId;
use gatelink_core::protocol::{HelloOk, ResponseFrame};
use gatelink_settings::GatelinkSettings;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::driver::{Command, Driver, DriverConfig};
use crate::events::EventStream;
use crate::state::{ConnectionState, ObserverSlot, StateChange, StateObserver};
use crate::transport::{Connector, WsConnector};

/// Handle to a gateway connection.
///
/// Cheap to clone; all clones drive the same connection. When the last
/// clone is dropped the connection is closed, pending requests resolve with
/// [`ClientError::Cancelled`] and the event stream ends.
///
/// Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct GatewayClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    observer: ObserverSlot,
    events: Arc<Mutex<Option<EventStream>>>,
    hello: Arc<RwLock<Option<HelloOk>>>,
    request_timeout: Duration,
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("state", &*self.state.borrow())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Client that connects over WebSocket.
    pub fn new(settings: &GatelinkSettings) -> Self {
        Self::with_connector(settings, WsConnector)
    }

    /// Client that opens transports through `connector`.
    pub fn with_connector(settings: &GatelinkSettings, connector: impl Connector) -> Self {
        let observer = ObserverSlot::default();
        let hello = Arc::new(RwLock::new(None));
        let handle = Driver::spawn(
            DriverConfig::from_settings(settings),
            Arc::new(connector),
            observer.clone(),
            Arc::clone(&hello),
        );
        Self {
            commands: handle.commands,
            state: handle.state,
            observer,
            events: Arc::new(Mutex::new(Some(handle.events))),
            hello,
            request_timeout: settings.request_timeout(),
        }
    }

    async fn ask<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(make(reply)).ok()?;
        rx.await.ok()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Open the connection and complete the handshake.
    ///
    /// Returns the current handshake result when already connected, and
    /// joins the attempt in progress when one is running.
    pub async fn connect(&self) -> Result<HelloOk> {
        self.ask(|reply| Command::Connect { reply })
            .await
            .unwrap_or(Err(ClientError::Cancelled))
    }

    /// Close the connection and stop any reconnect loop.
    ///
    /// Pending requests resolve with [`ClientError::Cancelled`].
    pub async fn disconnect(&self) {
        let _ = self.ask(|reply| Command::Disconnect { reply }).await;
    }

    /// Disconnect and stop the driver. Other clones become inert.
    pub async fn shutdown(&self) {
        let _ = self.ask(|reply| Command::Shutdown { reply }).await;
    }

    // ── Requests ────────────────────────────────────────────────────────

    /// Send a request and wait for its response, up to `timeout`.
    ///
    /// Dropping the returned future cancels the request.
    pub async fn send(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<ResponseFrame> {
        let id = RequestId::new();
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                id: id.clone(),
                method: method.to_owned(),
                params,
                timeout,
                reply,
            })
            .map_err(|_| ClientError::NotConnected)?;

        let mut guard = CancelOnDrop {
            id: Some(id),
            commands: &self.commands,
        };
        let outcome = rx.await;
        guard.disarm();
        outcome.unwrap_or(Err(ClientError::Cancelled))
    }

    /// [`send`](Self::send) that also resolves with
    /// [`ClientError::Cancelled`] as soon as `cancel` fires.
    pub async fn send_with_cancel(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ResponseFrame> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ClientError::Cancelled),
            result = self.send(method, params, timeout) => result,
        }
    }

    /// [`send`](Self::send) with the configured default timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<ResponseFrame> {
        self.send(method, params, self.request_timeout).await
    }

    /// Send a request and decode its payload.
    ///
    /// A non-`ok` response becomes [`ClientError::RequestFailed`]; a payload
    /// that does not fit `T` becomes [`ClientError::Encoding`].
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        let response = self.request(method, params).await?;
        decode_payload(method, response)
    }

    // ── Observation ─────────────────────────────────────────────────────

    /// Take the event stream. Only the first call gets it.
    pub fn take_events(&self) -> Option<EventStream> {
        self.events.lock().take()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether requests can be sent right now.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watch receiver that follows every state change.
    pub fn state_signal(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Register the single state-change callback, replacing any previous one.
    ///
    /// The callback runs on the driver task and must not block. Dropping the
    /// returned handle unregisters it.
    pub fn observe_state(
        &self,
        callback: impl Fn(StateChange) + Send + Sync + 'static,
    ) -> StateObserver {
        self.observer.register(callback)
    }

    /// Result of the current link's handshake.
    pub fn hello(&self) -> Option<HelloOk> {
        self.hello.read().clone()
    }

    /// Default request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

fn decode_payload<T: DeserializeOwned>(method: &str, response: ResponseFrame) -> Result<T> {
    if !response.ok {
        return Err(ClientError::RequestFailed(response.error_or_default()));
    }
    let payload = response.payload.unwrap_or(Value::Null);
    serde_json::from_value(payload)
        .map_err(|e| ClientError::Encoding(format!("{method} payload: {e}")))
}

/// Cancels the request when a `send` future is dropped before resolution.
struct CancelOnDrop<'a> {
    id: Option<RequestId>,
    commands: &'a mpsc::UnboundedSender<Command>,
}

impl CancelOnDrop<'_> {
    fn disarm(&mut self) {
        self.id = None;
    }
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            let _ = self.commands.send(Command::Cancel { id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use gatelink_core::protocol::ErrorShape;
    use serde::Deserialize;
    use serde_json::json;

    use crate::transport::memory_gateway;

    #[derive(Debug, Deserialize)]
    struct Status {
        uptime: u64,
    }

    #[test]
    fn decode_ok_payload() {
        let response = ResponseFrame::success("r1", json!({ "uptime": 12 }));
        let status: Status = decode_payload("status", response).unwrap();
        assert_eq!(status.uptime, 12);
    }

    #[test]
    fn decode_failure_is_request_failed() {
        let response = ResponseFrame::failure("r1", ErrorShape::new("nope").with_code("E"));
        let err = decode_payload::<Status>("status", response).unwrap_err();
        assert_matches!(err, ClientError::RequestFailed(shape) if shape.message == "nope");
    }

    #[test]
    fn decode_mismatched_payload_is_encoding_error() {
        let response = ResponseFrame::success("r1", json!({ "uptime": "long" }));
        let err = decode_payload::<Status>("status", response).unwrap_err();
        assert_matches!(err, ClientError::Encoding(msg) if msg.starts_with("status payload"));
    }

    #[test]
    fn missing_payload_decodes_as_null() {
        let mut response = ResponseFrame::success("r1", json!(null));
        response.payload = None;
        let unit: Option<Status> = decode_payload("status", response).unwrap();
        assert!(unit.is_none());
    }

    #[tokio::test]
    async fn send_before_connect_is_not_connected() {
        let (connector, _listener) = memory_gateway();
        let client = GatewayClient::with_connector(&GatelinkSettings::default(), connector);
        let err = client.request("status", None).await.unwrap_err();
        assert_matches!(err, ClientError::NotConnected);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn invalid_endpoint_fails_without_state_change() {
        let (connector, _listener) = memory_gateway();
        let mut settings = GatelinkSettings::default();
        settings.gateway.host = String::new();
        let client = GatewayClient::with_connector(&settings, connector);

        let err = client.connect().await.unwrap_err();
        assert_matches!(err, ClientError::InvalidEndpoint(_));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn events_taken_once() {
        let (connector, _listener) = memory_gateway();
        let client = GatewayClient::with_connector(&GatelinkSettings::default(), connector);
        assert!(client.take_events().is_some());
        assert!(client.clone().take_events().is_none());
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let (connector, _listener) = memory_gateway();
        let client = GatewayClient::with_connector(&GatelinkSettings::default(), connector);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .send_with_cancel("status", None, Duration::from_secs(1), &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::Cancelled);
    }

    #[tokio::test]
    async fn shutdown_makes_handles_inert() {
        let (connector, _listener) = memory_gateway();
        let client = GatewayClient::with_connector(&GatelinkSettings::default(), connector);
        let mut events = client.take_events().unwrap();
        client.shutdown().await;

        assert!(events.recv().await.is_none());
        assert_matches!(
            client.request("status", None).await,
            Err(ClientError::NotConnected)
        );
    }
}
