//! The connection driver.
//!
//! One task owns every piece of mutable client state: the connection state
//! machine, the current link, the in-flight handshake, the pending request
//! table, the reconnect delay and the supervisor. Client handles, the link
//! reader, request timers, handshake tasks and the supervisor only submit
//! [`Command`]s, so all mutation is serialized through [`Driver::run`].
//!
//! The driver never awaits transport I/O. Each link has its own writer task,
//! so a socket that stops draining cannot hold up timers, cancellations or
//! `disconnect`.
//!
//! Internal tasks hold weak senders: once every client handle is dropped the
//! command channel closes and the driver tears itself down.

use std::sync::Arc;
use std::time::Duration;

use gatelink_core::backoff::{Backoff, ReconnectPolicy};
use gatelink_core::errors::ClientError;
use gatelink_core::ids::RequestId;
use gatelink_core::profile::ConnectionProfile;
use gatelink_core::protocol::{ConnectParams, Frame, HelloOk, RequestFrame, encode_request};
use gatelink_settings::GatelinkSettings;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::correlator::{PendingTable, Reply};
use crate::events::{self, EventPublisher, EventStream};
use crate::handshake::{self, HandshakeConfig};
use crate::state::{ConnectionState, ObserverSlot, StateMachine};
use crate::supervisor::{SupervisorHandle, SupervisorId};
use crate::transport::{Connector, Transport, TransportMessage, TransportOptions, TransportSink, TransportStream};

/// Upper bound on a graceful close of a dropped link.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Reply carrying a handshake outcome.
pub(crate) type HelloReply = oneshot::Sender<Result<HelloOk, ClientError>>;

/// Messages processed by the driver, in arrival order.
pub(crate) enum Command {
    /// Open a link (or join the attempt in progress).
    Connect { reply: HelloReply },
    /// Drop the link and stop reconnecting.
    Disconnect { reply: oneshot::Sender<()> },
    /// Track a request and queue its frame on the link.
    Send {
        id: RequestId,
        method: String,
        params: Option<Value>,
        timeout: Duration,
        reply: Reply,
    },
    /// Caller stopped waiting for a request.
    Cancel { id: RequestId },
    /// Message read from link `generation`.
    Inbound {
        generation: u64,
        message: TransportMessage,
    },
    /// Link `generation` ended.
    LinkClosed { generation: u64, reason: String },
    /// Handshake attempt `epoch` finished.
    HandshakeDone {
        epoch: u64,
        result: Result<(Transport, HelloOk), ClientError>,
    },
    /// Supervisor asks how long to wait; `None` tells it to stop.
    ReconnectDelay {
        supervisor: SupervisorId,
        reply: oneshot::Sender<Option<Duration>>,
    },
    /// Supervisor asks for an attempt; `None` tells it to stop.
    ReconnectAttempt {
        supervisor: SupervisorId,
        reply: oneshot::Sender<Option<oneshot::Receiver<Result<HelloOk, ClientError>>>>,
    },
    /// Tear down and exit.
    Shutdown { reply: oneshot::Sender<()> },
}

/// Static inputs derived from settings.
#[derive(Clone, Debug)]
pub(crate) struct DriverConfig {
    pub(crate) profile: ConnectionProfile,
    pub(crate) params: ConnectParams,
    pub(crate) transport: TransportOptions,
    pub(crate) handshake_timeout: Duration,
    pub(crate) reconnect: ReconnectPolicy,
}

impl DriverConfig {
    pub(crate) fn from_settings(settings: &GatelinkSettings) -> Self {
        Self {
            profile: settings.gateway.clone(),
            params: ConnectParams::new(
                settings.client_info(),
                settings.client.role.clone(),
                settings.client.scopes.clone(),
                settings.gateway.auth(),
            ),
            transport: TransportOptions {
                max_message_bytes: settings.transport.max_message_bytes,
            },
            handshake_timeout: settings.handshake_timeout(),
            reconnect: settings.reconnect.clone(),
        }
    }
}

/// What the client handle keeps after spawning the driver.
pub(crate) struct DriverHandle {
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) state: watch::Receiver<ConnectionState>,
    pub(crate) events: EventStream,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttemptOrigin {
    /// Explicit `connect` from a disconnected client.
    User,
    /// Scheduled by the reconnect supervisor.
    Supervisor,
    /// Explicit `connect` that pre-empted a sleeping supervisor. Failure
    /// resumes the reconnect loop.
    Resume,
}

struct Attempt {
    epoch: u64,
    origin: AttemptOrigin,
    waiters: Vec<HelloReply>,
    task: JoinHandle<()>,
}

struct Link {
    generation: u64,
    outbox: mpsc::UnboundedSender<TransportMessage>,
    writer: CancellationToken,
    reader: JoinHandle<()>,
    hello: HelloOk,
}

impl Link {
    /// Stop reading and let the writer close the sink in the background.
    fn close(self) {
        self.reader.abort();
        self.writer.cancel();
    }
}

/// Owner of all connection state.
pub(crate) struct Driver {
    commands: mpsc::UnboundedReceiver<Command>,
    handle: mpsc::WeakUnboundedSender<Command>,
    connector: Arc<dyn Connector>,
    config: DriverConfig,
    state: StateMachine,
    hello: Arc<RwLock<Option<HelloOk>>>,
    link: Option<Link>,
    next_generation: u64,
    attempt: Option<Attempt>,
    next_epoch: u64,
    pending: PendingTable,
    expired: mpsc::UnboundedReceiver<RequestId>,
    events: EventPublisher,
    backoff: Backoff,
    supervisor: Option<SupervisorHandle>,
    next_supervisor: SupervisorId,
}

impl Driver {
    /// Spawn the driver task.
    pub(crate) fn spawn(
        config: DriverConfig,
        connector: Arc<dyn Connector>,
        observer: ObserverSlot,
        hello: Arc<RwLock<Option<HelloOk>>>,
    ) -> DriverHandle {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (pending, expired) = PendingTable::new();
        let (events, stream) = events::channel();
        let state = StateMachine::new(observer);
        let state_rx = state.subscribe();
        let backoff = Backoff::new(config.reconnect.clone());

        let driver = Self {
            commands,
            handle: commands_tx.downgrade(),
            connector,
            config,
            state,
            hello,
            link: None,
            next_generation: 0,
            attempt: None,
            next_epoch: 0,
            pending,
            expired,
            events,
            backoff,
            supervisor: None,
            next_supervisor: 0,
        };
        drop(tokio::spawn(driver.run()));

        DriverHandle {
            commands: commands_tx,
            state: state_rx,
            events: stream,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle(command) {
                        return;
                    }
                }
                Some(id) = self.expired.recv() => {
                    let _ = self.pending.expire(&id);
                }
            }
        }
        debug!("all client handles dropped");
        self.teardown();
    }

    /// Process one command. Returns `false` once the driver should exit.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Connect { reply } => self.on_connect(reply),
            Command::Disconnect { reply } => {
                self.disconnect();
                let _ = reply.send(());
            }
            Command::Send {
                id,
                method,
                params,
                timeout,
                reply,
            } => self.on_send(id, method, params, timeout, reply),
            Command::Cancel { id } => {
                let _ = self.pending.cancel(&id);
            }
            Command::Inbound {
                generation,
                message,
            } => self.on_inbound(generation, &message),
            Command::LinkClosed { generation, reason } => {
                if self.link.as_ref().is_some_and(|l| l.generation == generation) {
                    self.link_lost(&reason);
                }
            }
            Command::HandshakeDone { epoch, result } => self.on_handshake_done(epoch, result),
            Command::ReconnectDelay { supervisor, reply } => {
                let delay = self
                    .supervisor_is(supervisor)
                    .then(|| self.backoff.current());
                let _ = reply.send(delay);
            }
            Command::ReconnectAttempt { supervisor, reply } => {
                let _ = reply.send(self.on_reconnect_attempt(supervisor));
            }
            Command::Shutdown { reply } => {
                self.teardown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    // ── Connecting ──────────────────────────────────────────────────────

    fn on_connect(&mut self, reply: HelloReply) {
        match self.state.current() {
            ConnectionState::Connected => {
                let result = self
                    .link
                    .as_ref()
                    .map(|link| link.hello.clone())
                    .ok_or(ClientError::NotConnected);
                let _ = reply.send(result);
            }
            ConnectionState::Connecting if self.attempt.is_some() => {
                if let Some(attempt) = self.attempt.as_mut() {
                    attempt.waiters.push(reply);
                }
            }
            ConnectionState::Reconnecting => {
                // Skip the remaining delay; the loop resumes if this fails.
                if let Some(supervisor) = self.supervisor.take() {
                    supervisor.stop();
                }
                self.start_attempt(AttemptOrigin::Resume, reply);
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                self.start_attempt(AttemptOrigin::User, reply);
            }
        }
    }

    fn start_attempt(&mut self, origin: AttemptOrigin, waiter: HelloReply) {
        let url = match self.config.profile.url() {
            Ok(url) => url,
            Err(e) => {
                let _ = waiter.send(Err(e));
                return;
            }
        };
        let _ = self.state.transition(ConnectionState::Connecting);

        self.next_epoch += 1;
        let epoch = self.next_epoch;
        info!(%url, epoch, origin = ?origin, "connecting to gateway");

        let config = HandshakeConfig {
            url,
            transport: self.config.transport.clone(),
            params: self.config.params.clone(),
            timeout: self.config.handshake_timeout,
        };
        let connector = Arc::clone(&self.connector);
        let handle = self.handle.clone();
        let task = tokio::spawn(async move {
            let result = handshake::establish(connector.as_ref(), &config).await;
            if let Some(commands) = handle.upgrade() {
                let _ = commands.send(Command::HandshakeDone { epoch, result });
            }
        });

        self.attempt = Some(Attempt {
            epoch,
            origin,
            waiters: vec![waiter],
            task,
        });
    }

    fn on_handshake_done(
        &mut self,
        epoch: u64,
        result: Result<(Transport, HelloOk), ClientError>,
    ) {
        let Some(attempt) = self.attempt.take_if(|a| a.epoch == epoch) else {
            debug!(epoch, "discarding stale handshake result");
            if let Ok((transport, _)) = result {
                drop(tokio::spawn(close_sink(transport.sink)));
            }
            return;
        };

        match result {
            Ok((transport, hello)) => {
                self.backoff.reset();
                // A successful handshake ends any reconnect loop.
                self.supervisor = None;
                self.install_link(transport, hello.clone());
                let _ = self.state.transition(ConnectionState::Connected);
                for waiter in attempt.waiters {
                    let _ = waiter.send(Ok(hello.clone()));
                }
            }
            Err(e) => {
                match attempt.origin {
                    AttemptOrigin::User => {
                        let _ = self.state.transition(ConnectionState::Disconnected);
                    }
                    AttemptOrigin::Supervisor => {
                        let _ = self.state.transition(ConnectionState::Reconnecting);
                    }
                    AttemptOrigin::Resume => {
                        warn!(error = %e, "connect during reconnect failed, resuming backoff");
                        let _ = self.state.transition(ConnectionState::Reconnecting);
                        self.start_supervisor();
                    }
                }
                for waiter in attempt.waiters {
                    let _ = waiter.send(Err(e.clone()));
                }
            }
        }
    }

    fn install_link(&mut self, transport: Transport, hello: HelloOk) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let Transport { sink, stream } = transport;
        let (outbox, queued) = mpsc::unbounded_channel();
        let writer = CancellationToken::new();
        drop(tokio::spawn(write_loop(
            sink,
            queued,
            generation,
            writer.clone(),
            self.handle.clone(),
        )));
        let reader = tokio::spawn(read_loop(stream, generation, self.handle.clone()));
        *self.hello.write() = Some(hello.clone());
        self.link = Some(Link {
            generation,
            outbox,
            writer,
            reader,
            hello,
        });
        debug!(generation, "link established");
    }

    // ── Requests and inbound frames ─────────────────────────────────────

    fn on_send(
        &mut self,
        id: RequestId,
        method: String,
        params: Option<Value>,
        timeout: Duration,
        reply: Reply,
    ) {
        if reply.is_closed() {
            debug!(request_id = %id, %method, "caller cancelled before send");
            return;
        }
        let Some(link) = self.link.as_ref() else {
            let _ = reply.send(Err(ClientError::NotConnected));
            return;
        };

        let frame = RequestFrame {
            id,
            method,
            params,
        };
        let text = match encode_request(&frame) {
            Ok(text) => text,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        // The timer runs from here, however long the write takes.
        self.pending
            .register(frame.id.clone(), frame.method.clone(), timeout, reply);
        if link.outbox.send(TransportMessage::Text(text)).is_err() {
            // The writer already failed; its `LinkClosed` flushes this entry.
            debug!(request_id = %frame.id, "link writer gone, request will be flushed");
            return;
        }
        trace!(
            request_id = %frame.id,
            method = %frame.method,
            pending = self.pending.len(),
            "request queued"
        );
    }

    fn on_inbound(&mut self, generation: u64, message: &TransportMessage) {
        if !self.link.as_ref().is_some_and(|l| l.generation == generation) {
            trace!(generation, "ignoring message from stale link");
            return;
        }
        match message.decode() {
            Ok(Frame::Response(response)) => {
                let _ = self.pending.resolve(response);
            }
            Ok(Frame::Event(event)) => {
                if !self.events.publish(event) {
                    trace!("event stream dropped, discarding event");
                }
            }
            Ok(Frame::Request(request)) => {
                warn!(method = %request.method, "ignoring request frame from gateway");
            }
            Err(e) => {
                warn!(generation, bytes = message.len(), error = %e, "dropping malformed frame");
            }
        }
    }

    // ── Losing the link ─────────────────────────────────────────────────

    fn link_lost(&mut self, reason: &str) {
        let Some(link) = self.link.take() else {
            return;
        };
        let generation = link.generation;
        link.close();
        *self.hello.write() = None;
        let flushed = self.pending.flush();
        warn!(generation, reason, flushed, "gateway link lost");

        if self.config.reconnect.enabled {
            let _ = self.state.transition(ConnectionState::Reconnecting);
            self.start_supervisor();
        } else {
            let _ = self.state.transition(ConnectionState::Disconnected);
        }
    }

    fn start_supervisor(&mut self) {
        if self.supervisor.is_some() {
            debug!("reconnect supervisor already running");
            return;
        }
        self.next_supervisor += 1;
        self.supervisor = Some(SupervisorHandle::spawn(
            self.next_supervisor,
            self.handle.clone(),
        ));
    }

    fn supervisor_is(&self, id: SupervisorId) -> bool {
        self.supervisor.as_ref().is_some_and(|s| s.id == id)
            && self.state.current() == ConnectionState::Reconnecting
    }

    fn on_reconnect_attempt(
        &mut self,
        supervisor: SupervisorId,
    ) -> Option<oneshot::Receiver<Result<HelloOk, ClientError>>> {
        if !self.supervisor_is(supervisor) {
            return None;
        }
        let next_delay = self.backoff.grow();
        debug!(
            next_delay_ms = u64::try_from(next_delay.as_millis()).unwrap_or(u64::MAX),
            "starting reconnect attempt"
        );
        let (tx, rx) = oneshot::channel();
        self.start_attempt(AttemptOrigin::Supervisor, tx);
        Some(rx)
    }

    // ── Shutting down ───────────────────────────────────────────────────

    fn disconnect(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.stop();
        }
        if let Some(attempt) = self.attempt.take() {
            attempt.task.abort();
            for waiter in attempt.waiters {
                let _ = waiter.send(Err(ClientError::Cancelled));
            }
        }
        if let Some(link) = self.link.take() {
            link.close();
        }
        *self.hello.write() = None;
        let flushed = self.pending.flush();
        if self.state.transition(ConnectionState::Disconnected) {
            info!(flushed, "disconnected from gateway");
        }
    }

    fn teardown(&mut self) {
        self.disconnect();
        self.commands.close();
    }
}

/// Drain `queued` into `sink` until the link is dropped or a write fails.
async fn write_loop(
    mut sink: Box<dyn TransportSink>,
    mut queued: mpsc::UnboundedReceiver<TransportMessage>,
    generation: u64,
    cancel: CancellationToken,
    commands: mpsc::WeakUnboundedSender<Command>,
) {
    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => break,
            message = queued.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        let written = tokio::select! {
            () = cancel.cancelled() => break,
            written = sink.send(message) => written,
        };
        if let Err(e) = written {
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::LinkClosed {
                    generation,
                    reason: format!("write failed: {e}"),
                });
            }
            return;
        }
    }
    close_sink(sink).await;
}

async fn close_sink(mut sink: Box<dyn TransportSink>) {
    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
        debug!("transport close timed out, dropping it");
    }
}

async fn read_loop(
    mut stream: Box<dyn TransportStream>,
    generation: u64,
    commands: mpsc::WeakUnboundedSender<Command>,
) {
    loop {
        let next = stream.recv().await;
        let Some(commands) = commands.upgrade() else {
            return;
        };
        let command = match next {
            Some(Ok(message)) => Command::Inbound {
                generation,
                message,
            },
            Some(Err(e)) => Command::LinkClosed {
                generation,
                reason: e.to_string(),
            },
            None => Command::LinkClosed {
                generation,
                reason: "closed by peer".into(),
            },
        };
        let done = matches!(command, Command::LinkClosed { .. });
        if commands.send(command).is_err() || done {
            return;
        }
    }
}
