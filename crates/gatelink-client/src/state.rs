//! Connection state machine.
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected
//!      ▲              │  ▲            │
//!      │              ▼  │            ▼
//!      └─────────── Reconnecting ◄────┘
//! ```
//!
//! The driver owns the [`StateMachine`]; everyone else reads the state
//! through a `watch` receiver or a single registered [`StateObserver`].

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Lifecycle of the client's link to the gateway.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No link and no attempt in progress.
    #[default]
    Disconnected,
    /// Socket opening or handshake in progress.
    Connecting,
    /// Handshake complete; requests may be sent.
    Connected,
    /// Link lost; waiting to retry.
    Reconnecting,
}

impl ConnectionState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{Connected, Connecting, Disconnected, Reconnecting};
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected | Disconnected | Reconnecting)
                | (Connected, Reconnecting | Disconnected)
                | (Reconnecting, Connecting | Disconnected)
        )
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One applied transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateChange {
    /// State before.
    pub from: ConnectionState,
    /// State after.
    pub to: ConnectionState,
}

type Callback = Arc<dyn Fn(StateChange) + Send + Sync>;

struct Registration {
    token: u64,
    callback: Callback,
}

#[derive(Default)]
struct SlotInner {
    current: Option<Registration>,
    next_token: u64,
}

/// Holds at most one state-change callback.
#[derive(Clone, Default)]
pub(crate) struct ObserverSlot {
    inner: Arc<Mutex<SlotInner>>,
}

impl ObserverSlot {
    /// Register `callback`, replacing any previous observer.
    pub(crate) fn register(
        &self,
        callback: impl Fn(StateChange) + Send + Sync + 'static,
    ) -> StateObserver {
        let mut inner = self.inner.lock();
        inner.next_token += 1;
        let token = inner.next_token;
        inner.current = Some(Registration {
            token,
            callback: Arc::new(callback),
        });
        StateObserver {
            slot: Arc::downgrade(&self.inner),
            token,
        }
    }

    fn notify(&self, change: StateChange) {
        // Call outside the lock so the callback may re-register.
        let callback = self
            .inner
            .lock()
            .current
            .as_ref()
            .map(|r| Arc::clone(&r.callback));
        if let Some(callback) = callback {
            callback(change);
        }
    }

    #[cfg(test)]
    fn is_registered(&self) -> bool {
        self.inner.lock().current.is_some()
    }
}

/// Registration handle for a state-change callback.
///
/// Dropping it unregisters the callback, unless a newer observer has
/// replaced it in the meantime.
#[must_use = "dropping the observer unregisters it"]
pub struct StateObserver {
    slot: std::sync::Weak<Mutex<SlotInner>>,
    token: u64,
}

impl fmt::Debug for StateObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateObserver")
            .field("token", &self.token)
            .finish()
    }
}

impl Drop for StateObserver {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.upgrade() {
            let mut inner = slot.lock();
            if inner.current.as_ref().is_some_and(|r| r.token == self.token) {
                inner.current = None;
            }
        }
    }
}

/// The single owner of [`ConnectionState`].
pub(crate) struct StateMachine {
    current: ConnectionState,
    signal: watch::Sender<ConnectionState>,
    observer: ObserverSlot,
}

impl StateMachine {
    pub(crate) fn new(observer: ObserverSlot) -> Self {
        let (signal, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            current: ConnectionState::Disconnected,
            signal,
            observer,
        }
    }

    pub(crate) fn current(&self) -> ConnectionState {
        self.current
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.signal.subscribe()
    }

    /// Move to `next`. Returns `true` when the state changed.
    ///
    /// Same-state transitions are silent no-ops; illegal ones are refused.
    pub(crate) fn transition(&mut self, next: ConnectionState) -> bool {
        let from = self.current;
        if from == next {
            return false;
        }
        if !from.can_transition_to(next) {
            warn!(from = %from, to = %next, "refusing invalid state transition");
            return false;
        }
        self.current = next;
        let _ = self.signal.send_replace(next);
        debug!(from = %from, state = %next, "connection state changed");
        self.observer.notify(StateChange { from, to: next });
        true
    }
}
