//! Reconnection supervisor.
//!
//! Started by the driver when an established link drops. Each round it asks
//! the driver for the current delay, sleeps (interruptibly), then asks the
//! driver to grow the delay and start a handshake attempt. It stops on the
//! first successful handshake, when cancelled, or when the driver no longer
//! recognizes it.
//!
//! The loop owns no client state: every decision is made by the driver in
//! response to [`Command::ReconnectDelay`] / [`Command::ReconnectAttempt`].

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver::Command;

/// Identifies one supervisor loop to the driver.
pub(crate) type SupervisorId = u64;

/// Driver-side record of the running loop.
pub(crate) struct SupervisorHandle {
    pub(crate) id: SupervisorId,
    pub(crate) cancel: CancellationToken,
}

impl SupervisorHandle {
    /// Spawn a loop that talks to the driver through `commands`.
    pub(crate) fn spawn(id: SupervisorId, commands: mpsc::WeakUnboundedSender<Command>) -> Self {
        let cancel = CancellationToken::new();
        drop(tokio::spawn(run(id, cancel.clone(), commands)));
        Self { id, cancel }
    }

    /// Stop the loop at its next await point.
    pub(crate) fn stop(self) {
        self.cancel.cancel();
    }
}

async fn ask<T>(
    commands: &mpsc::WeakUnboundedSender<Command>,
    make: impl FnOnce(oneshot::Sender<T>) -> Command,
) -> Option<T> {
    let (reply, rx) = oneshot::channel();
    commands.upgrade()?.send(make(reply)).ok()?;
    rx.await.ok()
}

async fn run(
    supervisor: SupervisorId,
    cancel: CancellationToken,
    commands: mpsc::WeakUnboundedSender<Command>,
) {
    let mut attempt: u32 = 0;
    loop {
        let Some(delay) = ask(&commands, |reply| Command::ReconnectDelay { supervisor, reply })
            .await
            .flatten()
        else {
            break;
        };
        attempt += 1;
        info!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnecting after delay"
        );

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        let Some(outcome) = ask(&commands, |reply| Command::ReconnectAttempt { supervisor, reply })
            .await
            .flatten()
        else {
            break;
        };

        match outcome.await {
            Ok(Ok(hello)) => {
                info!(attempt, conn_id = %hello.conn_id(), "reconnected");
                break;
            }
            Ok(Err(_)) if cancel.is_cancelled() => break,
            Ok(Err(e)) => warn!(attempt, error = %e, "reconnect attempt failed"),
            Err(_) => break,
        }
    }
    debug!(supervisor, "reconnect supervisor stopped");
}
