//! Request correlation.
//!
//! Each in-flight request owns one entry in the [`PendingTable`]: the method
//! name, the caller's one-shot reply channel and a timeout timer. An entry is
//! removed by exactly one of response, timeout, cancel or flush, and the reply
//! channel is consumed in the same step, so no caller can be resolved twice.
//!
//! Timers run on their own tasks and only report the expired id back through
//! a channel; the table itself is only touched by its owner.

use std::collections::HashMap;
use std::time::Duration;

use gatelink_core::errors::ClientError;
use gatelink_core::ids::RequestId;
use gatelink_core::protocol::ResponseFrame;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Where a request's outcome is delivered.
pub(crate) type Reply = oneshot::Sender<Result<ResponseFrame, ClientError>>;

struct PendingRequest {
    method: String,
    timeout: Duration,
    reply: Reply,
    timer: JoinHandle<()>,
}

impl PendingRequest {
    fn settle(self, outcome: Result<ResponseFrame, ClientError>) {
        self.timer.abort();
        // The caller may already have stopped waiting.
        let _ = self.reply.send(outcome);
    }
}

/// Requests awaiting a response.
pub(crate) struct PendingTable {
    entries: HashMap<RequestId, PendingRequest>,
    expired_tx: mpsc::UnboundedSender<RequestId>,
}

impl PendingTable {
    /// Empty table plus the channel on which timers report expired ids.
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<RequestId>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        (
            Self {
                entries: HashMap::new(),
                expired_tx,
            },
            expired_rx,
        )
    }

    /// Track a request whose frame is being queued on the link. The timer
    /// starts immediately.
    pub(crate) fn register(
        &mut self,
        id: RequestId,
        method: String,
        timeout: Duration,
        reply: Reply,
    ) {
        let expired_tx = self.expired_tx.clone();
        let timer_id = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = expired_tx.send(timer_id);
        });
        let entry = PendingRequest {
            method,
            timeout,
            reply,
            timer,
        };
        if let Some(previous) = self.entries.insert(id.clone(), entry) {
            warn!(request_id = %id, method = %previous.method, "request id reused while pending");
            previous.settle(Err(ClientError::Cancelled));
        }
    }

    /// Deliver a response to its request. Unknown ids are ignored.
    pub(crate) fn resolve(&mut self, response: ResponseFrame) -> bool {
        let Some(entry) = self.entries.remove(&response.id) else {
            debug!(request_id = %response.id, "dropping response with no pending request");
            return false;
        };
        debug!(request_id = %response.id, method = %entry.method, ok = response.ok, "response received");
        entry.settle(Ok(response));
        true
    }

    /// Fail a request with [`ClientError::Timeout`].
    pub(crate) fn expire(&mut self, id: &RequestId) -> bool {
        let Some(entry) = self.entries.remove(id) else {
            return false;
        };
        warn!(request_id = %id, method = %entry.method, "request timed out");
        let error = ClientError::timeout(entry.method.clone(), entry.timeout);
        entry.settle(Err(error));
        true
    }

    /// Fail a request with [`ClientError::Cancelled`]. Idempotent.
    pub(crate) fn cancel(&mut self, id: &RequestId) -> bool {
        let Some(entry) = self.entries.remove(id) else {
            return false;
        };
        debug!(request_id = %id, method = %entry.method, "request cancelled");
        entry.settle(Err(ClientError::Cancelled));
        true
    }

    /// Fail every pending request with [`ClientError::Cancelled`].
    pub(crate) fn flush(&mut self) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.settle(Err(ClientError::Cancelled));
        }
        if count > 0 {
            debug!(count, "flushed pending requests");
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }
}

impl Drop for PendingTable {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    type Waiter = oneshot::Receiver<Result<ResponseFrame, ClientError>>;

    fn register(table: &mut PendingTable, method: &str, timeout: Duration) -> (RequestId, Waiter) {
        let id = RequestId::new();
        let (tx, rx) = oneshot::channel();
        table.register(id.clone(), method.into(), timeout, tx);
        (id, rx)
    }

    #[tokio::test]
    async fn response_resolves_matching_request() {
        let (mut table, _expired) = PendingTable::new();
        let (id, rx) = register(&mut table, "status", Duration::from_secs(30));

        assert!(table.resolve(ResponseFrame::success(id.clone(), json!({"ok": 1}))));
        let response = rx.await.unwrap().unwrap();
        assert_eq!(response.id, id);
        assert_eq!(response.payload, Some(json!({"ok": 1})));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn unmatched_response_has_no_effect() {
        let (mut table, _expired) = PendingTable::new();
        let (id, mut rx) = register(&mut table, "status", Duration::from_secs(30));

        assert!(!table.resolve(ResponseFrame::success("someone-else", json!(null))));
        assert!(table.contains(&id));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_reports_expiry() {
        let (mut table, mut expired) = PendingTable::new();
        let (id, rx) = register(&mut table, "chat.send", Duration::from_millis(10));

        let fired = expired.recv().await.unwrap();
        assert_eq!(fired, id);
        assert!(table.expire(&fired));

        let err = rx.await.unwrap().unwrap_err();
        assert_matches!(&err, ClientError::Timeout { method, seconds }
            if method == "chat.send" && (*seconds - 0.01).abs() < f64::EPSILON);
        assert_eq!(err.to_string(), "request 'chat.send' timed out after 0.01s");
    }

    #[tokio::test(start_paused = true)]
    async fn late_expiry_after_response_is_ignored() {
        let (mut table, mut expired) = PendingTable::new();
        let (id, rx) = register(&mut table, "status", Duration::from_millis(5));

        assert!(table.resolve(ResponseFrame::success(id.clone(), json!(1))));
        assert!(!table.expire(&id));
        assert!(rx.await.unwrap().is_ok());

        // The timer was aborted with the entry, so nothing is reported.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(expired.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_isolated() {
        let (mut table, _expired) = PendingTable::new();
        let (a, rx_a) = register(&mut table, "a", Duration::from_secs(30));
        let (b, mut rx_b) = register(&mut table, "b", Duration::from_secs(30));

        assert!(table.cancel(&a));
        assert!(!table.cancel(&a));
        assert_matches!(rx_a.await.unwrap(), Err(ClientError::Cancelled));

        assert!(table.contains(&b));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn flush_cancels_everything() {
        let (mut table, _expired) = PendingTable::new();
        let waiters: Vec<_> = (0..3)
            .map(|n| register(&mut table, &format!("m{n}"), Duration::from_secs(30)).1)
            .collect();

        assert_eq!(table.flush(), 3);
        assert_eq!(table.len(), 0);
        for rx in waiters {
            assert_matches!(rx.await.unwrap(), Err(ClientError::Cancelled));
        }
    }

    #[tokio::test]
    async fn dropping_table_cancels_waiters() {
        let (mut table, _expired) = PendingTable::new();
        let (_, rx) = register(&mut table, "status", Duration::from_secs(30));
        drop(table);
        assert_matches!(rx.await.unwrap(), Err(ClientError::Cancelled));
    }

    #[tokio::test]
    async fn settling_for_departed_caller_is_harmless() {
        let (mut table, _expired) = PendingTable::new();
        let (id, rx) = register(&mut table, "status", Duration::from_secs(30));
        drop(rx);
        assert!(table.resolve(ResponseFrame::success(id, json!(null))));
    }
}
