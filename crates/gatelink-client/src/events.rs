//! Gateway event stream.
//!
//! Every event frame received on an established link is pushed, in arrival
//! order, onto one unbounded channel. There is a single consumer and no
//! replay: events published before the stream is taken are buffered, events
//! published after it is dropped are discarded.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use gatelink_core::protocol::EventFrame;
use tokio::sync::mpsc;
use tracing::trace;

/// Create a connected publisher/stream pair.
pub(crate) fn channel() -> (EventPublisher, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventPublisher { tx }, EventStream { rx })
}

/// Write side, owned by the driver.
pub(crate) struct EventPublisher {
    tx: mpsc::UnboundedSender<EventFrame>,
}

impl EventPublisher {
    /// Deliver one event. Returns `false` when the consumer is gone.
    pub(crate) fn publish(&self, event: EventFrame) -> bool {
        trace!(event = %event.event, seq = ?event.seq, "publishing event");
        self.tx.send(event).is_ok()
    }
}

/// Ordered stream of gateway events.
///
/// Ends (yields `None`) once the client has been torn down and every
/// buffered event has been read.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<EventFrame>,
}

impl EventStream {
    /// Next event, waiting if none is buffered.
    pub async fn recv(&mut self) -> Option<EventFrame> {
        self.rx.recv().await
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<EventFrame> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = EventFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn fifo_delivery() {
        let (publisher, mut stream) = channel();
        for n in 0..5 {
            assert!(publisher.publish(EventFrame::new("tick", Some(json!({ "n": n })))));
        }
        for n in 0..5 {
            let event = stream.recv().await.unwrap();
            assert_eq!(event.payload, Some(json!({ "n": n })));
        }
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn stream_ends_when_publisher_dropped() {
        let (publisher, stream) = channel();
        assert!(publisher.publish(EventFrame::new("a", None)));
        assert!(publisher.publish(EventFrame::new("b", None)));
        drop(publisher);

        let names: Vec<String> = stream.map(|e| e.event).collect().await;
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn publish_without_consumer_reports_false() {
        let (publisher, stream) = channel();
        drop(stream);
        assert!(!publisher.publish(EventFrame::new("lost", None)));
    }
}
