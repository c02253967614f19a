//! Best-effort fan-out of events to live subscribers
//!
//! Each subscriber owns a bounded channel. Publishing never blocks: a
//! subscriber whose channel is full or closed is dropped from the set and
//! the others keep receiving.

use crate::event::{Event, EventPayload};
use aide_types::CorrelationId;
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Default per-subscriber buffer
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

#[derive(Debug)]
struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Event>,
}

/// Event fan-out hub
#[derive(Debug)]
pub struct EventNotifier {
    subscribers: Mutex<Vec<Subscriber>>,
    buffer: usize,
    next_id: AtomicU64,
}

impl EventNotifier {
    /// Create a notifier whose subscribers buffer up to `buffer` events
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push(Subscriber { id, tx });
        debug!(subscriber = id, "event subscriber registered");
        Subscription { id, rx }
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver `event` to every subscriber, returning how many received it
    pub fn publish(&self, event: &Event) -> usize {
        let mut delivered = 0;
        let mut dropped = 0u64;

        self.subscribers.lock().retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = sub.id, event = event.name(), "subscriber lagging; dropping");
                dropped += 1;
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = sub.id, "subscriber closed; dropping");
                dropped += 1;
                false
            }
        });

        if dropped > 0 {
            metrics::counter!("aide_events_dropped_subscribers_total").increment(dropped);
        }
        debug!(
            event = event.name(),
            correlation_id = %event.correlation_id,
            delivered,
            "event published"
        );
        delivered
    }

    /// Stamp and publish a payload
    pub fn emit(&self, correlation_id: &CorrelationId, payload: EventPayload) -> usize {
        self.publish(&Event::new(correlation_id.clone(), payload))
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

/// Receiving end of one subscriber
///
/// Events arrive in emission order. Dropping the subscription unregisters it
/// on the next publish.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    /// Subscriber id
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event; `None` once the notifier dropped this subscriber
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take an already-buffered event without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Drain every buffered event
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aide_types::TxnId;
    use futures::StreamExt;

    fn token(n: usize) -> EventPayload {
        EventPayload::AiToken {
            token: n.to_string(),
        }
    }

    #[tokio::test]
    async fn broadcasts_in_order_to_every_subscriber() {
        let notifier = EventNotifier::new(8);
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();
        let cid = CorrelationId::new();

        for i in 0..3 {
            assert_eq!(notifier.emit(&cid, token(i)), 2);
        }

        for sub in [&mut a, &mut b] {
            let tokens: Vec<_> = sub
                .drain()
                .into_iter()
                .map(|e| match e.payload {
                    EventPayload::AiToken { token } => token,
                    _ => unreachable!(),
                })
                .collect();
            assert_eq!(tokens, vec!["0", "1", "2"]);
        }
    }

    #[tokio::test]
    async fn full_subscriber_is_dropped_without_affecting_others() {
        let notifier = EventNotifier::new(2);
        let _slow = notifier.subscribe();
        let mut fast = notifier.subscribe();
        let cid = CorrelationId::new();

        for i in 0..5 {
            notifier.emit(&cid, token(i));
            assert!(fast.try_recv().is_some());
        }
        assert_eq!(notifier.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn closed_subscriber_is_dropped() {
        let notifier = EventNotifier::default();
        let sub = notifier.subscribe();
        drop(sub);
        assert_eq!(notifier.emit(&CorrelationId::new(), token(0)), 0);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscription_is_a_stream() {
        let notifier = EventNotifier::default();
        let mut sub = notifier.subscribe();
        let txn = TxnId::new();
        notifier.emit(&CorrelationId::new(), EventPayload::completed(txn));

        let event = sub.next().await.unwrap();
        assert_eq!(event.name(), "apply.progress");
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let notifier = EventNotifier::default();
        assert_eq!(notifier.emit(&CorrelationId::new(), token(1)), 0);
    }
}
