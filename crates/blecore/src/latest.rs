//! Replay-of-latest streams.
//!
//! A [`Latest`] cell holds the most recent value published to it and fans
//! new values out to every subscriber. Every subscriber first receives the
//! value held at subscription time (if any) and then every later value, in
//! publication order. Each subscriber has its own unbounded queue, so a slow
//! reader never loses a value.

use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

struct Slot<T> {
    value: Option<T>,
    subscribers: Vec<mpsc::UnboundedSender<T>>,
}

impl<T: Clone> Slot<T> {
    fn store(&mut self, value: T) {
        self.value = Some(value.clone());
        // Dropped streams are pruned here.
        self.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
    }
}

/// A single-slot latest value plus per-subscriber update queues.
pub struct Latest<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                subscribers: Vec::new(),
            }),
        }
    }
}

impl<T: Clone + Send + 'static> Latest<T> {
    /// Create an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` and deliver it to every current subscriber.
    pub fn publish(&self, value: T) {
        self.lock().store(value);
    }

    /// Publish `value` unless it equals the stored value.
    ///
    /// Returns whether it was published.
    pub fn publish_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        let mut slot = self.lock();
        if slot.value.as_ref() == Some(&value) {
            return false;
        }
        slot.store(value);
        true
    }

    /// Forget the stored value without notifying subscribers.
    pub fn clear(&self) {
        self.lock().value = None;
    }

    /// The most recently published value.
    pub fn current(&self) -> Option<T> {
        self.lock().value.clone()
    }

    /// Subscribe: the stored value first, then every later publication.
    ///
    /// Reading the slot and registering the queue happen under one lock, so
    /// a concurrent [`publish`](Self::publish) is seen exactly once.
    pub fn subscribe(&self) -> LatestStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = self.lock();
        let replay = slot.value.clone();
        slot.subscribers.push(tx);
        drop(slot);

        LatestStream {
            inner: stream::iter(replay)
                .chain(UnboundedReceiverStream::new(rx))
                .boxed(),
        }
    }
}

impl<T> std::fmt::Debug for Latest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self
            .slot
            .lock()
            .map(|slot| slot.subscribers.len())
            .unwrap_or_default();
        f.debug_struct("Latest")
            .field("subscribers", &subscribers)
            .finish_non_exhaustive()
    }
}

/// Stream returned by [`Latest::subscribe`].
///
/// Never ends on its own while the owning cell is alive.
pub struct LatestStream<T> {
    inner: BoxStream<'static, T>,
}

impl<T> Stream for LatestStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<T> std::fmt::Debug for LatestStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestStream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_late_subscriber_gets_latest() {
        let latest = Latest::new();
        latest.publish(1);
        latest.publish(2);

        let mut stream = latest.subscribe();
        assert_eq!(stream.next().await, Some(2));
    }

    #[tokio::test]
    async fn test_empty_cell_replays_nothing() {
        let latest: Latest<u8> = Latest::new();
        let mut stream = latest.subscribe();
        let next = timeout(Duration::from_millis(20), stream.next()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_updates_follow_replay() {
        let latest = Latest::new();
        latest.publish("a");
        let mut stream = latest.subscribe();
        latest.publish("b");
        latest.publish("c");

        assert_eq!(stream.next().await, Some("a"));
        assert_eq!(stream.next().await, Some("b"));
        assert_eq!(stream.next().await, Some("c"));
    }

    #[tokio::test]
    async fn test_slow_subscriber_sees_every_value_in_order() {
        let latest = Latest::new();
        let mut stream = latest.subscribe();
        for i in 0..100 {
            latest.publish(i);
        }
        let seen: Vec<_> = stream.by_ref().take(100).collect().await;
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let latest = Latest::new();
        drop(latest.subscribe());
        let mut kept = latest.subscribe();
        latest.publish(7u8);

        assert_eq!(latest.lock().subscribers.len(), 1);
        assert_eq!(kept.next().await, Some(7));
    }

    #[tokio::test]
    async fn test_stream_ends_when_cell_dropped() {
        let latest = Latest::new();
        let mut stream = latest.subscribe();
        latest.publish(1u8);
        drop(latest);

        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_publish_if_changed_skips_duplicates() {
        let latest = Latest::new();
        let mut stream = latest.subscribe();
        assert!(latest.publish_if_changed(1));
        assert!(!latest.publish_if_changed(1));
        assert!(latest.publish_if_changed(2));

        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, Some(2));
    }

    #[test]
    fn test_clear_and_current() {
        let latest = Latest::new();
        assert_eq!(latest.current(), None);
        latest.publish(42u8);
        assert_eq!(latest.current(), Some(42));
        latest.clear();
        assert_eq!(latest.current(), None);
    }
}
