//! Fix publisher - change-only delivery of accepted fixes.
//!
//! Every subscriber gets its own bounded hand-off channel, drained by a
//! dedicated dispatcher on the blocking thread pool. Publishing only ever
//! does a non-blocking `try_send`, so a slow, blocking or panicking callback
//! affects nobody but itself:
//!
//! - a full hand-off channel drops that delivery for that subscriber only
//! - a panicking callback is caught, counted and the dispatcher keeps going
//!
//! Async consumers can use [`FixPublisher::subscribe`] instead, which returns
//! a `broadcast::Receiver`.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::config::DEFAULT_SUBSCRIBER_BUFFER;
use crate::engine::BestFix;

/// Receives best-fix changes.
///
/// Implemented for any `FnMut(&BestFix) + Send + 'static` closure.
pub trait FixSubscriber: Send + 'static {
    fn on_best_fix_changed(&mut self, fix: &BestFix);
}

impl<F> FixSubscriber for F
where
    F: FnMut(&BestFix) + Send + 'static,
{
    fn on_best_fix_changed(&mut self, fix: &BestFix) {
        self(fix)
    }
}

/// Opaque registration handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Publisher errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublisherError {
    /// Callback dispatchers need a Tokio runtime.
    #[error("no Tokio runtime available to run subscriber dispatchers")]
    NoRuntime,

    /// The publisher was shut down.
    #[error("publisher is shut down")]
    ShutDown,
}

/// Publisher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    /// Fixes handed to subscribers.
    pub published: u64,
    /// Fixes ignored because they were not newer than the last published one.
    pub unchanged: u64,
    /// Deliveries enqueued to callback subscribers.
    pub delivered: u64,
    /// Deliveries dropped because a subscriber's buffer was full.
    pub dropped: u64,
    /// Callback invocations that panicked.
    pub panics: u64,
    /// Currently registered callback subscribers.
    pub subscribers: usize,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    unchanged: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    panics: AtomicU64,
}

struct Slot {
    id: SubscriptionId,
    name: String,
    tx: mpsc::Sender<BestFix>,
}

struct PublisherState {
    slots: Vec<Slot>,
    next_id: u64,
    last_published_seq: Option<u64>,
    broadcast_tx: Option<broadcast::Sender<BestFix>>,
}

struct Inner {
    state: Mutex<PublisherState>,
    counters: Arc<Counters>,
    buffer: usize,
}

/// Change-only fix publisher. Cheap to clone.
#[derive(Clone)]
pub struct FixPublisher {
    inner: Arc<Inner>,
}

impl fmt::Debug for FixPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixPublisher")
            .field("buffer", &self.inner.buffer)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for FixPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl FixPublisher {
    /// Create a publisher with a per-subscriber buffer of `buffer` fixes (minimum 1).
    pub fn new(buffer: usize) -> Self {
        let buffer = buffer.max(1);
        let (broadcast_tx, _) = broadcast::channel(buffer);

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(PublisherState {
                    slots: Vec::new(),
                    next_id: 1,
                    last_published_seq: None,
                    broadcast_tx: Some(broadcast_tx),
                }),
                counters: Arc::new(Counters::default()),
                buffer,
            }),
        }
    }

    /// Register a callback subscriber.
    ///
    /// Must be called from within a Tokio runtime: the callback runs on a
    /// dedicated blocking-pool dispatcher.
    pub fn on_best_fix_changed<S>(
        &self,
        name: impl Into<String>,
        subscriber: S,
    ) -> Result<SubscriptionId, PublisherError>
    where
        S: FixSubscriber,
    {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| PublisherError::NoRuntime)?;
        let name = name.into();

        let mut state = self.inner.state.lock();
        if state.broadcast_tx.is_none() {
            return Err(PublisherError::ShutDown);
        }

        let id = SubscriptionId(state.next_id);
        state.next_id += 1;

        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let counters = Arc::clone(&self.inner.counters);
        let dispatcher_name = name.clone();
        handle.spawn_blocking(move || dispatch(id, dispatcher_name, subscriber, rx, counters));

        state.slots.push(Slot {
            id,
            name: name.clone(),
            tx,
        });

        tracing::debug!(subscription = %id, name = %name, "Subscriber registered");
        Ok(id)
    }

    /// Subscribe to fixes as a broadcast stream.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<BestFix>, PublisherError> {
        self.inner
            .state
            .lock()
            .broadcast_tx
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(PublisherError::ShutDown)
    }

    /// Remove a callback subscriber. Returns false if it was not registered.
    ///
    /// Fixes already handed to the subscriber are still delivered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.slots.len();
        state.slots.retain(|slot| slot.id != id);
        let removed = state.slots.len() != before;
        if removed {
            tracing::debug!(subscription = %id, "Subscriber removed");
        }
        removed
    }

    /// Number of registered callback subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().slots.len()
    }

    /// Publish a newly accepted fix.
    ///
    /// Returns false without notifying anyone if the fix is not newer than
    /// the last published one, or after shutdown.
    pub fn publish(&self, fix: &BestFix) -> bool {
        let counters = &self.inner.counters;
        let mut state = self.inner.state.lock();

        if state.broadcast_tx.is_none() {
            return false;
        }
        if state
            .last_published_seq
            .is_some_and(|last| fix.fix_seq() <= last)
        {
            counters.unchanged.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        state.last_published_seq = Some(fix.fix_seq());
        counters.published.fetch_add(1, Ordering::Relaxed);

        for slot in &state.slots {
            match slot.tx.try_send(fix.clone()) {
                Ok(()) => {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        subscription = %slot.id,
                        name = %slot.name,
                        fix_seq = fix.fix_seq(),
                        "Subscriber buffer full, delivery dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        subscription = %slot.id,
                        name = %slot.name,
                        "Subscriber dispatcher gone"
                    );
                }
            }
        }

        if let Some(tx) = &state.broadcast_tx {
            // No receivers is fine
            let _ = tx.send(fix.clone());
        }
        true
    }

    /// Release all registrations. Further registrations fail.
    ///
    /// Dispatchers finish the fixes already handed to them, then exit.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if state.broadcast_tx.take().is_none() {
            return;
        }
        let released = state.slots.len();
        state.slots.clear();
        tracing::debug!(released, "Publisher shut down");
    }

    /// True once [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.state.lock().broadcast_tx.is_none()
    }

    /// Publisher counters.
    pub fn stats(&self) -> PublisherStats {
        let counters = &self.inner.counters;
        PublisherStats {
            published: counters.published.load(Ordering::Relaxed),
            unchanged: counters.unchanged.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            panics: counters.panics.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }
}

/// Deliver fixes to one subscriber until its channel closes.
fn dispatch<S: FixSubscriber>(
    id: SubscriptionId,
    name: String,
    mut subscriber: S,
    mut rx: mpsc::Receiver<BestFix>,
    counters: Arc<Counters>,
) {
    while let Some(fix) = rx.blocking_recv() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            subscriber.on_best_fix_changed(&fix);
        }));
        if result.is_err() {
            counters.panics.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                subscription = %id,
                name = %name,
                fix_seq = fix.fix_seq(),
                "Subscriber panicked"
            );
        }
    }
    tracing::trace!(subscription = %id, name = %name, "Dispatcher finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Decision, StalenessEngine};
    use crate::sample::{PositionSample, SourceId};
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    /// Produce `count` successive fixes by feeding improving samples.
    fn fixes(count: usize) -> Vec<BestFix> {
        let mut engine = StalenessEngine::default();
        (0..count)
            .map(|i| {
                let accuracy = 64.0 / 2f64.powi(i as i32);
                let sample = PositionSample::new(53.5, 10.0, accuracy, i as i64, SourceId::Gps);
                match engine.offer(sample, i as i64) {
                    Decision::Accepted { fix, .. } => fix,
                    other => panic!("expected acceptance, got {:?}", other),
                }
            })
            .collect()
    }

    fn recv_seq(rx: &std_mpsc::Receiver<u64>) -> u64 {
        rx.recv_timeout(Duration::from_secs(2))
            .expect("delivery expected")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delivers_in_order() {
        let publisher = FixPublisher::new(8);
        let (tx, rx) = std_mpsc::channel();
        publisher
            .on_best_fix_changed("collector", move |fix: &BestFix| {
                let _ = tx.send(fix.fix_seq());
            })
            .unwrap();

        for fix in fixes(3) {
            assert!(publisher.publish(&fix));
        }

        assert_eq!(recv_seq(&rx), 1);
        assert_eq!(recv_seq(&rx), 2);
        assert_eq!(recv_seq(&rx), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_change_only() {
        let publisher = FixPublisher::new(8);
        let all = fixes(2);

        assert!(publisher.publish(&all[0]));
        assert!(!publisher.publish(&all[0]));
        assert!(publisher.publish(&all[1]));
        assert!(!publisher.publish(&all[0]));

        let stats = publisher.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.unchanged, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_slow_subscriber_does_not_block_others() {
        let publisher = FixPublisher::new(1);

        let (gate_tx, gate_rx) = std_mpsc::channel::<()>();
        publisher
            .on_best_fix_changed("stuck", move |_: &BestFix| {
                let _ = gate_rx.recv();
            })
            .unwrap();

        let (tx, rx) = std_mpsc::channel();
        publisher
            .on_best_fix_changed("healthy", move |fix: &BestFix| {
                let _ = tx.send(fix.fix_seq());
            })
            .unwrap();

        let all = fixes(5);
        for fix in &all {
            publisher.publish(fix);
            // Let the healthy dispatcher keep up with its one-slot buffer
            assert_eq!(recv_seq(&rx), fix.fix_seq());
        }

        // The stuck subscriber holds one fix in its callback and one in its
        // buffer; the rest were dropped for it alone
        assert!(publisher.stats().dropped >= 2);
        drop(gate_tx);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panicking_subscriber_is_isolated() {
        let publisher = FixPublisher::new(8);
        publisher
            .on_best_fix_changed("faulty", |_: &BestFix| panic!("subscriber bug"))
            .unwrap();

        let (tx, rx) = std_mpsc::channel();
        publisher
            .on_best_fix_changed("healthy", move |fix: &BestFix| {
                let _ = tx.send(fix.fix_seq());
            })
            .unwrap();

        for fix in fixes(2) {
            publisher.publish(&fix);
        }
        assert_eq!(recv_seq(&rx), 1);
        assert_eq!(recv_seq(&rx), 2);

        // The faulty dispatcher survives its first panic
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while publisher.stats().panics < 2 && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(publisher.stats().panics, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unsubscribe() {
        let publisher = FixPublisher::new(8);
        let id = publisher
            .on_best_fix_changed("temp", |_: &BestFix| {})
            .unwrap();

        assert_eq!(publisher.subscriber_count(), 1);
        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_broadcast_subscription() {
        let publisher = FixPublisher::new(8);
        let mut rx = publisher.subscribe().unwrap();

        let all = fixes(1);
        publisher.publish(&all[0]);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.fix_seq(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_releases_registrations() {
        let publisher = FixPublisher::new(8);
        publisher
            .on_best_fix_changed("a", |_: &BestFix| {})
            .unwrap();
        let mut rx = publisher.subscribe().unwrap();

        publisher.shutdown();
        publisher.shutdown();

        assert!(publisher.is_shut_down());
        assert_eq!(publisher.subscriber_count(), 0);
        assert_eq!(
            publisher.on_best_fix_changed("late", |_: &BestFix| {}),
            Err(PublisherError::ShutDown)
        );
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(!publisher.publish(&fixes(1)[0]));
    }

    #[test]
    fn test_register_without_runtime_fails() {
        let publisher = FixPublisher::default();
        assert_eq!(
            publisher.on_best_fix_changed("orphan", |_: &BestFix| {}),
            Err(PublisherError::NoRuntime)
        );
    }
}
