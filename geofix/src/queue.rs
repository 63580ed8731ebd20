//! Ingestion queue - bounded multi-producer buffer of raw samples.
//!
//! Source adapters submit samples concurrently; the single consumer drains
//! them in arrival order. The queue never blocks producers: when full, the
//! oldest unconsumed sample is evicted (drop-oldest backpressure) and the
//! dropped counter is incremented.
//!
//! # Usage
//!
//! ```
//! use geofix::queue::IngestionQueue;
//! use geofix::sample::{PositionSample, SourceId};
//!
//! let queue = IngestionQueue::new(2);
//! queue.submit(PositionSample::new(53.5, 10.0, 10.0, 0, SourceId::Gps));
//! queue.submit(PositionSample::new(53.5, 10.1, 10.0, 1, SourceId::Gps));
//! queue.submit(PositionSample::new(53.5, 10.2, 10.0, 2, SourceId::Gps));
//!
//! assert_eq!(queue.dropped_count(), 1);
//! let drained: Vec<_> = queue.drain().map(|s| s.timestamp_ms()).collect();
//! assert_eq!(drained, vec![1, 2]);
//! ```

use std::collections::vec_deque;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::sample::PositionSample;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Result of a submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubmitOutcome {
    /// The sample was queued without evicting anything.
    Queued,
    /// The queue was full; the returned oldest sample was evicted.
    DroppedOldest(PositionSample),
}

/// Bounded, ordered ingestion buffer with drop-oldest backpressure.
#[derive(Debug)]
pub struct IngestionQueue {
    samples: Mutex<VecDeque<PositionSample>>,
    capacity: usize,
    submitted: AtomicU64,
    dropped: AtomicU64,
    notify: Notify,
}

impl IngestionQueue {
    /// Create a queue holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            submitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Submit a sample. Never blocks on the consumer.
    pub fn submit(&self, sample: PositionSample) -> SubmitOutcome {
        let evicted = {
            let mut samples = self.samples.lock();
            let evicted = if samples.len() >= self.capacity {
                samples.pop_front()
            } else {
                None
            };
            samples.push_back(sample);
            evicted
        };

        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();

        match evicted {
            Some(oldest) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::trace!(
                    source = %oldest.source(),
                    timestamp_ms = oldest.timestamp_ms(),
                    dropped,
                    "Ingestion queue full, dropped oldest sample"
                );
                SubmitOutcome::DroppedOldest(oldest)
            }
            None => SubmitOutcome::Queued,
        }
    }

    /// Take everything currently queued for one consumption pass.
    ///
    /// Samples submitted while the returned iterator is being consumed are
    /// kept for the next pass.
    pub fn drain(&self) -> Drain {
        let taken = std::mem::take(&mut *self.samples.lock());
        Drain {
            inner: taken.into_iter(),
        }
    }

    /// Wait until at least one submission happened since the last wake-up.
    ///
    /// Intended for the single consumer. A submission made while nobody is
    /// waiting is remembered, so the next call returns immediately.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// Number of samples currently queued.
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Maximum number of queued samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total samples evicted by drop-oldest backpressure.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Total samples ever submitted.
    pub fn submitted_count(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

impl Default for IngestionQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// One consumption pass over the queue, in arrival order.
#[derive(Debug)]
pub struct Drain {
    inner: vec_deque::IntoIter<PositionSample>,
}

impl Iterator for Drain {
    type Item = PositionSample;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Drain {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SourceId;
    use std::sync::Arc;
    use std::time::Duration;

    fn sample(ts: i64) -> PositionSample {
        PositionSample::new(53.5, 10.0, 10.0, ts, SourceId::Gps)
    }

    #[test]
    fn test_drain_preserves_arrival_order() {
        let queue = IngestionQueue::new(8);
        for ts in 0..5 {
            assert_eq!(queue.submit(sample(ts)), SubmitOutcome::Queued);
        }

        let drained: Vec<i64> = queue.drain().map(|s| s.timestamp_ms()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let queue = IngestionQueue::new(3);
        for ts in 0..3 {
            queue.submit(sample(ts));
        }

        let outcome = queue.submit(sample(3));
        assert_eq!(outcome, SubmitOutcome::DroppedOldest(sample(0)));
        queue.submit(sample(4));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped_count(), 2);
        assert_eq!(queue.submitted_count(), 5);

        let drained: Vec<i64> = queue.drain().map(|s| s.timestamp_ms()).collect();
        assert_eq!(drained, vec![2, 3, 4]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = IngestionQueue::new(0);
        assert_eq!(queue.capacity(), 1);

        queue.submit(sample(0));
        queue.submit(sample(1));
        assert_eq!(queue.drain().len(), 1);
    }

    #[test]
    fn test_drain_is_one_pass() {
        let queue = IngestionQueue::new(8);
        queue.submit(sample(0));
        queue.submit(sample(1));

        let mut pass = queue.drain();
        assert_eq!(pass.next().map(|s| s.timestamp_ms()), Some(0));

        // Submitted mid-pass: belongs to the next pass
        queue.submit(sample(2));
        assert_eq!(pass.next().map(|s| s.timestamp_ms()), Some(1));
        assert!(pass.next().is_none());

        let next: Vec<i64> = queue.drain().map(|s| s.timestamp_ms()).collect();
        assert_eq!(next, vec![2]);
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(IngestionQueue::new(1_000));
        let handles: Vec<_> = (0..4)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        queue.submit(sample(producer * 1_000 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.submitted_count(), 400);
        assert_eq!(queue.dropped_count(), 0);

        // Each producer's samples stay in its own submission order
        let drained: Vec<i64> = queue.drain().map(|s| s.timestamp_ms()).collect();
        for producer in 0..4 {
            let own: Vec<i64> = drained
                .iter()
                .copied()
                .filter(|ts| ts / 1_000 == producer)
                .collect();
            let mut sorted = own.clone();
            sorted.sort_unstable();
            assert_eq!(own, sorted);
            assert_eq!(own.len(), 100);
        }
    }

    #[tokio::test]
    async fn test_notified_after_submit() {
        let queue = Arc::new(IngestionQueue::new(4));

        let producer = Arc::clone(&queue);
        tokio::spawn(async move {
            producer.submit(sample(7));
        });

        tokio::time::timeout(Duration::from_secs(1), queue.notified())
            .await
            .expect("consumer should be woken");
        assert_eq!(queue.len(), 1);
    }
}
