//! Fix service - wires queue, multiplexer, pipeline and publisher together.
//!
//! [`FixService::start`] validates the configuration and spawns the consumer
//! task, which is the only owner of the validator and the staleness engine.
//! Everything else talks to it through the ingestion queue, a control
//! channel and a `watch` snapshot:
//!
//! ```text
//! adapters ─┐
//!           ├─► IngestionQueue ─► consumer task ─► FixPublisher ─► subscribers
//! submit() ─┘                         │
//!                                     └─► watch<FixSnapshot> ─► best_fix() / stats()
//! ```
//!
//! # Example
//!
//! ```ignore
//! let service = FixService::start(FusionConfig::default())?;
//! service.register_source(Box::new(ForeFlightSource::new(ForeFlightConfig::default())))?;
//! service.on_best_fix_changed("printer", |fix: &BestFix| println!("{}", fix))?;
//!
//! // ...
//! let stats = service.shutdown().await;
//! ```

mod consumer;
mod error;

pub use error::ServiceError;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use consumer::{Consumer, Control};

use crate::config::FusionConfig;
use crate::engine::{BestFix, EngineState};
use crate::pipeline::{FixPipeline, FixStats};
use crate::publisher::{FixPublisher, FixSubscriber, SubscriptionId};
use crate::queue::{IngestionQueue, SubmitOutcome};
use crate::sample::{PositionSample, SourceId};
use crate::source::{SourceAdapter, SourceEvent, SourceMultiplexer};
use crate::time::now_millis;

/// Capacity of the control channel.
const CONTROL_CHANNEL_CAPACITY: usize = 8;

/// Point-in-time view of the pipeline, refreshed by the consumer task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixSnapshot {
    pub best_fix: Option<BestFix>,
    pub state: EngineState,
    pub stats: FixStats,
}

/// Running fix service.
///
/// Dropping the service stops the consumer task; call
/// [`shutdown`](Self::shutdown) to also stop adapters and get final stats.
pub struct FixService {
    config: FusionConfig,
    queue: Arc<IngestionQueue>,
    publisher: FixPublisher,
    multiplexer: SourceMultiplexer,
    snapshot_rx: watch::Receiver<FixSnapshot>,
    control_tx: mpsc::Sender<Control>,
    cancel: CancellationToken,
    consumer: Mutex<Option<JoinHandle<FixStats>>>,
}

impl std::fmt::Debug for FixService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixService")
            .field("state", &self.engine_state())
            .field("sources", &self.active_sources())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl FixService {
    /// Validate `config` and start the consumer task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: FusionConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ServiceError::NoRuntime)?;

        let queue = Arc::new(IngestionQueue::new(config.queue_capacity));
        let publisher = FixPublisher::new(config.subscriber_buffer);
        let multiplexer = SourceMultiplexer::new(Arc::clone(&queue));
        let pipeline = FixPipeline::new(&config, publisher.clone());

        let (snapshot_tx, snapshot_rx) = watch::channel(FixSnapshot::default());
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let consumer = Consumer {
            pipeline,
            queue: Arc::clone(&queue),
            snapshot_tx,
            control_rx,
            cancel: cancel.clone(),
            stale_check_interval: Duration::from_millis(config.stale_check_interval_ms),
            drain_on_shutdown: config.drain_on_shutdown,
        };
        let handle = runtime.spawn(consumer.run());

        tracing::info!(
            max_accuracy_m = config.max_accuracy_m,
            stale_timeout_ms = config.stale_timeout_ms,
            hysteresis_margin = config.hysteresis_margin,
            queue_capacity = config.queue_capacity,
            "Fix service started"
        );

        Ok(Self {
            config,
            queue,
            publisher,
            multiplexer,
            snapshot_rx,
            control_tx,
            cancel,
            consumer: Mutex::new(Some(handle)),
        })
    }

    /// The validated configuration in use.
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Current best fix, if any.
    pub fn best_fix(&self) -> Option<BestFix> {
        self.snapshot_rx.borrow().best_fix.clone()
    }

    /// Current engine state.
    pub fn engine_state(&self) -> EngineState {
        self.snapshot_rx.borrow().state
    }

    /// Pipeline counters.
    pub fn stats(&self) -> FixStats {
        let mut stats = self.snapshot_rx.borrow().stats;
        stats.publisher = self.publisher.stats();
        stats.queue_dropped = self.queue.dropped_count();
        stats
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> FixSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified whenever the snapshot changes.
    pub fn snapshots(&self) -> watch::Receiver<FixSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Start a source adapter.
    pub fn register_source(
        &self,
        adapter: Box<dyn SourceAdapter>,
    ) -> Result<SourceId, ServiceError> {
        self.ensure_running()?;
        Ok(self.multiplexer.register(adapter)?)
    }

    /// Stop a source adapter and wait for it to finish.
    pub async fn deregister_source(&self, source: SourceId) -> Result<(), ServiceError> {
        Ok(self.multiplexer.deregister(source).await?)
    }

    /// Sources with a running adapter.
    pub fn active_sources(&self) -> BTreeSet<SourceId> {
        self.multiplexer.active_sources()
    }

    /// Subscribe to source lifecycle events.
    pub fn source_events(&self) -> broadcast::Receiver<SourceEvent> {
        self.multiplexer.events()
    }

    /// Register a callback notified on every best-fix change.
    pub fn on_best_fix_changed<S>(
        &self,
        name: impl Into<String>,
        subscriber: S,
    ) -> Result<SubscriptionId, ServiceError>
    where
        S: FixSubscriber,
    {
        Ok(self.publisher.on_best_fix_changed(name, subscriber)?)
    }

    /// Remove a callback subscriber.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.publisher.unsubscribe(id)
    }

    /// Subscribe to best-fix changes as a broadcast stream.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<BestFix>, ServiceError> {
        Ok(self.publisher.subscribe()?)
    }

    /// Inject a sample directly, bypassing the adapters.
    pub fn submit(&self, sample: PositionSample) -> Result<SubmitOutcome, ServiceError> {
        self.ensure_running()?;
        Ok(self.queue.submit(sample))
    }

    /// Seed a last-known position, tagged [`SourceId::Manual`] and stamped now.
    ///
    /// Competes like any other sample, so a real fix replaces it as soon as
    /// one scores better.
    pub fn seed_last_known(
        &self,
        latitude: f64,
        longitude: f64,
        accuracy_m: f64,
    ) -> Result<SubmitOutcome, ServiceError> {
        tracing::info!(latitude, longitude, accuracy_m, "Seeding last known position");
        self.submit(PositionSample::new(
            latitude,
            longitude,
            accuracy_m,
            now_millis(),
            SourceId::Manual,
        ))
    }

    /// Forget the best fix and validation history. Returns once done.
    pub async fn reset(&self) -> Result<(), ServiceError> {
        self.ensure_running()?;
        let (ack_tx, ack_rx) = oneshot::channel();
        self.control_tx
            .send(Control::Reset(ack_tx))
            .await
            .map_err(|_| ServiceError::ShutDown)?;
        ack_rx.await.map_err(|_| ServiceError::ShutDown)
    }

    /// Stop adapters, drain the queue, release subscribers.
    ///
    /// Idempotent: later calls return the same final stats.
    pub async fn shutdown(&self) -> FixStats {
        let handle = self.consumer.lock().take();
        let Some(handle) = handle else {
            return self.stats();
        };

        tracing::info!("Shutting down fix service");
        self.multiplexer.shutdown().await;
        self.cancel.cancel();

        let stats = match handle.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Fix consumer task failed");
                self.snapshot_rx.borrow().stats
            }
        };
        self.publisher.shutdown();

        tracing::info!(
            processed = stats.processed(),
            published = stats.publisher.published,
            queue_dropped = stats.queue_dropped,
            discarded_on_shutdown = stats.discarded_on_shutdown,
            "Fix service stopped"
        );
        self.stats()
    }

    /// True once shutdown has started.
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled() || self.consumer.lock().is_none()
    }

    fn ensure_running(&self) -> Result<(), ServiceError> {
        if self.is_shut_down() {
            Err(ServiceError::ShutDown)
        } else {
            Ok(())
        }
    }
}

impl Drop for FixService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
