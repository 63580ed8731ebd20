//! Source multiplexer - runs N adapters into one ingestion queue.
//!
//! Each registered adapter runs under its own supervisor task. When an
//! adapter returns an error or panics, its supervisor removes it and
//! broadcasts [`SourceEvent::Down`]; the other sources keep feeding the
//! queue untouched.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{join_task, SampleSink, SourceAdapter, SourceError};
use crate::queue::IngestionQueue;
use crate::sample::SourceId;

/// Capacity of the source event channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Source lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// An adapter was registered and started.
    Up(SourceId),
    /// An adapter failed and was removed.
    Down { source: SourceId, reason: String },
    /// An adapter ended normally (end of feed or deregistered).
    Finished(SourceId),
}

impl SourceEvent {
    /// The source the event is about.
    pub fn source(&self) -> SourceId {
        match self {
            Self::Up(source) | Self::Finished(source) => *source,
            Self::Down { source, .. } => *source,
        }
    }
}

impl fmt::Display for SourceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up(source) => write!(f, "{} up", source),
            Self::Down { source, reason } => write!(f, "{} down: {}", source, reason),
            Self::Finished(source) => write!(f, "{} finished", source),
        }
    }
}

/// Multiplexer errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultiplexerError {
    /// An adapter for this source is already active.
    #[error("source {0} is already registered")]
    AlreadyRegistered(SourceId),

    /// No active adapter for this source.
    #[error("source {0} is not registered")]
    NotRegistered(SourceId),

    /// Adapters need a Tokio runtime.
    #[error("no Tokio runtime available to run source adapters")]
    NoRuntime,

    /// The multiplexer was shut down.
    #[error("source multiplexer is shut down")]
    ShutDown,
}

struct ActiveSource {
    generation: u64,
    cancel: CancellationToken,
    supervisor: JoinHandle<()>,
}

struct MultiplexerState {
    active: HashMap<SourceId, ActiveSource>,
    next_generation: u64,
    shut_down: bool,
}

struct Inner {
    queue: Arc<IngestionQueue>,
    state: Mutex<MultiplexerState>,
    events_tx: broadcast::Sender<SourceEvent>,
}

/// Runs source adapters and merges their samples into one queue.
#[derive(Clone)]
pub struct SourceMultiplexer {
    inner: Arc<Inner>,
}

impl fmt::Debug for SourceMultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceMultiplexer")
            .field("active", &self.active_sources())
            .finish()
    }
}

impl SourceMultiplexer {
    /// Create a multiplexer feeding `queue`.
    pub fn new(queue: Arc<IngestionQueue>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                queue,
                state: Mutex::new(MultiplexerState {
                    active: HashMap::new(),
                    next_generation: 0,
                    shut_down: false,
                }),
                events_tx,
            }),
        }
    }

    /// Start an adapter under supervision.
    pub fn register(&self, adapter: Box<dyn SourceAdapter>) -> Result<SourceId, MultiplexerError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| MultiplexerError::NoRuntime)?;
        let source = adapter.source_id();

        let mut state = self.inner.state.lock();
        if state.shut_down {
            return Err(MultiplexerError::ShutDown);
        }
        if state.active.contains_key(&source) {
            return Err(MultiplexerError::AlreadyRegistered(source));
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let sink = SampleSink::new(source, Arc::clone(&self.inner.queue));
        let (cancel, task) = adapter.start(sink).into_parts();

        // Up goes out before the supervisor can report the end
        tracing::info!(source = %source, "Source registered");
        let _ = self.inner.events_tx.send(SourceEvent::Up(source));

        let inner = Arc::clone(&self.inner);
        let supervisor = runtime.spawn(supervise(inner, source, generation, task));

        state.active.insert(
            source,
            ActiveSource {
                generation,
                cancel,
                supervisor,
            },
        );
        Ok(source)
    }

    /// Stop an adapter and wait for it to finish.
    pub async fn deregister(&self, source: SourceId) -> Result<(), MultiplexerError> {
        let entry = self
            .inner
            .state
            .lock()
            .active
            .remove(&source)
            .ok_or(MultiplexerError::NotRegistered(source))?;

        entry.cancel.cancel();
        let _ = entry.supervisor.await;
        tracing::info!(source = %source, "Source deregistered");
        Ok(())
    }

    /// Sources with a running adapter.
    pub fn active_sources(&self) -> BTreeSet<SourceId> {
        self.inner.state.lock().active.keys().copied().collect()
    }

    /// Subscribe to source lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<SourceEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Stop every adapter. Idempotent; later registrations fail.
    pub async fn shutdown(&self) {
        let entries: Vec<(SourceId, ActiveSource)> = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            state.active.drain().collect()
        };

        for (_, entry) in &entries {
            entry.cancel.cancel();
        }
        for (source, entry) in entries {
            if let Err(e) = entry.supervisor.await {
                tracing::warn!(source = %source, error = %e, "Source supervisor failed");
            }
        }
        tracing::debug!("Source multiplexer shut down");
    }

    /// True once [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.state.lock().shut_down
    }
}

/// Await an adapter task and report how it ended.
async fn supervise(
    inner: Arc<Inner>,
    source: SourceId,
    generation: u64,
    task: JoinHandle<Result<(), SourceError>>,
) {
    let result = join_task(task).await;

    {
        let mut state = inner.state.lock();
        if state
            .active
            .get(&source)
            .is_some_and(|entry| entry.generation == generation)
        {
            state.active.remove(&source);
        }
    }

    let event = match result {
        Ok(()) => {
            tracing::info!(source = %source, "Source finished");
            SourceEvent::Finished(source)
        }
        Err(e) => {
            tracing::warn!(source = %source, error = %e, "Source failed, removed");
            SourceEvent::Down {
                source,
                reason: e.to_string(),
            }
        }
    };
    let _ = inner.events_tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::RawPosition;
    use crate::source::{ChannelSource, SourceHandle};
    use std::time::Duration;

    /// Adapter that fails or panics right away.
    struct Faulty {
        source: SourceId,
        panic: bool,
    }

    impl SourceAdapter for Faulty {
        fn source_id(&self) -> SourceId {
            self.source
        }

        fn start(self: Box<Self>, _sink: SampleSink) -> SourceHandle {
            let panic = self.panic;
            SourceHandle::spawn(move |_| async move {
                if panic {
                    panic!("adapter bug");
                }
                Err(SourceError::Failed("feed lost".to_string()))
            })
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<SourceEvent>) -> SourceEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event expected")
            .expect("event channel open")
    }

    #[tokio::test]
    async fn test_register_and_merge() {
        let queue = Arc::new(IngestionQueue::new(16));
        let multiplexer = SourceMultiplexer::new(Arc::clone(&queue));

        let (gps, gps_tx) = ChannelSource::new(SourceId::Gps, 4);
        let (network, network_tx) = ChannelSource::new(SourceId::Network, 4);
        multiplexer.register(Box::new(gps)).unwrap();
        multiplexer.register(Box::new(network)).unwrap();

        assert_eq!(
            multiplexer.active_sources(),
            BTreeSet::from([SourceId::Gps, SourceId::Network])
        );

        gps_tx.send(RawPosition::new(53.5, 10.0, 5.0, 1)).await.unwrap();
        network_tx.send(RawPosition::new(53.5, 10.0, 50.0, 2)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while queue.len() < 2 {
                queue.notified().await;
            }
        })
        .await
        .unwrap();

        let mut sources: Vec<SourceId> = queue.drain().map(|s| s.source()).collect();
        sources.sort();
        assert_eq!(sources, vec![SourceId::Gps, SourceId::Network]);

        multiplexer.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let multiplexer = SourceMultiplexer::new(Arc::new(IngestionQueue::default()));
        let (first, _tx1) = ChannelSource::new(SourceId::Gps, 4);
        let (second, _tx2) = ChannelSource::new(SourceId::Gps, 4);

        multiplexer.register(Box::new(first)).unwrap();
        assert_eq!(
            multiplexer.register(Box::new(second)),
            Err(MultiplexerError::AlreadyRegistered(SourceId::Gps))
        );
        multiplexer.shutdown().await;
    }

    #[tokio::test]
    async fn test_failing_source_is_isolated() {
        let multiplexer = SourceMultiplexer::new(Arc::new(IngestionQueue::default()));
        let mut events = multiplexer.events();

        let (gps, _gps_tx) = ChannelSource::new(SourceId::Gps, 4);
        multiplexer.register(Box::new(gps)).unwrap();
        assert_eq!(next_event(&mut events).await, SourceEvent::Up(SourceId::Gps));

        multiplexer
            .register(Box::new(Faulty {
                source: SourceId::Network,
                panic: false,
            }))
            .unwrap();
        assert_eq!(
            next_event(&mut events).await,
            SourceEvent::Up(SourceId::Network)
        );
        assert_eq!(
            next_event(&mut events).await,
            SourceEvent::Down {
                source: SourceId::Network,
                reason: "feed lost".to_string()
            }
        );

        assert_eq!(
            multiplexer.active_sources(),
            BTreeSet::from([SourceId::Gps])
        );
        multiplexer.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_source_is_isolated() {
        let multiplexer = SourceMultiplexer::new(Arc::new(IngestionQueue::default()));
        let mut events = multiplexer.events();

        multiplexer
            .register(Box::new(Faulty {
                source: SourceId::Passive,
                panic: true,
            }))
            .unwrap();
        next_event(&mut events).await;

        match next_event(&mut events).await {
            SourceEvent::Down { source, reason } => {
                assert_eq!(source, SourceId::Passive);
                assert!(reason.contains("adapter bug"));
            }
            other => panic!("expected down event, got {:?}", other),
        }

        // The slot is free again
        let (again, _tx) = ChannelSource::new(SourceId::Passive, 4);
        assert!(multiplexer.register(Box::new(again)).is_ok());
        multiplexer.shutdown().await;
    }

    #[tokio::test]
    async fn test_deregister() {
        let multiplexer = SourceMultiplexer::new(Arc::new(IngestionQueue::default()));
        let mut events = multiplexer.events();
        let (gps, _tx) = ChannelSource::new(SourceId::Gps, 4);
        multiplexer.register(Box::new(gps)).unwrap();

        multiplexer.deregister(SourceId::Gps).await.unwrap();
        assert!(multiplexer.active_sources().is_empty());
        assert_eq!(
            multiplexer.deregister(SourceId::Gps).await,
            Err(MultiplexerError::NotRegistered(SourceId::Gps))
        );

        next_event(&mut events).await;
        assert_eq!(
            next_event(&mut events).await,
            SourceEvent::Finished(SourceId::Gps)
        );
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let multiplexer = SourceMultiplexer::new(Arc::new(IngestionQueue::default()));
        let (gps, _tx) = ChannelSource::new(SourceId::Gps, 4);
        multiplexer.register(Box::new(gps)).unwrap();

        multiplexer.shutdown().await;
        multiplexer.shutdown().await;

        assert!(multiplexer.is_shut_down());
        assert!(multiplexer.active_sources().is_empty());

        let (late, _tx) = ChannelSource::new(SourceId::Network, 4);
        assert_eq!(
            multiplexer.register(Box::new(late)),
            Err(MultiplexerError::ShutDown)
        );
    }

    #[test]
    fn test_register_without_runtime_fails() {
        let multiplexer = SourceMultiplexer::new(Arc::new(IngestionQueue::default()));
        let (gps, _tx) = ChannelSource::new(SourceId::Gps, 4);
        assert_eq!(
            multiplexer.register(Box::new(gps)),
            Err(MultiplexerError::NoRuntime)
        );
    }
}
