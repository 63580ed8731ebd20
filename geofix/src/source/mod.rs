//! Source adapters and the multiplexer that runs them.
//!
//! A source adapter turns some external feed into [`RawPosition`]s. It is
//! started with a [`SampleSink`] that tags every position with the adapter's
//! [`SourceId`] and submits it to the shared ingestion queue, and returns a
//! [`SourceHandle`] that stops it.
//!
//! Built-in adapters:
//!
//! - [`ForeFlightSource`]: ForeFlight `XGPS` UDP broadcasts
//! - [`ChannelSource`]: positions pushed by the host application
//! - [`ReplaySource`]: positions replayed from a recorded file
//!
//! # Example
//!
//! ```ignore
//! let multiplexer = SourceMultiplexer::new(queue);
//! let (source, tx) = ChannelSource::new(SourceId::Network, 16);
//! multiplexer.register(Box::new(source))?;
//!
//! tx.send(RawPosition::new(53.63, 9.99, 25.0, now_millis())).await?;
//! ```

mod channel;
mod foreflight;
mod multiplexer;
mod replay;

pub use channel::ChannelSource;
pub use foreflight::{ForeFlightConfig, ForeFlightSource};
pub use multiplexer::{MultiplexerError, SourceEvent, SourceMultiplexer};
pub use replay::{
    load_replay, parse_replay, replay_sources, Pacing, ReplayRecord, ReplaySource,
};

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::queue::{IngestionQueue, SubmitOutcome};
use crate::sample::{PositionSample, RawPosition, SourceId};

/// Errors raised by a single source. Never affect other sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to bind the UDP socket.
    #[error("Failed to bind UDP socket on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while reading the feed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed replay record.
    #[error("replay line {line}: {reason}")]
    Replay { line: usize, reason: String },

    /// The adapter task panicked.
    #[error("source task panicked: {0}")]
    Panicked(String),

    /// Any other adapter failure.
    #[error("{0}")]
    Failed(String),
}

/// A position feed.
pub trait SourceAdapter: Send + 'static {
    /// Source tag applied to every sample this adapter produces.
    fn source_id(&self) -> SourceId;

    /// Start producing into `sink`. Must be called within a Tokio runtime.
    fn start(self: Box<Self>, sink: SampleSink) -> SourceHandle;
}

/// Tags raw positions with a source and submits them to the ingestion queue.
#[derive(Debug, Clone)]
pub struct SampleSink {
    source: SourceId,
    queue: Arc<IngestionQueue>,
}

impl SampleSink {
    /// Create a sink feeding `queue` on behalf of `source`.
    pub fn new(source: SourceId, queue: Arc<IngestionQueue>) -> Self {
        Self { source, queue }
    }

    /// The source every sample is tagged with.
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Tag and submit. Never blocks.
    pub fn submit(&self, raw: RawPosition) -> SubmitOutcome {
        self.queue.submit(PositionSample::from_raw(raw, self.source))
    }
}

/// Running adapter: a cancellation token plus the adapter's task.
#[derive(Debug)]
pub struct SourceHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), SourceError>>,
}

impl SourceHandle {
    /// Spawn an adapter task that receives its own cancellation token.
    ///
    /// ```ignore
    /// SourceHandle::spawn(move |cancel| self.run(sink, cancel))
    /// ```
    pub fn spawn<F, Fut>(run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), SourceError>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(cancel.clone()));
        Self { cancel, task }
    }

    /// True once the adapter task has returned.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the adapter and wait for it to finish.
    pub async fn stop(self) -> Result<(), SourceError> {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the adapter to finish on its own.
    pub async fn join(self) -> Result<(), SourceError> {
        join_task(self.task).await
    }

    pub(crate) fn into_parts(self) -> (CancellationToken, JoinHandle<Result<(), SourceError>>) {
        (self.cancel, self.task)
    }
}

/// Await an adapter task, turning a panic into [`SourceError::Panicked`].
pub(crate) async fn join_task(
    task: JoinHandle<Result<(), SourceError>>,
) -> Result<(), SourceError> {
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(SourceError::Panicked(panic_message(e.into_panic()))),
        Err(e) => Err(SourceError::Failed(e.to_string())),
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
