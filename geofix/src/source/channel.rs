//! Channel source - positions pushed by the host application.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{SampleSink, SourceAdapter, SourceError, SourceHandle};
use crate::sample::{RawPosition, SourceId};

/// Adapter fed through an `mpsc::Sender<RawPosition>`.
///
/// Finishes once every sender is dropped.
#[derive(Debug)]
pub struct ChannelSource {
    source: SourceId,
    rx: mpsc::Receiver<RawPosition>,
}

impl ChannelSource {
    /// Create the adapter and the sender the host application keeps.
    pub fn new(source: SourceId, capacity: usize) -> (Self, mpsc::Sender<RawPosition>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { source, rx }, tx)
    }

    async fn run(mut self, sink: SampleSink, cancel: CancellationToken) -> Result<(), SourceError> {
        let mut forwarded: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(source = %self.source, forwarded, "Channel source cancelled");
                    break;
                }
                position = self.rx.recv() => match position {
                    Some(raw) => {
                        sink.submit(raw);
                        forwarded += 1;
                    }
                    None => {
                        tracing::debug!(
                            source = %self.source,
                            forwarded,
                            "Channel source closed by sender"
                        );
                        break;
                    }
                },
            }
        }

        Ok(())
    }
}

impl SourceAdapter for ChannelSource {
    fn source_id(&self) -> SourceId {
        self.source
    }

    fn start(self: Box<Self>, sink: SampleSink) -> SourceHandle {
        SourceHandle::spawn(move |cancel| self.run(sink, cancel))
    }
}
