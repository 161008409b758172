//! Sequential segment driver.
//!
//! Segments are merged one at a time, oldest first, and their records are
//! streamed through a bounded channel into a single renderer. The renderer is
//! only finished after the last segment succeeds; on failure whatever was
//! already rendered is flushed and the stream is left open.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info_span};

use crate::error::{Result, SearchError};
use crate::filter::PatternChain;
use crate::merge::SegmentMerger;
use crate::render::Renderer;
use crate::segment::Segment;
use crate::target::SearchTarget;

/// Default number of records buffered between the merger and the renderer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

enum RenderMsg {
    Record(Value),
    End,
}

/// Counters from a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Segments searched.
    pub segments: usize,
    /// Records handed to the renderer.
    pub records: usize,
}

/// Drives segments through the merger into a renderer.
#[derive(Debug, Clone)]
pub struct SegmentPipeline {
    merger: SegmentMerger,
    capacity: usize,
}

impl SegmentPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub const fn new(merger: SegmentMerger) -> Self {
        Self {
            merger,
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// The merger each segment goes through.
    #[must_use]
    pub const fn merger(&self) -> &SegmentMerger {
        &self.merger
    }

    /// Sets the renderer channel capacity (at least 1).
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Searches `segments` in order and renders every hit into `sink`.
    ///
    /// `window_start` cuts records from the first segment only.
    ///
    /// # Errors
    ///
    /// Returns the first merge, render or write error. Records from segments
    /// that completed before the failure have already been written.
    pub async fn run<W>(
        &self,
        segments: &[Segment],
        targets: &[SearchTarget],
        chain: Arc<PatternChain>,
        window_start: DateTime<Utc>,
        mut renderer: Box<dyn Renderer>,
        sink: &mut W,
    ) -> Result<PipelineStats>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let (tx, mut rx) = mpsc::channel::<RenderMsg>(self.capacity);
        let stopped = || SearchError::Render("renderer stopped".to_string());

        let produce = async move {
            let mut stats = PipelineStats::default();
            for (index, segment) in segments.iter().enumerate() {
                let cutoff = (index == 0).then_some(window_start);
                let span = info_span!("segment", segment = %segment, index);
                let merge = self
                    .merger
                    .merge(targets, *segment, &chain, cutoff)
                    .instrument(span);

                // A dead renderer cancels the fan-out in progress.
                let hits = tokio::select! {
                    hits = merge => hits?,
                    () = tx.closed() => return Err(stopped()),
                };

                debug!(segment = %segment, hits = hits.len(), "forwarding segment");
                stats.segments += 1;
                for hit in hits {
                    tx.send(RenderMsg::Record(hit.record))
                        .await
                        .map_err(|_| stopped())?;
                    stats.records += 1;
                }
            }
            tx.send(RenderMsg::End).await.map_err(|_| stopped())?;
            Ok::<_, SearchError>(stats)
        };

        // Owns the receiver so a render or write failure closes the channel.
        let consume = async move {
            let mut buf = Vec::new();
            while let Some(msg) = rx.recv().await {
                buf.clear();
                match msg {
                    RenderMsg::Record(record) => renderer.render(&record, &mut buf)?,
                    RenderMsg::End => renderer.finish(&mut buf)?,
                }
                sink.write_all(&buf).await?;
            }
            sink.flush().await?;
            Ok::<_, SearchError>(())
        };

        let (produced, written) = tokio::join!(produce, consume);
        written?;
        produced
    }
}
