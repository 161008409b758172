//! High-level search entry point.
//!
//! [`EventSearch`] ties the catalog, topology and execution settings together:
//! it validates a [`SearchRequest`], plans the targets and segments, and runs
//! the segment pipeline into a sink.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::AsyncWrite;
use tracing::info;

use crate::error::{Result, SearchError};
use crate::exec::SearchExecutor;
use crate::filter::{Filter, PatternChain, compile};
use crate::merge::SegmentMerger;
use crate::pipeline::{PipelineStats, SegmentPipeline};
use crate::render::OutputFormat;
use crate::segment::{Segment, SearchWindow};
use crate::source::{LogSource, LogSourceRegistry};
use crate::target::{SearchTarget, resolve_targets};
use crate::topology::Topology;

/// What to search for.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Window start; records before it are dropped.
    pub start: DateTime<Utc>,
    /// Window end, normally the current time.
    pub now: DateTime<Utc>,
    /// Source names to search; empty means every source.
    pub sources: Vec<String>,
    /// AND-combined filters.
    pub filters: Vec<Filter>,
    /// Output encoding.
    pub format: OutputFormat,
}

impl SearchRequest {
    /// Creates a request from `start` until now, over every source.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            now: Utc::now(),
            sources: Vec::new(),
            filters: Vec::new(),
            format: OutputFormat::default(),
        }
    }

    /// Sets the window end.
    #[must_use]
    pub const fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Restricts the search to the named sources.
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    /// Sets the filters.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

/// A validated, resolved search, ready to run.
#[derive(Debug, Clone)]
pub struct SearchPlan {
    /// The validated window.
    pub window: SearchWindow,
    /// Selected sources.
    pub sources: Vec<Arc<LogSource>>,
    /// Compiled filters.
    pub chain: Arc<PatternChain>,
    /// Resolved targets.
    pub targets: Vec<SearchTarget>,
    /// Segments in search order.
    pub segments: Vec<Segment>,
}

impl SearchPlan {
    /// Number of distinct hosts the plan touches.
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.targets
            .iter()
            .map(|t| t.host.id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Fleet event search.
pub struct EventSearch {
    registry: LogSourceRegistry,
    topology: Arc<dyn Topology>,
    pipeline: SegmentPipeline,
}

impl std::fmt::Debug for EventSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSearch")
            .field("sources", &self.registry.len())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl EventSearch {
    /// Creates a search over `registry` and `topology` using `executor`.
    #[must_use]
    pub fn new(
        registry: LogSourceRegistry,
        topology: Arc<dyn Topology>,
        executor: SearchExecutor,
    ) -> Self {
        Self::with_pipeline(
            registry,
            topology,
            SegmentPipeline::new(SegmentMerger::new(executor)),
        )
    }

    /// Creates a search with a preconfigured pipeline.
    #[must_use]
    pub const fn with_pipeline(
        registry: LogSourceRegistry,
        topology: Arc<dyn Topology>,
        pipeline: SegmentPipeline,
    ) -> Self {
        Self {
            registry,
            topology,
            pipeline,
        }
    }

    /// The source catalog.
    #[must_use]
    pub const fn registry(&self) -> &LogSourceRegistry {
        &self.registry
    }

    /// Validates `request` and resolves it against the topology.
    ///
    /// # Errors
    ///
    /// Fails on an oversized window, an empty filter list, an unknown source
    /// or a filter that does not compile. No host is contacted.
    pub fn plan(&self, request: &SearchRequest) -> Result<SearchPlan> {
        let window = SearchWindow::new(request.start, request.now)?;
        if request.filters.is_empty() {
            return Err(SearchError::NoFilters);
        }
        let sources = self.registry.select(&request.sources)?;
        let chain = Arc::new(compile(&request.filters)?);
        let targets = resolve_targets(&sources, self.topology.as_ref());
        let segments = window.segments();

        Ok(SearchPlan {
            window,
            sources,
            chain,
            targets,
            segments,
        })
    }

    /// Runs `request`, writing rendered output to `sink`.
    ///
    /// # Errors
    ///
    /// Returns planning errors before anything is executed, and the first
    /// execution, render or write error afterwards.
    pub async fn run<W>(&self, request: &SearchRequest, sink: &mut W) -> Result<PipelineStats>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let plan = self.plan(request)?;
        let executor = self.pipeline.merger().executor();
        let remote = plan.targets.iter().filter(|t| !executor.is_local(t)).count();
        info!(
            sources = plan.sources.len(),
            hosts = plan.host_count(),
            targets = plan.targets.len(),
            remote_targets = remote,
            segments = plan.segments.len(),
            patterns = ?plan.chain.patterns(),
            "starting search"
        );

        let stats = self
            .pipeline
            .run(
                &plan.segments,
                &plan.targets,
                Arc::clone(&plan.chain),
                plan.window.start(),
                request.format.renderer(),
                sink,
            )
            .await?;
        info!(segments = stats.segments, records = stats.records, "search complete");
        Ok(stats)
    }
}
