//! Per-segment fan-out and chronological merge.
//!
//! Every target of a segment is searched concurrently (at most
//! [`DEFAULT_CONCURRENCY`] at a time). Results are only ordered once all
//! targets have finished, so the merged output is exactly sorted no matter
//! which target completes first.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{Result, SearchError};
use crate::exec::SearchExecutor;
use crate::filter::PatternChain;
use crate::segment::Segment;
use crate::target::SearchTarget;

/// Default number of targets searched at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Field holding a record's timestamp.
pub const TIME_FIELD: &str = "time";

/// A parsed search match.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// The matched line as the search returned it.
    pub line: String,
    /// Record timestamp.
    pub time: DateTime<Utc>,
    /// The structured record.
    pub record: Value,
}

/// Parses one raw line into a hit.
///
/// # Errors
///
/// Returns [`SearchError::MalformedRecord`] if the line is not a JSON object
/// with an RFC 3339 `time` field.
pub fn parse_hit(line: &str) -> Result<Hit> {
    let record: Value = serde_json::from_str(line)
        .map_err(|e| SearchError::MalformedRecord(format!("{e}: {line}")))?;
    if !record.is_object() {
        return Err(SearchError::MalformedRecord(format!("not an object: {line}")));
    }

    let time = record
        .get(TIME_FIELD)
        .and_then(Value::as_str)
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| SearchError::MalformedRecord(format!("missing or invalid time: {line}")))?;

    Ok(Hit {
        line: line.to_string(),
        time,
        record,
    })
}

/// Parses raw search output, skipping blank lines and dropping malformed ones.
#[must_use]
pub fn parse_hits(raw: &str) -> Vec<Hit> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_hit(line) {
            Ok(hit) => Some(hit),
            Err(e) => {
                warn!(error = %e, "skipping unparseable search hit");
                None
            }
        })
        .collect()
}

/// Flattens per-target hits in target order, applies the cutoff and sorts
/// stably by time.
fn collate(per_target: Vec<Vec<Hit>>, cutoff: Option<DateTime<Utc>>) -> Vec<Hit> {
    let mut hits: Vec<Hit> = per_target
        .into_iter()
        .flatten()
        .filter(|hit| cutoff.is_none_or(|c| hit.time >= c))
        .collect();
    hits.sort_by_key(|hit| hit.time);
    hits
}

/// Fans a segment out across targets and merges the results.
#[derive(Debug, Clone)]
pub struct SegmentMerger {
    executor: Arc<SearchExecutor>,
    concurrency: usize,
}

impl SegmentMerger {
    /// Creates a merger with the default concurrency.
    #[must_use]
    pub fn new(executor: SearchExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sets the maximum number of concurrent target searches (at least 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Maximum concurrent target searches.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// The underlying executor.
    #[must_use]
    pub fn executor(&self) -> &SearchExecutor {
        &self.executor
    }

    /// Searches every target for `segment` and returns hits in time order.
    ///
    /// Hits earlier than `cutoff` are dropped. Equal timestamps keep target
    /// order, then line order.
    ///
    /// # Errors
    ///
    /// The first target failure cancels the remaining searches and is returned.
    pub async fn merge(
        &self,
        targets: &[SearchTarget],
        segment: Segment,
        chain: &Arc<PatternChain>,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<Hit>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, target) in targets.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let executor = Arc::clone(&self.executor);
            let chain = Arc::clone(chain);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| SearchError::Worker(e.to_string()))?;
                let raw = executor.execute(&target, &segment, &chain).await?;
                let hits = parse_hits(&raw);
                debug!(target = %target, segment = %segment, hits = hits.len(), "target searched");
                Ok::<_, SearchError>((index, hits))
            });
        }

        let mut per_target: Vec<Vec<Hit>> = vec![Vec::new(); targets.len()];
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| SearchError::Worker(e.to_string())).and_then(|r| r);
            match outcome {
                Ok((index, hits)) => per_target[index] = hits,
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        let started = Instant::now();
        let hits = collate(per_target, cutoff);
        debug!(
            segment = %segment,
            hits = hits.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "segment merged"
        );
        Ok(hits)
    }
}
