//! One tracker run: fetch every configured segment, append to the log, redraw plots.

use crate::config::TrackerConfig;
use crate::ledger::{LedgerError, SegmentLog};
use crate::lock::{LockError, RunLock};
use crate::plot;
use crate::publish::{self, GitPublisher, PublishError, PublishOutcome};
use crate::strava::{ApiError, FetchProgress, SegmentId, SegmentSnapshot, SegmentSource};
use chrono::{NaiveDate, Utc};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("all {} segments failed to fetch", .failures.len())]
    AllSegmentsFailed { failures: Vec<(SegmentId, ApiError)> },

    #[error("authenticating with {source_name}: {error}")]
    Auth { source_name: String, error: ApiError },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Results of fetching a list of segments.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub fetched: Vec<SegmentSnapshot>,
    pub failures: Vec<(SegmentId, ApiError)>,
}

/// Fetch `ids` in order. A failed segment is recorded and skipped; once the
/// source stops being available the rest are marked failed without a request.
pub fn fetch_segments(
    source: &dyn SegmentSource,
    ids: &[SegmentId],
    progress: &dyn FetchProgress,
) -> FetchBatch {
    let total = ids.len();
    let mut batch = FetchBatch::default();

    for (i, &id) in ids.iter().enumerate() {
        progress.on_start(id, i, total);
        let result = source.fetch_segment(id);
        progress.on_complete(id, &result);

        match result {
            Ok(snapshot) => batch.fetched.push(snapshot),
            Err(e) => batch.failures.push((id, e)),
        }

        if !source.is_available() && i + 1 < total {
            tracing::error!(
                source = source.name(),
                remaining = total - i - 1,
                "source unavailable, skipping remaining segments"
            );
            batch
                .failures
                .extend(ids[i + 1..].iter().map(|&rest| (rest, ApiError::CircuitOpen)));
            break;
        }
    }

    progress.on_batch_complete(batch.fetched.len(), batch.failures.len(), total);
    batch
}

/// What a run did.
#[derive(Debug)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub total: usize,
    pub fetched: Vec<SegmentSnapshot>,
    pub failures: Vec<(SegmentId, ApiError)>,
    pub rows_written: usize,
    pub plots: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run the daily update for `date`.
///
/// Partial failure still writes the rows that were fetched. Fails only when
/// the log cannot be read or written, or when no segment could be fetched.
pub fn run_update(
    config: &TrackerConfig,
    source: &dyn SegmentSource,
    date: NaiveDate,
    progress: &dyn FetchProgress,
) -> Result<RunSummary, PipelineError> {
    let started = Instant::now();
    let ids = &config.segment_ids;

    // Open before fetching so a broken log fails fast without spending API quota.
    let mut log = SegmentLog::open(&config.paths.log_file)?;

    let FetchBatch { fetched, failures } = fetch_segments(source, ids, progress);

    if fetched.is_empty() {
        tracing::error!(segments = ids.len(), "no segments fetched, log left untouched");
        return Err(PipelineError::AllSegmentsFailed { failures });
    }

    for snapshot in &fetched {
        log.record(snapshot, date);
    }
    let rows_written = log.flush()?;

    let fetched_ids: Vec<SegmentId> = fetched.iter().map(|s| s.id).collect();
    let plots = plot::render_all(&log, &fetched_ids, &config.paths.plot_dir);

    let summary = RunSummary {
        date,
        total: ids.len(),
        fetched,
        failures,
        rows_written,
        plots,
        elapsed: started.elapsed(),
    };
    tracing::info!(
        %date,
        fetched = summary.fetched.len(),
        failed = summary.failures.len(),
        rows = summary.rows_written,
        plots = summary.plots.len(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "update finished"
    );
    Ok(summary)
}

/// A finished run and, when a publisher was given, what publishing did.
#[derive(Debug)]
pub struct TrackerRun {
    pub summary: RunSummary,
    pub published: Option<PublishOutcome>,
}

/// The scheduled job end to end: take the run lock, authenticate, update,
/// then publish the log and charts.
///
/// Every failure before the log is written returns early, so nothing is
/// committed for a run that recorded nothing.
pub fn run_and_publish(
    config: &TrackerConfig,
    source: &dyn SegmentSource,
    date: NaiveDate,
    progress: &dyn FetchProgress,
    publisher: Option<&GitPublisher>,
) -> Result<TrackerRun, PipelineError> {
    let _lock = RunLock::acquire(&config.paths.lock_file, RunLock::DEFAULT_STALE_AFTER)?;

    source.authenticate().map_err(|error| PipelineError::Auth {
        source_name: source.name().to_string(),
        error,
    })?;

    let summary = run_update(config, source, date, progress)?;

    let published = match publisher {
        Some(publisher) => {
            Some(publisher.publish(&publish::artifacts(&config.paths), Utc::now())?)
        }
        None => None,
    };
    Ok(TrackerRun { summary, published })
}

/// Redraw every segment's chart from the log alone.
pub fn regenerate_plots(log_path: &Path, plot_dir: &Path) -> Result<Vec<PathBuf>, LedgerError> {
    let log = SegmentLog::open(log_path)?;
    let ids: Vec<SegmentId> = log.segments().into_iter().map(|(id, _)| id).collect();
    if ids.is_empty() {
        tracing::warn!(path = %log_path.display(), "log has no rows, nothing to plot");
    }
    Ok(plot::render_all(&log, &ids, plot_dir))
}
