//! Segment source trait and structured error types.
//!
//! The SegmentSource trait abstracts over where segment statistics come from
//! (the Strava API in production, canned snapshots in tests) so the pipeline
//! never depends on the network directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Strava segment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Point-in-time statistics for one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSnapshot {
    pub id: SegmentId,
    pub name: String,
    /// Total attempts ever recorded on the segment.
    pub effort_count: u64,
    /// Total unique athletes.
    pub athlete_count: u64,
}

/// Structured error types for Strava API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("unauthorized (401): access token invalid or expired")]
    Unauthorized,

    #[error("rate limited by Strava (usage {usage}, limit {limit})")]
    RateLimited { usage: String, limit: String },

    #[error("segment not found: {0}")]
    SegmentNotFound(SegmentId),

    #[error("bad request (400): {0}")]
    BadRequest(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("hard stop: Strava has refused repeated requests (circuit breaker open)")]
    CircuitOpen,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

/// Anything that can produce a current snapshot for a segment id.
pub trait SegmentSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Obtain whatever session the source needs before the first fetch.
    fn authenticate(&self) -> Result<(), ApiError> {
        Ok(())
    }

    /// Fetch current statistics for one segment.
    fn fetch_segment(&self, id: SegmentId) -> Result<SegmentSnapshot, ApiError>;

    /// Whether further requests are worth attempting (false once rate limited hard).
    fn is_available(&self) -> bool {
        true
    }
}

/// Progress callback for multi-segment fetches.
pub trait FetchProgress {
    /// Called when starting to fetch a segment.
    fn on_start(&self, id: SegmentId, index: usize, total: usize);

    /// Called when a segment fetch completes.
    fn on_complete(&self, id: SegmentId, result: &Result<SegmentSnapshot, ApiError>);

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that writes through `tracing`.
pub struct TracingProgress;

impl FetchProgress for TracingProgress {
    fn on_start(&self, id: SegmentId, index: usize, total: usize) {
        tracing::info!(segment = %id, "[{}/{}] fetching segment", index + 1, total);
    }

    fn on_complete(&self, id: SegmentId, result: &Result<SegmentSnapshot, ApiError>) {
        match result {
            Ok(snap) => tracing::info!(
                segment = %id,
                name = %snap.name,
                efforts = snap.effort_count,
                athletes = snap.athlete_count,
                "segment fetched"
            ),
            Err(e) => tracing::warn!(segment = %id, error = %e, "segment fetch failed, skipping"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!("fetch complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}

/// Reporter that discards everything.
pub struct SilentProgress;

impl FetchProgress for SilentProgress {
    fn on_start(&self, _id: SegmentId, _index: usize, _total: usize) {}
    fn on_complete(&self, _id: SegmentId, _result: &Result<SegmentSnapshot, ApiError>) {}
    fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
}
