//! Segtrack core: daily Strava segment tracking.
//!
//! - Configuration from environment variables or a TOML file
//! - Strava client with token refresh, retry and a circuit breaker
//! - Append-only CSV log of daily attempt counts
//! - Per-segment PNG charts
//! - Git publishing of the log and charts

pub mod config;
pub mod explore;
pub mod ledger;
pub mod lock;
pub mod pipeline;
pub mod plot;
pub mod publish;
pub mod schedule;
pub mod strava;

pub use config::TrackerConfig;
pub use ledger::{LogRow, SegmentLog};
pub use pipeline::{run_and_publish, run_update, RunSummary};
pub use strava::{SegmentId, SegmentSnapshot, SegmentSource};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types shared with the daemon loop are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<TrackerConfig>();
        require_sync::<TrackerConfig>();
        require_send::<SegmentLog>();
        require_sync::<SegmentLog>();
        require_send::<strava::StravaClient>();
        require_sync::<strava::StravaClient>();
        require_send::<strava::CircuitBreaker>();
        require_sync::<strava::CircuitBreaker>();
        require_send::<schedule::DailySchedule>();
        require_sync::<schedule::DailySchedule>();

        require_send::<strava::ApiError>();
        require_send::<pipeline::PipelineError>();
        require_send::<publish::PublishError>();
    }
}
