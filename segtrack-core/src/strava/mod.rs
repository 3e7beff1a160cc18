//! Strava API access: client, rate-limit circuit breaker, source trait.

pub mod circuit_breaker;
pub mod client;
pub mod provider;

pub use circuit_breaker::{BreakerStatus, CircuitBreaker, OpenReason};
pub use client::{AccessToken, StravaClient};
pub use provider::{
    ApiError, FetchProgress, SegmentId, SegmentSnapshot, SegmentSource, SilentProgress,
    TracingProgress,
};
