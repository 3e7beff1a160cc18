//! Strava v3 API client.
//!
//! Exchanges the refresh token for a short-lived access token, then reads
//! segment details and explores segments within a bounding box. Handles
//! retries with exponential backoff for transient failures and feeds rate
//! limit responses into the circuit breaker.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{ApiError, SegmentId, SegmentSnapshot, SegmentSource};
use crate::config::{ApiSettings, Credentials};
use crate::explore::{ActivityType, Bounds, ClimbCategory, ExploredSegment};
use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const BODY_EXCERPT_CHARS: usize = 500;

/// Upper bound on a single retry pause.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Short-lived bearer token minted from the refresh token.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_at: Option<i64>,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SegmentDetail {
    name: Option<String>,
    effort_count: Option<u64>,
    athlete_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ExploreResponse {
    #[serde(default)]
    segments: Vec<ExploredSegment>,
}

/// Blocking Strava API client.
pub struct StravaClient {
    http: Client,
    credentials: Credentials,
    settings: ApiSettings,
    circuit_breaker: Arc<CircuitBreaker>,
    token: Mutex<Option<AccessToken>>,
}

impl StravaClient {
    pub fn new(
        credentials: Credentials,
        settings: ApiSettings,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(settings.timeout())
            .user_agent(concat!("segtrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::ClientSetup(e.to_string()))?;

        Ok(Self {
            http,
            credentials,
            settings,
            circuit_breaker,
            token: Mutex::new(None),
        })
    }

    /// Exchange the refresh token for a fresh access token and keep it for later calls.
    pub fn refresh_access_token(&self) -> Result<AccessToken, ApiError> {
        tracing::info!("refreshing Strava access token");

        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
            ("f", "json"),
        ];

        let resp = self
            .execute(|http| http.post(&self.settings.token_url).form(&form))
            .map_err(|e| ApiError::TokenRefresh(e.to_string()))?;

        let body: TokenResponse = decode(resp).map_err(|e| ApiError::TokenRefresh(e.to_string()))?;

        let token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::TokenRefresh("response carried no access_token".into()))?;

        if body
            .refresh_token
            .as_deref()
            .is_some_and(|r| r != self.credentials.refresh_token)
        {
            tracing::warn!("Strava rotated the refresh token; update the stored STRAVA_REFRESH_TOKEN");
        }

        let access = AccessToken {
            token,
            expires_at: body
                .expires_at
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        };

        match access.expires_at {
            Some(at) => tracing::info!(expires_at = %at, "access token refreshed"),
            None => tracing::info!("access token refreshed"),
        }

        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(access.clone());
        Ok(access)
    }

    fn bearer(&self) -> Result<String, ApiError> {
        let cached = self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.token.clone());
        match cached {
            Some(token) => Ok(token),
            None => Ok(self.refresh_access_token()?.token),
        }
    }

    /// Current totals for a single segment.
    pub fn get_segment(&self, id: SegmentId) -> Result<SegmentSnapshot, ApiError> {
        let token = self.bearer()?;
        let url = format!("{}/segments/{id}", self.settings.base_url);

        let delay = self.settings.request_delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let resp = match self.execute(|http| http.get(&url).bearer_auth(&token)) {
            Err(ApiError::Http { status: 404, .. }) => return Err(ApiError::SegmentNotFound(id)),
            other => other?,
        };
        let detail: SegmentDetail = decode(resp)?;

        Ok(SegmentSnapshot {
            id,
            name: detail
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("Unknown Segment {id}")),
            effort_count: detail.effort_count.unwrap_or(0),
            athlete_count: detail.athlete_count.unwrap_or(0),
        })
    }

    /// Segments inside `bounds`, optionally filtered by climb category.
    pub fn explore_segments(
        &self,
        bounds: &Bounds,
        activity: ActivityType,
        min_cat: Option<ClimbCategory>,
        max_cat: Option<ClimbCategory>,
    ) -> Result<Vec<ExploredSegment>, ApiError> {
        let token = self.bearer()?;
        let url = format!("{}/segments/explore", self.settings.base_url);

        let mut query = vec![
            ("bounds", bounds.to_query()),
            ("activity_type", activity.as_str().to_string()),
        ];
        if let Some(cat) = min_cat {
            query.push(("min_cat", cat.value().to_string()));
        }
        if let Some(cat) = max_cat {
            query.push(("max_cat", cat.value().to_string()));
        }

        tracing::info!(bounds = %bounds.to_query(), activity = activity.as_str(), "exploring segments");

        let resp = self.execute(|http| http.get(&url).bearer_auth(&token).query(&query))?;
        let body: ExploreResponse = decode(resp)?;
        Ok(body.segments)
    }

    /// Send a request with retry and circuit breaker handling.
    ///
    /// Server errors and connection failures are retried; every other
    /// non-success status is returned to the caller immediately.
    fn execute(&self, build: impl Fn(&Client) -> RequestBuilder) -> Result<Response, ApiError> {
        if !self.circuit_breaker.is_allowed() {
            tracing::debug!(status = ?self.circuit_breaker.status(), "request refused");
            return Err(ApiError::CircuitOpen);
        }

        let mut last_error = None;

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.settings.retry_base_delay(), attempt);
                tracing::debug!(attempt, ?delay, "retrying request");
                std::thread::sleep(delay);

                if !self.circuit_breaker.is_allowed() {
                    return Err(ApiError::CircuitOpen);
                }
            }

            let resp = match build(&self.http).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(ApiError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(ApiError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            if status.is_success() {
                self.circuit_breaker.record_success();
                return Ok(resp);
            }

            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    self.circuit_breaker.record_failure();
                    let header = |name: &str| {
                        resp.headers()
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("unknown")
                            .to_string()
                    };
                    return Err(ApiError::RateLimited {
                        usage: header("x-ratelimit-usage"),
                        limit: header("x-ratelimit-limit"),
                    });
                }
                StatusCode::FORBIDDEN => {
                    self.circuit_breaker.forbid();
                    return Err(http_error(resp));
                }
                StatusCode::UNAUTHORIZED => return Err(ApiError::Unauthorized),
                StatusCode::BAD_REQUEST => return Err(ApiError::BadRequest(body_excerpt(resp))),
                s if s.is_server_error() => {
                    self.circuit_breaker.record_failure();
                    last_error = Some(http_error(resp));
                    continue;
                }
                _ => return Err(http_error(resp)),
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::NetworkUnreachable("max retries exceeded".into())))
    }
}

impl SegmentSource for StravaClient {
    fn name(&self) -> &str {
        "strava"
    }

    fn authenticate(&self) -> Result<(), ApiError> {
        self.refresh_access_token().map(|_| ())
    }

    fn fetch_segment(&self, id: SegmentId) -> Result<SegmentSnapshot, ApiError> {
        self.get_segment(id)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let text = resp
        .text()
        .map_err(|e| ApiError::NetworkUnreachable(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| {
        ApiError::ResponseFormatChanged(format!("{e}; body: {}", excerpt(&text)))
    })
}

/// Pause before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// saturating and capped at [`MAX_RETRY_DELAY`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

fn http_error(resp: Response) -> ApiError {
    let status = resp.status().as_u16();
    ApiError::Http {
        status,
        body: body_excerpt(resp),
    }
}

fn body_excerpt(resp: Response) -> String {
    resp.text().map(|t| excerpt(&t)).unwrap_or_default()
}

fn excerpt(text: &str) -> String {
    text.chars().take(BODY_EXCERPT_CHARS).collect()
}
