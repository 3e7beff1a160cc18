//! Tracker configuration.
//!
//! Credentials and the segment list come from the environment when all four
//! `STRAVA_*` variables are set (the CI path), otherwise from the `[strava]`
//! section of a TOML file. Optional `[paths]`, `[api]` and `[publish]`
//! sections in the same file override defaults either way.
//!
//! ```toml
//! [strava]
//! client_id = 12345
//! client_secret = "..."
//! refresh_token = "..."
//! segment_ids = "229781, 8109834"
//!
//! [paths]
//! log_file = "all_segments_log.csv"
//! plot_dir = "plots"
//! ```

use crate::strava::SegmentId;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_CLIENT_ID: &str = "STRAVA_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "STRAVA_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "STRAVA_REFRESH_TOKEN";
pub const ENV_SEGMENT_IDS: &str = "STRAVA_SEGMENT_IDS";

pub const DEFAULT_CONFIG_FILE: &str = "segtrack.toml";
pub const DEFAULT_LOG_FILE: &str = "all_segments_log.csv";
pub const DEFAULT_PLOT_DIR: &str = "plots";
pub const DEFAULT_LOCK_FILE: &str = ".segtrack.lock";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "configuration not found: set STRAVA_CLIENT_ID, STRAVA_CLIENT_SECRET, \
         STRAVA_REFRESH_TOKEN and STRAVA_SEGMENT_IDS, or create '{}'",
        .0.display()
    )]
    NotFound(PathBuf),

    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("[strava] section missing from config file")]
    MissingSection,

    #[error("missing keys in [strava] section: {}", .0.join(", "))]
    MissingKeys(Vec<&'static str>),

    #[error("invalid segment id '{0}': expected a positive integer")]
    InvalidSegmentId(String),

    #[error("no valid segment ids found; provide a non-empty comma-separated list")]
    NoSegments,
}

/// Where credentials were resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Environment,
    File(PathBuf),
}

/// OAuth application credentials plus the long-lived refresh token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Output locations, relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub log_file: PathBuf,
    pub plot_dir: PathBuf,
    pub lock_file: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            plot_dir: PathBuf::from(DEFAULT_PLOT_DIR),
            lock_file: PathBuf::from(DEFAULT_LOCK_FILE),
        }
    }
}

/// HTTP behaviour of the Strava client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub token_url: String,
    pub timeout_secs: u64,
    /// Pause before each segment request.
    pub request_delay_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.strava.com/api/v3".into(),
            token_url: "https://www.strava.com/oauth/token".into(),
            timeout_secs: 30,
            request_delay_ms: 500,
            max_retries: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// How artifacts are committed back to the repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PublishSettings {
    pub commit_prefix: String,
    pub push: bool,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            commit_prefix: "Update Strava segment data".into(),
            push: true,
        }
    }
}

/// Fully resolved tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub credentials: Credentials,
    pub segment_ids: Vec<SegmentId>,
    pub paths: PathSettings,
    pub api: ApiSettings,
    pub publish: PublishSettings,
    pub source: ConfigSource,
}

// ── File schema ─────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    strava: Option<StravaSection>,
    #[serde(default)]
    paths: PathSettings,
    #[serde(default)]
    api: ApiSettings,
    #[serde(default)]
    publish: PublishSettings,
}

#[derive(Debug, Default, Deserialize)]
struct StravaSection {
    client_id: Option<Scalar>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    segment_ids: Option<SegmentIdList>,
}

impl StravaSection {
    fn missing_keys(&self, need_segments: bool) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.is_none() {
            missing.push("client_id");
        }
        if self.client_secret.is_none() {
            missing.push("client_secret");
        }
        if self.refresh_token.is_none() {
            missing.push("refresh_token");
        }
        if need_segments && self.segment_ids.is_none() {
            missing.push("segment_ids");
        }
        missing
    }
}

/// Client ids are numeric on Strava but commonly quoted in config files.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(i64),
    Text(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SegmentIdList {
    List(Vec<u64>),
    Text(String),
}

impl TrackerConfig {
    /// Resolve configuration from the process environment and `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Resolve configuration using `lookup` for environment variables.
    ///
    /// When all four `STRAVA_*` variables are set the file only supplies the
    /// optional sections, and a file that fails to parse is skipped with a
    /// warning.
    pub fn load_with(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env_value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let (Some(credentials), Some(ids)) =
            (env_credentials(&env_value), env_value(ENV_SEGMENT_IDS))
        {
            tracing::debug!("loading credentials from environment variables");
            let file = settings_beside_environment(path);
            return Ok(Self {
                credentials,
                segment_ids: parse_segment_ids(&ids)?,
                paths: file.paths,
                api: file.api,
                publish: file.publish,
                source: ConfigSource::Environment,
            });
        }

        let text = read_optional(path)?.ok_or_else(|| ConfigError::NotFound(path.to_path_buf()))?;
        tracing::debug!(path = %path.display(), "loading credentials from config file");
        let mut config = Self::from_toml(&text)?;
        config.source = ConfigSource::File(path.to_path_buf());
        Ok(config)
    }

    /// Parse a complete configuration from TOML text (no environment lookup).
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(text)?;
        Self::from_file_config(file)
    }

    fn from_file_config(file: FileConfig) -> Result<Self, ConfigError> {
        let strava = file.strava.ok_or(ConfigError::MissingSection)?;
        let missing = strava.missing_keys(true);

        let (Some(client_id), Some(client_secret), Some(refresh_token), Some(ids)) = (
            strava.client_id,
            strava.client_secret,
            strava.refresh_token,
            strava.segment_ids,
        ) else {
            return Err(ConfigError::MissingKeys(missing));
        };

        let segment_ids = match ids {
            SegmentIdList::Text(raw) => parse_segment_ids(&raw)?,
            SegmentIdList::List(list) => {
                let joined: Vec<String> = list.iter().map(u64::to_string).collect();
                parse_segment_ids(&joined.join(","))?
            }
        };

        Ok(Self {
            credentials: Credentials {
                client_id: client_id.into_string(),
                client_secret,
                refresh_token,
            },
            segment_ids,
            paths: file.paths,
            api: file.api,
            publish: file.publish,
            source: ConfigSource::File(PathBuf::from(DEFAULT_CONFIG_FILE)),
        })
    }
}

/// Credentials and HTTP settings without a segment list, for commands that
/// talk to Strava but do not track anything.
#[derive(Debug, Clone)]
pub struct ApiAccess {
    pub credentials: Credentials,
    pub api: ApiSettings,
    pub source: ConfigSource,
}

impl ApiAccess {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Same precedence as [`TrackerConfig::load_with`], minus
    /// `STRAVA_SEGMENT_IDS` and the `segment_ids` key.
    pub fn load_with(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env_value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(credentials) = env_credentials(&env_value) {
            return Ok(Self {
                credentials,
                api: settings_beside_environment(path).api,
                source: ConfigSource::Environment,
            });
        }

        let text = read_optional(path)?.ok_or_else(|| ConfigError::NotFound(path.to_path_buf()))?;
        let file: FileConfig = toml::from_str(&text)?;
        let strava = file.strava.ok_or(ConfigError::MissingSection)?;
        let missing = strava.missing_keys(false);
        let (Some(client_id), Some(client_secret), Some(refresh_token)) =
            (strava.client_id, strava.client_secret, strava.refresh_token)
        else {
            return Err(ConfigError::MissingKeys(missing));
        };

        Ok(Self {
            credentials: Credentials {
                client_id: client_id.into_string(),
                client_secret,
                refresh_token,
            },
            api: file.api,
            source: ConfigSource::File(path.to_path_buf()),
        })
    }
}

fn env_credentials(env_value: &impl Fn(&str) -> Option<String>) -> Option<Credentials> {
    Some(Credentials {
        client_id: env_value(ENV_CLIENT_ID)?,
        client_secret: env_value(ENV_CLIENT_SECRET)?,
        refresh_token: env_value(ENV_REFRESH_TOKEN)?,
    })
}

/// Optional sections to pair with environment credentials. The file may be
/// absent or broken; either way defaults apply.
fn settings_beside_environment(path: &Path) -> FileConfig {
    let parsed = read_optional(path).and_then(|text| match text {
        Some(text) => Ok(toml::from_str::<FileConfig>(&text)?),
        None => Ok(FileConfig::default()),
    });
    parsed.unwrap_or_else(|e| {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "ignoring config file; credentials come from the environment"
        );
        FileConfig::default()
    })
}

/// The parts of the configuration that need no credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSettings {
    pub paths: PathSettings,
    pub publish: PublishSettings,
}

/// Read `[paths]` and `[publish]` from `path`, falling back to defaults when
/// the file does not exist. The `[strava]` section is ignored.
pub fn load_local_settings(path: &Path) -> Result<LocalSettings, ConfigError> {
    let file: FileConfig = match read_optional(path)? {
        Some(text) => toml::from_str(&text)?,
        None => FileConfig::default(),
    };
    Ok(LocalSettings {
        paths: file.paths,
        publish: file.publish,
    })
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parse a comma-separated list of segment ids.
///
/// Whitespace and empty entries are ignored, duplicates keep their first
/// position, and at least one id must remain.
pub fn parse_segment_ids(raw: &str) -> Result<Vec<SegmentId>, ConfigError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let id = token
            .parse::<u64>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| ConfigError::InvalidSegmentId(token.to_string()))?;
        if seen.insert(id) {
            ids.push(SegmentId(id));
        } else {
            tracing::warn!(segment = id, "duplicate segment id ignored");
        }
    }

    if ids.is_empty() {
        return Err(ConfigError::NoSegments);
    }
    Ok(ids)
}
