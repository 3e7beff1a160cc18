//! Tracing subscriber setup for the `segtrack` binary.
//!
//! Human-readable output goes to stderr so stdout stays clean for summaries
//! and tables. `RUST_LOG` takes precedence over `-v` when set.

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    /// One JSON object per line, for CI log ingestion.
    pub use_json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
        }
    }
}

impl LoggingConfig {
    /// Map the number of `-v` flags to a level.
    pub fn from_verbosity(verbose: u8, use_json: bool) -> Self {
        let level = match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self { level, use_json }
    }

    fn filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
        EnvFilter::new(format!(
            "{level},segtrack_core={level},segtrack={level},h2=warn,hyper=warn,reqwest=warn",
            level = self.level
        ))
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = config.filter();
        let registry = tracing_subscriber::registry().with(filter);

        let result = if config.use_json {
            registry
                .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
                .try_init()
        } else {
            registry
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .try_init()
        };

        if let Err(e) = result {
            eprintln!("logging already initialised: {e}");
        }
    });

    if env::var_os("RUST_LOG").is_some() {
        tracing::debug!("log filter taken from RUST_LOG");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(LoggingConfig::from_verbosity(0, false).level, Level::INFO);
        assert_eq!(LoggingConfig::from_verbosity(1, false).level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_verbosity(5, true).level, Level::TRACE);
        assert!(LoggingConfig::from_verbosity(0, true).use_json);
    }

    #[test]
    fn default_is_info_text() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
    }
}
