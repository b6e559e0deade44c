//! Process configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Self-deadline applied when `PROCESS_DEADLINE_SECS` is not set.
pub const DEFAULT_PROCESS_DEADLINE: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of the serve database.
    pub serve_db_dir: PathBuf,
    /// Default sink for ancillary entry points; the collector proper takes
    /// its sink URLs from the registry.
    pub default_sink_url: Option<reqwest::Url>,
    /// Wall-clock lifetime after which the process retires itself.
    /// `None` disables the deadline.
    pub process_deadline: Option<Duration>,
    /// Diagnostic log filter, e.g. `info` or `logship_collector=debug`.
    pub log_level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "SERVE_DB_DIR is unset: it must have the value of an existing serve \
         database directory (an empty directory is fine)"
    )]
    MissingServeDbDir,
    #[error("SERVE_DB_DIR is set to a non-existent directory: {0:?}")]
    ServeDbDirMissing(PathBuf),
    #[error("SERVE_DB_DIR does not name a directory: {0:?}")]
    NotADirectory(PathBuf),
    #[error("LOGPLEX_URL does not parse: {0}")]
    BadSinkUrl(String),
    #[error("PROCESS_DEADLINE_SECS does not parse as a number of seconds: {0:?}")]
    BadDeadline(String),
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|name| std::env::var(name).ok())
    }

    /// Environment seam so tests can feed variables without mutating the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let serve_db_dir = PathBuf::from(
            lookup("SERVE_DB_DIR")
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingServeDbDir)?,
        );
        match std::fs::metadata(&serve_db_dir) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(ConfigError::NotADirectory(serve_db_dir)),
            Err(_) => return Err(ConfigError::ServeDbDirMissing(serve_db_dir)),
        }

        let default_sink_url = match lookup("LOGPLEX_URL") {
            Some(raw) => Some(
                reqwest::Url::parse(&raw).map_err(|e| ConfigError::BadSinkUrl(e.to_string()))?,
            ),
            None => None,
        };

        let process_deadline = match lookup("PROCESS_DEADLINE_SECS") {
            None => Some(DEFAULT_PROCESS_DEADLINE),
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => return Err(ConfigError::BadDeadline(raw)),
            },
        };

        let log_level = lookup("LOG_LEVEL")
            .map(|v| v.to_lowercase())
            .unwrap_or_else(|| "info".to_string());

        Ok(Config {
            serve_db_dir,
            default_sink_url,
            process_deadline,
            log_level,
        })
    }
}
