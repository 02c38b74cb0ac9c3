//! Configuration loading from grammatic.toml.

use eventlog::LOGS_DIR;
use eventlog::excerpt::DEFAULT_EXCERPT_LIMIT;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file looked up in the repository root.
pub const CONFIG_FILE: &str = "grammatic.toml";

/// Shortest excerpt limit that still fits the truncation marker.
const MIN_EXCERPT_LIMIT: usize = 4;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Log file location and write limits.
    #[serde(default)]
    pub logs: LogsConfig,

    /// Query defaults.
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Deserialize)]
pub struct LogsConfig {
    /// Logs directory, relative to the repository root.
    #[serde(default = "default_logs_dir")]
    pub dir: PathBuf,

    /// Maximum characters of a persisted stderr excerpt.
    #[serde(default = "default_excerpt_limit")]
    pub excerpt_limit: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
            excerpt_limit: default_excerpt_limit(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryConfig {
    /// Number of events `builds` and `parses` show without `--limit`.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from(LOGS_DIR)
}

fn default_excerpt_limit() -> usize {
    DEFAULT_EXCERPT_LIMIT
}

fn default_limit() -> usize {
    10
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the configuration for a repository.
    ///
    /// An explicit path must exist. Otherwise `<repo_root>/grammatic.toml` is
    /// used when present, and built-in defaults when not.
    pub fn resolve(repo_root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let path = repo_root.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Absolute-or-root-relative logs directory.
    pub fn logs_dir(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.logs.dir)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.logs.excerpt_limit < MIN_EXCERPT_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "logs.excerpt_limit must be at least {MIN_EXCERPT_LIMIT}, got {}",
                self.logs.excerpt_limit
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
