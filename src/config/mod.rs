//! Configuration management.
//!
//! Configuration is read from `~/.config/postwatch/config.toml` unless a path
//! is given on the command line. If the default file doesn't exist, one with
//! comments is created. Every section falls back to its defaults, so a partial
//! file is fine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::consumer::ConsumerConfig;
use crate::scheduler::SchedulerConfig;
use crate::source::reddit::RedditConfig;
use crate::stats::StatisticsConfig;

/// Environment variables that override the Reddit credentials in the file.
pub const ENV_REDDIT_CLIENT_ID: &str = "POSTWATCH_REDDIT_CLIENT_ID";
pub const ENV_REDDIT_CLIENT_SECRET: &str = "POSTWATCH_REDDIT_CLIENT_SECRET";

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub consumer: ConsumerConfig,
    pub statistics: StatisticsConfig,
    pub reddit: RedditConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Write logs to the terminal.
    pub console: bool,
    /// Write hourly log files.
    pub file: bool,
    pub directory: PathBuf,
    /// Filter directive for the log files.
    pub file_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            file: true,
            directory: PathBuf::from("logs"),
            file_level: "debug".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing default file is created with comments and defaults are
    /// returned. A missing explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let config_path = Self::default_config_path()?;
                if config_path.exists() {
                    Self::load_from(&config_path)?
                } else {
                    Self::write_default_config(&config_path, false)?;
                    Self::default()
                }
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse the file at `path` without touching the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/postwatch/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("postwatch").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var(ENV_REDDIT_CLIENT_ID) {
            self.reddit.client_id = Some(id);
        }
        if let Ok(secret) = std::env::var(ENV_REDDIT_CLIENT_SECRET) {
            self.reddit.client_secret = Some(secret);
        }
    }

    /// Write the commented default config to `path`.
    ///
    /// Refuses to replace an existing file unless `force` is set.
    pub fn write_default_config(path: &Path, force: bool) -> Result<(), ConfigError> {
        if path.exists() && !force {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Render the effective configuration with secrets masked.
    pub fn to_display_toml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if shown.reddit.client_secret.is_some() {
            shown.reddit.client_secret = Some("********".to_string());
        }
        toml::to_string_pretty(&shown).map_err(ConfigError::Serialize)
    }

    /// Generate the default config file content with comments.
    pub fn default_config_content() -> String {
        r##"# postwatch configuration

[scheduler]
# Lower bound on the wait between two polls of the same source (milliseconds).
# Values below 100 are raised to 100.
minimum_interval_ms = 500

# Log a warning when the feed holds this many unconsumed posts.
feed_warning_threshold = 100

[consumer]
# How long the consumer sleeps when the feed is empty (milliseconds).
idle_ms = 500

[statistics]
enabled = true
filename = "statistics.json"
interval_ms = 5000

[reddit]
# The Reddit source is only enabled when both credentials are set, either
# here or through POSTWATCH_REDDIT_CLIENT_ID / POSTWATCH_REDDIT_CLIENT_SECRET.
# client_id = ""
# client_secret = ""

# Subreddits to watch, with or without the "r/" prefix.
subreddits = []

# Maximum number of post ids per refresh request.
posts_per_specific_request = 100

# Also treat posts created this many seconds before startup as new.
# lookback_secs = 3600

user_agent = "postwatch/0.1.0"

[logging]
# Console filter directive, overridden by RUST_LOG.
level = "info"
console = true

# Hourly log files (postwatch.yyyy-MM-dd-HH.log).
file = true
directory = "logs"
file_level = "debug"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Config file already exists at {0} (use --force to overwrite)")]
    AlreadyExists(PathBuf),

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to render config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
