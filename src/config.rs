use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Board archive
    pub api_base_url: String,
    pub username: String,
    pub password: String,
    pub board: String,

    // Progress table
    pub output_path: PathBuf,

    // Retry
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: required_env("BBS_API_URL")?,
            username: required_env("BBS_USERNAME")?,
            password: required_env("BBS_PASSWORD")?,
            board: required_env("BOARD_NAME")?,
            output_path: PathBuf::from(env_or_default("OUTPUT_PATH", "./data/daily_tally.csv")),
            max_retries: parse_env_u32("MAX_RETRIES", 3)?,
            retry_delay: Duration::from_secs(parse_env_u64("RETRY_DELAY_SECS", 5)?),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_RETRIES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.board.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "BOARD_NAME".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.username.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "BBS_USERNAME".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if url::Url::parse(&self.api_base_url).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "BBS_API_URL".to_string(),
                message: format!("must be an absolute URL, got '{}'", self.api_base_url),
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }

    /// Configuration for tests: local endpoint, zero retry delay.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:1".to_string(),
            username: "tester".to_string(),
            password: "secret".to_string(),
            board: "Stock".to_string(),
            output_path: PathBuf::from("./data/test_tally.csv"),
            max_retries: 3,
            retry_delay: Duration::ZERO,
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
