//! Configuration module for the Autolearn agent.
//!
//! This module handles parsing configuration from environment variables and
//! deriving every protocol delay from the length of one time unit.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `AUTOLEARN_STORE_PATH` | No | `~/.autolearn/state.json` | JSON file backing the session store |
//! | `AUTOLEARN_TIME_UNIT_MS` | No | 1000 | Length of one time unit in milliseconds |
//!
//! # Example
//!
//! ```no_run
//! use autolearn_agent::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Store: {}", config.store_path.display());
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

/// Default store directory name relative to home.
const DEFAULT_STORE_DIR: &str = ".autolearn";

/// Default store file name.
const DEFAULT_STORE_FILE: &str = "state.json";

/// Default time unit in milliseconds.
const DEFAULT_TIME_UNIT_MS: u64 = 1000;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Configuration for the Autolearn CLI and agents.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the JSON file backing the persistent store.
    pub store_path: PathBuf,

    /// Length of one protocol time unit.
    pub time_unit: Duration,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `AUTOLEARN_TIME_UNIT_MS` is set but is not a positive integer
    /// - The home directory cannot be determined and no store path is set
    pub fn from_env() -> Result<Self, ConfigError> {
        // Optional: AUTOLEARN_STORE_PATH (default: ~/.autolearn/state.json)
        let store_path = match env::var("AUTOLEARN_STORE_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => {
                let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
                base_dirs
                    .home_dir()
                    .join(DEFAULT_STORE_DIR)
                    .join(DEFAULT_STORE_FILE)
            }
        };

        // Optional: AUTOLEARN_TIME_UNIT_MS (default: 1000, must be > 0)
        let time_unit_ms = match env::var("AUTOLEARN_TIME_UNIT_MS") {
            Ok(val) => parse_time_unit(&val)?,
            Err(_) => DEFAULT_TIME_UNIT_MS,
        };

        Ok(Self {
            store_path,
            time_unit: Duration::from_millis(time_unit_ms),
        })
    }

    /// Replaces the time unit with `override_ms` when one is given.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if `override_ms` is zero.
    pub fn with_time_unit_ms(mut self, override_ms: Option<u64>) -> Result<Self, ConfigError> {
        if let Some(ms) = override_ms {
            self.time_unit = Duration::from_millis(validate_time_unit(ms)?);
        }
        Ok(self)
    }
}

fn parse_time_unit(val: &str) -> Result<u64, ConfigError> {
    let ms = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        key: "AUTOLEARN_TIME_UNIT_MS".to_string(),
        message: format!("expected positive integer, got '{val}'"),
    })?;
    validate_time_unit(ms)
}

fn validate_time_unit(ms: u64) -> Result<u64, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::InvalidValue {
            key: "AUTOLEARN_TIME_UNIT_MS".to_string(),
            message: "time unit must be greater than 0".to_string(),
        });
    }
    Ok(ms)
}

/// Delays and thresholds used by the page agents.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTimings {
    /// Polling period for both agents.
    pub tick: Duration,

    /// Wait before inspecting a fresh video page's playback state.
    pub settle: Duration,

    /// Wait between play-control interaction attempts.
    pub click_retry: Duration,

    /// Wait before re-checking whether playback actually started.
    pub playback_verify: Duration,

    /// How long a course click may go without a registered video agent.
    pub navigation_timeout: Duration,

    /// Wait between selecting a card and activating it.
    pub card_click_delay: Duration,

    /// Wait between deciding to paginate and clicking the control.
    pub pagination_delay: Duration,

    /// Wait before reloading the list page in loop mode.
    pub reload_delay: Duration,

    /// Lifetime of the per-card activation marker.
    pub marker_lifetime: Duration,

    /// Wait before clicking a dismissible dialog or confirmation prompt.
    pub dialog_delay: Duration,

    /// Media time (in seconds) beyond which playback is assumed to be a resume.
    pub resume_threshold_secs: f64,
}

impl AgentTimings {
    /// Derives all delays from the length of one time unit.
    #[must_use]
    pub fn from_unit(unit: Duration) -> Self {
        Self {
            tick: unit * 3,
            settle: unit * 2,
            click_retry: unit / 2,
            playback_verify: unit,
            navigation_timeout: unit * 10,
            card_click_delay: unit,
            pagination_delay: unit * 2,
            reload_delay: unit * 2,
            marker_lifetime: unit * 5,
            dialog_delay: unit / 2,
            resume_threshold_secs: 10.0,
        }
    }
}

impl Default for AgentTimings {
    fn default() -> Self {
        Self::from_unit(Duration::from_millis(DEFAULT_TIME_UNIT_MS))
    }
}
