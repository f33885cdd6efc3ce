//! pipekit Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use pipekit_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[runtime]\nsink_queue_size = 64").unwrap();
//! assert_eq!(config.runtime.sink_queue_size, 64);
//! ```
//!
//! # Example Full Config
//!
//! ```toml
//! [log]
//! filter = "info"
//! json = false
//!
//! [runtime]
//! sink_queue_size = 1000
//! read_buffer_size = 65536
//! max_message_size = 1048576
//! shutdown_timeout_secs = 30
//! ```

mod error;
mod logging;
mod runtime;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use logging::LogConfig;
pub use runtime::RuntimeConfig;

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// Pipeline runtime tuning
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.log.validate()?;
        self.runtime.validate()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
