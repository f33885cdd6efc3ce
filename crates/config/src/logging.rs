//! Diagnostics settings
//!
//! Pipelines own stdout, so pipekit's own logs go to stderr unless a file
//! is configured.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// `[log]` section
///
/// ```toml
/// [log]
/// filter = "info,pipekit_pipeline=debug"
/// json = true
/// file = "/var/log/pipekit.log"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive, `--log-level` replaces it
    pub filter: String,

    /// Emit one JSON object per event instead of console lines
    pub json: bool,

    /// Append to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
            file: None,
        }
    }
}

impl LogConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.filter.trim().is_empty() {
            return Err(ConfigError::invalid_value("log", "filter", "must not be empty"));
        }
        Ok(())
    }
}
