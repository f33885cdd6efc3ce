//! Pipeline runtime tuning

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Runtime settings applied to every pipeline the binary builds
///
/// # Example
///
/// ```toml
/// [runtime]
/// sink_queue_size = 1000
/// read_buffer_size = 65536
/// max_message_size = 1048576
/// shutdown_timeout_secs = 30
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Requests queued per sink before source loops wait
    /// Default: 1000
    pub sink_queue_size: usize,

    /// Bytes read per item from raw byte streams
    /// Default: 65536 (64KB)
    pub read_buffer_size: usize,

    /// Largest accepted line/message, longer ones are skipped
    /// Default: 1048576 (1MB)
    pub max_message_size: usize,

    /// Time each sink gets to close at shutdown
    /// Default: 30
    pub shutdown_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sink_queue_size: 1000,
            read_buffer_size: 64 * 1024,
            max_message_size: 1024 * 1024,
            shutdown_timeout_secs: 30,
        }
    }
}

impl RuntimeConfig {
    /// Get the shutdown timeout as a Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("sink_queue_size", self.sink_queue_size),
            ("read_buffer_size", self.read_buffer_size),
            ("max_message_size", self.max_message_size),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid_value("runtime", field, "must be at least 1"));
            }
        }
        if self.shutdown_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "runtime",
                "shutdown_timeout_secs",
                "must be at least 1 second",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.sink_queue_size, 1000);
        assert_eq!(config.read_buffer_size, 64 * 1024);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let config: RuntimeConfig = toml::from_str("sink_queue_size = 16").unwrap();
        assert_eq!(config.sink_queue_size, 16);
        assert_eq!(config.read_buffer_size, 64 * 1024);
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let config = RuntimeConfig {
            read_buffer_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("read_buffer_size"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = RuntimeConfig {
            shutdown_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
