//! Runtime tuning for a pipeline

use std::time::Duration;

/// Default depth of each sink task's request queue
pub const DEFAULT_SINK_QUEUE_SIZE: usize = 1000;

/// Default time allowed for each sink to close during shutdown
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pipeline runtime settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Requests that may wait in a sink's queue before source loops block
    pub sink_queue_size: usize,

    /// Upper bound on one sink's close at shutdown; the sink task is aborted
    /// once it elapses
    pub close_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sink_queue_size: DEFAULT_SINK_QUEUE_SIZE,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl PipelineConfig {
    /// Set the sink queue size (zero is treated as one)
    pub fn with_sink_queue_size(mut self, size: usize) -> Self {
        self.sink_queue_size = size.max(1);
        self
    }

    /// Set the per-sink close timeout
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}
