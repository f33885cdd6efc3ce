//! Pipeline metrics
//!
//! Atomic counters shared by every source loop of a pipeline.
//! All operations use relaxed ordering; values are eventually consistent.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one pipeline run
///
/// # Thread Safety
///
/// All methods are safe to call from multiple source loops concurrently.
/// Values may be slightly stale when read while the pipeline is running.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Items successfully pulled from sources
    items_read: AtomicU64,

    /// Items the processor turned into output
    items_processed: AtomicU64,

    /// Outputs delivered to every sink without error
    items_written: AtomicU64,

    /// Individual sink pushes that succeeded
    sink_writes_success: AtomicU64,

    /// Individual sink pushes that failed
    sink_writes_failed: AtomicU64,

    /// Bytes reported by sinks
    bytes_written: AtomicU64,

    /// Source pulls that failed (read or decode)
    read_errors: AtomicU64,

    /// Processor failures
    process_errors: AtomicU64,

    /// Fan-outs with at least one failing sink
    write_errors: AtomicU64,

    /// Errors the handler returned as fatal
    fatal_errors: AtomicU64,

    /// Sources that reached end of stream
    sources_exhausted: AtomicU64,
}

impl PipelineMetrics {
    /// Create new metrics instance with all counters at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            items_read: AtomicU64::new(0),
            items_processed: AtomicU64::new(0),
            items_written: AtomicU64::new(0),
            sink_writes_success: AtomicU64::new(0),
            sink_writes_failed: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            process_errors: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            fatal_errors: AtomicU64::new(0),
            sources_exhausted: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_read(&self) {
        self.items_read.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_processed(&self) {
        self.items_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_process_error(&self) {
        self.process_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one fan-out
    ///
    /// `succeeded` and `failed` count sinks; `bytes` is the sum reported by
    /// the successful ones.
    #[inline]
    pub fn record_fanout(&self, succeeded: u64, failed: u64, bytes: u64) {
        self.sink_writes_success
            .fetch_add(succeeded, Ordering::Relaxed);
        self.sink_writes_failed.fetch_add(failed, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        if failed == 0 {
            self.items_written.fetch_add(1, Ordering::Relaxed);
        } else {
            self.write_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_fatal(&self) {
        self.fatal_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_exhausted(&self) {
        self.sources_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time copy of all counters
    #[inline]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_read: self.items_read.load(Ordering::Relaxed),
            items_processed: self.items_processed.load(Ordering::Relaxed),
            items_written: self.items_written.load(Ordering::Relaxed),
            sink_writes_success: self.sink_writes_success.load(Ordering::Relaxed),
            sink_writes_failed: self.sink_writes_failed.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            process_errors: self.process_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            fatal_errors: self.fatal_errors.load(Ordering::Relaxed),
            sources_exhausted: self.sources_exhausted.load(Ordering::Relaxed),
        }
    }

    /// Get items read count
    #[inline]
    pub fn items_read(&self) -> u64 {
        self.items_read.load(Ordering::Relaxed)
    }

    /// Get items written count
    #[inline]
    pub fn items_written(&self) -> u64 {
        self.items_written.load(Ordering::Relaxed)
    }
}

/// Point-in-time snapshot of pipeline metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub items_read: u64,
    pub items_processed: u64,
    pub items_written: u64,
    pub sink_writes_success: u64,
    pub sink_writes_failed: u64,
    pub bytes_written: u64,
    pub read_errors: u64,
    pub process_errors: u64,
    pub write_errors: u64,
    pub fatal_errors: u64,
    pub sources_exhausted: u64,
}

impl MetricsSnapshot {
    /// Total errors seen on either side of the processor
    #[inline]
    pub fn total_errors(&self) -> u64 {
        self.read_errors + self.process_errors + self.write_errors
    }

    /// Sink push success rate (0.0 - 1.0)
    ///
    /// Returns None if no sink push has been attempted.
    #[inline]
    pub fn sink_success_rate(&self) -> Option<f64> {
        let total = self.sink_writes_success + self.sink_writes_failed;
        if total == 0 {
            None
        } else {
            Some(self.sink_writes_success as f64 / total as f64)
        }
    }
}
