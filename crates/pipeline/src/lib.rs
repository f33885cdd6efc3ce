//! pipekit - Pipeline runtime
//!
//! Sources feed a shared processor whose output fans out to every sink.
//! Pipelines chain into graphs through couplers.
//!
//! # Architecture
//!
//! ```text
//!  [Sources]            [Pipeline A]              [Sinks]
//!   file ────┐                                 ┌──→ stdout
//!   socket ──┼──→ loop per source ──→ Processor ──→├──→ file
//!   memory ──┘                                 └──→ CouplerSink ══╗
//!                                                                 ║
//!                       [Pipeline B]                              ║
//!   CouplerSource ◄══════════════════════════════════════════════╝
//! ```
//!
//! # Key Design
//!
//! - **One task per source**: loops run in parallel; order is kept per source only
//! - **One task per sink**: source loops reach sinks through bounded queues,
//!   so a `Sink` never needs to be thread-safe
//! - **Concurrent fan-out**: an item is queued on every sink before any
//!   outcome is awaited; all failures are combined into one error
//! - **Explicit error flags**: `PipelineError` carries `fatal` and `temporary`
//!   directly; the error handler is the only place that escalates
//! - **Rendezvous coupling**: a coupler push returns once the downstream
//!   pipeline has pulled the item
//!
//! # Example
//!
//! ```ignore
//! use pipekit_pipeline::{IterSource, Pipeline, process_fn};
//! use pipekit_codec::Printer;
//! use tokio_util::sync::CancellationToken;
//!
//! let mut pipeline = Pipeline::new("increment", process_fn(|n: u32| async move { Ok(n + 1) }));
//! pipeline
//!     .add_source(IterSource::new([1, 2, 3]))
//!     .add_writer(tokio::io::stdout(), Printer);
//!
//! let report = pipeline.run(CancellationToken::new()).await;
//! assert!(report.is_clean());
//! ```

mod config;
mod context;
mod coupler;
mod error;
mod handler;
mod ids;
mod metrics;
mod pipeline;
mod processor;
mod runner;
mod sink;
mod sink_handle;
mod source;
mod source_set;

pub use config::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_SINK_QUEUE_SIZE, PipelineConfig};
pub use context::Context;
pub use coupler::{CouplerSink, CouplerSource, coupler};
pub use error::{BoxError, ErrorKind, PipelineError, Result};
pub use handler::{ErrorHandler, HandlerFn, LogErrorHandler, handler_fn};
pub use ids::{SinkId, SourceId};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::{Pipeline, PipelineHandle, RunReport, StopReason};
pub use processor::{Identity, ProcessFn, Processor, process_fn};
pub use runner::{BoxedRun, Runnable, run_many};
pub use sink::{NopClose, Sink, WriterSink};
pub use sink_handle::SinkHandle;
pub use source::{
    BufferSource, DEFAULT_READ_BUFFER_SIZE, IterSource, MessageReader, MessageSource, Source,
};
