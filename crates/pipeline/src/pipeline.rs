//! Pipeline runtime
//!
//! A pipeline owns a set of sources, one processor and a set of sinks.
//! `run` spawns one loop per source; every loop pulls an item, runs the
//! processor on it and fans the output out to all sinks, routing any
//! failure through the error handler.
//!
//! ```text
//! [source 0] ──→ loop 0 ──┐                 ┌──→ sink task 0 ──→ Sink
//! [source 1] ──→ loop 1 ──┼──→ Processor ──→├──→ sink task 1 ──→ Sink
//! [source N] ──→ loop N ──┘    (shared)     └──→ sink task M ──→ Sink
//! ```
//!
//! # Stopping
//!
//! Loops report to the orchestrator through two distinct signals:
//! `Exhausted` when their source reaches end of stream and `Abort` when the
//! error handler returns a fatal error. Either one makes the orchestrator
//! look at the source set, and it stops only once the set is empty. A fatal
//! error therefore stops the pipeline after its remaining sources drain, or
//! earlier if the caller cancels.
//!
//! Shutdown cancels every loop, then closes each sink exactly once. Close
//! failures are logged and never escalated.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pipekit_codec::{Decoder, Encoder};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::context::Context;
use crate::coupler::coupler;
use crate::error::{ErrorKind, PipelineError, Result};
use crate::handler::{ErrorHandler, LogErrorHandler};
use crate::ids::{SinkId, SourceId};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::processor::Processor;
use crate::sink::{Sink, WriterSink};
use crate::sink_handle::SinkHandle;
use crate::source::{BufferSource, MessageReader, MessageSource, Source};
use crate::source_set::SourceSet;

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;

/// Why a pipeline stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// Every source reached end of stream
    Drained,
    /// The caller's cancellation token fired
    Cancelled,
    /// `run` was called with no source registered
    NoSources,
    /// The pipeline's task panicked (only reported by `run_many`)
    Panicked,
}

impl StopReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Drained => "drained",
            Self::Cancelled => "cancelled",
            Self::NoSources => "no_sources",
            Self::Panicked => "panicked",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Pipeline name
    pub pipeline: String,

    /// What ended the run
    pub reason: StopReason,

    /// Counters at the moment the run ended
    pub metrics: MetricsSnapshot,

    /// First fatal error returned by the error handler, if any
    pub fatal_error: Option<String>,

    /// Sources sent through a handle that were still queued when the
    /// pipeline began stopping; they never ran
    pub sources_dropped: usize,

    /// Wall time spent in `run`
    pub elapsed: Duration,
}

impl RunReport {
    pub(crate) fn panicked(pipeline: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            pipeline: pipeline.into(),
            reason: StopReason::Panicked,
            metrics: MetricsSnapshot::default(),
            fatal_error: None,
            sources_dropped: 0,
            elapsed,
        }
    }

    /// True if the run drained without any fatal error
    pub fn is_clean(&self) -> bool {
        self.reason == StopReason::Drained && self.fatal_error.is_none()
    }
}

/// Requests sent to a pipeline through its handles
enum Control<I> {
    AddSource(Box<dyn Source<I>>),
}

/// Loop-to-orchestrator notifications
#[derive(Debug)]
enum Signal {
    /// The source reached end of stream and left the source set
    Exhausted(SourceId),
    /// The error handler returned a fatal error
    Abort { source: SourceId, message: String },
    /// The loop panicked; its source has been removed from the set
    Panicked(SourceId),
}

/// Cheap handle for adding sources to a pipeline, before or during `run`
pub struct PipelineHandle<I> {
    name: Arc<str>,
    control: mpsc::UnboundedSender<Control<I>>,
}

impl<I> Clone for PipelineHandle<I> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            control: self.control.clone(),
        }
    }
}

impl<I> PipelineHandle<I>
where
    I: Send + 'static,
{
    /// Register a source with the pipeline
    ///
    /// Sources sent before `run` start with the others. Sources sent while
    /// the pipeline runs get their own loop immediately. Fails once the
    /// pipeline has been dropped or has finished running.
    ///
    /// A source that is still queued when the pipeline starts stopping is
    /// dropped without running even though this returned `Ok`. Such sources
    /// are counted in [`RunReport::sources_dropped`].
    pub fn add_source(&self, source: impl Source<I> + 'static) -> Result<()> {
        self.control
            .send(Control::AddSource(Box::new(source)))
            .map_err(|_| {
                PipelineError::new(
                    ErrorKind::Other,
                    format!("pipeline {} is not accepting sources", self.name),
                )
            })
    }

    /// Name of the pipeline this handle feeds
    pub fn pipeline(&self) -> &str {
        &self.name
    }

    /// Check if the pipeline has stopped accepting sources
    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }
}

/// A set of sources feeding one processor whose output goes to every sink
pub struct Pipeline<I, O> {
    name: Arc<str>,
    processor: Arc<dyn Processor<I, O>>,
    handler: Arc<dyn ErrorHandler>,
    sources: Vec<Box<dyn Source<I>>>,
    sinks: Vec<Box<dyn Sink<O>>>,
    config: PipelineConfig,
    control: mpsc::UnboundedSender<Control<I>>,
    control_rx: mpsc::UnboundedReceiver<Control<I>>,
}

impl<I, O> Pipeline<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    /// Create a pipeline with the default error handler and config
    pub fn new(name: impl Into<String>, processor: impl Processor<I, O> + 'static) -> Self {
        let name: String = name.into();
        let (control, control_rx) = mpsc::unbounded_channel();
        Self {
            name: Arc::from(name),
            processor: Arc::new(processor),
            handler: Arc::new(LogErrorHandler),
            sources: Vec::new(),
            sinks: Vec::new(),
            config: PipelineConfig::default(),
            control,
            control_rx,
        }
    }

    /// Replace the processor
    pub fn set_processor(&mut self, processor: impl Processor<I, O> + 'static) -> &mut Self {
        self.processor = Arc::new(processor);
        self
    }

    /// Replace the error handler
    pub fn set_error_handler(&mut self, handler: impl ErrorHandler + 'static) -> &mut Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Replace the runtime settings
    pub fn set_config(&mut self, config: PipelineConfig) -> &mut Self {
        self.config = config;
        self
    }

    /// Register a source
    pub fn add_source(&mut self, source: impl Source<I> + 'static) -> &mut Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Register a message-oriented reader decoded with `decoder`
    pub fn add_message_source<M, D>(&mut self, reader: M, decoder: D) -> &mut Self
    where
        M: MessageReader + 'static,
        D: Decoder<I> + 'static,
    {
        self.add_source(MessageSource::new(reader, decoder))
    }

    /// Register a byte stream read `buffer_size` bytes at a time
    pub fn add_reader<R, D>(&mut self, reader: R, decoder: D, buffer_size: usize) -> &mut Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        D: Decoder<I> + 'static,
    {
        self.add_source(BufferSource::new(reader, decoder, buffer_size))
    }

    /// Register a sink
    pub fn add_sink(&mut self, sink: impl Sink<O> + 'static) -> &mut Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Register a writer fed through `encoder`
    pub fn add_writer<W, E>(&mut self, writer: W, encoder: E) -> &mut Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        E: Encoder<O> + 'static,
    {
        self.add_sink(WriterSink::new(writer, encoder))
    }

    /// Couple this pipeline's output to `downstream`'s input
    ///
    /// When this pipeline shuts down, `downstream` sees end of stream on
    /// the coupled source.
    pub fn join<X>(&mut self, downstream: &mut Pipeline<O, X>) -> &mut Self
    where
        O: Clone,
        X: Send + Sync + 'static,
    {
        let link = format!("{}->{}", self.name, downstream.name);
        let (sink, source) = coupler::<O>();
        self.add_sink(sink.named(link.clone()));
        downstream.add_source(source.named(link));
        self
    }

    /// Get a handle that can add sources while the pipeline runs
    pub fn handle(&self) -> PipelineHandle<I> {
        PipelineHandle {
            name: Arc::clone(&self.name),
            control: self.control.clone(),
        }
    }

    /// Get the pipeline name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of sources registered directly (not through handles)
    #[inline]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    #[inline]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Box the pipeline for `run_many`
    pub fn boxed(self) -> Box<dyn crate::runner::Runnable> {
        Box::new(self)
    }

    /// Run until every source drains or `cancel` fires
    ///
    /// Must be called from within a tokio runtime. All sinks are closed
    /// before this returns.
    pub async fn run(self, cancel: CancellationToken) -> RunReport {
        let started = Instant::now();
        let Pipeline {
            name,
            processor,
            handler,
            sources,
            sinks,
            config,
            control,
            mut control_rx,
        } = self;
        // Only handles keep the control channel open from here on
        drop(control);

        let shutdown = cancel.child_token();
        let (signals, mut signal_rx) = mpsc::unbounded_channel();

        let mut handles = Vec::with_capacity(sinks.len());
        let mut sink_tasks = Vec::with_capacity(sinks.len());
        for (index, sink) in sinks.into_iter().enumerate() {
            let Ok(index) = u16::try_from(index) else {
                tracing::error!(pipeline = %name, max = SinkId::MAX, "too many sinks, dropping the rest");
                break;
            };
            let (handle, task) = SinkHandle::spawn(SinkId::new(index), sink, config.sink_queue_size);
            handles.push(handle);
            sink_tasks.push(task);
        }

        let shared = Arc::new(Shared {
            name: Arc::clone(&name),
            processor,
            handler,
            sinks: handles,
            metrics: PipelineMetrics::new(),
            sources: SourceSet::new(),
            signals,
            shutdown: shutdown.clone(),
        });

        let mut loops = JoinSet::new();
        for source in sources {
            spawn_source(&shared, &mut loops, source);
        }
        while let Ok(Control::AddSource(source)) = control_rx.try_recv() {
            spawn_source(&shared, &mut loops, source);
        }

        tracing::info!(
            pipeline = %name,
            sources = shared.sources.len(),
            sinks = shared.sinks.len(),
            "pipeline started"
        );

        let mut fatal_error = None;
        let reason = if shared.sources.is_empty() {
            StopReason::NoSources
        } else {
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break StopReason::Cancelled,

                    Some(signal) = signal_rx.recv() => {
                        on_signal(&name, signal, &mut fatal_error);
                        if shared.sources.is_empty() {
                            break StopReason::Drained;
                        }
                        tracing::debug!(
                            pipeline = %name,
                            remaining = ?shared.sources.names(),
                            "sources still running"
                        );
                    }

                    Some(Control::AddSource(source)) = control_rx.recv() => {
                        spawn_source(&shared, &mut loops, source);
                    }
                }
            }
        };

        tracing::info!(pipeline = %name, reason = %reason, "pipeline stopping");

        // Stop accepting sources; anything that raced with the stop is dropped
        control_rx.close();
        let mut sources_dropped = 0;
        while let Ok(Control::AddSource(source)) = control_rx.try_recv() {
            sources_dropped += 1;
            tracing::warn!(pipeline = %name, source_name = %source.name(), "source added during shutdown was dropped");
        }

        shutdown.cancel();
        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    tracing::error!(pipeline = %name, error = %e, "source loop panicked");
                }
            }
        }
        while let Ok(signal) = signal_rx.try_recv() {
            on_signal(&name, signal, &mut fatal_error);
        }

        close_sinks(&name, &shared.sinks, sink_tasks, config.close_timeout).await;

        let metrics = shared.metrics.snapshot();
        let elapsed = started.elapsed();
        tracing::info!(
            pipeline = %name,
            reason = %reason,
            items_read = metrics.items_read,
            items_processed = metrics.items_processed,
            items_written = metrics.items_written,
            errors = metrics.total_errors(),
            fatal_errors = metrics.fatal_errors,
            sources_dropped,
            elapsed_ms = elapsed.as_millis() as u64,
            "pipeline stopped"
        );

        RunReport {
            pipeline: name.to_string(),
            reason,
            metrics,
            fatal_error,
            sources_dropped,
            elapsed,
        }
    }
}

impl<I, O> std::fmt::Debug for Pipeline<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("sources", &self.sources.len())
            .field("sinks", &self.sinks.len())
            .field("config", &self.config)
            .finish()
    }
}

/// State shared by the orchestrator and every source loop
struct Shared<I, O> {
    name: Arc<str>,
    processor: Arc<dyn Processor<I, O>>,
    handler: Arc<dyn ErrorHandler>,
    sinks: Vec<SinkHandle<O>>,
    metrics: PipelineMetrics,
    sources: SourceSet,
    signals: mpsc::UnboundedSender<Signal>,
    shutdown: CancellationToken,
}

impl<I, O> Shared<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    /// Process one item and write the output to every sink
    async fn deliver(&self, cx: &Context, item: I) -> Result<()> {
        let output = match self.processor.process(cx, item).await {
            Ok(output) => output,
            Err(err) => {
                self.metrics.record_process_error();
                return Err(err);
            }
        };
        self.metrics.record_processed();

        self.fan_out(Arc::new(output)).await
    }

    /// Write `output` to every sink, combining all failures into one error
    ///
    /// The item is queued on every sink before any outcome is awaited, so
    /// sinks write concurrently. A sink that fails never stops the others
    /// from receiving the item.
    async fn fan_out(&self, output: Arc<O>) -> Result<()> {
        let mut receipts = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            receipts.push(sink.enqueue(Arc::clone(&output)).await);
        }

        let mut errors = Vec::new();
        let mut succeeded = 0u64;
        let mut bytes = 0u64;
        for (sink, receipt) in self.sinks.iter().zip(receipts) {
            let outcome = match receipt {
                Ok(receipt) => sink.settle(receipt).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(n) => {
                    succeeded += 1;
                    bytes += n as u64;
                }
                Err(e) => errors.push(e),
            }
        }

        self.metrics
            .record_fanout(succeeded, errors.len() as u64, bytes);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::combine(errors))
        }
    }

    /// Pass `err` through the error handler and raise an abort if it comes
    /// back fatal
    async fn handle_error(&self, cx: &Context, err: PipelineError) {
        let Some(err) = self.handler.handle(cx, err).await else {
            return;
        };
        if !err.is_fatal() {
            return;
        }

        self.metrics.record_fatal();
        let Some(source) = cx.source() else {
            return;
        };
        tracing::error!(pipeline = %self.name, source = %source, error = %err, "fatal error");
        let _ = self.signals.send(Signal::Abort {
            source,
            message: err.to_string(),
        });
    }
}

fn spawn_source<I, O>(
    shared: &Arc<Shared<I, O>>,
    loops: &mut JoinSet<()>,
    source: Box<dyn Source<I>>,
) where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    let id = shared.sources.insert(source.name());
    loops.spawn(source_loop(Arc::clone(shared), id, source));
}

/// Removes the source of a loop that died without finishing (a panic drops
/// the loop's future while the guard is still armed)
struct LoopGuard<'a, I, O> {
    shared: &'a Shared<I, O>,
    id: SourceId,
    armed: bool,
}

impl<I, O> LoopGuard<'_, I, O> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<I, O> Drop for LoopGuard<'_, I, O> {
    fn drop(&mut self) {
        if self.armed && self.shared.sources.remove(self.id) {
            let _ = self.shared.signals.send(Signal::Panicked(self.id));
        }
    }
}

/// Body of one source's task
async fn source_loop<I, O>(shared: Arc<Shared<I, O>>, id: SourceId, mut source: Box<dyn Source<I>>)
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    let guard = LoopGuard {
        shared: &shared,
        id,
        armed: true,
    };
    let cx = Context::new(Arc::clone(&shared.name), shared.shutdown.clone()).with_source(id);

    tracing::debug!(pipeline = %shared.name, source = %id, source_name = %source.name(), "source loop started");

    loop {
        let pulled = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            pulled = source.pull() => pulled,
        };

        let item = match pulled {
            Ok(Some(item)) => item,
            Ok(None) => {
                shared.sources.remove(id);
                shared.metrics.record_exhausted();
                tracing::debug!(pipeline = %shared.name, source = %id, source_name = %source.name(), "source exhausted");
                let _ = shared.signals.send(Signal::Exhausted(id));
                break;
            }
            Err(err) => {
                shared.metrics.record_read_error();
                shared.handle_error(&cx, err).await;
                continue;
            }
        };
        shared.metrics.record_read();

        let delivered = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            delivered = shared.deliver(&cx, item) => delivered,
        };
        if let Err(err) = delivered {
            shared.handle_error(&cx, err).await;
        }
    }

    guard.disarm();
    tracing::debug!(pipeline = %shared.name, source = %id, "source loop stopped");
}

fn on_signal(pipeline: &str, signal: Signal, fatal_error: &mut Option<String>) {
    match signal {
        Signal::Exhausted(source) => {
            tracing::debug!(pipeline, source = %source, "source drained");
        }
        Signal::Abort { source, message } => {
            tracing::warn!(pipeline, source = %source, "abort requested, waiting for remaining sources");
            fatal_error.get_or_insert(message);
        }
        Signal::Panicked(source) => {
            tracing::error!(pipeline, source = %source, "source loop panicked");
        }
    }
}

/// Close every sink once, bounded by `timeout` each, then reap the tasks
async fn close_sinks<O>(
    pipeline: &str,
    sinks: &[SinkHandle<O>],
    tasks: Vec<JoinHandle<()>>,
    timeout: Duration,
) where
    O: Send + Sync + 'static,
{
    for (sink, task) in sinks.iter().zip(tasks) {
        match tokio::time::timeout(timeout, sink.close()).await {
            Ok(Ok(())) => {
                tracing::debug!(pipeline, sink = %sink.id(), sink_name = %sink.name(), "sink closed");
            }
            Ok(Err(e)) => {
                tracing::warn!(pipeline, sink = %sink.id(), sink_name = %sink.name(), error = %e, "sink close failed");
            }
            Err(_) => {
                tracing::warn!(
                    pipeline,
                    sink = %sink.id(),
                    sink_name = %sink.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "sink close timed out, aborting sink task"
                );
                task.abort();
            }
        }

        if let Err(e) = task.await {
            if e.is_panic() {
                tracing::error!(pipeline, sink = %sink.id(), error = %e, "sink task panicked");
            }
        }
    }
}
