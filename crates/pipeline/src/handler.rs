//! Error handlers
//!
//! Every read, process and write failure passes through the pipeline's
//! error handler before anything else happens. The handler decides what the
//! error becomes: returned unchanged, re-classified (for example escalated
//! to fatal), or suppressed by returning `None`. Only a fatal error that
//! comes back out of the handler asks the pipeline to stop.

use async_trait::async_trait;

use crate::context::Context;
use crate::error::PipelineError;

/// Pluggable error policy of a pipeline
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Inspect `err` and return what remains of it
    async fn handle(&self, cx: &Context, err: PipelineError) -> Option<PipelineError>;
}

/// Default handler: logs the error and returns it unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorHandler;

#[async_trait]
impl ErrorHandler for LogErrorHandler {
    async fn handle(&self, cx: &Context, err: PipelineError) -> Option<PipelineError> {
        match cx.source() {
            Some(source) => tracing::warn!(
                pipeline = %cx.pipeline(),
                source = %source,
                kind = %err.kind(),
                fatal = err.is_fatal(),
                temporary = err.is_temporary(),
                error = %err,
                "error in pipeline"
            ),
            None => tracing::warn!(
                pipeline = %cx.pipeline(),
                kind = %err.kind(),
                fatal = err.is_fatal(),
                temporary = err.is_temporary(),
                error = %err,
                "error in pipeline"
            ),
        }
        Some(err)
    }
}

/// Handler backed by a synchronous closure, see `handler_fn`
#[derive(Clone)]
pub struct HandlerFn<F>(F);

/// Build an error handler from a closure
///
/// ```ignore
/// // Any decode failure stops the pipeline
/// let strict = handler_fn(|_cx, err| {
///     if err.kind() == ErrorKind::Decode { Some(err.into_fatal()) } else { Some(err) }
/// });
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&Context, PipelineError) -> Option<PipelineError> + Send + Sync,
{
    HandlerFn(f)
}

#[async_trait]
impl<F> ErrorHandler for HandlerFn<F>
where
    F: Fn(&Context, PipelineError) -> Option<PipelineError> + Send + Sync,
{
    async fn handle(&self, cx: &Context, err: PipelineError) -> Option<PipelineError> {
        (self.0)(cx, err)
    }
}

impl<F> std::fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HandlerFn")
    }
}
