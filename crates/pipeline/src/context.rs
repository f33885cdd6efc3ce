//! Per-call context handed to processors and error handlers

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::ids::SourceId;

/// Where a processor or error-handler call originates
///
/// Cheap to clone. The cancellation token is the pipeline's own shutdown
/// token: it fires on external cancellation and when the pipeline stops, so
/// long-running processors can bail out early.
#[derive(Debug, Clone)]
pub struct Context {
    pipeline: Arc<str>,
    source: Option<SourceId>,
    cancel: CancellationToken,
}

impl Context {
    /// Create a context for `pipeline`
    pub fn new(pipeline: impl Into<Arc<str>>, cancel: CancellationToken) -> Self {
        Self {
            pipeline: pipeline.into(),
            source: None,
            cancel,
        }
    }

    /// Attach the source the current item was pulled from
    #[must_use]
    pub fn with_source(mut self, source: SourceId) -> Self {
        self.source = Some(source);
        self
    }

    /// Name of the pipeline
    #[inline]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Source of the current item, if any
    #[inline]
    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    /// Shutdown token of the pipeline
    #[inline]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the pipeline is shutting down
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
