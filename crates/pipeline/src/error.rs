//! Pipeline error types
//!
//! Every failure that reaches the error handler is a `PipelineError`. The
//! classification flags are plain fields set when the error is built:
//!
//! - `fatal`: the owning pipeline should stop once its sources drain or it
//!   is cancelled
//! - `temporary`: the failure may be retried or ignored (informational, the
//!   runtime never retries on its own)
//!
//! End of stream is not an error. Sources report it as `Ok(None)`.

use std::fmt;

use thiserror::Error;

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

/// Boxed error accepted by the `PipelineError` constructors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Prefix of every combined error message
const COMBINED_PREFIX: &str = "errors detected in the pipeline";

/// Stage of the pipeline an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Pulling raw input from a source failed
    Read,
    /// Raw input could not be decoded (a read failure from the pipeline's view)
    Decode,
    /// The processor rejected an item
    Process,
    /// Writing to a single sink failed
    Write,
    /// An item could not be encoded for a sink (a write failure from the pipeline's view)
    Encode,
    /// Aggregate of the sink failures of one fan-out write
    CombinedWrite,
    /// Closing a sink failed
    Close,
    /// A sink was written to after it had been closed or its consumer was gone
    SinkClosed,
    /// Anything else, including errors classified from foreign types
    Other,
}

impl ErrorKind {
    /// Short lowercase name for logs
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Decode => "decode",
            Self::Process => "process",
            Self::Write => "write",
            Self::Encode => "encode",
            Self::CombinedWrite => "combined_write",
            Self::Close => "close",
            Self::SinkClosed => "sink_closed",
            Self::Other => "other",
        }
    }

    /// Whether this kind is a failure on the input side of the pipeline
    #[inline]
    pub const fn is_read_side(&self) -> bool {
        matches!(self, Self::Read | Self::Decode)
    }

    /// Whether this kind is a failure on the output side of the pipeline
    #[inline]
    pub const fn is_write_side(&self) -> bool {
        matches!(
            self,
            Self::Write | Self::Encode | Self::CombinedWrite | Self::SinkClosed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified pipeline error
///
/// `Display` prints the message only. The kind and flags are available
/// through accessors so handlers can decide on escalation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PipelineError {
    kind: ErrorKind,
    fatal: bool,
    temporary: bool,
    message: String,
    causes: Vec<PipelineError>,
    #[source]
    source: Option<BoxError>,
}

impl PipelineError {
    /// Create an error from a plain message, with both flags cleared
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            fatal: false,
            temporary: false,
            message: message.into(),
            causes: Vec::new(),
            source: None,
        }
    }

    /// Wrap an arbitrary error under `kind`
    ///
    /// If `err` is itself a `PipelineError`, its `fatal` and `temporary`
    /// flags carry over; each flag is inherited on its own.
    pub fn wrap(kind: ErrorKind, err: impl Into<BoxError>) -> Self {
        let err = err.into();
        let message = err.to_string();
        let (fatal, temporary) = match err.downcast_ref::<PipelineError>() {
            Some(inner) => (inner.fatal, inner.temporary),
            None => (false, false),
        };

        Self {
            kind,
            fatal,
            temporary,
            message,
            causes: Vec::new(),
            source: Some(err),
        }
    }

    /// Classify a foreign error as `Other`, inheriting flags if it is a `PipelineError`
    pub fn classify(err: impl Into<BoxError>) -> Self {
        Self::wrap(ErrorKind::Other, err)
    }

    /// Create a read error
    pub fn read(err: impl Into<BoxError>) -> Self {
        Self::wrap(ErrorKind::Read, err)
    }

    /// Create a decode error
    pub fn decode(err: impl Into<BoxError>) -> Self {
        Self::wrap(ErrorKind::Decode, err)
    }

    /// Create a process error
    pub fn process(err: impl Into<BoxError>) -> Self {
        Self::wrap(ErrorKind::Process, err)
    }

    /// Create a write error
    pub fn write(err: impl Into<BoxError>) -> Self {
        Self::wrap(ErrorKind::Write, err)
    }

    /// Create an encode error
    pub fn encode(err: impl Into<BoxError>) -> Self {
        Self::wrap(ErrorKind::Encode, err)
    }

    /// Create a close error
    pub fn close(err: impl Into<BoxError>) -> Self {
        Self::wrap(ErrorKind::Close, err)
    }

    /// Create an error for a write to a closed sink
    pub fn sink_closed(sink: impl fmt::Display) -> Self {
        Self::new(ErrorKind::SinkClosed, format!("sink closed: {sink}"))
    }

    /// Combine the failures of one fan-out write into a single error
    ///
    /// - `fatal` is set if any constituent is fatal
    /// - `temporary` is set only if every constituent is temporary
    /// - the message lists constituent messages in encounter order,
    ///   `errors detected in the pipeline: [first|second]`
    pub fn combine(errors: impl IntoIterator<Item = PipelineError>) -> Self {
        let causes: Vec<PipelineError> = errors.into_iter().collect();

        let fatal = causes.iter().any(|e| e.fatal);
        let temporary = !causes.is_empty() && causes.iter().all(|e| e.temporary);

        let joined = causes
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("|");

        Self {
            kind: ErrorKind::CombinedWrite,
            fatal,
            temporary,
            message: format!("{COMBINED_PREFIX}: [{joined}]"),
            causes,
            source: None,
        }
    }

    /// Mark this error fatal
    #[must_use]
    pub fn into_fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    /// Mark this error temporary
    #[must_use]
    pub fn into_temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    /// Stage the error came from
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether the owning pipeline should stop
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Whether the failure may be retried or ignored
    #[inline]
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Human-readable message
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Constituent errors of a combined error (empty otherwise)
    #[inline]
    pub fn causes(&self) -> &[PipelineError] {
        &self.causes
    }
}
