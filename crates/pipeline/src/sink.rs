//! Pipeline sinks
//!
//! A sink accepts processed items and is closed exactly once at shutdown.
//! The runtime gives every sink its own task (see `sink_handle`), so a sink
//! is only ever touched by one task at a time and takes `&mut self`.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use pipekit_codec::Encoder;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{PipelineError, Result};

#[cfg(test)]
#[path = "sink_test.rs"]
mod tests;

/// Something the pipeline pushes processed items to
#[async_trait]
pub trait Sink<T>: Send {
    /// Write one item, returning the number of bytes written
    async fn push(&mut self, item: &T) -> Result<usize>;

    /// Release the sink; called once, after the last push
    async fn close(&mut self) -> Result<()>;

    /// Name used in logs
    fn name(&self) -> &str {
        "sink"
    }
}

#[async_trait]
impl<T, S> Sink<T> for Box<S>
where
    T: Send + Sync + 'static,
    S: Sink<T> + ?Sized,
{
    async fn push(&mut self, item: &T) -> Result<usize> {
        (**self).push(item).await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Sink that encodes items and writes them to an `AsyncWrite`
///
/// Each push is flushed so interactive outputs (stdout, sockets) see items
/// as they are produced. Closing flushes and shuts the writer down; wrap
/// writers that must stay open in `NopClose`.
pub struct WriterSink<W, E> {
    writer: W,
    encoder: E,
    name: String,
}

impl<W, E> WriterSink<W, E> {
    /// Create a writer sink
    pub fn new(writer: W, encoder: E) -> Self {
        Self {
            writer,
            encoder,
            name: "writer".into(),
        }
    }

    /// Set the name used in logs
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Consume the sink and return the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<T, W, E> Sink<T> for WriterSink<W, E>
where
    T: Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send,
    E: Encoder<T>,
{
    async fn push(&mut self, item: &T) -> Result<usize> {
        let raw = self.encoder.encode(item).map_err(PipelineError::encode)?;

        self.writer
            .write_all(&raw)
            .await
            .map_err(PipelineError::write)?;
        self.writer.flush().await.map_err(PipelineError::write)?;

        Ok(raw.len())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(PipelineError::close)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Writer wrapper whose shutdown only flushes
///
/// Used for shared process-wide writers such as stdout, which a pipeline
/// must not close on behalf of everybody else.
#[derive(Debug)]
pub struct NopClose<W>(W);

impl<W> NopClose<W> {
    /// Wrap `writer`
    pub fn new(writer: W) -> Self {
        Self(writer)
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W> AsyncWrite for NopClose<W>
where
    W: AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }
}
