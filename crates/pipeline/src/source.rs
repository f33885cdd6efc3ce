//! Pipeline sources
//!
//! A source yields one item per `pull`. `Ok(None)` is the end-of-stream
//! sentinel: the pipeline drops the source and never reports it as an error.
//! Any `Err` is a read failure that goes to the error handler, after which
//! the pipeline pulls again.
//!
//! # Flavors
//!
//! | Source | Framing | Decoding |
//! |--------|---------|----------|
//! | `BufferSource` | whatever one `read` returns, up to the buffer size | `Decoder` |
//! | `MessageSource` | delegated to a `MessageReader` | `Decoder` |
//! | `IterSource` | one element per pull | none |
//! | `CouplerSource` | one pushed item per pull | none |

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use pipekit_codec::Decoder;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{PipelineError, Result};

#[cfg(test)]
#[path = "source_test.rs"]
mod tests;

/// Default read buffer size for `BufferSource`
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Something the pipeline pulls items from
///
/// Each registered source is owned by exactly one ingestion task, so
/// implementations get `&mut self` and need no internal locking.
#[async_trait]
pub trait Source<T>: Send {
    /// Pull the next item, `Ok(None)` once the source is exhausted
    async fn pull(&mut self) -> Result<Option<T>>;

    /// Name used in logs
    fn name(&self) -> &str {
        "source"
    }
}

#[async_trait]
impl<T, S> Source<T> for Box<S>
where
    T: Send + 'static,
    S: Source<T> + ?Sized,
{
    async fn pull(&mut self) -> Result<Option<T>> {
        (**self).pull().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Message-oriented transport that frames its own input
///
/// `Ok(None)` signals end of stream.
#[async_trait]
pub trait MessageReader: Send {
    /// Read the next framed message
    async fn read(&mut self) -> io::Result<Option<Bytes>>;
}

/// Source that decodes each message of a `MessageReader`
pub struct MessageSource<M, D> {
    reader: M,
    decoder: D,
    name: String,
}

impl<M, D> MessageSource<M, D> {
    /// Create a message source
    pub fn new(reader: M, decoder: D) -> Self {
        Self::with_name(reader, decoder, "message")
    }

    /// Create a message source with a name for logs
    pub fn with_name(reader: M, decoder: D, name: impl Into<String>) -> Self {
        Self {
            reader,
            decoder,
            name: name.into(),
        }
    }
}

#[async_trait]
impl<T, M, D> Source<T> for MessageSource<M, D>
where
    T: Send + 'static,
    M: MessageReader,
    D: Decoder<T>,
{
    async fn pull(&mut self) -> Result<Option<T>> {
        let Some(raw) = self.reader.read().await.map_err(PipelineError::read)? else {
            return Ok(None);
        };

        let item = self.decoder.decode(&raw).map_err(PipelineError::decode)?;
        Ok(Some(item))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Source that reads an `AsyncRead` into a fixed-size buffer
///
/// Each pull performs one `read` and decodes exactly the bytes it returned,
/// so the buffer size caps how much raw input one item covers. A read of
/// zero bytes is end of stream.
pub struct BufferSource<R, D> {
    reader: R,
    decoder: D,
    buf: Vec<u8>,
    name: String,
}

impl<R, D> BufferSource<R, D> {
    /// Create a buffer source reading at most `buffer_size` bytes per item
    ///
    /// A zero `buffer_size` is bumped to one byte, since a zero-length read
    /// would be indistinguishable from end of stream.
    pub fn new(reader: R, decoder: D, buffer_size: usize) -> Self {
        Self {
            reader,
            decoder,
            buf: vec![0; buffer_size.max(1)],
            name: "reader".into(),
        }
    }

    /// Set the name used in logs
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Size of the read buffer
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buf.len()
    }
}

#[async_trait]
impl<T, R, D> Source<T> for BufferSource<R, D>
where
    T: Send + 'static,
    R: AsyncRead + Unpin + Send,
    D: Decoder<T>,
{
    async fn pull(&mut self) -> Result<Option<T>> {
        let n = self
            .reader
            .read(&mut self.buf)
            .await
            .map_err(PipelineError::read)?;

        if n == 0 {
            return Ok(None);
        }

        let item = self
            .decoder
            .decode(&self.buf[..n])
            .map_err(PipelineError::decode)?;
        Ok(Some(item))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Source that yields the elements of an iterator
pub struct IterSource<I> {
    iter: I,
    name: String,
}

impl<I> IterSource<I> {
    /// Create a source over `iter`
    pub fn new<C>(items: C) -> Self
    where
        C: IntoIterator<IntoIter = I>,
    {
        Self {
            iter: items.into_iter(),
            name: "iter".into(),
        }
    }

    /// Set the name used in logs
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl<I> Source<I::Item> for IterSource<I>
where
    I: Iterator + Send,
    I::Item: Send + 'static,
{
    async fn pull(&mut self) -> Result<Option<I::Item>> {
        Ok(self.iter.next())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
