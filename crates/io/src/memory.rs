//! In-memory transports
//!
//! `MemoryReader` replays frames as messages; `MemoryWriter` collects bytes
//! into a buffer shared by all its clones, so a test can keep one clone and
//! hand the other to a pipeline.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pipekit_pipeline::MessageReader;
use tokio::io::AsyncWrite;

/// Message reader over a fixed list of frames
#[derive(Debug, Default)]
pub struct MemoryReader {
    frames: VecDeque<Bytes>,
}

impl MemoryReader {
    pub fn new<B>(frames: impl IntoIterator<Item = B>) -> Self
    where
        B: Into<Bytes>,
    {
        Self {
            frames: frames.into_iter().map(Into::into).collect(),
        }
    }

    /// One frame per line of `text`
    pub fn lines(text: &str) -> Self {
        Self::new(text.lines().map(|line| Bytes::copy_from_slice(line.as_bytes())))
    }

    /// Frames not read yet
    #[inline]
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl MessageReader for MemoryReader {
    async fn read(&mut self) -> io::Result<Option<Bytes>> {
        Ok(self.frames.pop_front())
    }
}

#[derive(Debug, Default)]
struct Buffer {
    data: Vec<u8>,
    shutdown: bool,
}

/// `AsyncWrite` appending to a shared buffer
///
/// Writes after `shutdown` fail with `BrokenPipe`.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    inner: Arc<Mutex<Buffer>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().data.clone()
    }

    /// Contents as text, invalid UTF-8 replaced
    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().data).into_owned()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any clone has been shut down
    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "memory writer is shut down",
            )));
        }
        inner.data.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.lock().shutdown = true;
        Poll::Ready(Ok(()))
    }
}
