//! Delimiter-framed message reader
//!
//! Splits a buffered byte stream into messages on a single delimiter byte
//! (newline by default). Memory per message is bounded: a message longer
//! than `max_message_size` is skipped up to its delimiter and reported as
//! an `InvalidData` error, after which reading continues with the next
//! message.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use pipekit_pipeline::MessageReader;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};

#[cfg(test)]
#[path = "delimited_test.rs"]
mod tests;

/// Default upper bound on one message, delimiter included
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Outcome of one bounded read
enum Frame {
    /// A message of this many bytes is in the buffer
    Message,
    /// The message was longer than the limit and has been skipped
    TooLong(usize),
    /// Nothing left to read
    Eof,
}

/// Message reader yielding one message per delimiter-terminated frame
///
/// The delimiter is stripped. When the delimiter is `\n`, a trailing `\r`
/// is stripped too. A final frame without delimiter is still returned.
pub struct DelimitedReader<R> {
    reader: R,
    delimiter: u8,
    max_message_size: usize,
    buf: Vec<u8>,
}

impl<R> DelimitedReader<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Create a reader splitting on `delimiter`
    pub fn new(reader: R, delimiter: u8) -> Self {
        Self {
            reader,
            delimiter,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            buf: Vec::new(),
        }
    }

    /// Bound the size of one message (zero is treated as one byte)
    #[must_use]
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max.max(1);
        self
    }

    #[inline]
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    #[inline]
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Get the wrapped reader back
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read one frame into `self.buf`, consuming at most one delimiter
    async fn read_frame(&mut self) -> io::Result<Frame> {
        self.buf.clear();

        let mut total = 0usize;
        let mut exceeded = false;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if total == 0 {
                    return Ok(Frame::Eof);
                }
                break;
            }

            let (take, done) = match available.iter().position(|&b| b == self.delimiter) {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };

            // Past the limit bytes are consumed but not stored
            if !exceeded {
                let room = self.max_message_size.saturating_sub(self.buf.len());
                if take <= room {
                    self.buf.extend_from_slice(&available[..take]);
                } else {
                    exceeded = true;
                }
            }

            total += take;
            self.reader.consume(take);

            if done {
                break;
            }
        }

        if exceeded {
            self.buf.clear();
            return Ok(Frame::TooLong(total));
        }
        Ok(Frame::Message)
    }

    /// Strip the delimiter (and `\r` before a newline)
    fn message(&self) -> &[u8] {
        let mut end = self.buf.len();
        if end > 0 && self.buf[end - 1] == self.delimiter {
            end -= 1;
            if self.delimiter == b'\n' && end > 0 && self.buf[end - 1] == b'\r' {
                end -= 1;
            }
        }
        &self.buf[..end]
    }
}

impl<R> DelimitedReader<BufReader<R>>
where
    R: AsyncRead + Unpin + Send,
{
    /// Newline-delimited reader over an unbuffered stream
    pub fn lines(reader: R) -> Self {
        Self::new(BufReader::new(reader), b'\n')
    }
}

impl DelimitedReader<BufReader<File>> {
    /// Open `path` for newline-delimited reading
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path.as_ref()).await?;
        tracing::debug!(path = %path.as_ref().display(), "opened delimited file");
        Ok(Self::lines(file))
    }
}

#[async_trait]
impl<R> MessageReader for DelimitedReader<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn read(&mut self) -> io::Result<Option<Bytes>> {
        match self.read_frame().await? {
            Frame::Eof => Ok(None),
            Frame::Message => Ok(Some(Bytes::copy_from_slice(self.message()))),
            Frame::TooLong(size) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "message of {size} bytes exceeds limit of {} bytes",
                    self.max_message_size
                ),
            )),
        }
    }
}
