//! Framed reads over a connection.
//!
//! Command lines end at `\n`; payloads are an exact byte count announced by
//! the preceding command. Both are served from the same buffered reader so
//! payload bytes that arrive in the same segment as the command are not lost.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

/// Errors raised while reading a command line.
#[derive(Error, Debug)]
pub enum FrameError {
    /// The line exceeded the configured maximum before a delimiter was seen.
    #[error("command line exceeds {0} bytes")]
    LineTooLong(usize),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Buffered reader that yields command lines and payload bytes.
#[derive(Debug)]
pub struct FramedReader<R> {
    inner: BufReader<R>,
    max_line_length: usize,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    /// Wrap a reader, capping command lines at `max_line_length` bytes
    /// (delimiter excluded).
    pub fn new(reader: R, max_line_length: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            max_line_length,
        }
    }

    /// Read the next command line with its delimiter stripped.
    ///
    /// A trailing `\r` is stripped as well. Returns `Ok(None)` once the
    /// stream has ended with nothing buffered. A final line without a
    /// delimiter is returned as-is. Invalid UTF-8 is replaced lossily.
    pub async fn read_line(&mut self) -> Result<Option<String>, FrameError> {
        let limit = self.max_line_length as u64 + 1;
        let mut buf = Vec::new();

        (&mut self.inner)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .await?;

        if buf.is_empty() {
            return Ok(None);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
        } else if buf.len() > self.max_line_length {
            return Err(FrameError::LineTooLong(self.max_line_length));
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }

        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Read up to `buf.len()` payload bytes. Returns 0 at end of stream.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).await
    }

    /// Read exactly `n` bytes, or fewer if the stream ends first.
    pub async fn read_exact_or_eof(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(n.min(64 * 1024));
        (&mut self.inner)
            .take(n as u64)
            .read_to_end(&mut data)
            .await?;
        Ok(data)
    }

    /// Read and drop up to `n` bytes. Returns how many were discarded.
    pub async fn discard(&mut self, n: u64) -> io::Result<u64> {
        tokio::io::copy(&mut (&mut self.inner).take(n), &mut tokio::io::sink()).await
    }
}
