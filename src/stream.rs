//! Pull-based byte reads over a fallible stream of chunks
//!
//! The range-response parser needs byte-level and bounded reads over an
//! HTTP body without buffering the whole payload; this wraps any
//! `Stream<Item = Result<Bytes>>` with exactly that surface.

use crate::error::{Error, Result};
use bytes::{Buf, Bytes};
use futures::{Stream, StreamExt};

/// Incremental reader over a stream of byte chunks.
pub struct ChunkReader<S> {
    stream: S,
    current: Bytes,
}

impl<S> ChunkReader<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            current: Bytes::new(),
        }
    }

    /// Ensure the internal buffer is non-empty; false at end of stream.
    async fn fill(&mut self) -> Result<bool> {
        while self.current.is_empty() {
            match self.stream.next().await {
                Some(chunk) => self.current = chunk?,
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Next byte, or `None` at end of stream.
    pub async fn read_byte(&mut self) -> Result<Option<u8>> {
        if !self.fill().await? {
            return Ok(None);
        }
        let byte = self.current[0];
        self.current.advance(1);
        Ok(Some(byte))
    }

    /// Fill `buf` completely; errors if the stream ends first.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut read = 0;
        while read < buf.len() {
            if !self.fill().await? {
                return Err(Error::malformed_response("body ended unexpectedly"));
            }
            let n = self.current.len().min(buf.len() - read);
            buf[read..read + n].copy_from_slice(&self.current[..n]);
            self.current.advance(n);
            read += n;
        }
        Ok(())
    }

    /// Up to `max` bytes without copying, or `None` at end of stream.
    pub async fn next_chunk(&mut self, max: usize) -> Result<Option<Bytes>> {
        if !self.fill().await? {
            return Ok(None);
        }
        let n = self.current.len().min(max);
        Ok(Some(self.current.split_to(n)))
    }

    /// Drain the rest of the stream into `out`, returning the byte count.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<u64> {
        let mut total = 0u64;
        while let Some(chunk) = self.next_chunk(usize::MAX).await? {
            total += chunk.len() as u64;
            out.extend_from_slice(&chunk);
        }
        Ok(total)
    }
}
