//! Peek-decide-stream reading.
//!
//! Thin convenience wrapper around [`Read::take`] for inspecting the head of
//! a stream (a container header, the first bytes of an archive member) before
//! deciding whether to read the rest.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::Read;

/// A resumable [`Read`]er for peek-decide-stream workflows.
///
/// Read enough data to inspect, then either take the full content via
/// [`into_bytes`](Self::into_bytes) or drop to discard.
pub struct PeekableReader<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: Read> PeekableReader<R> {
    /// Wrap any reader for peeking.
    pub fn new(reader: R) -> Self {
        Self { reader, buffer: Vec::new() }
    }

    /// Read up to `limit` bytes of content.
    ///
    /// Returns a slice of all buffered data. Successive calls do not accumulate:
    /// - `peek(16)` puts 16 bytes in the buffer, returns 16 bytes
    /// - `peek(512)` puts an additional 496 bytes in the buffer, returns 512
    /// - `peek(8)` immediately returns 8 bytes (because buffer already has 512)
    ///
    /// A short stream is not an error; the returned slice is simply shorter.
    pub fn peek(&mut self, limit: usize) -> Result<&[u8]> {
        if self.buffer.len() >= limit {
            return Ok(&self.buffer[..limit]);
        }
        let needed = (limit - self.buffer.len()) as u64;
        (&mut self.reader).take(needed).read_to_end(&mut self.buffer).or_raise(|| ErrorKind::Io)?;
        Ok(&self.buffer[..self.buffer.len().min(limit)])
    }

    /// Access data read into internal buffer so far.
    pub fn head(&self) -> &[u8] {
        &self.buffer
    }

    /// Read all remaining data and return the complete buffer.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        self.reader.read_to_end(&mut self.buffer).or_raise(|| ErrorKind::Io)?;
        Ok(self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn test_data() -> Vec<u8> {
        b"Rar!\x1a\x07\x00 followed by enough bytes to need more than one peek() call.".to_vec()
    }

    #[test]
    fn test_peek() {
        let mut peekable = PeekableReader::new(Cursor::new(test_data()));
        assert_eq!(peekable.peek(4).unwrap(), b"Rar!");
    }

    #[test]
    fn test_multiple_peek_calls() {
        let original = test_data();
        let mut peekable = PeekableReader::new(Cursor::new(original.clone()));
        assert_eq!(peekable.peek(4).unwrap(), b"Rar!");
        assert_eq!(peekable.peek(7).unwrap(), b"Rar!\x1a\x07\x00");
        assert_eq!(peekable.peek(2).unwrap(), b"Ra");
        assert_eq!(peekable.head(), b"Rar!\x1a\x07\x00");
        assert_eq!(peekable.into_bytes().unwrap(), original);
    }

    #[test]
    fn test_peek_larger_than_data() {
        let mut peekable = PeekableReader::new(Cursor::new(b"tiny".to_vec()));
        assert_eq!(peekable.peek(1000).unwrap(), b"tiny");
    }

    #[test]
    fn test_empty_input() {
        let mut peekable = PeekableReader::new(Cursor::new(Vec::new()));
        assert!(peekable.peek(100).unwrap().is_empty());
        assert!(peekable.into_bytes().unwrap().is_empty());
    }
}
