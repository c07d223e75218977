//! Bounded input buffer for a single connection read.
//!
//! Binary safe: the valid region is tracked by an explicit length, never by
//! a terminator.

use crate::invariant;
use crate::runtime::limits::BUFFER_CAPACITY;
use std::io::{self, Read};

/// Fixed-capacity byte buffer with a valid-length marker.
///
/// One instance is reused for every connection; [`InputBuffer::reset`]
/// clears it before each read so nothing leaks between peers.
pub struct InputBuffer {
    data: [u8; BUFFER_CAPACITY],
    len: usize,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self {
            data: [0u8; BUFFER_CAPACITY],
            len: 0,
        }
    }

    /// Zero the contents and mark the buffer empty.
    pub fn reset(&mut self) {
        self.data.fill(0);
        self.len = 0;
    }

    /// Perform exactly one read of at most `limit` bytes from `reader`.
    ///
    /// The valid length is only updated on success; on error it stays zero
    /// (callers reset before reading).
    pub fn read_once<R: Read>(&mut self, reader: &mut R, limit: usize) -> io::Result<usize> {
        invariant::ensure(limit <= BUFFER_CAPACITY, "read limit exceeds buffer capacity");

        let n = reader.read(&mut self.data[..limit])?;
        invariant::ensure(n <= limit, "reader returned more bytes than requested");
        self.len = n;
        Ok(n)
    }

    /// The bytes filled by the last read.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new()
    }
}
