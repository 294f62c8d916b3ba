//! Accumulation buffer for process output

mod ansi;

pub(crate) use ansi::strip_colors;

use bytes::{Buf, BytesMut};

/// Initial capacity; the buffer grows as needed.
const INITIAL_CAPACITY: usize = 4096;

/// Bytes received from the process that no completed match has consumed yet.
///
/// Only the matching routine touches it, so there is no locking.
#[derive(Debug)]
pub(crate) struct Buffer {
    inner: BytesMut,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    /// Create an empty buffer
    pub(crate) fn new() -> Self {
        Self {
            inner: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Append a chunk at the end
    pub(crate) fn append(&mut self, data: &[u8]) {
        self.inner.extend_from_slice(data);
    }

    /// Unconsumed bytes
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    /// Number of unconsumed bytes
    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether every received byte has been consumed
    pub(crate) fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop the first `n` bytes, or everything if `n` exceeds the length.
    pub(crate) fn consume(&mut self, n: usize) {
        let n = n.min(self.inner.len());
        self.inner.advance(n);
    }

    /// Copy out `range` and drop everything up to its end.
    pub(crate) fn take_span(&mut self, start: usize, end: usize) -> Vec<u8> {
        let span = self.inner[start..end].to_vec();
        self.inner.advance(end);
        span
    }

    /// Copy out everything from `start` and leave the buffer empty.
    pub(crate) fn take_from(&mut self, start: usize) -> Vec<u8> {
        let rest = self.inner[start..].to_vec();
        self.inner.clear();
        rest
    }

    /// Drop every unconsumed byte
    pub(crate) fn clear(&mut self) {
        self.inner.clear();
    }
}
