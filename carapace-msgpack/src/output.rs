//! Chained write buffer: a mutable head plus sealed chunks awaiting a flush.

use bytes::{BufMut, Bytes, BytesMut};

const DEFAULT_HEAD_CAPACITY: usize = 256;

/// Growable output buffer for the encoder.
///
/// Bytes accumulate in a [`BytesMut`] head; once the head crosses the seal
/// threshold it is frozen onto the chunk chain, where an async sink can claim
/// it without copying. The one-shot path concatenates everything at the end.
#[derive(Debug)]
pub struct OutputBuffer {
    sealed: Vec<Bytes>,
    head: BytesMut,
    seal_threshold: usize,
    sealed_len: usize,
}

impl OutputBuffer {
    /// A buffer that never seals; suited to the one-shot `into_vec` path.
    pub fn new() -> Self {
        Self::with_seal_threshold(usize::MAX)
    }

    /// A buffer that seals its head onto the chunk chain once the head holds
    /// at least `threshold` bytes.
    pub fn with_seal_threshold(threshold: usize) -> Self {
        Self {
            sealed: Vec::new(),
            head: BytesMut::with_capacity(DEFAULT_HEAD_CAPACITY.min(threshold)),
            seal_threshold: threshold.max(1),
            sealed_len: 0,
        }
    }

    /// Total bytes written so far, sealed or not.
    pub fn len(&self) -> usize {
        self.sealed_len + self.head.len()
    }

    /// True when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a single byte.
    pub fn put_u8(&mut self, byte: u8) {
        self.head.put_u8(byte);
    }

    /// Append a run of bytes.
    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.head.put_slice(bytes);
    }

    /// Freeze the head onto the chunk chain when it has crossed the seal
    /// threshold. Called between tokens so tokens are never split mid-write.
    pub fn maybe_seal(&mut self) {
        if self.head.len() >= self.seal_threshold {
            self.seal();
        }
    }

    /// Unconditionally freeze the head onto the chunk chain.
    pub fn seal(&mut self) {
        if !self.head.is_empty() {
            let chunk = self.head.split().freeze();
            self.sealed_len += chunk.len();
            self.sealed.push(chunk);
        }
    }

    /// Claim every sealed chunk, leaving unsealed head bytes in place.
    pub fn take_sealed(&mut self) -> Vec<Bytes> {
        self.sealed_len = 0;
        std::mem::take(&mut self.sealed)
    }

    /// Seal and claim everything.
    pub fn into_chunks(mut self) -> Vec<Bytes> {
        self.seal();
        self.sealed
    }

    /// Concatenate everything into one owned vector.
    pub fn into_vec(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for chunk in &self.sealed {
            out.extend_from_slice(chunk);
        }
        out.extend_from_slice(&self.head);
        out
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seals_at_threshold_and_reassembles() {
        let mut out = OutputBuffer::with_seal_threshold(4);
        out.put_slice(b"abc");
        out.maybe_seal();
        assert_eq!(out.take_sealed().len(), 0);
        out.put_slice(b"de");
        out.maybe_seal();
        out.put_slice(b"f");
        assert_eq!(out.len(), 6);
        assert_eq!(out.into_vec(), b"abcdef");
    }

    #[test]
    fn sealed_chunks_can_be_claimed_incrementally() {
        let mut out = OutputBuffer::with_seal_threshold(2);
        out.put_slice(b"abcd");
        out.maybe_seal();
        let chunks = out.take_sealed();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref(), b"abcd");
        out.put_slice(b"e");
        assert_eq!(out.into_vec(), b"e");
    }
}
