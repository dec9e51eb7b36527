//! Request and response byte buffers.
//!
//! Both buffers are single-slot: one logical RPC call writes into
//! [`WriteBuffer`] and reads its reply back from [`ReadBuffer`]. They are not
//! queues.

use bytes::{Buf, Bytes, BytesMut};

/// Accumulates serialized request bytes until the next send.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    buf: BytesMut,
}

impl WriteBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drain everything into an immutable body snapshot.
    ///
    /// The buffer is empty afterwards, so writes for the next call can't
    /// touch the returned bytes.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Discard buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Holds one response body, consumed front to back.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    data: Bytes,
}

impl ReadBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with a new response body.
    ///
    /// Unread bytes from the previous response are dropped, never
    /// concatenated.
    pub fn replace(&mut self, body: Bytes) {
        self.data = body;
    }

    /// Copy up to `out.len()` bytes into `out`, returning how many were read.
    ///
    /// A short or empty read means the response held fewer bytes than the
    /// decoder asked for; it is returned as is.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.data.len());
        out[..n].copy_from_slice(&self.data[..n]);
        self.data.advance(n);
        n
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Discard unread bytes.
    pub fn clear(&mut self) {
        self.data = Bytes::new();
    }
}
