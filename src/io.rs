use std::io::{Read, Write};

use tokio::io::{AsyncRead, AsyncWrite};

/// Async duplex stream a negotiation can run over and hand back.
pub trait IoStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> IoStream for T {}

/// Blocking duplex stream a negotiation can run over and hand back.
pub trait BlockingStream: Read + Write + Send {}
impl<T: Read + Write + Send> BlockingStream for T {}

pub type BoxedStream = Box<dyn IoStream>;
pub type BoxedBlockingStream = Box<dyn BlockingStream>;

/// Handshake buffer with a cursor.
///
/// One frame is reused for every phase of a negotiation. While writing,
/// `buf[offset..length]` is what is still unsent; while reading it is the part
/// that has not been filled yet.
///
/// ### Invariants
/// - `offset <= length <= buf.len()`
/// - A phase is finished exactly when `offset == length`.
#[derive(Debug, Default)]
pub struct Frame {
    buf: Vec<u8>,
    offset: usize,
    length: usize,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with an outgoing message.
    pub fn load(&mut self, bytes: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(bytes);
        self.offset = 0;
        self.length = bytes.len();
    }

    /// Discard the contents and expect `len` fresh bytes from the peer.
    pub fn expect(&mut self, len: usize) {
        self.buf.clear();
        self.buf.resize(len, 0);
        self.offset = 0;
        self.length = len;
    }

    /// Keep what was read so far and expect `extra` more bytes after it.
    pub fn expect_more(&mut self, extra: usize) {
        self.length += extra;
        if self.buf.len() < self.length {
            self.buf.resize(self.length, 0);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.offset == self.length
    }

    /// Bytes written or read so far in this phase.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.offset]
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn pending(&self) -> &[u8] {
        &self.buf[self.offset..self.length]
    }

    pub fn pending_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.offset..self.length]
    }

    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.offset + n <= self.length);
        self.offset = (self.offset + n).min(self.length);
    }
}
