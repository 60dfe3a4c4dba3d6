//! Framed-message listener.
//!
//! Turns a timeout-bounded byte stream into discrete frames. Bytes are
//! accumulated until the terminator shows up anywhere in the buffer, then
//! the whole buffer is emitted and reset.
//!
//! The whole buffer means the whole buffer: if one read delivers two
//! records (two presses queued before the link was drained), both go out
//! together as one frame and the parser rejects it. A frame still in
//! progress when shutdown is requested is discarded, never emitted.

pub mod serial;

use std::borrow::Cow;
use std::io;
use std::time::Duration;

use crate::constants::READ_CHUNK_SIZE;
use crate::error::ListenerError;
use crate::shutdown::ShutdownCoordinator;

pub use serial::SerialSource;

/// A stream that supports bounded reads.
pub trait ByteSource {
    /// Reads up to `buf.len()` bytes, waiting at most the configured timeout.
    ///
    /// A timeout with no data is `Ok(0)`, not an error.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Sets the bound applied to each read.
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

/// One complete, terminator-delimited record as it came off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Raw bytes of the frame.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Frame content as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Accumulates bytes from a [`ByteSource`] and emits frames.
///
/// Also an `Iterator` over `Result<Frame, ListenerError>` that ends once
/// shutdown is requested or after the first stream error; it cannot be
/// restarted.
#[derive(Debug)]
pub struct FrameListener<S> {
    source: S,
    terminator: u8,
    shutdown: ShutdownCoordinator,
    buf: Vec<u8>,
    finished: bool,
}

impl<S: ByteSource> FrameListener<S> {
    /// Creates a listener, applying `read_timeout` to the source.
    pub fn new(
        mut source: S,
        terminator: u8,
        read_timeout: Duration,
        shutdown: ShutdownCoordinator,
    ) -> Result<Self, ListenerError> {
        source.set_read_timeout(read_timeout)?;
        Ok(Self {
            source,
            terminator,
            shutdown,
            buf: Vec::new(),
            finished: false,
        })
    }

    /// Blocks until the next frame, shutdown, or a stream error.
    ///
    /// Returns `Ok(None)` once shutdown has been requested.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ListenerError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if self.finished || self.shutdown.should_quit() {
                if !self.buf.is_empty() {
                    log::debug!("Discarding {} byte partial frame", self.buf.len());
                    self.buf.clear();
                }
                self.finished = true;
                return Ok(None);
            }

            let n = match self.source.read_chunk(&mut chunk) {
                Ok(n) => n,
                Err(e) => {
                    self.finished = true;
                    return Err(ListenerError::Read(e));
                }
            };
            if n == 0 {
                continue;
            }

            self.buf.extend_from_slice(&chunk[..n]);
            if self.buf.contains(&self.terminator) {
                return Ok(Some(Frame::from(std::mem::take(&mut self.buf))));
            }
        }
    }
}

impl<S: ByteSource> Iterator for FrameListener<S> {
    type Item = Result<Frame, ListenerError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}
