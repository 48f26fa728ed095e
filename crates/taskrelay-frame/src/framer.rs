use bytes::BytesMut;

use crate::codec::{Frame, FrameConfig, LineDecoder};
use crate::error::Result;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Push-style per-connection frame accumulator.
///
/// Feed raw chunks with [`push`](Self::push) as they arrive, then drain
/// complete frames with [`frames`](Self::frames). Framing is synchronous and
/// never touches the socket, so it can run inside any read loop.
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    decoder: LineDecoder,
}

impl LineFramer {
    /// Create a framer with default configuration.
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    /// Create a framer with explicit configuration.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: LineDecoder::new(config.max_frame_size),
        }
    }

    /// Append a chunk read from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Take the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.decoder.decode(&mut self.buf)
    }

    /// Lazily yield every complete frame currently buffered, in arrival order.
    ///
    /// The iterator ends when only a partial tail (or nothing) remains; push
    /// more bytes and call `frames` again to continue.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames {
            framer: self,
            failed: false,
        }
    }

    /// Bytes buffered but not yet delimited.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Number of frames yielded so far.
    pub fn frames_parsed(&self) -> u64 {
        self.decoder.frames_decoded()
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the complete frames buffered in a [`LineFramer`].
///
/// Yields at most one error, then stops.
#[derive(Debug)]
pub struct Frames<'a> {
    framer: &'a mut LineFramer,
    failed: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.framer.next_frame() {
            Ok(frame) => frame.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
