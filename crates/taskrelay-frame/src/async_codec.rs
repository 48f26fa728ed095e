use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{encode_line, Frame, FrameConfig, LineDecoder};
use crate::error::{FrameError, Result};

/// `tokio_util` codec for newline-delimited frames.
///
/// `FramedRead` keeps calling [`Decoder::decode`] until it returns `None`, so
/// every line already buffered is yielded before the next socket read.
#[derive(Debug, Clone, Default)]
pub struct LineCodec {
    decoder: LineDecoder,
}

impl LineCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            decoder: LineDecoder::new(config.max_frame_size),
        }
    }

    /// Number of frames decoded so far.
    pub fn frames_decoded(&self) -> u64 {
        self.decoder.frames_decoded()
    }
}

impl Decoder for LineCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        self.decoder.decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            debug!(bytes = src.len(), "discarding unterminated bytes at end of stream");
            src.clear();
            self.decoder.reset_scan();
        }
        Ok(None)
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<()> {
        encode_line(item.as_ref(), dst)
    }
}
