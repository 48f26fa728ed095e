use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Line terminator byte.
pub const TERMINATOR: u8 = b'\n';

/// Default maximum frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// One complete line taken off the stream, terminator stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Zero-based position of this frame among the frames decoded on its stream.
    pub seq: u64,
    /// The line contents.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(seq: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            seq,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (payload + terminator).
    pub fn wire_size(&self) -> usize {
        self.payload.len() + 1
    }
}

/// Append `payload` and the terminator to `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────┬──────┐
/// │ UTF-8 JSON document      │ 0x0A │
/// └──────────────────────────┴──────┘
/// ```
pub fn encode_line(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if let Some(pos) = payload.iter().position(|b| *b == TERMINATOR) {
        return Err(FrameError::EmbeddedTerminator(pos));
    }
    dst.reserve(payload.len() + 1);
    dst.put_slice(payload);
    dst.put_u8(TERMINATOR);
    Ok(())
}

/// Scans a growing buffer for complete lines.
///
/// Remembers how far it already scanned, so a partial tail is not rescanned
/// when the next chunk arrives. A trailing `\r` is stripped and empty lines
/// are skipped without consuming a sequence number.
#[derive(Debug, Clone)]
pub struct LineDecoder {
    next_index: usize,
    max_frame_size: usize,
    frames_decoded: u64,
}

impl LineDecoder {
    /// Create a decoder with the given maximum line length.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            next_index: 0,
            max_frame_size,
            frames_decoded: 0,
        }
    }

    /// Decode the next complete line from `src`.
    ///
    /// Returns `Ok(None)` if the buffer doesn't contain a complete line yet.
    /// On success, consumes the line and its terminator from the buffer.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            let scan_from = self.next_index.min(src.len());
            let Some(offset) = src[scan_from..].iter().position(|b| *b == TERMINATOR) else {
                self.next_index = src.len();
                if src.len() > self.max_frame_size {
                    return Err(FrameError::FrameTooLarge {
                        size: src.len(),
                        max: self.max_frame_size,
                    });
                }
                return Ok(None); // Need more data
            };

            let end = scan_from + offset;
            self.next_index = 0;

            let mut line = src.split_to(end + 1);
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }

            if line.len() > self.max_frame_size {
                return Err(FrameError::FrameTooLarge {
                    size: line.len(),
                    max: self.max_frame_size,
                });
            }
            if line.is_empty() {
                continue;
            }

            let seq = self.frames_decoded;
            self.frames_decoded += 1;
            return Ok(Some(Frame {
                seq,
                payload: line.freeze(),
            }));
        }
    }

    /// Forget scan progress; call after clearing the buffer externally.
    pub fn reset_scan(&mut self) {
        self.next_index = 0;
    }

    /// Number of frames decoded so far.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Maximum line length in bytes.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Update the maximum line length for subsequent decoding.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME)
    }
}

/// Configuration for line framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum line length in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
