//! Newline-delimited JSON framing for the taskrelay TCP protocol.
//!
//! Every message on the wire is one UTF-8 JSON document followed by `\n`.
//! There is no length prefix, so the decoder scans for terminators and keeps
//! any partial tail until the next read completes it.
//!
//! - [`LineDecoder`] is the shared scanning core
//! - [`LineFramer`] is the runtime-agnostic per-connection accumulator: push
//!   raw chunks from any read loop, drain complete frames
//! - [`LineReader`] / [`LineWriter`] wrap blocking `Read` / `Write` streams;
//!   the reader feeds a [`LineFramer`]
//! - `LineCodec` (feature `async`) plugs the same rules into `tokio_util::codec`

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod framer;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::LineCodec;
pub use codec::{encode_line, Frame, FrameConfig, LineDecoder, DEFAULT_MAX_FRAME, TERMINATOR};
pub use error::{FrameError, Result};
pub use framer::{Frames, LineFramer};
pub use reader::LineReader;
pub use writer::LineWriter;
