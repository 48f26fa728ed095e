/// Errors that can occur during line encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A line grew past the configured maximum without a terminator.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An outbound payload contains the line terminator.
    #[error("payload contains a line terminator at byte {0}")]
    EmbeddedTerminator(usize),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
