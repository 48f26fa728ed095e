/// Errors that can occur while running a task server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the listener.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `start` was called on a server that is already listening.
    #[error("server is already running")]
    AlreadyRunning,

    /// `stop` was called on a server that is not listening.
    #[error("server is not running")]
    NotRunning,

    /// An externally supplied transport failed.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, ServerError>;
