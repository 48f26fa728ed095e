//! Newline-delimited JSON TCP task server.
//!
//! This is the inbound half of the task bridge: the gateway connects, writes
//! task documents one per line, and reads one reply line per task. Replies on
//! a connection always come back in request order, however the handler's
//! completions interleave.

pub mod completion;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod queue;
pub mod server;
pub mod transport;

pub use completion::{Completion, WriteOutcome};
pub use config::{ServerConfig, DEFAULT_MAX_PENDING_REPLIES, DEFAULT_TCP_HOST, DEFAULT_TCP_PORT};
pub use connection::ConnectionState;
pub use error::{Result, ServerError};
pub use handler::{from_async, AsyncHandler, SharedHandler, TaskHandler};
pub use server::TaskServer;
pub use transport::{Transport, TransportKind};

pub use taskrelay_task::{HandlerError, Task};
