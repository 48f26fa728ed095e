//! Task bridge receiver.
//!
//! A gateway forwards work to this process as newline-delimited JSON tasks
//! over TCP; a caller-supplied handler completes each task and the reply goes
//! back on the same connection, in request order.
//!
//! # Crate Structure
//!
//! - [`task`] - Task model, inbound decoding, and the error classifier
//! - [`frame`] - Newline framing (blocking reader/writer, tokio codec)
//! - [`server`] - The TCP task server and its per-connection reply ordering
//! - [`receiver`] - Start/stop facade selecting the transport

pub mod receiver;

/// Re-export task model types.
pub mod task {
    pub use taskrelay_task::*;
}

/// Re-export framing types.
pub mod frame {
    pub use taskrelay_frame::*;
}

/// Re-export server types.
pub mod server {
    pub use taskrelay_server::*;
}

pub use receiver::{
    Receiver, ReceiverBuilder, ReceiverError, ReceiverOptions, DEFAULT_HTTP_PORT,
    DEFAULT_REQUEST_BODY_LIMIT,
};
pub use taskrelay_server::{
    from_async, Completion, HandlerError, SharedHandler, Task, TaskHandler, Transport,
    TransportKind, WriteOutcome,
};
