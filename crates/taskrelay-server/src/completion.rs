use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use taskrelay_task::{HandlerError, Reply, Task};
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionState};

/// What happened to a reply handed to [`Completion::complete`].
///
/// Nothing here is sent over the wire; it lets the caller observe disconnect
/// races. Neither failure outcome is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The reply was queued on a live connection and will be written in order.
    Written,
    /// The peer closed the connection between dispatch and completion.
    PeerClosed,
    /// The connection was already torn down when the completion was called.
    ConnectionLost,
}

impl WriteOutcome {
    /// Status text reported to completion callers.
    pub const fn as_str(self) -> &'static str {
        match self {
            WriteOutcome::Written => "Response written.",
            WriteOutcome::PeerClosed => "Connection ended by client.",
            WriteOutcome::ConnectionLost => "Connection lost - cannot write response.",
        }
    }

    /// Whether the reply reached a live connection.
    pub const fn is_written(self) -> bool {
        matches!(self, WriteOutcome::Written)
    }
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one-shot reply channel handed to a task handler with each task.
///
/// Consuming `self` guarantees at most one reply per task. A completion that
/// is dropped without being called releases its place in the connection's
/// reply order, so later replies on that connection are not held back.
pub struct Completion {
    connection: Arc<Connection>,
    slot: u64,
    done: bool,
}

impl Completion {
    pub(crate) fn new(connection: Arc<Connection>, slot: u64) -> Self {
        Self {
            connection,
            slot,
            done: false,
        }
    }

    /// Reply with the handler's result or failure.
    pub fn complete(mut self, outcome: Result<Task, HandlerError>) -> WriteOutcome {
        self.done = true;
        let written = self
            .connection
            .finish(self.slot, Some(Reply::from_outcome(outcome)));
        if !written.is_written() {
            debug!(
                connection = self.connection.id(),
                slot = self.slot,
                outcome = %written,
                "reply dropped"
            );
        }
        written
    }

    /// Reply with a result.
    pub fn succeed(self, task: Task) -> WriteOutcome {
        self.complete(Ok(task))
    }

    /// Reply with a failure.
    pub fn fail(self, err: impl Into<HandlerError>) -> WriteOutcome {
        self.complete(Err(err.into()))
    }

    /// Current state of the connection this task arrived on.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Server-assigned id of the connection this task arrived on.
    pub fn connection_id(&self) -> u64 {
        self.connection.id()
    }

    /// Remote address of the connection this task arrived on.
    pub fn peer_addr(&self) -> SocketAddr {
        self.connection.peer_addr()
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.done {
            warn!(
                connection = self.connection.id(),
                slot = self.slot,
                "completion dropped without a reply"
            );
            self.connection.finish(self.slot, None);
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("connection", &self.connection.id())
            .field("slot", &self.slot)
            .field("done", &self.done)
            .finish()
    }
}
