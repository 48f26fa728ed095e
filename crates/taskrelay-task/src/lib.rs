//! Task model, normalization and reply envelopes.
//!
//! This crate holds the data shapes shared by every taskrelay transport:
//! - [`Task`], the unit of work submitted by the gateway
//! - [`normalize`], which turns any decoded JSON object into a [`Task`]
//! - [`HandlerError`] and [`classify`], which turn handler failures into the
//!   wire-safe [`ErrorEnvelope`]
//! - [`Reply`], the document written back for every non-dropped request

pub mod envelope;
pub mod error;
pub mod inbound;
pub mod task;

pub use envelope::{
    classify, ErrorEnvelope, HandlerError, ReadyStatus, Reply, HANDLER_FAILURE_MESSAGE,
    PARSE_FAILURE_PREFIX, UNSERIALIZABLE_ERROR,
};
pub use error::{Result, TaskError};
pub use inbound::{decode_inbound, is_truthy, Inbound};
pub use task::{normalize, HookTarget, Task, TaskKind, TaskRequest, TaskResponse, TaskType};
