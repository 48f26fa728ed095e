use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::Task;

/// `debugMessage` for every handler-reported failure.
pub const HANDLER_FAILURE_MESSAGE: &str = "Unable to execute Flex method";

/// `error` for handler failures whose payload cannot be serialized.
pub const UNSERIALIZABLE_ERROR: &str = "Error argument not instance of Error and not stringifiable";

/// Prefix of `debugMessage` for frames that never reached the handler.
pub const PARSE_FAILURE_PREFIX: &str = "unable to parse";

/// A failure reported by a task handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// An error value with a type name and a message.
    Failure { name: String, message: String },
    /// Plain data the handler chose to report as the error.
    Data(Value),
    /// A payload whose serialization failed; holds the serializer's reason.
    Unserializable(String),
}

impl HandlerError {
    /// An error named `Error` with the given message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    /// An error with an explicit type name.
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Capture a Rust error, named after its type.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::named(short_type_name::<E>(), err.to_string())
    }

    /// Capture arbitrary data as the error payload.
    ///
    /// Serialization happens here; if it fails the error degrades to
    /// [`HandlerError::Unserializable`].
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::Data(value),
            Err(err) => Self::Unserializable(err.to_string()),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Failure { name, message } => write!(f, "{name}: {message}"),
            HandlerError::Data(value) => write!(f, "{value}"),
            HandlerError::Unserializable(_) => f.write_str(UNSERIALIZABLE_ERROR),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<Value> for HandlerError {
    fn from(value: Value) -> Self {
        Self::Data(value)
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let full = full.strip_prefix("dyn ").unwrap_or(full);
    let base = full.split(['<', ' ']).next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// The error document written back in place of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub is_error: bool,
    pub debug_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ErrorEnvelope {
    /// Envelope for a frame that could not be decoded into a task.
    pub fn parse_failure(detail: impl fmt::Display) -> Self {
        Self {
            is_error: true,
            debug_message: format!("{PARSE_FAILURE_PREFIX} task: {detail}"),
            error: None,
        }
    }
}

/// Normalize a handler failure into its wire envelope.
pub fn classify(err: &HandlerError) -> ErrorEnvelope {
    let error = match err {
        HandlerError::Failure { .. } => Value::String(err.to_string()),
        HandlerError::Data(value) => value.clone(),
        HandlerError::Unserializable(_) => Value::String(UNSERIALIZABLE_ERROR.to_string()),
    };

    ErrorEnvelope {
        is_error: true,
        debug_message: HANDLER_FAILURE_MESSAGE.to_string(),
        error: Some(error),
    }
}

/// Reply to a readiness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyStatus {
    pub status: String,
}

impl Default for ReadyStatus {
    fn default() -> Self {
        Self {
            status: "ready".to_string(),
        }
    }
}

/// One document written back to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    /// The handler's result, serialized whole.
    Success(Box<Task>),
    Error(ErrorEnvelope),
    Ready(ReadyStatus),
}

impl Reply {
    /// Build the reply for a completed task.
    pub fn from_outcome(outcome: Result<Task, HandlerError>) -> Self {
        match outcome {
            Ok(task) => Reply::Success(Box::new(task)),
            Err(err) => Reply::Error(classify(&err)),
        }
    }

    /// Reply to a readiness probe.
    pub fn ready() -> Self {
        Reply::Ready(ReadyStatus::default())
    }

    /// Serialize to a single-line JSON document (no terminator).
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
