/// Errors that can occur while decoding or normalizing a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The decoded document is not a JSON object.
    #[error("task must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

pub type Result<T> = std::result::Result<T, TaskError>;
