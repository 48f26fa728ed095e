use serde_json::Value;

use crate::error::Result;
use crate::task::{normalize, Task};

/// Field whose truthy value marks a readiness probe.
pub const HEALTH_CHECK_FIELD: &str = "healthCheck";

/// What a decoded inbound frame asks the server to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Readiness probe; answered without invoking the handler.
    HealthCheck,
    /// A literal `null` document; dropped without a reply.
    Null,
    /// A normalized task to dispatch.
    Task(Box<Task>),
}

/// Decode one frame payload.
///
/// Returns [`crate::TaskError::Json`] for malformed JSON and the
/// [`normalize`] errors for documents that are not valid tasks.
pub fn decode_inbound(payload: &[u8]) -> Result<Inbound> {
    let value: Value = serde_json::from_slice(payload)?;

    if value.is_null() {
        return Ok(Inbound::Null);
    }
    if value.get(HEALTH_CHECK_FIELD).is_some_and(is_truthy) {
        return Ok(Inbound::HealthCheck);
    }

    normalize(value).map(|task| Inbound::Task(Box::new(task)))
}

/// JSON truthiness: `null`, `false`, `0`, and `""` are falsy, everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
