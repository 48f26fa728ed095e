use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TaskError};
use crate::inbound::json_type_name;

const TASK_ID: &str = "taskId";
const REQUEST_ID: &str = "requestId";
const APP_ID: &str = "appId";
const AUTH_KEY: &str = "authKey";
const TASK_TYPE: &str = "taskType";
const TASK_NAME: &str = "taskName";
const HOOK_TYPE: &str = "hookType";
const REQUEST: &str = "request";
const RESPONSE: &str = "response";
const METHOD: &str = "method";
const HEADERS: &str = "headers";
const QUERY: &str = "query";
const PARAMS: &str = "params";
const BODY: &str = "body";
const ENTITY_ID: &str = "entityId";
const SERVICE_OBJECT_NAME: &str = "serviceObjectName";
const OBJECT_NAME: &str = "objectName";
const TEMP_OBJECT_STORE: &str = "tempObjectStore";
const STATUS: &str = "status";
const STATUS_CODE: &str = "statusCode";
const CONTINUE: &str = "continue";

/// The `taskType` discriminant as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskType {
    Data,
    Functions,
    Auth,
    ServiceDiscovery,
    Custom,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Data => "data",
            TaskType::Functions => "functions",
            TaskType::Auth => "auth",
            TaskType::ServiceDiscovery => "serviceDiscovery",
            TaskType::Custom => "custom",
        }
    }
}

/// Handler selection carried by `functions` and `auth` tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookTarget {
    pub task_name: Option<String>,
    pub hook_type: Option<String>,
}

impl HookTarget {
    fn take_from(fields: &mut Map<String, Value>) -> Self {
        Self {
            task_name: take(fields, TASK_NAME),
            hook_type: take(fields, HOOK_TYPE),
        }
    }
}

/// A task's type together with the fields only that type may carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Data,
    Functions(HookTarget),
    Auth(HookTarget),
    ServiceDiscovery,
    Custom,
}

impl TaskKind {
    /// The wire discriminant for this kind.
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskKind::Data => TaskType::Data,
            TaskKind::Functions(_) => TaskType::Functions,
            TaskKind::Auth(_) => TaskType::Auth,
            TaskKind::ServiceDiscovery => TaskType::ServiceDiscovery,
            TaskKind::Custom => TaskType::Custom,
        }
    }

    /// The hook target, for kinds that carry one.
    pub fn hook_target(&self) -> Option<&HookTarget> {
        match self {
            TaskKind::Functions(target) | TaskKind::Auth(target) => Some(target),
            _ => None,
        }
    }
}

/// The originating request a task describes.
///
/// A known field whose JSON type does not match stays in `extra` verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct TaskRequest {
    pub method: Option<String>,
    pub headers: Option<Map<String, Value>>,
    pub query: Option<Map<String, Value>>,
    /// Legacy spelling of `query`, still sent by older gateways.
    pub params: Option<Map<String, Value>>,
    pub body: Option<Value>,
    pub entity_id: Option<String>,
    pub service_object_name: Option<String>,
    pub object_name: Option<String>,
    pub temp_object_store: Option<Map<String, Value>>,
    /// Fields this crate does not model, kept verbatim.
    pub extra: Map<String, Value>,
}

impl TaskRequest {
    /// Copy legacy `params` into `query` when `query` is missing or empty.
    ///
    /// Both must be objects. A `query` with at least one entry always wins
    /// over `params`, and a `query` of any other JSON type is left alone.
    pub fn apply_legacy_query(&mut self) {
        if self.extra.contains_key(QUERY) {
            return;
        }
        if let Some(params) = &self.params {
            if self.query.as_ref().is_none_or(Map::is_empty) {
                self.query = Some(params.clone());
            }
        }
    }
}

impl From<Map<String, Value>> for TaskRequest {
    fn from(mut fields: Map<String, Value>) -> Self {
        Self {
            method: take(&mut fields, METHOD),
            headers: take(&mut fields, HEADERS),
            query: take(&mut fields, QUERY),
            params: take(&mut fields, PARAMS),
            body: fields.remove(BODY),
            entity_id: take(&mut fields, ENTITY_ID),
            service_object_name: take(&mut fields, SERVICE_OBJECT_NAME),
            object_name: take(&mut fields, OBJECT_NAME),
            temp_object_store: take(&mut fields, TEMP_OBJECT_STORE),
            extra: fields,
        }
    }
}

impl From<TaskRequest> for Map<String, Value> {
    fn from(request: TaskRequest) -> Self {
        let mut fields = request.extra;
        put(&mut fields, METHOD, request.method.map(Value::String));
        put(&mut fields, HEADERS, request.headers.map(Value::Object));
        put(&mut fields, QUERY, request.query.map(Value::Object));
        put(&mut fields, PARAMS, request.params.map(Value::Object));
        put(&mut fields, BODY, request.body);
        put(&mut fields, ENTITY_ID, request.entity_id.map(Value::String));
        put(
            &mut fields,
            SERVICE_OBJECT_NAME,
            request.service_object_name.map(Value::String),
        );
        put(&mut fields, OBJECT_NAME, request.object_name.map(Value::String));
        put(
            &mut fields,
            TEMP_OBJECT_STORE,
            request.temp_object_store.map(Value::Object),
        );
        fields
    }
}

/// The response a handler fills in before completing a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct TaskResponse {
    pub status: Option<u16>,
    pub status_code: Option<u16>,
    pub headers: Option<Map<String, Value>>,
    pub body: Option<Value>,
    /// Whether the gateway should continue its own request pipeline.
    pub continue_request: Option<bool>,
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for TaskResponse {
    fn from(mut fields: Map<String, Value>) -> Self {
        Self {
            status: take(&mut fields, STATUS),
            status_code: take(&mut fields, STATUS_CODE),
            headers: take(&mut fields, HEADERS),
            body: fields.remove(BODY),
            continue_request: take(&mut fields, CONTINUE),
            extra: fields,
        }
    }
}

impl From<TaskResponse> for Map<String, Value> {
    fn from(response: TaskResponse) -> Self {
        let mut fields = response.extra;
        put(&mut fields, STATUS, response.status.map(Value::from));
        put(&mut fields, STATUS_CODE, response.status_code.map(Value::from));
        put(&mut fields, HEADERS, response.headers.map(Value::Object));
        put(&mut fields, BODY, response.body);
        put(&mut fields, CONTINUE, response.continue_request.map(Value::Bool));
        fields
    }
}

/// The canonical unit of work submitted by the gateway.
///
/// Every field the gateway sends survives a decode/encode cycle: fields that
/// are not modelled here, or whose JSON type does not match the model, are
/// kept in [`Task::extra`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Task {
    /// Sender-assigned correlation id, echoed back untouched.
    pub task_id: Option<String>,
    pub request_id: Option<String>,
    pub app_id: Option<String>,
    pub auth_key: Option<String>,
    /// `None` when the document carries no recognized `taskType`.
    pub kind: Option<TaskKind>,
    /// Absent requests stay absent; nothing synthesizes one.
    pub request: Option<TaskRequest>,
    pub response: Option<TaskResponse>,
    pub extra: Map<String, Value>,
}

impl Task {
    /// Create an empty task of the given kind.
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Set the sender-assigned task id.
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// The wire `taskType`, if any.
    pub fn task_type(&self) -> Option<TaskType> {
        self.kind.as_ref().map(TaskKind::task_type)
    }

    /// The response object, created empty on first access.
    pub fn response_mut(&mut self) -> &mut TaskResponse {
        self.response.get_or_insert_with(TaskResponse::default)
    }
}

/// Turn a decoded JSON document into a [`Task`].
///
/// Fails only when `raw` is not an object; every other document becomes a
/// task, with mistyped or unknown fields passed through unchanged. Applies
/// the legacy `params` to `query` rule exactly once.
pub fn normalize(raw: Value) -> Result<Task> {
    let fields = match raw {
        Value::Object(fields) => fields,
        other => return Err(TaskError::NotAnObject(json_type_name(&other))),
    };

    let mut task = Task::from(fields);
    if let Some(request) = task.request.as_mut() {
        request.apply_legacy_query();
    }
    Ok(task)
}

impl From<Map<String, Value>> for Task {
    fn from(mut fields: Map<String, Value>) -> Self {
        let task_id = take(&mut fields, TASK_ID);
        let request_id = take(&mut fields, REQUEST_ID);
        let app_id = take(&mut fields, APP_ID);
        let auth_key = take(&mut fields, AUTH_KEY);
        // Hook fields on other kinds are not ours to interpret; they stay in `extra`.
        let kind = take(&mut fields, TASK_TYPE).map(|task_type| match task_type {
            TaskType::Data => TaskKind::Data,
            TaskType::Functions => TaskKind::Functions(HookTarget::take_from(&mut fields)),
            TaskType::Auth => TaskKind::Auth(HookTarget::take_from(&mut fields)),
            TaskType::ServiceDiscovery => TaskKind::ServiceDiscovery,
            TaskType::Custom => TaskKind::Custom,
        });

        Self {
            task_id,
            request_id,
            app_id,
            auth_key,
            kind,
            request: take(&mut fields, REQUEST),
            response: take(&mut fields, RESPONSE),
            extra: fields,
        }
    }
}

impl From<Task> for Map<String, Value> {
    fn from(task: Task) -> Self {
        let mut fields = task.extra;
        put(&mut fields, TASK_ID, task.task_id.map(Value::String));
        put(&mut fields, REQUEST_ID, task.request_id.map(Value::String));
        put(&mut fields, APP_ID, task.app_id.map(Value::String));
        put(&mut fields, AUTH_KEY, task.auth_key.map(Value::String));
        if let Some(kind) = task.kind {
            put(&mut fields, TASK_TYPE, Some(kind.task_type().as_str().into()));
            if let TaskKind::Functions(target) | TaskKind::Auth(target) = kind {
                put(&mut fields, TASK_NAME, target.task_name.map(Value::String));
                put(&mut fields, HOOK_TYPE, target.hook_type.map(Value::String));
            }
        }
        put(
            &mut fields,
            REQUEST,
            task.request.map(|request| Value::Object(request.into())),
        );
        put(
            &mut fields,
            RESPONSE,
            task.response.map(|response| Value::Object(response.into())),
        );
        fields
    }
}

/// Remove `key` when its value has the shape of `T`; otherwise leave it in place.
fn take<T: DeserializeOwned>(fields: &mut Map<String, Value>, key: &str) -> Option<T> {
    let parsed = T::deserialize(fields.get(key)?).ok()?;
    fields.remove(key);
    Some(parsed)
}

/// Set a modelled field, replacing any passthrough value under the same key.
fn put(fields: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        fields.insert(key.to_string(), value);
    }
}
