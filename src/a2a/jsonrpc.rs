//! JSON-RPC 2.0 envelope for A2A invocations.
//!
//! Wire format for a skill invocation:
//!
//! ```json
//! {"jsonrpc": "2.0", "method": "invoke", "id": "…",
//!  "params": {"task": {"skill": "echo", "parameters": {…}}}}
//! ```
//!
//! Request validation is performed against the raw JSON value so that it can
//! enumerate *every* missing field, not just the first one a typed
//! deserializer happens to trip over.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::a2a::model::Artifact;
use crate::error::{Result, SuperAgentError};

/// Invalid JSON was received by the server.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid Request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist / is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameter(s).
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name (`"invoke"` for skill invocation).
    pub method: String,
    /// Request id, threaded through for correlation. May be a string,
    /// number, or null — but the key must be present.
    pub id: Value,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build an `invoke` request for a skill.
    ///
    /// `webhook_url`, when set, asks the remote agent to push completion to
    /// that URL instead of (or in addition to) the response.
    pub fn invoke(
        skill: &str,
        parameters: &Map<String, Value>,
        request_id: &str,
        webhook_url: Option<&str>,
    ) -> Self {
        let mut params = json!({
            "task": {
                "skill": skill,
                "parameters": parameters,
            }
        });
        if let Some(url) = webhook_url {
            params["webhookUrl"] = Value::String(url.to_string());
        }
        Self {
            jsonrpc: "2.0".to_string(),
            method: "invoke".to_string(),
            id: Value::String(request_id.to_string()),
            params: Some(params),
        }
    }

    /// The requested skill name, when this is a well-formed invoke request.
    pub fn skill(&self) -> Option<&str> {
        self.params
            .as_ref()?
            .get("task")?
            .get("skill")?
            .as_str()
            .filter(|s| !s.trim().is_empty())
    }

    /// The invocation parameters, defaulting to an empty map.
    pub fn parameters(&self) -> Map<String, Value> {
        self.params
            .as_ref()
            .and_then(|p| p.get("task"))
            .and_then(|t| t.get("parameters"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// The webhook URL, when the caller requested asynchronous completion.
    pub fn webhook_url(&self) -> Option<&str> {
        self.params.as_ref()?.get("webhookUrl")?.as_str()
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Error message.
    pub message: String,
    /// Optional structured error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echo of the request id.
    pub id: Value,
    /// Result payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Terminal result payload of a blocking invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResult {
    /// Terminal status reported by the agent (`"completed"`).
    #[serde(default)]
    pub status: Option<String>,
    /// The primary result value.
    #[serde(default)]
    pub result: Option<Value>,
    /// Named output artifacts.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

/// A typed event of a streaming invocation. The client-side SSE parser
/// produces these; the server-side emitter serializes them.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationEvent {
    /// The agent acknowledged the invocation and started work.
    Start {
        /// Status reported by the agent (e.g. `"running"`).
        status: String,
    },
    /// A (possibly partial) completion. Multiple complete events may
    /// arrive; callers shallow-merge their results.
    Complete {
        /// Partial or final result payload, when present.
        result: Option<Value>,
        /// Terminal status, when present.
        status: Option<String>,
    },
    /// The agent reported an error. The stream may continue; the overall
    /// invocation fails if any error event was seen.
    Error {
        /// The error message.
        message: String,
    },
}

impl InvocationEvent {
    /// SSE `event:` name this variant travels under.
    pub fn wire_event(&self) -> &'static str {
        match self {
            InvocationEvent::Start { .. } => "start",
            InvocationEvent::Complete { .. } => "complete",
            InvocationEvent::Error { .. } => "error",
        }
    }

    /// SSE `data:` payload for this variant.
    pub fn wire_data(&self) -> Value {
        match self {
            InvocationEvent::Start { status } => json!({ "status": status }),
            InvocationEvent::Complete { result, status } => {
                let mut payload = Map::new();
                if let Some(result) = result {
                    payload.insert("result".to_string(), result.clone());
                }
                if let Some(status) = status {
                    payload.insert("status".to_string(), Value::String(status.clone()));
                }
                Value::Object(payload)
            }
            InvocationEvent::Error { message } => json!({ "error": message }),
        }
    }
}

/// Validate a raw JSON-RPC request document, enumerating every violation.
///
/// Checks: `jsonrpc` present and exactly `"2.0"`, `method` present,
/// `id` key present, and for `invoke` a non-blank `params.task.skill`.
pub fn validate_request(value: &Value) -> Result<JsonRpcRequest> {
    let mut violations = Vec::new();

    let obj = match value.as_object() {
        Some(obj) => obj,
        None => {
            return Err(SuperAgentError::invalid_request(
                "request body must be a JSON object",
            ))
        }
    };

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some("2.0") => {}
        Some(other) => violations.push(format!("jsonrpc must be \"2.0\", got \"{other}\"")),
        None => violations.push("missing field: jsonrpc".to_string()),
    }

    let method = obj.get("method").and_then(Value::as_str);
    if method.map_or(true, |m| m.trim().is_empty()) {
        violations.push("missing field: method".to_string());
    }

    if !obj.contains_key("id") {
        violations.push("missing field: id".to_string());
    }

    if method == Some("invoke") {
        let skill = obj
            .get("params")
            .and_then(|p| p.get("task"))
            .and_then(|t| t.get("skill"))
            .and_then(Value::as_str);
        if skill.map_or(true, |s| s.trim().is_empty()) {
            violations.push("missing field: params.task.skill".to_string());
        }
    }

    if !violations.is_empty() {
        return Err(SuperAgentError::InvalidRequest {
            message: violations.join("; "),
            data: Some(Value::Array(
                violations.into_iter().map(Value::String).collect(),
            )),
        });
    }

    Ok(JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.unwrap_or_default().to_string(),
        id: obj.get("id").cloned().unwrap_or(Value::Null),
        params: obj.get("params").cloned(),
    })
}
