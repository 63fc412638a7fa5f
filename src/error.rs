//! Error taxonomy for the workflow and A2A layers.
//!
//! The taxonomy mirrors the propagation policy of the core:
//! - configuration errors fail fast, before any I/O
//! - transient network errors are retryable and handled by the client's
//!   backoff loop before they ever reach the task layer
//! - business-logic errors (skill not found, auth, explicit remote errors)
//!   are never retried
//! - `Task` wraps any of the above when a task with `fail_on_error = true`
//!   halts a workflow run

use serde_json::Value;

/// Unified error type for workflow execution and A2A RPC.
///
/// Validation variants (`MissingContextKeys`, `TypeMismatch`,
/// `InvalidRequest`) aggregate *all* violations, never just the first.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SuperAgentError {
    /// Bad or missing task/client setup. Raised at construction or
    /// `validate()` time, never deferred to execution.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Human-readable error message naming every missing/invalid key.
        message: String,
    },

    /// Unreachable agent, connection failure, or DNS error. Retryable.
    #[error("Network error: {message}")]
    Network {
        /// Human-readable error message.
        message: String,
    },

    /// Request or stream exceeded its timeout. Retryable.
    #[error("Timeout: {message}")]
    Timeout {
        /// Human-readable error message.
        message: String,
    },

    /// Non-2xx HTTP response. Retryable only for 408/429/503.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Agent is reachable but does not advertise the requested skill.
    /// The message enumerates every skill the agent actually offers.
    #[error("Skill '{skill}' not found on agent; available skills: {}", available.join(", "))]
    SkillNotFound {
        /// The skill that was requested.
        skill: String,
        /// Names of the skills the agent advertises.
        available: Vec<String>,
    },

    /// Invalid or missing credentials (401). Never retried, and the
    /// expected token value is never echoed back.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// The remote agent returned an explicit error payload, or a streaming
    /// invocation reported one or more error events.
    #[error("Invocation error: {message}")]
    Invocation {
        /// Human-readable error message (joined, for streaming errors).
        message: String,
        /// Optional structured error data from the remote agent.
        data: Option<Value>,
    },

    /// Workflow-level wrapper surfaced to the engine when a task with
    /// `fail_on_error = true` fails.
    #[error("Task '{task_name}' failed: {message}")]
    Task {
        /// Name of the failing task.
        task_name: String,
        /// The underlying failure message.
        message: String,
    },

    /// Required context keys are absent or blank. Lists all of them.
    #[error("Missing context keys: {}", keys.join(", "))]
    MissingContextKeys {
        /// Every key that was missing or blank.
        keys: Vec<String>,
    },

    /// Context values have the wrong type. Lists all mismatches.
    #[error("Context type mismatch: {}", mismatches.join("; "))]
    TypeMismatch {
        /// One entry per mismatching key, e.g. `"count: expected integer, got string"`.
        mismatches: Vec<String>,
    },

    /// Malformed JSON-RPC request envelope. The message enumerates every
    /// missing field.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Human-readable error message.
        message: String,
        /// Optional structured validation data.
        data: Option<Value>,
    },

    /// Invalid JSON received from a remote (parse or deserialization failure).
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// Catch-all for errors that don't fit other categories.
    #[error("{0}")]
    Other(String),
}

/// Convenience result type for workflow and A2A operations.
pub type Result<T> = std::result::Result<T, SuperAgentError>;

impl SuperAgentError {
    /// Create a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a `Network` error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a `Timeout` error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create an `Authentication` error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create an `Invocation` error with no structured data.
    pub fn invocation(message: impl Into<String>) -> Self {
        Self::Invocation {
            message: message.into(),
            data: None,
        }
    }

    /// Create a `Task` error wrapping a failure in the named task.
    pub fn task(task_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Task {
            task_name: task_name.into(),
            message: message.into(),
        }
    }

    /// Create an `InvalidRequest` error with no structured data.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            data: None,
        }
    }

    /// Whether the client's retry loop may retry after this error.
    ///
    /// This is an explicit allowlist of transient kinds. Business-logic
    /// errors (`SkillNotFound`, `Authentication`, `Invocation`, ...) are
    /// deliberately excluded so that configuration mistakes are never
    /// masked by backoff delay.
    pub fn is_retryable(&self) -> bool {
        match self {
            SuperAgentError::Network { .. } | SuperAgentError::Timeout { .. } => true,
            SuperAgentError::Http { status, .. } => matches!(status, 408 | 429 | 503),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SuperAgentError {
    fn from(err: serde_json::Error) -> Self {
        SuperAgentError::InvalidJson(err.to_string())
    }
}

#[cfg(feature = "client")]
impl From<reqwest::Error> for SuperAgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SuperAgentError::Timeout {
                message: err.to_string(),
            }
        } else if err.is_connect() {
            SuperAgentError::Network {
                message: format!("connection failed: {err}"),
            }
        } else {
            SuperAgentError::Network {
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_timeout_are_retryable() {
        assert!(SuperAgentError::network("connection refused").is_retryable());
        assert!(SuperAgentError::timeout("30s elapsed").is_retryable());
    }

    #[test]
    fn retryable_http_statuses_are_an_allowlist() {
        for status in [408, 429, 503] {
            let err = SuperAgentError::Http {
                status,
                body: String::new(),
            };
            assert!(err.is_retryable(), "{status} should be retryable");
        }
        for status in [400, 401, 404, 500, 502] {
            let err = SuperAgentError::Http {
                status,
                body: String::new(),
            };
            assert!(!err.is_retryable(), "{status} should not be retryable");
        }
    }

    #[test]
    fn business_errors_are_never_retryable() {
        let err = SuperAgentError::SkillNotFound {
            skill: "summarize".to_string(),
            available: vec!["echo".to_string()],
        };
        assert!(!err.is_retryable());
        assert!(!SuperAgentError::authentication("bad token").is_retryable());
        assert!(!SuperAgentError::invocation("remote failure").is_retryable());
    }

    #[test]
    fn skill_not_found_enumerates_available_skills() {
        let err = SuperAgentError::SkillNotFound {
            skill: "translate".to_string(),
            available: vec!["echo".to_string(), "summarize".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("translate"));
        assert!(msg.contains("echo"));
        assert!(msg.contains("summarize"));
    }

    #[test]
    fn missing_keys_lists_all_of_them() {
        let err = SuperAgentError::MissingContextKeys {
            keys: vec!["user_id".to_string(), "form_id".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("user_id"));
        assert!(msg.contains("form_id"));
    }
}
