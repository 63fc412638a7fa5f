//! Task definitions.
//!
//! A [`Task`] is one named step of a workflow. The work itself is a closed
//! set of kinds: a direct closure, an LLM call, or a remote A2A skill
//! invocation. Validation runs before execution and names every problem at
//! once rather than failing on the first.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, SuperAgentError};
use crate::workflow::context::Context;
use crate::workflow::llm::{ChatMessage, OutputFormat};

/// Closure signature for [`TaskKind::Direct`] tasks.
pub type DirectFn = dyn Fn(&Context) -> Result<Value> + Send + Sync;

/// A direct (in-process) task body.
#[derive(Clone)]
pub struct DirectTask {
    func: Arc<DirectFn>,
}

impl DirectTask {
    /// Wrap a closure as a task body.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Context) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    /// Run the closure against the current context.
    pub fn call(&self, context: &Context) -> Result<Value> {
        (self.func)(context)
    }
}

impl fmt::Debug for DirectTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectTask").finish_non_exhaustive()
    }
}

/// Configuration of an LLM task.
///
/// At least one of `prompt`, `system_prompt`, or `messages` must be set.
/// `prompt` and message contents may contain `{{key}}` / `{{key.path}}`
/// placeholders rendered from the context at execution time.
#[derive(Debug, Clone, Default)]
pub struct LlmTaskConfig {
    /// User prompt template.
    pub prompt: Option<String>,
    /// System prompt template, prepended to the rendered messages.
    pub system_prompt: Option<String>,
    /// Explicit chat history. Contents are templates too.
    pub messages: Vec<ChatMessage>,
    /// Model override; falls back to [`crate::config::LlmConfig::default_model`].
    pub model: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Completion token cap.
    pub max_tokens: Option<u32>,
    /// Desired shape of the output; non-text formats are coerced from the
    /// raw completion.
    pub output_format: OutputFormat,
    /// Context key the output lands under. Defaults to `"<task>_output"`.
    pub output_key: Option<String>,
}

/// Where an A2A task gets its bearer token from, resolved at execution time.
#[derive(Clone)]
pub enum TokenSource {
    /// A literal token value.
    Literal(String),
    /// Read from an environment variable at execution time.
    EnvVar(String),
    /// Looked up in [`crate::config::SuperAgentConfig::settings`].
    Config(String),
    /// Computed by a callback at execution time.
    Callback(Arc<dyn Fn() -> Result<String> + Send + Sync>),
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::Literal(_) => f.write_str("TokenSource::Literal(***)"),
            TokenSource::EnvVar(name) => write!(f, "TokenSource::EnvVar({name})"),
            TokenSource::Config(key) => write!(f, "TokenSource::Config({key})"),
            TokenSource::Callback(_) => f.write_str("TokenSource::Callback(..)"),
        }
    }
}

/// Configuration of a remote A2A skill invocation task.
#[derive(Debug, Clone)]
pub struct A2aTaskConfig {
    /// Base URL of the remote agent.
    pub agent_url: String,
    /// Skill to invoke.
    pub skill: String,
    /// Context keys forwarded as invocation parameters. Ignored when
    /// `forward_all` is set.
    pub input: Vec<String>,
    /// Forward the entire (non-private-filtered) context. Off by default;
    /// with neither `input` nor `forward_all`, nothing is forwarded.
    pub forward_all: bool,
    /// Use the streaming (SSE) invocation path.
    pub streaming: bool,
    /// Bearer token source, if the agent requires authentication.
    pub auth: Option<TokenSource>,
    /// Per-task timeout override.
    pub timeout: Option<std::time::Duration>,
    /// Webhook URL passed through to the agent for async completion
    /// notification. Send-only; no inbound webhook handling happens here.
    pub webhook_url: Option<String>,
    /// Context key the result lands under when it is not a JSON object.
    /// Object results are merged into the context directly.
    pub output_key: Option<String>,
}

impl A2aTaskConfig {
    /// Create a config with the two required fields; everything else takes
    /// its default.
    pub fn new(agent_url: impl Into<String>, skill: impl Into<String>) -> Self {
        Self {
            agent_url: agent_url.into(),
            skill: skill.into(),
            input: Vec::new(),
            forward_all: false,
            streaming: false,
            auth: None,
            timeout: None,
            webhook_url: None,
            output_key: None,
        }
    }
}

/// The closed set of task kinds.
#[derive(Debug, Clone)]
pub enum TaskKind {
    /// An in-process closure.
    Direct(DirectTask),
    /// An LLM completion.
    Llm(LlmTaskConfig),
    /// A remote A2A skill invocation.
    A2a(A2aTaskConfig),
}

/// Gate deciding whether a task runs for the current context.
#[derive(Clone)]
pub struct TaskCondition {
    predicate: Arc<dyn Fn(&Context) -> bool + Send + Sync>,
}

impl TaskCondition {
    /// Wrap a predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Evaluate against the current context.
    pub fn holds(&self, context: &Context) -> bool {
        (self.predicate)(context)
    }
}

impl fmt::Debug for TaskCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCondition").finish_non_exhaustive()
    }
}

/// One named step of a workflow.
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique name within the workflow.
    pub name: String,
    /// What the task does.
    pub kind: TaskKind,
    /// When `true` (the default), a failure halts the workflow. When
    /// `false`, the failure is recorded in the context and the run
    /// continues.
    pub fail_on_error: bool,
    /// Optional gate; when it evaluates false the task is skipped.
    pub condition: Option<TaskCondition>,
    /// Context keys that must be present (and non-blank) before the task
    /// runs.
    pub required_inputs: Vec<String>,
    /// Context keys the task promises to provide. Informational, used by
    /// workflow-level validation.
    pub provided_outputs: Vec<String>,
}

impl Task {
    fn with_kind(name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fail_on_error: true,
            condition: None,
            required_inputs: Vec::new(),
            provided_outputs: Vec::new(),
        }
    }

    /// Create a direct task from a closure.
    pub fn direct<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Context) -> Result<Value> + Send + Sync + 'static,
    {
        Self::with_kind(name, TaskKind::Direct(DirectTask::new(func)))
    }

    /// Create an LLM task.
    pub fn llm(name: impl Into<String>, config: LlmTaskConfig) -> Self {
        Self::with_kind(name, TaskKind::Llm(config))
    }

    /// Create an A2A task.
    pub fn a2a(name: impl Into<String>, config: A2aTaskConfig) -> Self {
        Self::with_kind(name, TaskKind::A2a(config))
    }

    /// Let the workflow continue when this task fails; the failure is
    /// recorded in the context instead of halting the run.
    #[must_use]
    pub fn continue_on_error(mut self) -> Self {
        self.fail_on_error = false;
        self
    }

    /// Gate the task on a predicate over the current context.
    #[must_use]
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(TaskCondition::new(predicate));
        self
    }

    /// Declare context keys required before the task runs.
    #[must_use]
    pub fn requires<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_inputs = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Declare context keys the task provides.
    #[must_use]
    pub fn provides<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provided_outputs = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Validate the task definition, naming every problem.
    ///
    /// Runs before any I/O; a workflow with an invalid task never starts.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("task name must not be blank".to_string());
        }

        match &self.kind {
            TaskKind::Direct(_) => {}
            TaskKind::Llm(config) => {
                let has_content = config.prompt.as_deref().is_some_and(|p| !p.trim().is_empty())
                    || config
                        .system_prompt
                        .as_deref()
                        .is_some_and(|p| !p.trim().is_empty())
                    || !config.messages.is_empty();
                if !has_content {
                    problems.push(format!(
                        "task '{}': an LLM task needs a prompt, a system_prompt, or messages",
                        self.name
                    ));
                }
            }
            TaskKind::A2a(config) => {
                if config.agent_url.trim().is_empty() {
                    problems.push(format!("task '{}': agent_url is required", self.name));
                } else if !crate::a2a::model::is_well_formed_url(&config.agent_url) {
                    problems.push(format!(
                        "task '{}': agent_url '{}' is not a valid http(s) URL",
                        self.name, config.agent_url
                    ));
                }
                if config.skill.trim().is_empty() {
                    problems.push(format!("task '{}': skill is required", self.name));
                }
                if let Some(timeout) = config.timeout {
                    if timeout.is_zero() {
                        problems.push(format!("task '{}': timeout must be positive", self.name));
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SuperAgentError::configuration(problems.join("; ")))
        }
    }

    /// Short kind label used in traces and logs.
    pub fn kind_label(&self) -> &'static str {
        match &self.kind {
            TaskKind::Direct(_) => "direct",
            TaskKind::Llm(_) => "llm",
            TaskKind::A2a(_) => "a2a",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_task_runs_closure() {
        let task = Task::direct("double", |ctx| {
            let n = ctx.get("n").and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(n * 2))
        });
        let ctx = Context::new([("n".to_string(), json!(21))]);
        match &task.kind {
            TaskKind::Direct(body) => assert_eq!(body.call(&ctx).unwrap(), json!(42)),
            _ => panic!("expected direct task"),
        }
    }

    #[test]
    fn fail_on_error_defaults_to_true() {
        let task = Task::direct("t", |_| Ok(Value::Null));
        assert!(task.fail_on_error);
        assert!(!task.continue_on_error().fail_on_error);
    }

    #[test]
    fn a2a_validation_names_every_problem() {
        let mut config = A2aTaskConfig::new("", "");
        config.timeout = Some(std::time::Duration::ZERO);
        let err = Task::a2a("fetch", config).validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("agent_url is required"));
        assert!(msg.contains("skill is required"));
        assert!(msg.contains("timeout must be positive"));
    }

    #[test]
    fn a2a_validation_rejects_malformed_url() {
        let config = A2aTaskConfig::new("not a url", "echo");
        assert!(Task::a2a("fetch", config).validate().is_err());

        let config = A2aTaskConfig::new("https://agent.example.com", "echo");
        assert!(Task::a2a("fetch", config).validate().is_ok());
    }

    #[test]
    fn llm_task_needs_some_content() {
        let err = Task::llm("gen", LlmTaskConfig::default())
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("prompt"));

        let config = LlmTaskConfig {
            prompt: Some("Summarize {{text}}".to_string()),
            ..LlmTaskConfig::default()
        };
        assert!(Task::llm("gen", config).validate().is_ok());
    }

    #[test]
    fn blank_name_is_rejected() {
        let task = Task::direct("  ", |_| Ok(Value::Null));
        assert!(task.validate().is_err());
    }

    #[test]
    fn condition_gates_on_context() {
        let task = Task::direct("maybe", |_| Ok(Value::Null))
            .when(|ctx| ctx.get("enabled").and_then(Value::as_bool).unwrap_or(false));
        let condition = task.condition.as_ref().unwrap();

        let off = Context::new([("enabled".to_string(), json!(false))]);
        let on = Context::new([("enabled".to_string(), json!(true))]);
        assert!(!condition.holds(&off));
        assert!(condition.holds(&on));
    }

    #[test]
    fn token_source_debug_never_prints_literals() {
        let debug = format!("{:?}", TokenSource::Literal("sk-secret".to_string()));
        assert!(!debug.contains("sk-secret"));
    }
}
