//! Sequential workflow execution with per-task tracing.
//!
//! The engine runs tasks in definition order against an immutable
//! [`Context`]: each task's updates produce a *new* context, so the trace
//! can refer to what every task actually saw. A failing task halts the run
//! unless it opted into `continue_on_error`, in which case the failure is
//! recorded under `<task>_error` / `<task>_failed` markers and execution
//! moves on. Silent continuation is opt-in, never the default.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::config::SuperAgentConfig;
use crate::error::{Result, SuperAgentError};
use crate::workflow::context::Context;
use crate::workflow::llm::LlmProvider;
use crate::workflow::task::{Task, TaskKind};

/// Execution status of one task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Not reached yet.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Condition evaluated false; the task did not run.
    Skipped,
}

impl TaskStatus {
    /// Stable lowercase label used in traces and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }
}

/// One entry of a run's execution trace.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    /// Name of the task.
    pub task_name: String,
    /// Wall-clock execution time. Zero for skipped tasks.
    pub duration_ms: u64,
    /// Terminal status of the task.
    pub status: TaskStatus,
    /// Truncated rendering of the task's output (or its error).
    pub output_summary: String,
}

/// Terminal status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every non-skipped task succeeded (or contained its own failure).
    Completed,
    /// A task with `fail_on_error` failed and halted the run.
    Failed,
}

/// Outcome of [`WorkflowEngine::run`].
#[derive(Debug)]
pub struct RunResult {
    /// Terminal status.
    pub status: RunStatus,
    /// The final context, including any failure markers.
    pub context: Context,
    /// One entry per task reached, in execution order.
    pub trace: Vec<TraceEntry>,
    /// Name of the halting task, when the run failed.
    pub failed_task: Option<String>,
    /// The halting error, when the run failed.
    pub error: Option<SuperAgentError>,
}

impl RunResult {
    /// Whether the run completed.
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// A named, ordered list of tasks.
#[derive(Debug)]
pub struct WorkflowDefinition {
    /// Workflow name, used in logs and traces.
    pub name: String,
    /// Tasks in execution order.
    pub tasks: Vec<Task>,
}

impl WorkflowDefinition {
    /// Create a workflow from its tasks.
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            tasks,
        }
    }

    /// Validate the definition, naming every problem: blank names, empty
    /// task lists, duplicate task names, and each task's own validation
    /// failures.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("workflow name must not be blank".to_string());
        }
        if self.tasks.is_empty() {
            problems.push(format!("workflow '{}' has no tasks", self.name));
        }

        let mut seen = std::collections::BTreeSet::new();
        for task in &self.tasks {
            if !seen.insert(task.name.as_str()) {
                problems.push(format!("duplicate task name '{}'", task.name));
            }
            if let Err(err) = task.validate() {
                problems.push(err.to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SuperAgentError::configuration(problems.join("; ")))
        }
    }

    /// Check that every declared `required_inputs` entry can be satisfied by
    /// the initial context keys or an upstream task's `provided_outputs`.
    ///
    /// An upstream task that declares no outputs is treated as opaque: it
    /// may produce anything, so it satisfies any later requirement. The
    /// check only catches requirements that provably cannot be met.
    pub fn validate_inputs<'a>(
        &self,
        initial_keys: impl IntoIterator<Item = &'a str>,
    ) -> Result<()> {
        let mut available: std::collections::BTreeSet<&str> =
            initial_keys.into_iter().collect();
        let mut opaque_upstream = false;
        let mut problems = Vec::new();

        for task in &self.tasks {
            for input in &task.required_inputs {
                if !opaque_upstream && !available.contains(input.as_str()) {
                    problems.push(format!(
                        "task '{}' requires '{}', which no earlier task provides",
                        task.name, input
                    ));
                }
            }
            if task.provided_outputs.is_empty() {
                opaque_upstream = true;
            } else {
                available.extend(task.provided_outputs.iter().map(String::as_str));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SuperAgentError::configuration(problems.join("; ")))
        }
    }
}

/// Runs workflows against an injected configuration and LLM provider.
pub struct WorkflowEngine {
    config: SuperAgentConfig,
    provider: Option<Arc<dyn LlmProvider>>,
}

impl WorkflowEngine {
    /// Create an engine without an LLM provider. Workflows containing LLM
    /// tasks are rejected at validation time.
    pub fn new(config: SuperAgentConfig) -> Self {
        Self {
            config,
            provider: None,
        }
    }

    /// Create an engine with an LLM provider.
    pub fn with_provider(config: SuperAgentConfig, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            config,
            provider: Some(provider),
        }
    }

    /// Run a workflow to completion.
    ///
    /// Returns `Err` only for definition problems found before execution
    /// starts; execution failures are reported through [`RunResult`] so the
    /// trace and final context are available either way.
    pub async fn run(&self, workflow: &WorkflowDefinition, initial: Context) -> Result<RunResult> {
        workflow.validate()?;
        workflow.validate_inputs(initial.keys())?;
        if self.provider.is_none()
            && workflow
                .tasks
                .iter()
                .any(|t| matches!(t.kind, TaskKind::Llm(_)))
        {
            return Err(SuperAgentError::configuration(format!(
                "workflow '{}' contains LLM tasks but no provider is configured",
                workflow.name
            )));
        }

        info!(workflow = %workflow.name, tasks = workflow.tasks.len(), "workflow started");

        let mut context = initial;
        let mut trace = Vec::with_capacity(workflow.tasks.len());

        for task in &workflow.tasks {
            if let Some(condition) = &task.condition {
                if !condition.holds(&context) {
                    info!(workflow = %workflow.name, task = %task.name, "task skipped");
                    trace.push(TraceEntry {
                        task_name: task.name.clone(),
                        duration_ms: 0,
                        status: TaskStatus::Skipped,
                        output_summary: "condition not met".to_string(),
                    });
                    continue;
                }
            }

            let started = Instant::now();
            let outcome = self.execute_task(task, &context).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(updates) => {
                    let summary = summarize_updates(&updates);
                    info!(
                        workflow = %workflow.name,
                        task = %task.name,
                        kind = task.kind_label(),
                        duration_ms,
                        "task succeeded"
                    );
                    context = context.merge(updates);
                    trace.push(TraceEntry {
                        task_name: task.name.clone(),
                        duration_ms,
                        status: TaskStatus::Succeeded,
                        output_summary: summary,
                    });
                }
                Err(err) => {
                    trace.push(TraceEntry {
                        task_name: task.name.clone(),
                        duration_ms,
                        status: TaskStatus::Failed,
                        output_summary: err.to_string(),
                    });

                    if task.fail_on_error {
                        error!(
                            workflow = %workflow.name,
                            task = %task.name,
                            duration_ms,
                            error = %err,
                            "task failed; halting workflow"
                        );
                        let halting = SuperAgentError::task(&task.name, err.to_string());
                        context = context
                            .set(format!("{}_error", task.name), Value::String(err.to_string()));
                        return Ok(RunResult {
                            status: RunStatus::Failed,
                            context,
                            trace,
                            failed_task: Some(task.name.clone()),
                            error: Some(halting),
                        });
                    }

                    warn!(
                        workflow = %workflow.name,
                        task = %task.name,
                        duration_ms,
                        error = %err,
                        "task failed; continuing (continue_on_error)"
                    );
                    context = context.merge([
                        (
                            format!("{}_error", task.name),
                            Value::String(err.to_string()),
                        ),
                        (format!("{}_failed", task.name), Value::Bool(true)),
                    ]);
                }
            }
        }

        info!(workflow = %workflow.name, "workflow completed");
        Ok(RunResult {
            status: RunStatus::Completed,
            context,
            trace,
            failed_task: None,
            error: None,
        })
    }

    async fn execute_task(&self, task: &Task, context: &Context) -> Result<Map<String, Value>> {
        let required: Vec<&str> = task.required_inputs.iter().map(String::as_str).collect();
        context.validate_presence(&required)?;

        match &task.kind {
            TaskKind::Direct(body) => {
                let value = body.call(context)?;
                let mut updates = Map::new();
                match value {
                    Value::Null => {}
                    Value::Object(map) => updates.extend(map),
                    other => {
                        updates.insert(format!("{}_output", task.name), other);
                    }
                }
                Ok(updates)
            }
            TaskKind::Llm(config) => {
                let provider = self
                    .provider
                    .as_deref()
                    .ok_or_else(|| SuperAgentError::configuration("no LLM provider configured"))?;
                let value =
                    crate::workflow::llm::run_llm_task(provider, &self.config.llm, config, context)
                        .await?;
                let key = config
                    .output_key
                    .clone()
                    .unwrap_or_else(|| format!("{}_output", task.name));
                let mut updates = Map::new();
                updates.insert(key, value);
                Ok(updates)
            }
            #[cfg(feature = "client")]
            TaskKind::A2a(config) => {
                crate::workflow::a2a_task::run_a2a_task(&self.config, &task.name, config, context)
                    .await
            }
            #[cfg(not(feature = "client"))]
            TaskKind::A2a(_) => Err(SuperAgentError::configuration(
                "A2A tasks require the 'client' feature",
            )),
        }
    }
}

/// Short human-readable rendering of a task's context updates.
fn summarize_updates(updates: &Map<String, Value>) -> String {
    const MAX_VALUE_LEN: usize = 60;
    if updates.is_empty() {
        return "no updates".to_string();
    }
    updates
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Array(items) => format!("[Array with {} items]", items.len()),
                Value::Object(map) => format!("[Hash with {} keys]", map.len()),
                other => other.to_string(),
            };
            let rendered = if rendered.chars().count() > MAX_VALUE_LEN {
                let truncated: String = rendered.chars().take(MAX_VALUE_LEN).collect();
                format!("{truncated}...")
            } else {
                rendered
            };
            format!("{key}={rendered}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}
