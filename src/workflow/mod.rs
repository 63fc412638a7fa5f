//! Workflow orchestration: immutable contexts, a closed set of task kinds,
//! and a sequential engine with per-task tracing.

pub mod context;
pub mod engine;
pub mod llm;
pub mod task;

#[cfg(feature = "client")]
mod a2a_task;

pub use context::{Context, ExpectedType, FILTERED};
pub use engine::{
    RunResult, RunStatus, TaskStatus, TraceEntry, WorkflowDefinition, WorkflowEngine,
};
pub use llm::{ChatMessage, CompletionRequest, LlmProvider, OutputFormat};
pub use task::{
    A2aTaskConfig, DirectTask, LlmTaskConfig, Task, TaskCondition, TaskKind, TokenSource,
};
