//! # superagent — workflow orchestration with Agent-to-Agent (A2A) RPC
//!
//! This crate is the orchestration core of a form-automation platform: it
//! runs multi-step workflows over an immutable key/value context, where
//! each step is either an in-process closure, an LLM completion, or a
//! remote skill invocation against another agent over the A2A protocol
//! (JSON-RPC 2.0 with Server-Sent Events for streaming).
//!
//! ## Overview
//!
//! A workflow is an ordered list of named tasks. Each task reads the
//! current [`workflow::Context`], does its work, and produces updates that
//! yield a *new* context — the engine never mutates a context in place, so
//! every task's input is reconstructible from the trace. A failing task
//! halts the run unless it opted into `continue_on_error`, in which case
//! the failure lands in the context under `<task>_error` / `<task>_failed`
//! markers and execution moves on.
//!
//! The A2A side has both halves:
//! - a **client** ([`a2a::A2aClient`]) that discovers remote agents via
//!   their card at `/.well-known/agent.json`, invokes skills with retries
//!   and exponential backoff, and consumes SSE event streams
//! - a **server** ([`a2a::A2aServer`]) that exposes your own skills behind
//!   the same protocol, with CORS, bearer auth, and request logging
//!   middleware included
//!
//! ## Feature flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `client` | yes     | HTTP client for remote agents (reqwest + SSE) |
//! | `server` | yes     | axum integration for exposing skills |
//! | `full`   | no      | Enable all features |
//!
//! ## Quick start: running a workflow
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use superagent::config::SuperAgentConfig;
//! use superagent::workflow::{Context, Task, WorkflowDefinition, WorkflowEngine};
//!
//! # async fn example() -> superagent::error::Result<()> {
//! let workflow = WorkflowDefinition::new(
//!     "enrich-submission",
//!     vec![
//!         Task::direct("normalize", |ctx| {
//!             let email = ctx.get("email").and_then(|v| v.as_str()).unwrap_or("");
//!             Ok(json!({ "email": email.to_lowercase() }))
//!         }),
//!         Task::a2a(
//!             "score",
//!             superagent::workflow::A2aTaskConfig::new("http://scorer.internal:8080", "score_lead"),
//!         )
//!         .continue_on_error(),
//!     ],
//! );
//!
//! let engine = WorkflowEngine::new(SuperAgentConfig::default());
//! let initial = Context::new([("email".to_string(), json!("Ada@Example.COM"))]);
//! let result = engine.run(&workflow, initial).await?;
//!
//! println!("status: {:?}", result.status);
//! for entry in &result.trace {
//!     println!("{} [{}] {}ms", entry.task_name, entry.status.as_str(), entry.duration_ms);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Quick start: serving skills
//!
//! Implement [`a2a::SkillHandler`] and hand it to [`a2a::A2aServer`]:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use superagent::a2a::{A2aServer, AgentCard, Capability, SkillHandler};
//! use superagent::config::ServerConfig;
//!
//! let card = AgentCard::new("scorer", "scores leads", "http://scorer.internal:8080/")
//!     .with_capability(Capability::new("score_lead", "score one lead"));
//!
//! let app = A2aServer::new(ServerConfig::default())
//!     .register(card, Arc::new(MyHandler))
//!     .router();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! ## Architecture
//!
//! - [`workflow::Context`] — immutable context with private-key redaction
//!   in every logging projection
//! - [`workflow::WorkflowEngine`] — sequential execution with a per-task
//!   trace of status, duration, and output summary
//! - [`workflow::LlmProvider`] — the seam for LLM vendors; prompts are
//!   `{{key.path}}` templates rendered from the context
//! - [`a2a::AgentCard`] — discovery document (camelCase wire keys,
//!   `serviceEndpointURL` included)
//! - [`resilience::RetryManager`] — exponential backoff over an explicit
//!   allowlist of transient errors
//! - [`resilience::CircuitBreaker`] — per-job-class breaker over an
//!   injectable counter store, failing open when the store is down

pub mod a2a;
pub mod config;
pub mod error;
pub mod resilience;
pub mod workflow;

pub use error::{Result, SuperAgentError};

/// Re-exports of the types most hosts touch.
///
/// ```
/// use superagent::prelude::*;
/// ```
pub mod prelude {
    pub use crate::a2a::{AgentCard, Artifact, Capability, InvokeResult};
    pub use crate::config::SuperAgentConfig;
    pub use crate::error::{Result, SuperAgentError};
    pub use crate::workflow::{
        Context, LlmProvider, RunResult, RunStatus, Task, TaskKind, WorkflowDefinition,
        WorkflowEngine,
    };

    #[cfg(feature = "client")]
    pub use crate::a2a::A2aClient;
    #[cfg(feature = "server")]
    pub use crate::a2a::{A2aServer, SkillHandler};
}
