//! The A2A protocol surface: agent cards, the JSON-RPC invoke envelope,
//! the HTTP client with SSE streaming, and the axum server integration.

pub mod jsonrpc;
pub mod model;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub mod sse;

#[cfg(feature = "server")]
pub mod middleware;
#[cfg(feature = "server")]
pub mod server;

pub use jsonrpc::{InvocationEvent, InvokeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use model::{
    AgentCard, Artifact, Capability, CapabilityExample, Message, ParameterSpec, Part, Role,
};

#[cfg(feature = "client")]
pub use client::{A2aClient, AgentTransport, HttpTransport};
#[cfg(feature = "client")]
pub use sse::{EventStream, EventStreamAdapter};

#[cfg(feature = "server")]
pub use server::{A2aServer, SkillHandler};
