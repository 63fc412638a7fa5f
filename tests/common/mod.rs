//! Shared test utilities for integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use superagent::a2a::server::{A2aServer, SkillHandler};
use superagent::a2a::{AgentCard, Artifact, Capability, InvocationEvent, InvokeResult};
use superagent::config::ServerConfig;
use superagent::error::{Result, SuperAgentError};

/// Test agent with one skill per behavior under test:
/// - `echo` — returns its parameters as the result object
/// - `boom` — always fails
/// - `artifacts` — returns a document and a data artifact
/// - `chunks` — streams two partial completions
pub struct TestAgent;

#[async_trait]
impl SkillHandler for TestAgent {
    async fn invoke(&self, skill: &str, parameters: Map<String, Value>) -> Result<InvokeResult> {
        match skill {
            "echo" => Ok(InvokeResult {
                status: Some("completed".to_string()),
                result: Some(Value::Object(parameters)),
                artifacts: Vec::new(),
            }),
            "boom" => Err(SuperAgentError::invocation("deliberate test failure")),
            "artifacts" => Ok(InvokeResult {
                status: Some("completed".to_string()),
                result: Some(serde_json::json!({ "ok": true })),
                artifacts: vec![
                    Artifact::Document {
                        name: "report".to_string(),
                        description: "test report".to_string(),
                        content: "all fine".to_string(),
                    },
                    Artifact::Data {
                        name: "metrics".to_string(),
                        description: "test metrics".to_string(),
                        parsed_content: serde_json::json!({ "count": 3 }),
                    },
                ],
            }),
            other => Err(SuperAgentError::invocation(format!(
                "unhandled test skill '{other}'"
            ))),
        }
    }

    async fn invoke_stream(
        &self,
        skill: &str,
        parameters: Map<String, Value>,
    ) -> Result<mpsc::Receiver<InvocationEvent>> {
        match skill {
            "chunks" => {
                let (tx, rx) = mpsc::channel(8);
                tokio::spawn(async move {
                    let events = [
                        InvocationEvent::Start {
                            status: "running".to_string(),
                        },
                        InvocationEvent::Complete {
                            result: Some(serde_json::json!({ "part": 1 })),
                            status: None,
                        },
                        InvocationEvent::Complete {
                            result: Some(serde_json::json!({ "part": 2 })),
                            status: Some("completed".to_string()),
                        },
                    ];
                    for event in events {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                });
                Ok(rx)
            }
            "boom" => {
                let (tx, rx) = mpsc::channel(8);
                tokio::spawn(async move {
                    let _ = tx
                        .send(InvocationEvent::Start {
                            status: "running".to_string(),
                        })
                        .await;
                    let _ = tx
                        .send(InvocationEvent::Error {
                            message: "stream blew up".to_string(),
                        })
                        .await;
                });
                Ok(rx)
            }
            _ => {
                // Fall back to the blocking path replayed as events.
                let result = self.invoke(skill, parameters).await?;
                let (tx, rx) = mpsc::channel(8);
                let _ = tx
                    .send(InvocationEvent::Complete {
                        result: result.result,
                        status: result.status,
                    })
                    .await;
                Ok(rx)
            }
        }
    }
}

/// Card advertising every skill [`TestAgent`] implements.
pub fn test_agent_card(endpoint: &str) -> AgentCard {
    AgentCard::new("test-agent", "integration test agent", endpoint)
        .with_capability(Capability::new("echo", "echo parameters back"))
        .with_capability(Capability::new("boom", "always fails"))
        .with_capability(Capability::new("artifacts", "returns artifacts"))
        .with_capability(Capability::new("chunks", "streams partial results"))
}

static TRACING: std::sync::Once = std::sync::Once::new();

/// Start a test server on a random port.
pub async fn start_test_server(config: ServerConfig) -> (String, tokio::task::JoinHandle<()>) {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");

    let card = test_agent_card(&format!("{base_url}/"));
    let app = A2aServer::new(config).register(card, Arc::new(TestAgent)).router();

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Brief wait for the server to start accepting connections.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    (base_url, handle)
}
