//! Axum integration — ready-made HTTP routes for exposing skills as an A2A
//! agent.
//!
//! Routes:
//! - `GET /.well-known/agent.json` — agent card discovery (default agent)
//! - `GET /health` — liveness probe
//! - `POST /invoke` — JSON-RPC 2.0 skill invocation (default agent),
//!   answered as JSON or as an SSE event stream depending on `Accept`
//! - `GET /agents/{name}` — card discovery for a named agent
//! - `POST /agents/{name}/invoke` — invocation on a named agent
//!
//! The single-agent routes serve the first registered agent, so a one-agent
//! host needs no registry awareness at all. Middleware wraps the router
//! outermost-first: CORS, bearer auth, request logging.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::{Result, SuperAgentError};

use super::jsonrpc::{
    self, InvocationEvent, InvokeResult, JsonRpcError, JsonRpcResponse,
};
use super::middleware;
use super::model::AgentCard;

/// Implements the skills an agent advertises.
///
/// `invoke` is the only required method; the default streaming
/// implementation runs the blocking invocation and replays it as a
/// start/complete event pair, so handlers only implement `invoke_stream`
/// when they have genuinely incremental output.
#[async_trait]
pub trait SkillHandler: Send + Sync {
    /// Run a skill to completion.
    async fn invoke(&self, skill: &str, parameters: Map<String, Value>) -> Result<InvokeResult>;

    /// Run a skill, emitting events as work progresses.
    async fn invoke_stream(
        &self,
        skill: &str,
        parameters: Map<String, Value>,
    ) -> Result<mpsc::Receiver<InvocationEvent>> {
        let (tx, rx) = mpsc::channel(16);
        let result = self.invoke(skill, parameters).await?;
        let _ = tx
            .send(InvocationEvent::Start {
                status: "running".to_string(),
            })
            .await;
        let _ = tx
            .send(InvocationEvent::Complete {
                result: result.result,
                status: result.status.or_else(|| Some("completed".to_string())),
            })
            .await;
        Ok(rx)
    }
}

struct Agent {
    card: AgentCard,
    handler: Arc<dyn SkillHandler>,
}

struct AppState {
    agents: BTreeMap<String, Agent>,
    default_agent: String,
}

/// Builder for the A2A server router.
///
/// # Example
///
/// ```rust,ignore
/// use superagent::a2a::server::A2aServer;
/// use superagent::config::ServerConfig;
///
/// let app = A2aServer::new(ServerConfig::default())
///     .register(card, Arc::new(handler))
///     .router();
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// ```
pub struct A2aServer {
    config: ServerConfig,
    agents: BTreeMap<String, Agent>,
    default_agent: Option<String>,
}

impl A2aServer {
    /// Create a server builder.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            agents: BTreeMap::new(),
            default_agent: None,
        }
    }

    /// Register an agent. The first registered agent also answers the
    /// single-agent routes (`/.well-known/agent.json`, `/invoke`).
    #[must_use]
    pub fn register(mut self, card: AgentCard, handler: Arc<dyn SkillHandler>) -> Self {
        let name = card.name.clone();
        if self.default_agent.is_none() {
            self.default_agent = Some(name.clone());
        }
        self.agents.insert(name, Agent { card, handler });
        self
    }

    /// Build the router with all middleware applied.
    ///
    /// # Panics
    ///
    /// Panics if no agent was registered; a server with nothing to serve is
    /// a programming error, not a runtime condition.
    pub fn router(self) -> Router {
        let default_agent = self
            .default_agent
            .clone()
            .unwrap_or_else(|| panic!("A2aServer::router called with no registered agents"));
        let state = Arc::new(AppState {
            agents: self.agents,
            default_agent,
        });
        let server_config = Arc::new(self.config);

        Router::new()
            .route("/.well-known/agent.json", get(handle_default_card))
            .route("/health", get(handle_health))
            .route("/invoke", post(handle_default_invoke))
            .route("/agents/{name}", get(handle_named_card))
            .route("/agents/{name}/invoke", post(handle_named_invoke))
            .with_state(state)
            .layer(axum::middleware::from_fn(middleware::request_logging))
            .layer(axum::middleware::from_fn_with_state(
                server_config.clone(),
                middleware::auth,
            ))
            .layer(axum::middleware::from_fn_with_state(
                server_config,
                middleware::cors,
            ))
    }
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn handle_default_card(State(state): State<Arc<AppState>>) -> Response {
    match state.agents.get(&state.default_agent) {
        Some(agent) => Json(&agent.card).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_named_card(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.agents.get(&name) {
        Some(agent) => Json(&agent.card).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no agent named '{name}'") })),
        )
            .into_response(),
    }
}

async fn handle_default_invoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let agent_name = state.default_agent.clone();
    invoke_on(state, &agent_name, &headers, &body).await
}

async fn handle_named_invoke(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    invoke_on(state, &name, &headers, &body).await
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

fn rpc_error(id: Value, code: i64, message: String, data: Option<Value>) -> Response {
    Json(JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            message,
            data,
        }),
    })
    .into_response()
}

/// Parse, validate, and dispatch one invocation request.
async fn invoke_on(
    state: Arc<AppState>,
    agent_name: &str,
    headers: &HeaderMap,
    body: &str,
) -> Response {
    let Some(agent) = state.agents.get(agent_name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no agent named '{agent_name}'") })),
        )
            .into_response();
    };

    // Parse the body by hand so malformed JSON gets a JSON-RPC parse error
    // instead of a framework 400.
    let raw: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(err) => {
            return rpc_error(
                Value::Null,
                jsonrpc::PARSE_ERROR,
                format!("Parse error: {err}"),
                None,
            );
        }
    };

    let request = match jsonrpc::validate_request(&raw) {
        Ok(request) => request,
        Err(SuperAgentError::InvalidRequest { message, data }) => {
            let id = raw.get("id").cloned().unwrap_or(Value::Null);
            return rpc_error(id, jsonrpc::INVALID_REQUEST, message, data);
        }
        Err(err) => {
            return rpc_error(Value::Null, jsonrpc::INVALID_REQUEST, err.to_string(), None);
        }
    };

    if request.method != "invoke" {
        return rpc_error(
            request.id,
            jsonrpc::METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
            None,
        );
    }

    // Validation guarantees a non-blank skill for invoke.
    let skill = request.skill().unwrap_or_default().to_string();
    if !agent.card.supports_skill(&skill) {
        let available = agent.card.capability_names().join(", ");
        warn!(agent = agent_name, %skill, "unknown skill requested");
        return rpc_error(
            request.id,
            jsonrpc::INVALID_PARAMS,
            format!("Skill '{skill}' not found; available skills: {available}"),
            None,
        );
    }

    let parameters = request.parameters();
    debug!(agent = agent_name, %skill, parameter_count = parameters.len(), "dispatching invocation");

    if wants_event_stream(headers) {
        match agent.handler.invoke_stream(&skill, parameters).await {
            Ok(receiver) => sse_response(receiver),
            Err(err) => rpc_error(request.id, error_code(&err), err.to_string(), error_data(err)),
        }
    } else {
        match agent.handler.invoke(&skill, parameters).await {
            Ok(result) => match serde_json::to_value(&result) {
                Ok(value) => Json(JsonRpcResponse::success(request.id, value)).into_response(),
                Err(err) => rpc_error(
                    request.id,
                    jsonrpc::INTERNAL_ERROR,
                    format!("could not serialize result: {err}"),
                    None,
                ),
            },
            Err(err) => rpc_error(request.id, error_code(&err), err.to_string(), error_data(err)),
        }
    }
}

fn sse_response(mut receiver: mpsc::Receiver<InvocationEvent>) -> Response {
    let stream = async_stream::stream! {
        while let Some(event) = receiver.recv().await {
            let sse_event: std::result::Result<Event, Infallible> = Ok(Event::default()
                .event(event.wire_event())
                .data(event.wire_data().to_string()));
            yield sse_event;
        }
    };
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn error_code(err: &SuperAgentError) -> i64 {
    match err {
        SuperAgentError::InvalidRequest { .. } => jsonrpc::INVALID_REQUEST,
        SuperAgentError::SkillNotFound { .. } => jsonrpc::INVALID_PARAMS,
        SuperAgentError::MissingContextKeys { .. } | SuperAgentError::TypeMismatch { .. } => {
            jsonrpc::INVALID_PARAMS
        }
        _ => jsonrpc::INTERNAL_ERROR,
    }
}

fn error_data(err: SuperAgentError) -> Option<Value> {
    match err {
        SuperAgentError::Invocation { data, .. } => data,
        SuperAgentError::InvalidRequest { data, .. } => data,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2a::model::Capability;
    use crate::config::{OriginRule, TokenRule};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct EchoHandler;

    #[async_trait]
    impl SkillHandler for EchoHandler {
        async fn invoke(
            &self,
            _skill: &str,
            parameters: Map<String, Value>,
        ) -> Result<InvokeResult> {
            Ok(InvokeResult {
                status: Some("completed".to_string()),
                result: Some(Value::Object(parameters)),
                artifacts: Vec::new(),
            })
        }
    }

    fn test_card() -> AgentCard {
        AgentCard::new("echo-agent", "echoes parameters", "http://localhost:8080/")
            .with_capability(Capability::new("echo", "echo input"))
    }

    fn app(config: ServerConfig) -> Router {
        A2aServer::new(config)
            .register(test_card(), Arc::new(EchoHandler))
            .router()
    }

    fn invoke_body(skill: &str) -> String {
        json!({
            "jsonrpc": "2.0",
            "method": "invoke",
            "id": "req-1",
            "params": {"task": {"skill": skill, "parameters": {"x": 1}}}
        })
        .to_string()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn discovery_serves_camel_case_card() {
        let response = app(ServerConfig::default())
            .oneshot(
                Request::builder()
                    .uri("/.well-known/agent.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let card = body_json(response).await;
        assert_eq!(card["name"], "echo-agent");
        assert!(card.get("serviceEndpointURL").is_some());
        assert!(card.get("service_endpoint_url").is_none());
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let response = app(ServerConfig::default())
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn invoke_round_trips_parameters() {
        let response = app(ServerConfig::default())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/invoke")
                    .header("content-type", "application/json")
                    .body(Body::from(invoke_body("echo")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["id"], "req-1");
        assert_eq!(body["result"]["result"]["x"], 1);
        assert_eq!(body["result"]["status"], "completed");
    }

    #[tokio::test]
    async fn validation_lists_every_missing_field() {
        let response = app(ServerConfig::default())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/invoke")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], jsonrpc::INVALID_REQUEST);
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("jsonrpc"));
        assert!(message.contains("method"));
        assert!(message.contains("id"));
    }

    #[tokio::test]
    async fn malformed_json_gets_a_parse_error() {
        let response = app(ServerConfig::default())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/invoke")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], jsonrpc::PARSE_ERROR);
    }

    #[tokio::test]
    async fn unknown_skill_names_available_ones() {
        let response = app(ServerConfig::default())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/invoke")
                    .header("content-type", "application/json")
                    .body(Body::from(invoke_body("translate")))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], jsonrpc::INVALID_PARAMS);
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("translate"));
        assert!(message.contains("echo"));
    }

    #[tokio::test]
    async fn streaming_accept_header_gets_an_event_stream() {
        let response = app(ServerConfig::default())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/invoke")
                    .header("content-type", "application/json")
                    .header("accept", "text/event-stream")
                    .body(Body::from(invoke_body("echo")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(content_type.starts_with("text/event-stream"));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("event: start"));
        assert!(text.contains("event: complete"));
        assert!(text.contains("\"x\":1"));
    }

    #[tokio::test]
    async fn named_agent_routes_work() {
        let response = app(ServerConfig::default())
            .oneshot(
                Request::builder()
                    .uri("/agents/echo-agent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let missing = app(ServerConfig::default())
            .oneshot(
                Request::builder()
                    .uri("/agents/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    fn authed_config() -> ServerConfig {
        ServerConfig {
            auth_token: Some(TokenRule::Static("secret".to_string())),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn auth_challenge_carries_www_authenticate() {
        let response = app(authed_config())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/invoke")
                    .header("content-type", "application/json")
                    .body(Body::from(invoke_body("echo")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get(header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok()),
            Some("Bearer")
        );
        let body = body_json(response).await;
        assert_eq!(body["code"], "unauthorized");
    }

    #[tokio::test]
    async fn auth_exempts_discovery_and_health() {
        for path in ["/.well-known/agent.json", "/health"] {
            let response = app(authed_config())
                .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{path} should be public");
        }
    }

    #[tokio::test]
    async fn valid_bearer_token_is_accepted() {
        let response = app(authed_config())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/invoke")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer secret")
                    .body(Body::from(invoke_body("echo")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn token_set_rule_accepts_any_member() {
        let config = ServerConfig {
            auth_token: Some(TokenRule::AnyOf(vec![
                "reader".to_string(),
                "writer".to_string(),
            ])),
            ..ServerConfig::default()
        };

        for (token, expected) in [
            ("reader", StatusCode::OK),
            ("writer", StatusCode::OK),
            ("stranger", StatusCode::UNAUTHORIZED),
        ] {
            let response = app(config.clone())
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/invoke")
                        .header("content-type", "application/json")
                        .header("authorization", format!("Bearer {token}"))
                        .body(Body::from(invoke_body("echo")))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), expected, "token {token}");
        }
    }

    #[tokio::test]
    async fn token_predicate_rule_is_consulted_per_request() {
        let config = ServerConfig {
            auth_token: Some(TokenRule::Predicate(Arc::new(|token: &str| {
                token.starts_with("sk-")
            }))),
            ..ServerConfig::default()
        };

        let response = app(config.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/invoke")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer sk-live-1")
                    .body(Body::from(invoke_body("echo")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app(config)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/invoke")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer pk-live-1")
                    .body(Body::from(invoke_body("echo")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn origin_pattern_rule_gates_cors() {
        let config = ServerConfig {
            allowed_origins: vec![
                OriginRule::pattern(r"^https://[a-z]+\.example\.com$").unwrap()
            ],
            ..ServerConfig::default()
        };

        let allowed = app(config.clone())
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/invoke")
                    .header("origin", "https://staging.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(
            allowed
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("https://staging.example.com")
        );

        let denied = app(config)
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/invoke")
                    .header("origin", "https://example.org")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    fn cors_config() -> ServerConfig {
        ServerConfig {
            allowed_origins: vec![OriginRule::Exact("https://app.example.com".to_string())],
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn preflight_from_allowed_origin_echoes_it() {
        let response = app(cors_config())
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/invoke")
                    .header("origin", "https://app.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("https://app.example.com")
        );
    }

    #[tokio::test]
    async fn preflight_from_disallowed_origin_is_forbidden() {
        let response = app(cors_config())
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/invoke")
                    .header("origin", "https://evil.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn responses_carry_request_id_and_timing_headers() {
        let response = app(ServerConfig::default())
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", "trace-me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok()),
            Some("trace-me")
        );
        let timing = response
            .headers()
            .get("x-response-time")
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(timing.ends_with("ms"));
    }
}
