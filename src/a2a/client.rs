//! High-level A2A client for invoking skills on remote agents.
//!
//! The client composes discovery (agent card with TTL cache), health
//! probing, blocking and streaming invocation, retries with exponential
//! backoff, and bearer authentication. Transport is a trait seam so tests
//! can substitute a fake agent without a socket.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::A2aConfig;
use crate::error::{Result, SuperAgentError};
use crate::resilience::RetryManager;

use super::jsonrpc::{InvokeResult, JsonRpcRequest, JsonRpcResponse};
use super::model::{is_well_formed_url, AgentCard, Capability};
use super::sse::{EventStream, InvocationEvent};

/// Wire transport used by [`A2aClient`].
///
/// The production implementation is [`HttpTransport`]; tests implement this
/// trait directly to script agent behavior.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Fetch the agent card from the discovery endpoint.
    async fn get_card(&self) -> Result<AgentCard>;
    /// Probe the agent's health endpoint.
    async fn health(&self) -> Result<()>;
    /// Send a blocking JSON-RPC invocation.
    async fn invoke(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse>;
    /// Send a streaming invocation and return its event stream.
    async fn invoke_stream(&self, request: &JsonRpcRequest) -> Result<EventStream>;
}

/// HTTP transport over reqwest.
///
/// Maps responses uniformly: 401 becomes an authentication error, any other
/// non-2xx becomes an HTTP error carrying status and body text.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a transport for the given agent base URL.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SuperAgentError::configuration(format!("HTTP client setup: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Check the response status, draining the body into the error on failure.
    async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 401 {
            return Err(SuperAgentError::authentication(
                "agent rejected credentials (401)",
            ));
        }
        Err(SuperAgentError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl AgentTransport for HttpTransport {
    async fn get_card(&self) -> Result<AgentCard> {
        let response = self
            .authorize(self.http.get(self.url("/.well-known/agent.json")))
            .send()
            .await?;
        let response = Self::checked(response).await?;
        let body = response.text().await?;
        AgentCard::from_json(&body)
    }

    async fn health(&self) -> Result<()> {
        let response = self.authorize(self.http.get(self.url("/health"))).send().await?;
        Self::checked(response).await?;
        Ok(())
    }

    async fn invoke(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        let response = self
            .authorize(self.http.post(self.url("/invoke")))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await?;
        let response = Self::checked(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(Into::into)
    }

    async fn invoke_stream(&self, request: &JsonRpcRequest) -> Result<EventStream> {
        let response = self
            .authorize(self.http.post(self.url("/invoke")))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = Self::checked(response).await?;
        Ok(EventStream::from_response(response))
    }
}

struct CachedCard {
    card: AgentCard,
    fetched_at: Instant,
}

/// Client for one remote A2A agent.
///
/// # Construction
///
/// ```no_run
/// use superagent::a2a::A2aClient;
/// use superagent::config::A2aConfig;
///
/// # fn example() -> superagent::error::Result<()> {
/// let client = A2aClient::new("http://localhost:7420", A2aConfig::default())?;
/// let authed = A2aClient::with_token(
///     "http://localhost:7420",
///     A2aConfig::default(),
///     "secret-token",
/// )?;
/// # Ok(())
/// # }
/// ```
pub struct A2aClient {
    agent_url: String,
    config: A2aConfig,
    retry: RetryManager,
    transport: Arc<dyn AgentTransport>,
    card_cache: RwLock<Option<CachedCard>>,
}

impl std::fmt::Debug for A2aClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("A2aClient")
            .field("agent_url", &self.agent_url)
            .finish_non_exhaustive()
    }
}

impl A2aClient {
    /// Create a client for an agent base URL with no authentication.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the URL is not a well-formed
    /// http/https URL. This fails at construction, before any I/O.
    pub fn new(agent_url: impl Into<String>, config: A2aConfig) -> Result<Self> {
        Self::build(agent_url.into(), config, None)
    }

    /// Create a client that sends `Authorization: Bearer <token>` on every
    /// request.
    pub fn with_token(
        agent_url: impl Into<String>,
        config: A2aConfig,
        token: impl Into<String>,
    ) -> Result<Self> {
        Self::build(agent_url.into(), config, Some(token.into()))
    }

    fn build(agent_url: String, config: A2aConfig, token: Option<String>) -> Result<Self> {
        if !is_well_formed_url(&agent_url) {
            return Err(SuperAgentError::configuration(format!(
                "invalid agent URL '{agent_url}': expected http(s)://host[...]"
            )));
        }
        let transport = HttpTransport::new(&agent_url, token, config.timeout)?;
        Ok(Self::assemble(agent_url, config, Arc::new(transport)))
    }

    /// Create a client over a custom transport. Used by tests and non-HTTP
    /// integrations.
    pub fn with_transport(
        agent_url: impl Into<String>,
        config: A2aConfig,
        transport: Arc<dyn AgentTransport>,
    ) -> Self {
        Self::assemble(agent_url.into(), config, transport)
    }

    fn assemble(agent_url: String, config: A2aConfig, transport: Arc<dyn AgentTransport>) -> Self {
        let retry = RetryManager::from_config(&config);
        Self {
            agent_url,
            config,
            retry,
            transport,
            card_cache: RwLock::new(None),
        }
    }

    /// The agent base URL this client talks to.
    pub fn agent_url(&self) -> &str {
        &self.agent_url
    }

    /// Fetch the agent card, serving from cache while it is fresh.
    ///
    /// The cache TTL comes from [`A2aConfig::cache_ttl`]; a fetch failure is
    /// returned to the caller and never cached.
    pub async fn agent_card(&self) -> Result<AgentCard> {
        {
            let cache = self.card_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.config.cache_ttl {
                    return Ok(cached.card.clone());
                }
            }
        }
        self.refresh_agent_card().await
    }

    /// Fetch the agent card from the network, replacing any cached copy.
    pub async fn refresh_agent_card(&self) -> Result<AgentCard> {
        let card = self.transport.get_card().await?;
        debug!(agent_url = %self.agent_url, agent = %card.name, "fetched agent card");
        let mut cache = self.card_cache.write().await;
        *cache = Some(CachedCard {
            card: card.clone(),
            fetched_at: Instant::now(),
        });
        Ok(card)
    }

    /// List the capabilities the agent advertises.
    pub async fn list_capabilities(&self) -> Result<Vec<Capability>> {
        Ok(self.agent_card().await?.capabilities)
    }

    /// Whether the agent advertises the named skill.
    pub async fn supports_skill(&self, skill: &str) -> Result<bool> {
        Ok(self.agent_card().await?.supports_skill(skill))
    }

    /// Probe the agent's health endpoint. Never returns an error: any
    /// failure reads as unhealthy.
    pub async fn health_check(&self) -> bool {
        match self.transport.health().await {
            Ok(()) => true,
            Err(err) => {
                debug!(agent_url = %self.agent_url, error = %err, "health check failed");
                false
            }
        }
    }

    /// Invoke a skill and wait for its terminal result.
    ///
    /// The skill is checked against the agent card first; an unknown skill
    /// fails immediately with an error that names every skill the agent
    /// does offer. Transient transport failures are retried with
    /// exponential backoff; remote error payloads and `"failed"` statuses
    /// are not.
    pub async fn invoke_skill(
        &self,
        skill: &str,
        parameters: &Map<String, Value>,
    ) -> Result<InvokeResult> {
        self.invoke_with(skill, parameters, None).await
    }

    /// Invoke a skill, asking the agent to push completion to `webhook_url`.
    ///
    /// The request carries a `webhookUrl` alongside the task params; the
    /// returned result is the agent's acknowledgement. Receiving the
    /// webhook callback is the host's concern.
    pub async fn invoke_skill_with_webhook(
        &self,
        skill: &str,
        parameters: &Map<String, Value>,
        webhook_url: &str,
    ) -> Result<InvokeResult> {
        self.invoke_with(skill, parameters, Some(webhook_url)).await
    }

    async fn invoke_with(
        &self,
        skill: &str,
        parameters: &Map<String, Value>,
        webhook_url: Option<&str>,
    ) -> Result<InvokeResult> {
        let card = self.agent_card().await?;
        if !card.supports_skill(skill) {
            return Err(SuperAgentError::SkillNotFound {
                skill: skill.to_string(),
                available: card.capability_names(),
            });
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let request = JsonRpcRequest::invoke(skill, parameters, &request_id, webhook_url);

        let response = self
            .retry
            .with_retry("invoke_skill", || async {
                self.transport.invoke(&request).await
            })
            .await?;

        Self::unpack_response(skill, response)
    }

    /// Invoke a skill over SSE and fold the event stream into one result
    /// map.
    ///
    /// `complete` and `task_complete` results are shallow-merged in arrival
    /// order (later keys win). The invocation is all-or-nothing: if any
    /// error event arrives, the whole call fails with every error message
    /// joined, and partial results are discarded. The stream as a whole is
    /// bounded by [`A2aConfig::timeout`].
    pub async fn invoke_skill_streaming(
        &self,
        skill: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let mut stream = self.open_stream(skill, parameters).await?;

        let consume = async {
            let mut merged = Map::new();
            let mut errors: Vec<String> = Vec::new();

            while let Some(event) = stream.next().await {
                match event? {
                    InvocationEvent::Start { status } => {
                        debug!(skill, status = %status, "streaming invocation started");
                    }
                    InvocationEvent::Complete { result, status } => {
                        if let Some(Value::Object(map)) = result {
                            for (key, value) in map {
                                merged.insert(key, value);
                            }
                        } else if let Some(value) = result {
                            merged.insert("result".to_string(), value);
                        }
                        if let Some(status) = status {
                            merged.insert("status".to_string(), Value::String(status));
                        }
                    }
                    InvocationEvent::Error { message } => {
                        warn!(skill, error = %message, "streaming invocation reported an error");
                        errors.push(message);
                    }
                }
            }

            if errors.is_empty() {
                Ok(merged)
            } else {
                Err(SuperAgentError::invocation(errors.join("; ")))
            }
        };

        match tokio::time::timeout(self.config.timeout, consume).await {
            Ok(result) => result,
            Err(_) => Err(SuperAgentError::timeout(format!(
                "streaming invocation of '{skill}' exceeded {:?}",
                self.config.timeout
            ))),
        }
    }

    /// Open a raw event stream for a skill invocation.
    ///
    /// Most callers want [`invoke_skill_streaming`](Self::invoke_skill_streaming);
    /// this is the escape hatch for hosts that relay events as they arrive.
    pub async fn open_stream(
        &self,
        skill: &str,
        parameters: &Map<String, Value>,
    ) -> Result<EventStream> {
        let card = self.agent_card().await?;
        if !card.supports_skill(skill) {
            return Err(SuperAgentError::SkillNotFound {
                skill: skill.to_string(),
                available: card.capability_names(),
            });
        }
        let request_id = uuid::Uuid::new_v4().to_string();
        let request = JsonRpcRequest::invoke(skill, parameters, &request_id, None);
        self.transport.invoke_stream(&request).await
    }

    /// Map a JSON-RPC response envelope onto the invocation result.
    fn unpack_response(skill: &str, response: JsonRpcResponse) -> Result<InvokeResult> {
        if let Some(error) = response.error {
            return Err(SuperAgentError::Invocation {
                message: format!("agent error {}: {}", error.code, error.message),
                data: error.data,
            });
        }
        let result_value = response.result.ok_or_else(|| {
            SuperAgentError::invocation(format!(
                "agent returned neither result nor error for '{skill}'"
            ))
        })?;
        let result: InvokeResult = serde_json::from_value(result_value)?;
        if result.status.as_deref() == Some("failed") {
            return Err(SuperAgentError::invocation(format!(
                "agent reported failure for '{skill}'"
            )));
        }
        Ok(result)
    }
}
