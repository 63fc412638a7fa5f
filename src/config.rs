//! Explicit, injected configuration.
//!
//! A [`SuperAgentConfig`] is constructed once at process start and passed by
//! reference into the client, server, and engine constructors. There is no
//! ambient global configuration — this keeps the core testable in isolation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::error::{Result, SuperAgentError};

/// LLM provider settings consumed by [`crate::workflow::LlmTaskConfig`] executions.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Provider identifier (e.g. `"openai"`, `"anthropic"`). Informational;
    /// the actual provider is the injected [`crate::workflow::LlmProvider`].
    pub provider: String,
    /// API key forwarded to the provider implementation, if it needs one.
    pub api_key: Option<String>,
    /// Model used when a task does not name one.
    pub default_model: String,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Retry attempts for provider calls.
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: None,
            default_model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Outbound A2A client defaults. Individual tasks may override the timeout.
#[derive(Debug, Clone)]
pub struct A2aConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// How long a fetched agent card stays cached before re-fetching.
    pub cache_ttl: Duration,
    /// Maximum invocation attempts (1 = no retries).
    pub max_retries: u32,
    /// First retry delay; subsequent delays grow by `backoff_factor`.
    pub base_delay: Duration,
    /// Upper bound on any single retry delay.
    pub max_delay: Duration,
    /// Exponential growth factor between attempts.
    pub backoff_factor: f64,
}

impl Default for A2aConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(300),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

/// One rule in the CORS origin allowlist. A request origin is allowed when
/// any configured rule matches it.
#[derive(Clone)]
pub enum OriginRule {
    /// Any origin.
    Any,
    /// Exact, case-sensitive origin match.
    Exact(String),
    /// Regular-expression match over the full origin value.
    Pattern(Regex),
    /// Arbitrary predicate over the origin value.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl OriginRule {
    /// Compile a regex rule. The pattern is matched unanchored; anchor it
    /// explicitly when a substring hit would be too permissive.
    pub fn pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            SuperAgentError::configuration(format!("invalid origin pattern '{pattern}': {e}"))
        })?;
        Ok(OriginRule::Pattern(regex))
    }

    /// Whether this rule admits the given origin.
    pub fn matches(&self, origin: &str) -> bool {
        match self {
            OriginRule::Any => true,
            OriginRule::Exact(allowed) => allowed == origin,
            OriginRule::Pattern(regex) => regex.is_match(origin),
            OriginRule::Predicate(pred) => pred(origin),
        }
    }
}

impl fmt::Debug for OriginRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginRule::Any => write!(f, "OriginRule::Any"),
            OriginRule::Exact(origin) => write!(f, "OriginRule::Exact({origin})"),
            OriginRule::Pattern(regex) => write!(f, "OriginRule::Pattern({})", regex.as_str()),
            OriginRule::Predicate(_) => write!(f, "OriginRule::Predicate(<fn>)"),
        }
    }
}

/// How the server decides whether a presented bearer token is valid.
///
/// Like [`crate::workflow::TokenSource`] on the client side, dynamic rules
/// are evaluated per request and token material never appears in `Debug`
/// output.
#[derive(Clone)]
pub enum TokenRule {
    /// A single static token.
    Static(String),
    /// Membership in a fixed token set.
    AnyOf(Vec<String>),
    /// Compare against the value of an environment variable, read per
    /// request so rotation needs no restart.
    Env(String),
    /// Arbitrary predicate over the presented token (database lookups,
    /// keyed token maps).
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl TokenRule {
    /// Whether the presented token is accepted.
    pub fn accepts(&self, presented: &str) -> bool {
        match self {
            TokenRule::Static(expected) => expected == presented,
            TokenRule::AnyOf(tokens) => tokens.iter().any(|t| t == presented),
            TokenRule::Env(var) => std::env::var(var).is_ok_and(|v| v == presented),
            TokenRule::Predicate(pred) => pred(presented),
        }
    }
}

impl fmt::Debug for TokenRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenRule::Static(_) => write!(f, "TokenRule::Static(***)"),
            TokenRule::AnyOf(tokens) => write!(f, "TokenRule::AnyOf({} tokens)", tokens.len()),
            TokenRule::Env(var) => write!(f, "TokenRule::Env({var})"),
            TokenRule::Predicate(_) => write!(f, "TokenRule::Predicate(<fn>)"),
        }
    }
}

/// Inbound A2A server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Bearer token rule enforced on non-public paths. `None` disables auth.
    pub auth_token: Option<TokenRule>,
    /// Origin rules for the CORS middleware. The default admits any origin.
    pub allowed_origins: Vec<OriginRule>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            auth_token: None,
            allowed_origins: vec![OriginRule::Any],
        }
    }
}

/// Top-level configuration for the orchestration core.
///
/// # Example
///
/// ```
/// use superagent::config::SuperAgentConfig;
/// use std::time::Duration;
///
/// let mut config = SuperAgentConfig::default();
/// config.a2a.timeout = Duration::from_secs(10);
/// config.settings.insert("billing_token".to_string(), "sk-123".to_string());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SuperAgentConfig {
    /// LLM provider defaults.
    pub llm: LlmConfig,
    /// Outbound A2A client defaults.
    pub a2a: A2aConfig,
    /// Inbound A2A server settings.
    pub server: ServerConfig,
    /// Named settings consulted by `TokenSource::Config` lookups and host
    /// integrations.
    pub settings: HashMap<String, String>,
}

impl SuperAgentConfig {
    /// Look up a named setting.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}
