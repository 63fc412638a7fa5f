//! A2A wire-level data model: agent cards, capabilities, messages, artifacts.
//!
//! All types serialize with camelCase keys to match the discovery document
//! and invocation payloads exchanged between agents. The one deliberate
//! exception to plain camelCase is `serviceEndpointURL`, which keeps its
//! historical capitalization on the wire.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SuperAgentError};

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_modalities() -> Vec<String> {
    vec!["text".to_string(), "json".to_string()]
}

/// Describes a remote agent: identity, endpoint, and advertised capabilities.
///
/// Served at `/.well-known/agent.json` and consumed by
/// [`agent_card`](crate::a2a::A2aClient::agent_card).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    /// Unique agent id. Generated when absent from the source document.
    #[serde(default = "new_id")]
    pub id: String,
    /// Human-readable agent name.
    pub name: String,
    /// Description of what the agent does.
    #[serde(default)]
    pub description: String,
    /// Semantic version of the agent. Defaults to `"1.0.0"`.
    #[serde(default = "default_version")]
    pub version: String,
    /// Base URL where the agent accepts invocations.
    #[serde(rename = "serviceEndpointURL")]
    pub service_endpoint_url: String,
    /// Skills the agent advertises. Must be non-empty to validate.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Content modalities the agent accepts/produces.
    #[serde(default = "default_modalities")]
    pub supported_modalities: Vec<String>,
    /// Authentication the agent requires (scheme descriptions, not secrets).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_requirements: Option<Value>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Creation timestamp.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl AgentCard {
    /// Create a card with a generated id and fresh timestamps.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        service_endpoint_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: name.into(),
            description: description.into(),
            version: default_version(),
            service_endpoint_url: service_endpoint_url.into(),
            capabilities: Vec::new(),
            supported_modalities: default_modalities(),
            authentication_requirements: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a capability (builder-style).
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Set the version (builder-style).
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Every validation violation for this card, empty when valid.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("name must be present".to_string());
        }
        if self.version.trim().is_empty() {
            errors.push("version must be present".to_string());
        }
        if self.service_endpoint_url.trim().is_empty() {
            errors.push("serviceEndpointURL must be present".to_string());
        } else if !is_well_formed_url(&self.service_endpoint_url) {
            errors.push(format!(
                "serviceEndpointURL is not a well-formed URL: {}",
                self.service_endpoint_url
            ));
        }
        if self.capabilities.is_empty() {
            errors.push("capabilities must contain at least one capability".to_string());
        }
        for (i, capability) in self.capabilities.iter().enumerate() {
            for err in capability.validation_errors() {
                errors.push(format!("capabilities[{i}]: {err}"));
            }
        }
        errors
    }

    /// Validate, reporting *all* violations at once.
    pub fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SuperAgentError::configuration(format!(
                "invalid agent card: {}",
                errors.join("; ")
            )))
        }
    }

    /// Serialize to the wire-format JSON document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a card from its wire-format JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether the card advertises a capability with this exact name.
    pub fn supports_skill(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name)
    }

    /// The advertised capability names, in declaration order.
    pub fn capability_names(&self) -> Vec<String> {
        self.capabilities.iter().map(|c| c.name.clone()).collect()
    }
}

/// Minimal URL well-formedness check: an http/https scheme followed by a
/// non-empty host.
pub(crate) fn is_well_formed_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or("");
            !host.is_empty()
        }
        None => false,
    }
}

/// One parameter of a [`Capability`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    /// Parameter type tag (e.g. `"string"`, `"integer"`).
    #[serde(rename = "type")]
    pub param_type: String,
    /// What the parameter means.
    #[serde(default)]
    pub description: String,
    /// Whether callers must supply it.
    #[serde(default)]
    pub required: bool,
}

/// Worked input/output example attached to a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityExample {
    /// Example input parameters.
    pub input: Value,
    /// Example output.
    pub output: Value,
    /// What the example demonstrates.
    #[serde(default)]
    pub description: String,
}

/// A named skill an agent can perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    /// Skill name, matched exactly at invocation time.
    pub name: String,
    /// What the skill does.
    #[serde(default)]
    pub description: String,
    /// Parameter specifications keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterSpec>,
    /// Schema-like description of the return shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<Value>,
    /// Worked examples.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<CapabilityExample>,
    /// De-duplicated classification tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Permissions a caller must hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_permissions: Vec<String>,
}

impl Capability {
    /// Create a capability with the required fields.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
            returns: None,
            examples: Vec::new(),
            tags: Vec::new(),
            required_permissions: Vec::new(),
        }
    }

    /// Add tags, preserving order and dropping duplicates.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        for tag in tags {
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    /// Add a parameter (builder-style).
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }

    /// Every validation violation for this capability, empty when valid.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("capability name must be present".to_string());
        }
        if self.description.trim().is_empty() {
            errors.push("capability description must be present".to_string());
        }
        errors
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from the calling side.
    User,
    /// Message from the agent.
    Agent,
    /// System instruction.
    System,
}

/// One content part of a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Part {
    /// Plain text content.
    #[serde(rename_all = "camelCase")]
    Text {
        /// The text.
        text: String,
    },
    /// File content, referenced by URI or carried inline as base64 bytes.
    #[serde(rename_all = "camelCase")]
    File {
        /// File name.
        name: String,
        /// MIME type, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// URI of the file, for by-reference parts.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
        /// Base64-encoded content, for inline parts.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<String>,
    },
    /// Structured data content.
    #[serde(rename_all = "camelCase")]
    Data {
        /// The data payload.
        data: Value,
    },
}

impl Part {
    /// Convenience constructor for a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Convenience constructor for a data part.
    pub fn data(data: Value) -> Self {
        Part::Data { data }
    }
}

/// A message exchanged with an agent: a role plus ordered content parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Sender role.
    pub role: Role,
    /// Ordered content parts.
    pub parts: Vec<Part>,
}

impl Message {
    /// Create a message with a single text part.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::text(text)],
        }
    }
}

/// A named output unit attached to an invocation result.
///
/// Artifacts are replayed into the workflow [`crate::workflow::Context`]
/// under derived keys: `<task_name>_<artifact_name>` plus a `_content`
/// (documents) or `_data` (data artifacts) suffix variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Artifact {
    /// Text/document output.
    #[serde(rename_all = "camelCase")]
    Document {
        /// Artifact name.
        name: String,
        /// What the artifact is.
        #[serde(default)]
        description: String,
        /// The document text.
        content: String,
    },
    /// Structured data output.
    #[serde(rename_all = "camelCase")]
    Data {
        /// Artifact name.
        name: String,
        /// What the artifact is.
        #[serde(default)]
        description: String,
        /// The parsed data payload.
        parsed_content: Value,
    },
}

impl Artifact {
    /// The artifact's name.
    pub fn name(&self) -> &str {
        match self {
            Artifact::Document { name, .. } | Artifact::Data { name, .. } => name,
        }
    }

    /// The artifact's description.
    pub fn description(&self) -> &str {
        match self {
            Artifact::Document { description, .. } | Artifact::Data { description, .. } => {
                description
            }
        }
    }

    /// The artifact's content as a JSON value.
    pub fn content_value(&self) -> Value {
        match self {
            Artifact::Document { content, .. } => Value::String(content.clone()),
            Artifact::Data { parsed_content, .. } => parsed_content.clone(),
        }
    }

    /// The context-key suffix for this artifact kind (`_content` for
    /// documents, `_data` for data artifacts).
    pub fn key_suffix(&self) -> &'static str {
        match self {
            Artifact::Document { .. } => "_content",
            Artifact::Data { .. } => "_data",
        }
    }
}
