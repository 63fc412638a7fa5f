//! LLM task plumbing: prompt templating, the provider seam, and output
//! coercion.
//!
//! Templating is deliberately small: `{{key}}` and one-level `{{key.path}}`
//! lookups against the context, with unresolvable placeholders rendered as
//! visible `[MISSING: key]` markers rather than silently dropped.
//!
//! Coercion is lossy by design. Models wrap JSON in prose and code fences;
//! the coercer first tries a strict parse, then extracts the first
//! bracketed region, then falls back to a permissive `key: value` line
//! scan, logging a warning whenever it has to guess.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::LlmConfig;
use crate::error::Result;
use crate::workflow::context::Context;

/// One chat message sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    /// Message body; may contain `{{...}}` placeholders before rendering.
    pub content: String,
}

impl ChatMessage {
    /// Create a message with an arbitrary role.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

/// Desired shape of an LLM task's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Raw completion text.
    #[default]
    Text,
    /// Any JSON value.
    Json,
    /// A JSON object.
    Hash,
    /// A JSON array.
    Array,
    /// An integer.
    Integer,
    /// A float.
    Float,
    /// A boolean.
    Boolean,
}

/// A fully-rendered completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Rendered chat messages, in order.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Completion token cap.
    pub max_tokens: Option<u32>,
}

/// The provider seam: hosts inject an implementation backed by their LLM
/// vendor; tests inject a canned one.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion and return the raw text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Render `{{key}}` / `{{key.path}}` placeholders from the context.
///
/// Unresolvable placeholders become `[MISSING: key]` so a bad prompt is
/// visible in the output instead of silently truncated. String values are
/// inserted verbatim; everything else is inserted as compact JSON.
pub fn render_template(template: &str, context: &Context) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let key = after_open[..close].trim();
                match lookup(context, key) {
                    Some(value) => out.push_str(&render_value(value)),
                    None => {
                        out.push_str("[MISSING: ");
                        out.push_str(key);
                        out.push(']');
                    }
                }
                rest = &after_open[close + 2..];
            }
            None => {
                // Unterminated placeholder: emit the rest verbatim.
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn lookup<'a>(context: &'a Context, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return None;
    }
    if key.contains('.') {
        let path: Vec<&str> = key.split('.').collect();
        context.dig(&path)
    } else {
        context.get(key)
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coerce a raw completion into the requested output shape.
///
/// Best-effort: when the text cannot be coerced, the raw string is
/// returned and a warning is logged, so a flaky model degrades a workflow's
/// output rather than crashing it.
pub fn coerce_output(raw: &str, format: OutputFormat) -> Value {
    match format {
        OutputFormat::Text => Value::String(raw.to_string()),
        OutputFormat::Json => coerce_json(raw, None),
        OutputFormat::Hash => coerce_json(raw, Some(Shape::Object)),
        OutputFormat::Array => coerce_json(raw, Some(Shape::Array)),
        OutputFormat::Integer => match extract_integer(raw) {
            Some(n) => Value::from(n),
            None => give_up(raw, "integer"),
        },
        OutputFormat::Float => match extract_float(raw) {
            Some(f) => Value::from(f),
            None => give_up(raw, "float"),
        },
        OutputFormat::Boolean => match extract_boolean(raw) {
            Some(b) => Value::Bool(b),
            None => give_up(raw, "boolean"),
        },
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Shape {
    Object,
    Array,
}

fn shape_matches(value: &Value, shape: Option<Shape>) -> bool {
    match shape {
        None => true,
        Some(Shape::Object) => value.is_object(),
        Some(Shape::Array) => value.is_array(),
    }
}

fn coerce_json(raw: &str, shape: Option<Shape>) -> Value {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if shape_matches(&value, shape) {
            return value;
        }
    }

    // Models often wrap JSON in prose or code fences; try the first
    // bracketed region.
    let delimiters: &[(char, char)] = match shape {
        Some(Shape::Array) => &[('[', ']')],
        Some(Shape::Object) => &[('{', '}')],
        None => &[('{', '}'), ('[', ']')],
    };
    for &(open, close) in delimiters {
        if let Some(candidate) = extract_delimited(trimmed, open, close) {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                if shape_matches(&value, shape) {
                    return value;
                }
            }
        }
    }

    // Last resort for object-like output: scan `key: value` lines.
    if shape != Some(Shape::Array) {
        if let Some(object) = scan_key_value_lines(trimmed) {
            warn!("coerced LLM output via key-value line scan; output was not valid JSON");
            return object;
        }
    }

    give_up(raw, "JSON")
}

fn give_up(raw: &str, wanted: &str) -> Value {
    warn!(wanted, "could not coerce LLM output; returning raw text");
    Value::String(raw.to_string())
}

fn extract_delimited(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Parse loose `key: value` lines into an object. Values that parse as
/// JSON scalars keep their type; everything else stays a string.
fn scan_key_value_lines(text: &str) -> Option<Value> {
    let mut object = Map::new();
    for line in text.lines() {
        let line = line.trim().trim_start_matches(['-', '*']).trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().trim_matches(['"', '\'']);
        if key.is_empty() || key.contains(' ') {
            continue;
        }
        let value = value.trim().trim_end_matches(',').trim_matches(['"', '\'']);
        let parsed = serde_json::from_str::<Value>(value)
            .ok()
            .filter(|v| !v.is_object() && !v.is_array())
            .unwrap_or_else(|| Value::String(value.to_string()));
        object.insert(key.to_string(), parsed);
    }
    (!object.is_empty()).then(|| Value::Object(object))
}

fn extract_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(n);
    }
    // A sentence-final period is not a decimal point.
    first_number_token(trimmed)?.trim_end_matches('.').parse().ok()
}

fn extract_float(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if let Ok(f) = trimmed.parse::<f64>() {
        return Some(f);
    }
    first_number_token(trimmed)?.parse().ok()
}

/// First maximal run of digits (with optional sign and decimal point) in
/// the text.
fn first_number_token(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut start = None;
    for (i, &b) in bytes.iter().enumerate() {
        let is_number_char = b.is_ascii_digit()
            || b == b'.'
            || (b == b'-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit));
        match (start, is_number_char) {
            (None, true) if b != b'.' => start = Some(i),
            (Some(s), false) => return Some(&text[s..i]),
            _ => {}
        }
    }
    start.map(|s| &text[s..])
}

fn extract_boolean(raw: &str) -> Option<bool> {
    let lower = raw.trim().to_lowercase();
    if lower.starts_with("true") || lower.starts_with("yes") {
        Some(true)
    } else if lower.starts_with("false") || lower.starts_with("no") {
        Some(false)
    } else {
        None
    }
}

/// Render and run one LLM task, returning the coerced output value.
pub(crate) async fn run_llm_task(
    provider: &dyn LlmProvider,
    llm_config: &LlmConfig,
    task_config: &crate::workflow::task::LlmTaskConfig,
    context: &Context,
) -> Result<Value> {
    let mut messages = Vec::new();
    if let Some(system) = &task_config.system_prompt {
        messages.push(ChatMessage::system(render_template(system, context)));
    }
    for message in &task_config.messages {
        messages.push(ChatMessage::new(
            message.role.clone(),
            render_template(&message.content, context),
        ));
    }
    if let Some(prompt) = &task_config.prompt {
        messages.push(ChatMessage::user(render_template(prompt, context)));
    }

    let request = CompletionRequest {
        model: task_config
            .model
            .clone()
            .unwrap_or_else(|| llm_config.default_model.clone()),
        messages,
        temperature: task_config.temperature,
        max_tokens: task_config.max_tokens,
    };

    let raw = provider.complete(&request).await?;
    Ok(coerce_output(&raw, task_config.output_format))
}
