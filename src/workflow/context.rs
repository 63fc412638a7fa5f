//! Immutable key/value state threaded between workflow tasks.
//!
//! Every mutation returns a *new* [`Context`]; the original is never touched.
//! That makes contexts safe to share across concurrent workflow runs without
//! locking, and makes traces deterministic to replay.
//!
//! A subset of keys can be marked private. Those are redacted in
//! [`Context::filtered_for_logging`] and [`Context::summary`], but never in
//! [`Context::to_map`] — redaction is a display concern, not a data one.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde_json::Value;

use crate::error::{Result, SuperAgentError};

/// Redaction marker used in place of private values.
pub const FILTERED: &str = "[FILTERED]";

/// Expected value type for [`Context::validate_types`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    /// JSON string.
    String,
    /// JSON integer (i64-representable number).
    Integer,
    /// Any JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ExpectedType {
    fn matches(self, value: &Value) -> bool {
        match self {
            ExpectedType::String => value.is_string(),
            ExpectedType::Integer => value.is_i64() || value.is_u64(),
            ExpectedType::Number => value.is_number(),
            ExpectedType::Boolean => value.is_boolean(),
            ExpectedType::Array => value.is_array(),
            ExpectedType::Object => value.is_object(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            ExpectedType::String => "string",
            ExpectedType::Integer => "integer",
            ExpectedType::Number => "number",
            ExpectedType::Boolean => "boolean",
            ExpectedType::Array => "array",
            ExpectedType::Object => "object",
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A value is blank if it is null, an empty/whitespace string, or an empty
/// collection.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Immutable state container for a single workflow run.
///
/// # Example
///
/// ```
/// use superagent::workflow::Context;
/// use serde_json::json;
///
/// let ctx = Context::new([("x".to_string(), json!(1))]);
/// let ctx2 = ctx.set("y", json!(2));
/// assert!(ctx.get("y").is_none());          // original untouched
/// assert_eq!(ctx2.get("y"), Some(&json!(2)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    data: BTreeMap<String, Value>,
    private_keys: BTreeSet<String>,
}

impl Context {
    /// Create a context from initial key/value pairs.
    pub fn new(data: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            data: data.into_iter().collect(),
            private_keys: BTreeSet::new(),
        }
    }

    /// Create an empty context.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a context with data and a set of private (redacted) keys.
    pub fn with_private_keys(
        data: impl IntoIterator<Item = (String, Value)>,
        private_keys: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            data: data.into_iter().collect(),
            private_keys: private_keys.into_iter().collect(),
        }
    }

    /// Get a value by key. Never fails on a missing key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the context holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Iterate over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// The private (redacted-in-logs) keys.
    pub fn private_keys(&self) -> impl Iterator<Item = &str> {
        self.private_keys.iter().map(String::as_str)
    }

    /// Return a new context with `key` set to `value`.
    #[must_use = "set returns a new Context; the original is unchanged"]
    pub fn set(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.data.insert(key.into(), value);
        next
    }

    /// Return a new context with all entries of `other` merged in.
    #[must_use = "merge returns a new Context; the original is unchanged"]
    pub fn merge(&self, other: impl IntoIterator<Item = (String, Value)>) -> Self {
        let mut next = self.clone();
        next.data.extend(other);
        next
    }

    /// Like [`merge`](Self::merge), but drops null values before merging so
    /// they cannot shadow existing entries.
    #[must_use = "merge_safe returns a new Context; the original is unchanged"]
    pub fn merge_safe(&self, other: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.merge(other.into_iter().filter(|(_, v)| !v.is_null()))
    }

    /// Return a new context restricted to the given keys. Private-key
    /// markings survive.
    #[must_use]
    pub fn slice(&self, keys: &[&str]) -> Self {
        let data = self
            .data
            .iter()
            .filter(|(k, _)| keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            data,
            private_keys: self.private_keys.clone(),
        }
    }

    /// Return a new context without the given keys. Private-key markings
    /// survive.
    #[must_use]
    pub fn except(&self, keys: &[&str]) -> Self {
        let data = self
            .data
            .iter()
            .filter(|(k, _)| !keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            data,
            private_keys: self.private_keys.clone(),
        }
    }

    /// Safe nested traversal through objects and arrays.
    ///
    /// Array steps are parsed as indices. Returns `None` on any broken link
    /// instead of failing.
    ///
    /// ```
    /// use superagent::workflow::Context;
    /// use serde_json::json;
    ///
    /// let ctx = Context::new([("form".to_string(), json!({"fields": [{"name": "email"}]}))]);
    /// assert_eq!(ctx.dig(&["form", "fields", "0", "name"]), Some(&json!("email")));
    /// assert_eq!(ctx.dig(&["form", "missing", "name"]), None);
    /// ```
    pub fn dig(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.data.get(*first)?;
        for step in rest {
            current = match current {
                Value::Object(map) => map.get(*step)?,
                Value::Array(items) => items.get(step.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Fail with [`SuperAgentError::MissingContextKeys`] listing *all* keys
    /// that are absent or blank.
    pub fn validate_presence(&self, keys: &[&str]) -> Result<()> {
        let missing: Vec<String> = keys
            .iter()
            .filter(|k| self.data.get(**k).map_or(true, is_blank))
            .map(|k| k.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SuperAgentError::MissingContextKeys { keys: missing })
        }
    }

    /// Fail with [`SuperAgentError::TypeMismatch`] aggregating *all*
    /// mismatching keys. Missing keys are reported as mismatches too.
    pub fn validate_types(&self, expectations: &[(&str, ExpectedType)]) -> Result<()> {
        let mismatches: Vec<String> = expectations
            .iter()
            .filter_map(|(key, expected)| match self.data.get(*key) {
                Some(value) if expected.matches(value) => None,
                Some(value) => Some(format!(
                    "{key}: expected {}, got {}",
                    expected.name(),
                    type_name(value)
                )),
                None => Some(format!("{key}: expected {}, got nothing", expected.name())),
            })
            .collect();
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(SuperAgentError::TypeMismatch { mismatches })
        }
    }

    /// The raw underlying data. Private keys are *not* redacted here.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.data.clone()
    }

    /// Display-safe projection with private values replaced by
    /// [`FILTERED`]. Use this for any log payload that includes context data.
    pub fn filtered_for_logging(&self) -> BTreeMap<String, Value> {
        self.data
            .iter()
            .map(|(k, v)| {
                if self.private_keys.contains(k) {
                    (k.clone(), Value::String(FILTERED.to_string()))
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect()
    }

    /// Compact, display-safe summary: private values redacted, long strings
    /// truncated to `max_length` with an ellipsis, collections shown as
    /// placeholders.
    pub fn summary(&self, max_length: usize) -> BTreeMap<String, String> {
        self.data
            .iter()
            .map(|(k, v)| {
                let rendered = if self.private_keys.contains(k) {
                    FILTERED.to_string()
                } else {
                    summarize_value(v, max_length)
                };
                (k.clone(), rendered)
            })
            .collect()
    }
}

fn summarize_value(value: &Value, max_length: usize) -> String {
    match value {
        Value::String(s) => {
            if s.chars().count() > max_length {
                let truncated: String = s.chars().take(max_length).collect();
                format!("{truncated}...")
            } else {
                s.clone()
            }
        }
        Value::Array(items) => format!("[Array with {} items]", items.len()),
        Value::Object(map) => format!("[Hash with {} keys]", map.len()),
        other => other.to_string(),
    }
}

// Equality and hashing follow the data only; private-key markings are a
// display concern and do not affect identity.
impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Context {}

impl Hash for Context {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // BTreeMap iteration order is deterministic, so hashing the
        // serialized form is stable.
        for (k, v) in &self.data {
            k.hash(state);
            v.to_string().hash(state);
        }
    }
}
