//! Execution of A2A tasks: pre-flight checks, parameter extraction, the
//! invocation itself, and folding results and artifacts back into context
//! updates.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::a2a::client::A2aClient;
use crate::config::SuperAgentConfig;
use crate::error::{Result, SuperAgentError};
use crate::workflow::context::Context;
use crate::workflow::task::{A2aTaskConfig, TokenSource};

/// Resolve the bearer token for a task, per execution so rotated
/// credentials are picked up without rebuilding the workflow.
fn resolve_token(
    source: &TokenSource,
    config: &SuperAgentConfig,
    task_name: &str,
) -> Result<String> {
    match source {
        TokenSource::Literal(token) => Ok(token.clone()),
        TokenSource::EnvVar(name) => std::env::var(name).map_err(|_| {
            SuperAgentError::configuration(format!(
                "task '{task_name}': auth env var '{name}' is not set"
            ))
        }),
        TokenSource::Config(key) => config.setting(key).map(str::to_string).ok_or_else(|| {
            SuperAgentError::configuration(format!(
                "task '{task_name}': auth setting '{key}' is not configured"
            ))
        }),
        TokenSource::Callback(callback) => callback(),
    }
}

/// Extract the invocation parameters from the context.
///
/// The `input` allowlist wins when present. `forward_all` is the explicit
/// opt-in for whole-context forwarding. With neither, nothing is forwarded
/// and a warning is logged, since an empty parameter set is usually a
/// misconfigured task rather than an intentional one.
fn extract_parameters(
    task_name: &str,
    task_config: &A2aTaskConfig,
    context: &Context,
) -> Map<String, Value> {
    if !task_config.input.is_empty() {
        let mut params = Map::new();
        for key in &task_config.input {
            if let Some(value) = context.get(key) {
                params.insert(key.clone(), value.clone());
            }
        }
        return params;
    }

    if task_config.forward_all {
        return context
            .to_map()
            .into_iter()
            .collect();
    }

    warn!(
        task = task_name,
        "no input keys configured and forward_all is off; forwarding no parameters"
    );
    Map::new()
}

/// Fold an invocation result value into context updates.
///
/// Object results merge key-by-key; anything else lands under the
/// configured output key, defaulting to `"a2a_result"`.
fn fold_result(task_config: &A2aTaskConfig, result: Value, updates: &mut Map<String, Value>) {
    match result {
        Value::Object(map) => {
            for (key, value) in map {
                updates.insert(key, value);
            }
        }
        other => {
            let key = task_config
                .output_key
                .clone()
                .unwrap_or_else(|| "a2a_result".to_string());
            updates.insert(key, other);
        }
    }
}

/// Run one A2A task against the current context and return the context
/// updates it produces.
///
/// Pre-flight: the agent must pass a health probe (failure is a network
/// error, so the retry policy upstream of workflow execution may apply) and
/// must advertise the requested skill (failure names every skill it does
/// advertise). Artifacts come back under `"<task>_<artifact>"` keys with a
/// suffix matching the artifact kind.
pub(crate) async fn run_a2a_task(
    config: &SuperAgentConfig,
    task_name: &str,
    task_config: &A2aTaskConfig,
    context: &Context,
) -> Result<Map<String, Value>> {
    let mut a2a_config = config.a2a.clone();
    if let Some(timeout) = task_config.timeout {
        a2a_config.timeout = timeout;
    }

    let client = match &task_config.auth {
        Some(source) => {
            let token = resolve_token(source, config, task_name)?;
            A2aClient::with_token(&task_config.agent_url, a2a_config, token)?
        }
        None => A2aClient::new(&task_config.agent_url, a2a_config)?,
    };

    if !client.health_check().await {
        return Err(SuperAgentError::network(format!(
            "agent at {} failed its health check",
            task_config.agent_url
        )));
    }

    let parameters = extract_parameters(task_name, task_config, context);
    debug!(
        task = task_name,
        skill = %task_config.skill,
        parameter_count = parameters.len(),
        streaming = task_config.streaming,
        "invoking remote skill"
    );

    let mut updates = Map::new();

    if task_config.streaming {
        let merged = client
            .invoke_skill_streaming(&task_config.skill, &parameters)
            .await?;
        fold_result(task_config, Value::Object(merged), &mut updates);
    } else {
        let invoke_result = match &task_config.webhook_url {
            Some(url) => {
                client
                    .invoke_skill_with_webhook(&task_config.skill, &parameters, url)
                    .await?
            }
            None => client.invoke_skill(&task_config.skill, &parameters).await?,
        };
        if let Some(result) = invoke_result.result {
            fold_result(task_config, result, &mut updates);
        }
        for artifact in &invoke_result.artifacts {
            let base = format!("{task_name}_{}", artifact.name());
            let suffixed = format!("{base}{}", artifact.key_suffix());
            updates.insert(suffixed, artifact.content_value());
            updates.insert(base, artifact.content_value());
        }
    }

    Ok(updates)
}
