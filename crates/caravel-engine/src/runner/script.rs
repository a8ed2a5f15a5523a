//! One-shot script containers.

use caravel_client::ClientError;
use caravel_core::ConfigId;
use serde_json::{json, Value as Json};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::action::ScriptSpec;
use crate::error::{EngineError, EngineResult};
use crate::runner::{kwargs, Runner};

/// Creates a container from the configuration, mounts the script directory,
/// runs it to completion, and collects logs and the exit code. The container
/// is removed afterwards unless `remove_existing_after` is disabled.
pub async fn run_script(
    runner: &Runner<'_>,
    client_name: &str,
    id: &ConfigId,
    container_name: &str,
    spec: &ScriptSpec,
) -> EngineResult<Json> {
    let entry = runner.policy.client(client_name)?;
    let options = runner.options;
    let container_script_dir = options.container_script_dir.clone();

    let mut extra = caravel_map::OptionsMap::new();
    if let Some(script_path) = &spec.script_path {
        let path = Path::new(script_path);
        let (script_dir, container_path) = if path.is_dir() {
            (script_path.clone(), container_script_dir.clone())
        } else {
            let dir = path
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|| ".".to_string());
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_default();
            (dir, format!("{}/{}", container_script_dir, file))
        };
        if let Some(command_format) = &spec.command_format {
            let command: Vec<String> = command_format
                .iter()
                .map(|part| part.replace("{script_path}", &container_path))
                .collect();
            extra.insert("Cmd".to_string(), json!(command));
        }
        let mut volumes = serde_json::Map::new();
        volumes.insert(container_script_dir.clone(), json!({}));
        extra.insert("Volumes".to_string(), Json::Object(volumes));
        extra.insert(
            "HostConfig".to_string(),
            json!({"Binds": [format!("{}:{}", script_dir, container_script_dir)]}),
        );
    } else if let Some(command_format) = &spec.command_format {
        extra.insert("Cmd".to_string(), json!(command_format));
    }
    if let Some(entrypoint) = &spec.entrypoint {
        extra.insert("Entrypoint".to_string(), json!([entrypoint]));
    }

    let body = kwargs::instance_create_body(
        runner.policy,
        client_name,
        id,
        container_name,
        &extra,
    )?;
    info!(container = container_name, "running script container");
    let container_id = entry.api.create_container(container_name, body).await?;
    runner.cache.add_container(client_name, container_name);

    let run = async {
        entry.api.start_container(container_name).await?;
        let timeout = options
            .wait_timeout
            .or(entry.config.wait_timeout)
            .or(entry.config.timeout);
        let exit_code = entry
            .api
            .wait_container(container_name, timeout.map(Duration::from_secs))
            .await?;
        let log = entry
            .api
            .container_logs(container_name, spec.timestamps)
            .await?;
        Ok::<(i64, String), ClientError>((exit_code, log))
    }
    .await;

    if options.remove_existing_after {
        debug!(container = container_name, "removing script container");
        let _ = entry.api.stop_container(container_name, Some(1)).await;
        entry.api.remove_container(container_name, true, true).await?;
        runner.cache.remove_container(client_name, container_name);
    }

    match run {
        Ok((exit_code, log)) => Ok(json!({
            "id": container_id,
            "exit_code": exit_code,
            "log": log,
        })),
        Err(ClientError::WaitTimeout(_)) => Err(EngineError::ScriptAction(format!(
            "timed out while waiting for the script container {}",
            container_name
        ))),
        Err(other) => Err(other.into()),
    }
}
