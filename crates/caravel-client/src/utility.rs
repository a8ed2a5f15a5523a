//! Batch maintenance helpers on a single client.
//!
//! These operate directly on a daemon, outside any map: removing stopped
//! containers, and stopping and removing everything. Failures carry the
//! names already processed so callers can see how far the batch got.

use bollard::models::ContainerSummary;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::DockerApi;
use crate::error::ClientError;

/// Failure of a batch call, with everything completed up to that point.
#[derive(Error, Debug)]
#[error("batch operation failed after {} items: {source}", results.len())]
pub struct PartialResultsError {
    /// Names processed before the failure.
    pub results: Vec<String>,
    #[source]
    pub source: ClientError,
}

fn primary_name(container: &ContainerSummary) -> Option<String> {
    container
        .names
        .as_ref()?
        .first()
        .map(|name| name.trim_start_matches('/').to_string())
}

fn is_stopped(container: &ContainerSummary) -> bool {
    matches!(
        container.status.as_deref(),
        Some(status) if status.starts_with("Exited") || status == "Dead"
    )
}

fn is_initial(container: &ContainerSummary) -> bool {
    matches!(container.status.as_deref(), Some("") | Some("Created") | None)
}

/// Removes all stopped containers. Containers that were created but never
/// started are kept unless `include_initial` is set; `exclude` names are
/// skipped.
pub async fn cleanup_containers(
    api: &dyn DockerApi,
    include_initial: bool,
    exclude: &[String],
) -> Result<Vec<String>, PartialResultsError> {
    let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();
    let containers = api
        .list_containers(true)
        .await
        .map_err(|source| PartialResultsError {
            results: Vec::new(),
            source,
        })?;
    let candidates: Vec<String> = containers
        .iter()
        .filter(|c| is_stopped(c) || (include_initial && is_initial(c)))
        .filter_map(primary_name)
        .filter(|name| !exclude.contains(name.as_str()))
        .collect();

    let mut removed = Vec::new();
    for name in candidates {
        match api.remove_container(&name, false, false).await {
            Ok(()) => {
                info!(container = %name, "removed stopped container");
                removed.push(name);
            }
            Err(source) => {
                return Err(PartialResultsError {
                    results: removed,
                    source,
                })
            }
        }
    }
    Ok(removed)
}

/// Stops every running container, then removes all containers. Returns the
/// stopped and the removed names.
pub async fn remove_all_containers(
    api: &dyn DockerApi,
    stop_timeout: u64,
) -> Result<(Vec<String>, Vec<String>), PartialResultsError> {
    let containers = api
        .list_containers(true)
        .await
        .map_err(|source| PartialResultsError {
            results: Vec::new(),
            source,
        })?;
    let names: Vec<(String, bool)> = containers
        .iter()
        .filter_map(|c| primary_name(c).map(|name| (name, !is_stopped(c))))
        .collect();

    let mut stopped = Vec::new();
    for (name, running) in &names {
        if !running {
            continue;
        }
        match api.stop_container(name, Some(stop_timeout as i32)).await {
            Ok(()) => stopped.push(name.clone()),
            Err(ClientError::WaitTimeout(_)) => {
                warn!(container = %name, "container did not stop in time");
                let _ = api
                    .wait_container(name, Some(Duration::from_secs(stop_timeout)))
                    .await;
                stopped.push(name.clone());
            }
            Err(source) => {
                return Err(PartialResultsError {
                    results: stopped,
                    source,
                })
            }
        }
    }

    let mut removed = Vec::new();
    for (name, _) in &names {
        match api.remove_container(name, false, false).await {
            Ok(()) => removed.push(name.clone()),
            Err(source) => {
                let mut results = stopped.clone();
                results.extend(removed);
                return Err(PartialResultsError { results, source });
            }
        }
    }
    Ok((stopped, removed))
}
