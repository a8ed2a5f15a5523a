//! Attached volume materialization and preparation.
//!
//! On daemons with named volumes an attached volume becomes a Docker volume;
//! elsewhere a tiny holder container shares it via `volumes_from`. Ownership
//! and permissions are adjusted through a transient core-image container.

use bollard::models::{ContainerCreateBody, HostConfig, VolumeCreateOptions};
use caravel_client::ClientEntry;
use caravel_core::{shortcuts, ConfigId};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::cache::NameCache;
use crate::error::{EngineError, EngineResult};
use crate::policy::Policy;
use crate::runner::{Runner, BASE_IMAGE, CORE_IMAGE};

fn volume_path(policy: &Policy, id: &ConfigId) -> EngineResult<String> {
    let alias = id.instance_name.as_deref().unwrap_or(&id.config_name);
    let config = policy.config(&id.map_name, &id.config_name)?;
    config
        .attaches
        .iter()
        .find(|a| a.alias() == alias)
        .and_then(|a| a.path().map(String::from))
        .or_else(|| policy.default_volume_path(&id.map_name, alias))
        .ok_or_else(|| {
            EngineError::Map(caravel_map::MapError::Integrity(format!(
                "no path known for attached volume '{}'",
                alias
            )))
        })
}

/// Creates a named volume for an attached alias.
pub async fn create_volume(
    policy: &Policy,
    cache: &NameCache,
    entry: &ClientEntry,
    client_name: &str,
    id: &ConfigId,
) -> EngineResult<()> {
    let name = policy.item_name(id)?;
    let alias = id.instance_name.as_deref().unwrap_or(&id.config_name);
    let map = policy.map(&id.map_name)?;
    let volume_config = map.volumes.get(alias).cloned().unwrap_or_default();
    let driver_opts = volume_config
        .driver_options
        .iter()
        .map(|(k, v)| {
            let value = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect();
    let options = VolumeCreateOptions {
        name: Some(name.clone()),
        driver: Some(volume_config.driver.clone()),
        driver_opts: Some(driver_opts),
        ..Default::default()
    };
    entry.api.create_volume(options).await?;
    cache.add_volume(client_name, &name);
    Ok(())
}

/// Creates a legacy holder container sharing the attached volume.
pub async fn create_attached(
    policy: &Policy,
    cache: &NameCache,
    entry: &ClientEntry,
    client_name: &str,
    id: &ConfigId,
    container_name: &str,
) -> EngineResult<()> {
    let path = volume_path(policy, id)?;
    let config = policy.config(&id.map_name, &id.config_name)?;
    let user = config
        .user
        .as_ref()
        .and_then(|u| shortcuts::extract_user(&u.resolve()));

    cache
        .ensure_image(client_name, entry.api.as_ref(), BASE_IMAGE, false, None)
        .await?;
    let body = ContainerCreateBody {
        image: Some(BASE_IMAGE.to_string()),
        user,
        volumes: Some([(path, Default::default())].into_iter().collect()),
        network_disabled: Some(true),
        ..Default::default()
    };
    entry.api.create_container(container_name, body).await?;
    cache.add_container(client_name, container_name);
    Ok(())
}

/// Adjusts owner and permissions on an attached volume by running `chown`
/// and `chmod` in a transient core-image container. Volumes without a user
/// or permission setting need no preparation.
pub async fn prepare(
    runner: &Runner<'_>,
    client_name: &str,
    id: &ConfigId,
    item_name: &str,
) -> EngineResult<()> {
    if !runner.options.prepare_local {
        return Ok(());
    }
    let policy = runner.policy;
    let config = policy.config(&id.map_name, &id.config_name)?;
    let map = policy.map(&id.map_name)?;
    // Volume-level preparation settings win over the attaching
    // configuration's.
    let alias = id.instance_name.as_deref().unwrap_or(&id.config_name);
    let volume_config = map.volumes.get(alias);
    let user = volume_config
        .and_then(|v| v.user.as_ref())
        .or(config.user.as_ref())
        .and_then(|u| shortcuts::extract_user(&u.resolve()));
    let permissions = volume_config
        .and_then(|v| v.permissions.clone())
        .or_else(|| config.permissions.clone());
    if user.is_none() && permissions.is_none() {
        return Ok(());
    }

    let entry = policy.client(client_name)?;
    let features = entry.config.features();
    let path = volume_path(policy, id)?;
    let mut commands = Vec::new();
    if let Some(user) = &user {
        commands.push(shortcuts::chown_cmd(user, &path));
    }
    if let Some(permissions) = &permissions {
        commands.push(shortcuts::chmod_cmd(permissions, &path));
    }

    runner
        .cache
        .ensure_image(client_name, entry.api.as_ref(), CORE_IMAGE, false, None)
        .await?;

    let host_config = if features.named_volumes {
        HostConfig {
            binds: Some(vec![format!("{}:{}", item_name, path)]),
            ..Default::default()
        }
    } else {
        // The holder container must have finished its no-op command before
        // its volume is adjusted.
        let wait_timeout = entry.config.wait_timeout.map(Duration::from_secs);
        entry.api.wait_container(item_name, wait_timeout).await?;
        HostConfig {
            volumes_from: Some(vec![item_name.to_string()]),
            ..Default::default()
        }
    };

    let body = ContainerCreateBody {
        image: Some(CORE_IMAGE.to_string()),
        cmd: Some(vec!["sh".to_string(), "-c".to_string(), commands.join(" && ")]),
        user: Some("root".to_string()),
        network_disabled: Some(true),
        host_config: Some(host_config),
        ..Default::default()
    };
    let temp_name = format!("{}.prepare", item_name);
    debug!(volume = item_name, commands = %json!(commands), "preparing attached volume");
    entry.api.create_container(&temp_name, body).await?;
    let result = async {
        entry.api.start_container(&temp_name).await?;
        let wait_timeout = entry.config.wait_timeout.map(Duration::from_secs);
        entry.api.wait_container(&temp_name, wait_timeout).await?;
        Ok::<(), caravel_client::ClientError>(())
    }
    .await;
    entry.api.remove_container(&temp_name, true, false).await?;
    result?;
    Ok(())
}
