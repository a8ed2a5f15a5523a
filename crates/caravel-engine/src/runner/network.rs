//! Network operations: create requests, endpoint connection, disconnection.

use bollard::models::{EndpointIpamConfig, EndpointSettings, NetworkCreateRequest};
use caravel_core::ConfigId;
use caravel_map::{NetworkEndpoint, PRESET_NETWORKS};
use serde_json::Value as Json;

use crate::error::EngineResult;
use crate::policy::{cname, nname, Policy};

/// Resolves a network reference to the daemon-side name. Configured
/// networks get the map prefix; preset networks and already-resolved names
/// pass through.
fn resolve_network_name(policy: &Policy, map_name: &str, name: &str) -> String {
    if PRESET_NETWORKS.contains(&name) {
        return name.to_string();
    }
    match policy.map(map_name) {
        Ok(map) if map.networks.contains_key(name) => nname(map_name, name),
        _ => name.to_string(),
    }
}

pub fn create_request(
    policy: &Policy,
    id: &ConfigId,
    network_name: &str,
) -> EngineResult<NetworkCreateRequest> {
    let map = policy.map(&id.map_name)?;
    let config = map
        .networks
        .get(&id.config_name)
        .cloned()
        .unwrap_or_default();
    let options = config
        .driver_options
        .iter()
        .map(|(k, v)| {
            let value = match v {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect();
    Ok(NetworkCreateRequest {
        name: network_name.to_string(),
        driver: Some(config.driver.clone()),
        options: Some(options),
        internal: Some(config.internal),
        ..Default::default()
    })
}

fn endpoint_settings(map_name: &str, endpoint: &NetworkEndpoint) -> EndpointSettings {
    let aliases = (!endpoint.aliases.is_empty()).then(|| endpoint.aliases.clone());
    let links = (!endpoint.links.is_empty()).then(|| {
        endpoint
            .links
            .iter()
            .map(|link| {
                format!(
                    "{}:{}",
                    cname(map_name, &link.container, None),
                    link.alias.clone().unwrap_or_else(|| link.container.clone())
                )
            })
            .collect()
    });
    let ipam = if endpoint.ipv4_address.is_some()
        || endpoint.ipv6_address.is_some()
        || !endpoint.link_local_ips.is_empty()
    {
        Some(EndpointIpamConfig {
            ipv4_address: endpoint.ipv4_address.clone(),
            ipv6_address: endpoint.ipv6_address.clone(),
            link_local_ips: (!endpoint.link_local_ips.is_empty())
                .then(|| endpoint.link_local_ips.clone()),
        })
    } else {
        None
    };
    EndpointSettings {
        aliases,
        links,
        ipam_config: ipam,
        ..Default::default()
    }
}

/// Connects a container to specific endpoints.
pub async fn connect(
    policy: &Policy,
    entry: &caravel_client::ClientEntry,
    id: &ConfigId,
    container_name: &str,
    endpoints: &[NetworkEndpoint],
) -> EngineResult<()> {
    for endpoint in endpoints {
        let network_name = resolve_network_name(policy, &id.map_name, &endpoint.network_name);
        entry
            .api
            .connect_network(
                &network_name,
                container_name,
                endpoint_settings(&id.map_name, endpoint),
            )
            .await?;
    }
    Ok(())
}

/// Connects a container to all of its configured networks. Preset networks
/// are implicit and skipped.
pub async fn connect_all(
    policy: &Policy,
    entry: &caravel_client::ClientEntry,
    id: &ConfigId,
    container_name: &str,
) -> EngineResult<()> {
    if !entry.config.features().networks {
        return Ok(());
    }
    let config = policy.config(&id.map_name, &id.config_name)?;
    let endpoints: Vec<NetworkEndpoint> = config
        .networks
        .iter()
        .filter(|ep| !PRESET_NETWORKS.contains(&ep.network_name.as_str()))
        .cloned()
        .collect();
    connect(policy, entry, id, container_name, &endpoints).await
}

/// Disconnects a container from the named networks.
pub async fn disconnect(
    policy: &Policy,
    entry: &caravel_client::ClientEntry,
    id: &ConfigId,
    container_name: &str,
    networks: &[String],
) -> EngineResult<()> {
    for network in networks {
        let network_name = resolve_network_name(policy, &id.map_name, network);
        entry
            .api
            .disconnect_network(&network_name, container_name)
            .await?;
    }
    Ok(())
}
