//! Field-by-field comparison of live containers against their effective
//! configuration. This is the computationally heavy path behind the `update`
//! intent.

use bollard::auth::DockerCredentials;
use bollard::models::{ContainerInspectResponse, Network};
use caravel_client::{ClientConfiguration, DockerApi};
use caravel_core::{shortcuts, ConfigId};
use caravel_map::{
    CmdCheck, Command, ContainerConfiguration, ExecPolicy, NetworkConfiguration, NetworkEndpoint,
    NetworkMode, OptionsMap, PRESET_NETWORKS,
};
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::cache::{normalize_tag, NameCache};
use crate::error::EngineResult;
use crate::policy::{cname, nname};
use crate::state::base::StateGenerator;
use crate::state::volumes::{instance_volumes, VolumeChecker};
use crate::state::{ConfigState, InstanceState};

/// Host config fields treated as resource limits. Mismatches here are
/// fixable in place on daemons that support host-config updates.
pub const HOST_CONFIG_LIMIT_KEYS: &[&str] = &[
    "BlkioWeight",
    "CpuPeriod",
    "CpuQuota",
    "CpuShares",
    "CpusetCpus",
    "CpusetMems",
    "Memory",
    "MemoryReservation",
    "MemorySwap",
    "KernelMemory",
];

/// Per-client working state shared across the checks of one traversal:
/// virtual filesystem paths seen on dependency containers and the endpoint
/// ids of registered networks.
pub struct UpdateContext {
    pub client_name: String,
    pub volumes: VolumeChecker,
    /// Container id to connected (network id, endpoint id) pairs.
    endpoints: HashMap<String, HashSet<(String, String)>>,
    pub default_networks: Vec<String>,
}

impl UpdateContext {
    pub async fn new(
        client_name: &str,
        api: &dyn DockerApi,
        cache: &NameCache,
    ) -> EngineResult<Self> {
        let mut context = UpdateContext {
            client_name: client_name.to_string(),
            volumes: VolumeChecker::new(),
            endpoints: HashMap::new(),
            default_networks: Vec::new(),
        };
        for preset in PRESET_NETWORKS {
            if *preset == "none" || *preset == "host" {
                continue;
            }
            if cache.has_network(client_name, preset) {
                let detail = api.inspect_network(preset).await?;
                context.default_networks.push((*preset).to_string());
                context.register_network(&detail);
            }
        }
        Ok(context)
    }

    /// Records which containers hold which endpoint on a network.
    pub fn register_network(&mut self, detail: &Network) {
        let Some(network_id) = &detail.id else { return };
        for (container_id, container) in detail.containers.iter().flatten() {
            if let Some(endpoint_id) = &container.endpoint_id {
                self.endpoints
                    .entry(container_id.clone())
                    .or_default()
                    .insert((network_id.clone(), endpoint_id.clone()));
            }
        }
    }

    fn has_endpoint(&self, container_id: &str, network_id: &str, endpoint_id: &str) -> bool {
        self.endpoints
            .get(container_id)
            .map(|pairs| pairs.contains(&(network_id.to_string(), endpoint_id.to_string())))
            .unwrap_or(false)
    }
}

pub fn credentials_for(config: &ClientConfiguration, image: &str) -> Option<DockerCredentials> {
    config.auth_for_image(image).map(|auth| DockerCredentials {
        username: auth.username.clone(),
        password: auth.password.clone(),
        email: auth.email.clone(),
        serveraddress: auth.serveraddress.clone(),
        ..Default::default()
    })
}

fn resolved_options(options: &Option<caravel_core::Value<OptionsMap>>) -> OptionsMap {
    options.as_ref().map(|o| o.resolve()).unwrap_or_default()
}

/// Runs all update comparisons for a container (or legacy attached
/// container) and merges the findings into its state flags.
pub async fn check(
    generator: &StateGenerator<'_>,
    client_name: &str,
    id: &ConfigId,
    container_name: &str,
    detail: &ContainerInspectResponse,
    state: &mut ConfigState,
    context: &mut UpdateContext,
) -> EngineResult<()> {
    let policy = generator.policy;
    let map = policy.map(&id.map_name)?;
    let config = policy.config(&id.map_name, &id.config_name)?;
    let entry = policy.client(client_name)?;
    let features = entry.config.features();

    if id.kind == caravel_core::ItemKind::Volume {
        // Legacy attached container: record where its volume lives so
        // dependent containers can be compared against it.
        let alias = id.instance_name.as_deref().unwrap_or(&id.config_name);
        if let Some(mapped_path) = policy.default_volume_path(&id.map_name, alias) {
            let volumes = instance_volumes(detail, false);
            let parent = map
                .use_attached_parent_name
                .then_some(id.config_name.as_str());
            context
                .volumes
                .register_attached(alias, parent, &mapped_path, volumes.get(&mapped_path));
        }
        return Ok(());
    }

    let flags = &mut state.flags;

    // Image id against the id currently tagged by the configured reference.
    let image_tag = normalize_tag(&map.image_for(&id.config_name, config));
    let ref_image_id = generator.cache.image_id(client_name, &image_tag);
    let live_image_id = detail.image.clone();
    if live_image_id != ref_image_id && (!config.is_persistent() || generator.options.update_persistent)
    {
        debug!(
            container = container_name,
            expected = ?ref_image_id,
            live = ?live_image_id,
            "image id differs"
        );
        flags.image_mismatch = true;
    }

    let volumes = instance_volumes(detail, features.named_volumes);
    if !context.volumes.check(
        policy,
        map,
        id,
        config,
        features.named_volumes,
        &volumes,
    )? {
        flags.volume_mismatch = true;
    }

    if !links_match(&id.map_name, config, detail) {
        flags.missing_link = true;
    }

    if !environment_matches(config, detail)
        || !command_matches(config, detail)
        || !ports_match(config, &entry.config, detail)
    {
        flags.misc_mismatch = true;
    }

    if state.state == InstanceState::Running {
        let check_option = generator.options.check_exec_commands;
        if check_option != CmdCheck::None && !config.exec_commands.is_empty() {
            let missing = if features.exec_top {
                let top = entry
                    .api
                    .top_processes(container_name, "-eo pid,user,args")
                    .await?;
                missing_exec_commands(config, &top, check_option)
            } else {
                // No process listing available; every restart command is
                // treated as missing.
                config
                    .exec_commands
                    .iter()
                    .filter(|cmd| cmd.policy == ExecPolicy::Restart)
                    .cloned()
                    .collect()
            };
            if !missing.is_empty() {
                flags.exec_missing = true;
                state.extra.missing_exec = missing;
            }
        }
    }

    if features.networks {
        check_endpoints(&id.map_name, config, detail, state, context);
    } else if !network_mode_matches(&id.map_name, config, detail) {
        state.flags.misc_mismatch = true;
    }

    if !limits_match(config, detail) {
        state.flags.host_config_mismatch = true;
    }

    Ok(())
}

fn links_match(
    map_name: &str,
    config: &ContainerConfiguration,
    detail: &ContainerInspectResponse,
) -> bool {
    if config.links.is_empty() {
        return true;
    }
    let mut live_links: HashMap<String, HashSet<String>> = HashMap::new();
    let links = detail
        .host_config
        .as_ref()
        .and_then(|hc| hc.links.clone())
        .unwrap_or_default();
    for link in links {
        let (name, alias_path) = match link.split_once(':') {
            Some(pair) => pair,
            None => continue,
        };
        let name = name.trim_start_matches('/').to_string();
        let alias = alias_path.rsplit('/').next().unwrap_or_default().to_string();
        live_links.entry(name).or_default().insert(alias);
    }
    for link in &config.links {
        let linked_name = cname(map_name, &link.container, None);
        let expected_alias = link.alias.clone().unwrap_or_else(|| link.container.clone());
        let found = live_links
            .get(&linked_name)
            .map(|aliases| aliases.contains(&expected_alias))
            .unwrap_or(false);
        if !found {
            debug!(link = %link.container, alias = %expected_alias, "configured link missing");
            return false;
        }
    }
    true
}

/// Every configured environment entry must be present with the same value;
/// extra live entries are tolerated.
fn environment_matches(
    config: &ContainerConfiguration,
    detail: &ContainerInspectResponse,
) -> bool {
    let options = resolved_options(&config.create_options);
    let Some(Json::Array(expected)) = options.get("Env") else {
        return true;
    };
    let live: HashMap<&str, &str> = detail
        .config
        .as_ref()
        .and_then(|c| c.env.as_ref())
        .map(|env| {
            env.iter()
                .filter_map(|entry| entry.split_once('='))
                .collect()
        })
        .unwrap_or_default();
    for entry in expected {
        let Some(entry) = entry.as_str() else { continue };
        let Some((key, value)) = entry.split_once('=') else {
            continue;
        };
        if live.get(key) != Some(&value) {
            debug!(key = key, "environment entry differs");
            return false;
        }
    }
    true
}

fn strip_quotes(item: &str) -> &str {
    let bytes = item.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'\'' || first == b'"') {
            return &item[1..item.len() - 1];
        }
    }
    item
}

fn normalize_cmd(value: &Json) -> Option<Vec<String>> {
    match value {
        Json::String(s) => shlex::split(s)
            .map(|parts| parts.iter().map(|p| strip_quotes(p).to_string()).collect()),
        Json::Array(items) => Some(
            items
                .iter()
                .filter_map(|i| i.as_str())
                .map(|i| strip_quotes(i).to_string())
                .collect(),
        ),
        _ => None,
    }
}

fn command_matches(config: &ContainerConfiguration, detail: &ContainerInspectResponse) -> bool {
    let options = resolved_options(&config.create_options);
    let live_config = detail.config.clone().unwrap_or_default();
    if let Some(expected) = options.get("Cmd").and_then(normalize_cmd) {
        let live = live_config.cmd.clone().unwrap_or_default();
        if expected != live {
            debug!(?expected, ?live, "command differs");
            return false;
        }
    }
    if let Some(expected) = options.get("Entrypoint").and_then(normalize_cmd) {
        let live = live_config.entrypoint.clone().unwrap_or_default();
        if expected != live {
            debug!(?expected, ?live, "entrypoint differs");
            return false;
        }
    }
    true
}

fn ports_match(
    config: &ContainerConfiguration,
    client_config: &ClientConfiguration,
    detail: &ContainerInspectResponse,
) -> bool {
    if config.exposes.is_empty() {
        return true;
    }
    let live_ports = detail
        .network_settings
        .as_ref()
        .and_then(|ns| ns.ports.clone())
        .unwrap_or_default();
    for binding in &config.exposes {
        let key = if binding.exposed_port.contains('/') {
            binding.exposed_port.clone()
        } else {
            format!("{}/tcp", binding.exposed_port)
        };
        let Some(entry) = live_ports.get(&key) else {
            debug!(port = %key, "exposed port not found");
            return false;
        };
        if let Some(host_port) = &binding.host_port {
            let host_port = host_port.resolve();
            let address = match &binding.interface {
                Some(interface) => {
                    match client_config.interface_address(interface, binding.ipv6) {
                        Some(address) => address,
                        None => return false,
                    }
                }
                None => "0.0.0.0".to_string(),
            };
            let Some(bindings) = entry else {
                debug!(port = %key, "exposed but not published");
                return false;
            };
            let found = bindings.iter().any(|b| {
                b.host_port.as_deref() == Some(host_port.as_str())
                    && match b.host_ip.as_deref() {
                        Some(ip) => ip == address || (address == "0.0.0.0" && ip.is_empty()),
                        None => address == "0.0.0.0",
                    }
            });
            if !found {
                debug!(port = %key, host_port = %host_port, "published port differs");
                return false;
            }
        }
    }
    true
}

fn missing_exec_commands(
    config: &ContainerConfiguration,
    top: &bollard::models::ContainerTopResponse,
    check: CmdCheck,
) -> Vec<caravel_map::ExecCommand> {
    let titles = top.titles.clone().unwrap_or_default();
    let user_idx = titles
        .iter()
        .position(|t| t == "USER" || t == "UID")
        .unwrap_or(1);
    let args_idx = titles
        .iter()
        .position(|t| t == "ARGS" || t == "COMMAND" || t == "CMD")
        .unwrap_or(titles.len().saturating_sub(1));
    let processes = top.processes.clone().unwrap_or_default();

    let default_user = config
        .user
        .as_ref()
        .and_then(|u| shortcuts::extract_user(&u.resolve()))
        .unwrap_or_else(|| "root".to_string());

    config
        .exec_commands
        .iter()
        .filter(|exec| exec.policy == ExecPolicy::Restart)
        .filter(|exec| {
            let line = match exec.cmd.resolve() {
                Command::Shell(s) => s,
                Command::Argv(parts) => parts.join(" "),
            };
            let user = exec
                .user
                .as_ref()
                .map(|u| u.resolve())
                .unwrap_or_else(|| default_user.clone());
            let running = processes.iter().any(|row| {
                let row_user = row.get(user_idx).map(String::as_str).unwrap_or_default();
                let row_args = row.get(args_idx).map(String::as_str).unwrap_or_default();
                row_user == user
                    && match check {
                        CmdCheck::Full => row_args == line,
                        CmdCheck::Partial => row_args.contains(&line),
                        CmdCheck::None => true,
                    }
            });
            !running
        })
        .cloned()
        .collect()
}

/// Compares configured network endpoints against the live container and
/// fills the reconnect/disconnect findings.
fn check_endpoints(
    map_name: &str,
    config: &ContainerConfiguration,
    detail: &ContainerInspectResponse,
    state: &mut ConfigState,
    context: &UpdateContext,
) {
    let live_networks = detail
        .network_settings
        .as_ref()
        .and_then(|ns| ns.networks.clone())
        .unwrap_or_default();
    let connected: HashSet<String> = live_networks.keys().cloned().collect();

    let named_endpoints: Vec<(String, NetworkEndpoint)> = if !config.networks.is_empty() {
        config
            .networks
            .iter()
            .map(|ep| {
                let name = if PRESET_NETWORKS.contains(&ep.network_name.as_str()) {
                    ep.network_name.clone()
                } else {
                    nname(map_name, &ep.network_name)
                };
                (name, ep.clone())
            })
            .collect()
    } else {
        match &config.network_mode {
            None | Some(NetworkMode::Bridge) => context
                .default_networks
                .iter()
                .map(|name| (name.clone(), NetworkEndpoint::named(name.clone())))
                .collect(),
            Some(NetworkMode::Disabled) => Vec::new(),
            Some(_) => {
                // Host and container modes are fixed at creation time; any
                // difference requires a recreate.
                if !network_mode_matches(map_name, config, detail) {
                    state.flags.misc_mismatch = true;
                }
                return;
            }
        }
    };

    let configured: HashSet<String> = named_endpoints.iter().map(|(n, _)| n.clone()).collect();
    let container_id = detail.id.clone().unwrap_or_default();
    let mut disconnected = Vec::new();
    let mut reconnect = Vec::new();

    let running = detail
        .state
        .as_ref()
        .and_then(|s| s.running)
        .unwrap_or(false);
    if running {
        for (ref_name, endpoint) in &named_endpoints {
            let Some(live) = live_networks.get(ref_name) else {
                debug!(network = %ref_name, "network not connected");
                disconnected.push(endpoint.clone());
                continue;
            };
            let live_aliases: HashSet<&str> = live
                .aliases
                .iter()
                .flatten()
                .map(String::as_str)
                .collect();
            if !endpoint
                .aliases
                .iter()
                .all(|alias| live_aliases.contains(alias.as_str()))
            {
                debug!(network = %ref_name, "aliases differ");
                reconnect.push(endpoint.clone());
                continue;
            }
            let ids = (
                live.network_id.clone().unwrap_or_default(),
                live.endpoint_id.clone().unwrap_or_default(),
            );
            if !context.has_endpoint(&container_id, &ids.0, &ids.1) {
                debug!(network = %ref_name, "endpoint not registered on network");
                reconnect.push(endpoint.clone());
                continue;
            }
            let expected_links: HashSet<String> = endpoint
                .links
                .iter()
                .map(|link| {
                    format!(
                        "{}:{}",
                        cname(map_name, &link.container, None),
                        link.alias.clone().unwrap_or_else(|| link.container.clone())
                    )
                })
                .collect();
            let live_links: HashSet<String> =
                live.links.iter().flatten().cloned().collect();
            if expected_links != live_links {
                debug!(network = %ref_name, "endpoint links differ");
                reconnect.push(endpoint.clone());
            }
        }
    } else {
        for (ref_name, endpoint) in &named_endpoints {
            if !connected.contains(ref_name) {
                disconnected.push(endpoint.clone());
            }
        }
    }

    let left: Vec<String> = connected.difference(&configured).cloned().collect();
    if !disconnected.is_empty() {
        state.flags.network_disconnected = true;
        state.extra.disconnected = disconnected;
    }
    if !reconnect.is_empty() {
        state.flags.network_mismatch = true;
        state.extra.reconnect = reconnect;
    }
    if !left.is_empty() {
        state.flags.network_left = true;
        state.extra.left = left;
    }
}

fn network_mode_matches(
    map_name: &str,
    config: &ContainerConfiguration,
    detail: &ContainerInspectResponse,
) -> bool {
    let live_mode = detail
        .host_config
        .as_ref()
        .and_then(|hc| hc.network_mode.clone())
        .unwrap_or_else(|| "default".to_string());
    match &config.network_mode {
        None => true,
        Some(NetworkMode::Bridge) => live_mode == "bridge" || live_mode == "default",
        Some(NetworkMode::Host) => live_mode == "host",
        Some(NetworkMode::Disabled) => {
            live_mode == "none"
                || detail
                    .config
                    .as_ref()
                    .and_then(|c| c.network_disabled)
                    .unwrap_or(false)
        }
        Some(NetworkMode::Container(target)) => live_mode == format!("container:{}", target),
        Some(NetworkMode::ConfigRef { config, instance }) => {
            let target = cname(map_name, config, instance.as_deref());
            live_mode == format!("container:{}", target)
        }
    }
}

fn limit_value(value: Option<&Json>) -> Json {
    match value {
        None | Some(Json::Null) => Json::from(0),
        Some(other) => other.clone(),
    }
}

/// Exact comparison over the limit keys present in the configured host
/// config; unset live values count as zero.
fn limits_match(config: &ContainerConfiguration, detail: &ContainerInspectResponse) -> bool {
    let expected = resolved_options(&config.host_config);
    if expected.is_empty() {
        return true;
    }
    let live = serde_json::to_value(detail.host_config.clone().unwrap_or_default())
        .unwrap_or(Json::Null);
    for key in HOST_CONFIG_LIMIT_KEYS {
        let Some(expected_value) = expected.get(*key) else {
            continue;
        };
        let live_value = limit_value(live.get(*key));
        if limit_value(Some(expected_value)) != live_value {
            debug!(key = key, expected = %expected_value, live = %live_value, "limit differs");
            return false;
        }
    }
    true
}

/// Driver, driver options, and the internal flag of a live network against
/// its configuration.
pub fn network_matches(config: &NetworkConfiguration, detail: &Network) -> bool {
    if detail.driver.as_deref() != Some(config.driver.as_str()) {
        return false;
    }
    if detail.internal.unwrap_or(false) != config.internal {
        return false;
    }
    let live_options = detail.options.clone().unwrap_or_default();
    for (key, value) in &config.driver_options {
        let expected = match value {
            Json::String(s) => s.clone(),
            other => other.to_string(),
        };
        if live_options.get(key) != Some(&expected) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerConfig, ContainerState, HostConfig, NetworkSettings};
    use serde_json::json;

    fn config_with_options(options: Json) -> ContainerConfiguration {
        serde_json::from_value(json!({"create_options": options})).unwrap()
    }

    fn detail_with_env(env: Vec<&str>) -> ContainerInspectResponse {
        ContainerInspectResponse {
            config: Some(ContainerConfig {
                env: Some(env.into_iter().map(String::from).collect()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn environment_uses_subset_semantics() {
        let config = config_with_options(json!({"Env": ["A=1"]}));
        assert!(environment_matches(
            &config,
            &detail_with_env(vec!["A=1", "B=2"])
        ));
        assert!(!environment_matches(&config, &detail_with_env(vec!["A=2"])));
        assert!(!environment_matches(&config, &detail_with_env(vec![])));
    }

    #[test]
    fn command_comparison_normalizes_quotes() {
        let config = config_with_options(json!({"Cmd": "sh -c 'sleep 1'"}));
        let detail = ContainerInspectResponse {
            config: Some(ContainerConfig {
                cmd: Some(vec!["sh".into(), "-c".into(), "sleep 1".into()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(command_matches(&config, &detail));
    }

    #[test]
    fn limit_comparison_treats_unset_as_zero() {
        let config: ContainerConfiguration =
            serde_json::from_value(json!({"host_config": {"Memory": 0}})).unwrap();
        let detail = ContainerInspectResponse {
            host_config: Some(HostConfig::default()),
            ..Default::default()
        };
        assert!(limits_match(&config, &detail));

        let config: ContainerConfiguration =
            serde_json::from_value(json!({"host_config": {"Memory": 1048576}})).unwrap();
        assert!(!limits_match(&config, &detail));
    }

    #[test]
    fn network_mode_config_ref_compares_container_name() {
        let config: ContainerConfiguration =
            serde_json::from_value(json!({"network_mode": "app.i1"})).unwrap();
        let detail = ContainerInspectResponse {
            host_config: Some(HostConfig {
                network_mode: Some("container:m.app.i1".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(network_mode_matches("m", &config, &detail));
    }

    #[test]
    fn running_container_without_configured_network_is_disconnected() {
        let config: ContainerConfiguration =
            serde_json::from_value(json!({"networks": ["backend"]})).unwrap();
        let detail = ContainerInspectResponse {
            id: Some("c1".into()),
            state: Some(ContainerState {
                running: Some(true),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings::default()),
            ..Default::default()
        };
        let mut state = ConfigState::absent("c", ConfigId::container("m", "web", None), false);
        let context = UpdateContext {
            client_name: "c".into(),
            volumes: VolumeChecker::new(),
            endpoints: HashMap::new(),
            default_networks: vec![],
        };
        check_endpoints("m", &config, &detail, &mut state, &context);
        assert!(state.flags.network_disconnected);
        assert_eq!(state.extra.disconnected.len(), 1);
    }
}
