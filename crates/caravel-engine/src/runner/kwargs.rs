//! Assembly of create and host-config request bodies.
//!
//! Derived fields come from the structured configuration; `create_options`
//! and `host_config` from the configuration overlay them, and caller kwargs
//! overlay both. Scalar fields overwrite, arrays extend, and nested objects
//! merge key-wise; `Cmd` and `Entrypoint` always overwrite.

use bollard::models::{ContainerCreateBody, ContainerUpdateBody};
use caravel_client::ClientConfiguration;
use caravel_core::{shortcuts, ConfigId};
use caravel_map::{
    ContainerConfiguration, ContainerMap, HostBind, NetworkMode, OptionsMap, UsedVolume,
};
use serde_json::{json, Map as JsonMap, Value as Json};

use crate::error::{EngineError, EngineResult};
use crate::policy::{aname, cname, hostname, Policy};
use crate::state::update::HOST_CONFIG_LIMIT_KEYS;

/// Key under which a `VolumesFrom` entry merges: the container name without
/// the access-mode suffix.
fn volumes_from_key(entry: &str) -> &str {
    entry.split(':').next().unwrap_or(entry)
}

/// Key under which a `Links` entry merges: the alias.
fn links_key(entry: &str) -> &str {
    entry.rsplit(':').next().unwrap_or(entry)
}

/// Replaces entries whose key matches, appends the rest.
fn merge_keyed_list(current: &mut Vec<Json>, items: &[Json], key_of: fn(&str) -> &str) {
    for item in items {
        let Some(item_str) = item.as_str() else {
            current.push(item.clone());
            continue;
        };
        let position = current.iter().position(|existing| {
            existing
                .as_str()
                .map(|e| key_of(e) == key_of(item_str))
                .unwrap_or(false)
        });
        match position {
            Some(index) => current[index] = item.clone(),
            None => current.push(item.clone()),
        }
    }
}

/// Merges option maps into `base`. `None` values are skipped, arrays extend,
/// objects merge, everything else overwrites. `Cmd` and `Entrypoint`
/// overwrite even as arrays, since appending to a command is meaningless;
/// `VolumesFrom` and `Links` merge by container name and alias, with the
/// higher-priority entry winning.
pub fn update_kwargs(base: &mut JsonMap<String, Json>, updates: &[&OptionsMap]) {
    for update in updates {
        for (key, value) in update.iter() {
            if value.is_null() {
                continue;
            }
            if key == "Cmd" || key == "Entrypoint" {
                base.insert(key.clone(), value.clone());
                continue;
            }
            match (base.get_mut(key), value) {
                (Some(Json::Array(current)), Json::Array(items)) => match key.as_str() {
                    "VolumesFrom" => merge_keyed_list(current, items, volumes_from_key),
                    "Links" => merge_keyed_list(current, items, links_key),
                    _ => current.extend(items.iter().cloned()),
                },
                (Some(Json::Object(current)), Json::Object(entries)) => {
                    for (entry_key, entry_value) in entries {
                        current.insert(entry_key.clone(), entry_value.clone());
                    }
                }
                _ => {
                    base.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

fn resolved_options(options: &Option<caravel_core::Value<OptionsMap>>) -> OptionsMap {
    options.as_ref().map(|o| o.resolve()).unwrap_or_default()
}

/// The configuration that attaches an alias, if any.
fn attaching_config<'m>(map: &'m ContainerMap, alias: &str) -> Option<&'m str> {
    map.iter_configs()
        .find(|(_, config)| config.attaches.iter().any(|a| a.alias() == alias))
        .map(|(name, _)| name.as_str())
}

struct UsedVolumeTarget {
    /// Bind entry `volume_name:path[:ro]` for named volumes.
    bind: Option<String>,
    /// `volumes_from` entry for containers and legacy attached volumes.
    volumes_from: Option<String>,
}

fn resolve_used(
    policy: &Policy,
    map: &ContainerMap,
    used: &UsedVolume,
    named_volumes: bool,
) -> EngineResult<UsedVolumeTarget> {
    let full_alias = used.alias();
    let (first, rest) = match full_alias.split_once('.') {
        Some((f, r)) => (f, Some(r)),
        None => (full_alias, None),
    };
    let ro = if used.readonly() { ":ro" } else { "" };

    // Attached alias, either plain or parent-scoped.
    let attached = if map.use_attached_parent_name {
        rest.and_then(|alias| {
            map.containers
                .get(first)
                .filter(|c| c.attaches.iter().any(|a| a.alias() == alias))
                .map(|_| (alias, Some(first)))
        })
    } else {
        attaching_config(map, first).map(|parent| (first, map.use_attached_parent_name.then_some(parent)))
    };

    if let Some((alias, parent)) = attached {
        let volume_name = aname(&map.name, alias, parent);
        if named_volumes {
            let path = used
                .path()
                .map(String::from)
                .or_else(|| policy.default_volume_path(&map.name, alias))
                .ok_or_else(|| {
                    EngineError::Map(caravel_map::MapError::Integrity(format!(
                        "no path known for used volume '{}'",
                        full_alias
                    )))
                })?;
            return Ok(UsedVolumeTarget {
                bind: Some(format!("{}:{}{}", volume_name, path, ro)),
                volumes_from: None,
            });
        }
        return Ok(UsedVolumeTarget {
            bind: None,
            volumes_from: Some(format!("{}{}", volume_name, ro)),
        });
    }

    // Container reference; all of its volumes are taken over.
    let container_name = cname(&map.name, full_alias, None);
    Ok(UsedVolumeTarget {
        bind: None,
        volumes_from: Some(format!("{}{}", container_name, ro)),
    })
}

/// Host config fields derived from the structured configuration.
fn derived_host_config(
    policy: &Policy,
    map: &ContainerMap,
    config: &ContainerConfiguration,
    id: &ConfigId,
    client_config: &ClientConfiguration,
) -> EngineResult<OptionsMap> {
    let named_volumes = client_config.features().named_volumes;
    let mut binds: Vec<String> = Vec::new();
    let mut volumes_from: Vec<String> = Vec::new();

    for bind in &config.binds {
        let (container_path, host_path, readonly) = match bind {
            HostBind::Alias { alias, readonly } => {
                let container_path = policy
                    .default_volume_path(&map.name, alias)
                    .ok_or_else(|| {
                        EngineError::Map(caravel_map::MapError::Integrity(format!(
                            "no container path for volume alias '{}'",
                            alias
                        )))
                    })?;
                let host_path = map.host.path(alias, id.instance_name.as_deref())?;
                (container_path, host_path, *readonly)
            }
            HostBind::Path {
                container_path,
                host_path,
                readonly,
            } => (
                container_path.clone(),
                map.host.apply_root(host_path.resolve()),
                *readonly,
            ),
        };
        let ro = if readonly { ":ro" } else { "" };
        binds.push(format!("{}:{}{}", host_path, container_path, ro));
    }

    for attached in &config.attaches {
        let parent = map
            .use_attached_parent_name
            .then_some(id.config_name.as_str());
        let volume_name = aname(&map.name, attached.alias(), parent);
        if named_volumes {
            let path = attached
                .path()
                .map(String::from)
                .or_else(|| policy.default_volume_path(&map.name, attached.alias()))
                .ok_or_else(|| {
                    EngineError::Map(caravel_map::MapError::Integrity(format!(
                        "no container path for attached volume '{}'",
                        attached.alias()
                    )))
                })?;
            binds.push(format!("{}:{}", volume_name, path));
        } else {
            volumes_from.push(volume_name);
        }
    }

    for used in &config.uses {
        let target = resolve_used(policy, map, used, named_volumes)?;
        if let Some(bind) = target.bind {
            binds.push(bind);
        }
        if let Some(from) = target.volumes_from {
            volumes_from.push(from);
        }
    }

    let links: Vec<String> = config
        .links
        .iter()
        .map(|link| {
            format!(
                "{}:{}",
                cname(&map.name, &link.container, None),
                link.alias.clone().unwrap_or_else(|| link.container.clone())
            )
        })
        .collect();

    let mut port_bindings = JsonMap::new();
    for binding in &config.exposes {
        let Some(host_port) = &binding.host_port else {
            continue;
        };
        let key = if binding.exposed_port.contains('/') {
            binding.exposed_port.clone()
        } else {
            format!("{}/tcp", binding.exposed_port)
        };
        let mut entry = JsonMap::new();
        entry.insert("HostPort".to_string(), Json::String(host_port.resolve()));
        if let Some(interface) = &binding.interface {
            let address = client_config
                .interface_address(interface, binding.ipv6)
                .ok_or_else(|| {
                    EngineError::Client(caravel_client::ClientError::Configuration(format!(
                        "address for interface '{}' not found in client configuration",
                        interface
                    )))
                })?;
            entry.insert("HostIp".to_string(), Json::String(address));
        }
        let bindings = port_bindings
            .entry(key)
            .or_insert_with(|| Json::Array(Vec::new()));
        if let Json::Array(list) = bindings {
            list.push(Json::Object(entry));
        }
    }

    let mut host_config = OptionsMap::new();
    if !binds.is_empty() {
        host_config.insert("Binds".to_string(), json!(binds));
    }
    if !volumes_from.is_empty() {
        host_config.insert("VolumesFrom".to_string(), json!(volumes_from));
    }
    if !links.is_empty() {
        host_config.insert("Links".to_string(), json!(links));
    }
    if !port_bindings.is_empty() {
        host_config.insert("PortBindings".to_string(), Json::Object(port_bindings));
    }
    match &config.network_mode {
        Some(NetworkMode::Bridge) => {
            host_config.insert("NetworkMode".to_string(), json!("bridge"));
        }
        Some(NetworkMode::Host) => {
            host_config.insert("NetworkMode".to_string(), json!("host"));
        }
        Some(NetworkMode::Disabled) => {
            host_config.insert("NetworkMode".to_string(), json!("none"));
        }
        Some(NetworkMode::Container(target)) => {
            host_config.insert("NetworkMode".to_string(), json!(format!("container:{}", target)));
        }
        Some(NetworkMode::ConfigRef { config, instance }) => {
            let target = cname(&map.name, config, instance.as_deref());
            host_config.insert("NetworkMode".to_string(), json!(format!("container:{}", target)));
        }
        None => {}
    }
    Ok(host_config)
}

/// Full create body for a container instance, with configuration options and
/// caller kwargs merged in order of precedence.
pub fn instance_create_body(
    policy: &Policy,
    client_name: &str,
    id: &ConfigId,
    container_name: &str,
    extra: &OptionsMap,
) -> EngineResult<ContainerCreateBody> {
    let map = policy.map(&id.map_name)?;
    let config = policy.config(&id.map_name, &id.config_name)?;
    let entry = policy.client(client_name)?;
    let client_config = &entry.config;
    let features = client_config.features();

    let mut body = JsonMap::new();
    body.insert(
        "Image".to_string(),
        Json::String(map.image_for(&id.config_name, config)),
    );

    let mut volumes = JsonMap::new();
    for share in &config.shares {
        volumes.insert(share.resolve(), json!({}));
    }
    for bind in &config.binds {
        let container_path = match bind {
            HostBind::Alias { alias, .. } => policy.default_volume_path(&map.name, alias),
            HostBind::Path { container_path, .. } => Some(container_path.clone()),
        };
        if let Some(path) = container_path {
            volumes.insert(path, json!({}));
        }
    }
    if !volumes.is_empty() {
        body.insert("Volumes".to_string(), Json::Object(volumes));
    }

    if let Some(user) = &config.user {
        if let Some(user) = shortcuts::extract_user(&user.resolve()) {
            body.insert("User".to_string(), Json::String(user));
        }
    }

    let mut exposed = JsonMap::new();
    for binding in &config.exposes {
        let key = if binding.exposed_port.contains('/') {
            binding.exposed_port.clone()
        } else {
            format!("{}/tcp", binding.exposed_port)
        };
        exposed.insert(key, json!({}));
    }
    if !exposed.is_empty() {
        body.insert("ExposedPorts".to_string(), Json::Object(exposed));
    }

    if map.set_hostname {
        body.insert(
            "Hostname".to_string(),
            Json::String(hostname(client_name, container_name)),
        );
    }
    let domainname = client_config
        .domainname
        .as_ref()
        .map(|d| d.resolve())
        .or_else(|| map.default_domain.as_ref().map(|d| d.resolve()));
    if let Some(domainname) = domainname {
        body.insert("Domainname".to_string(), Json::String(domainname));
    }

    if matches!(config.network_mode, Some(NetworkMode::Disabled)) {
        body.insert("NetworkDisabled".to_string(), Json::Bool(true));
    }
    if features.stop_signal_on_create {
        if let Some(signal) = &config.stop_signal {
            body.insert("StopSignal".to_string(), Json::String(signal.clone()));
        }
        if let Some(timeout) = config.stop_timeout {
            body.insert("StopTimeout".to_string(), json!(timeout));
        }
    }
    if let Some(healthcheck) = &config.healthcheck {
        body.insert("Healthcheck".to_string(), healthcheck.clone());
    }

    // Host config: derived fields, overlaid by the configuration and by a
    // caller-supplied HostConfig block.
    let mut host_config = derived_host_config(policy, map, config, id, client_config)?;
    let config_host = resolved_options(&config.host_config);
    let extra_host = match extra.get("HostConfig") {
        Some(Json::Object(map)) => map.clone(),
        _ => OptionsMap::new(),
    };
    update_kwargs(&mut host_config, &[&config_host, &extra_host]);
    if !host_config.is_empty() {
        body.insert("HostConfig".to_string(), Json::Object(host_config));
    }

    let create_options = resolved_options(&config.create_options);
    let mut extra = extra.clone();
    extra.remove("HostConfig");
    update_kwargs(&mut body, &[&create_options, &extra]);

    serde_json::from_value(Json::Object(body)).map_err(|e| {
        EngineError::Client(caravel_client::ClientError::Configuration(format!(
            "invalid create options for {}: {}",
            container_name, e
        )))
    })
}

/// Stop timeout for a container: configuration, then client, then the Docker
/// default.
pub fn stop_timeout(
    policy: &Policy,
    id: &ConfigId,
    client_config: &ClientConfiguration,
) -> EngineResult<Option<u64>> {
    let config = policy.config(&id.map_name, &id.config_name)?;
    Ok(config.stop_timeout.or(client_config.stop_timeout))
}

/// Update body carrying only the limit fields of the configured host config.
pub fn host_config_update(policy: &Policy, id: &ConfigId) -> EngineResult<ContainerUpdateBody> {
    let config = policy.config(&id.map_name, &id.config_name)?;
    let options = resolved_options(&config.host_config);
    let mut limits = JsonMap::new();
    for key in HOST_CONFIG_LIMIT_KEYS {
        if let Some(value) = options.get(*key) {
            limits.insert((*key).to_string(), value.clone());
        }
    }
    serde_json::from_value(Json::Object(limits)).map_err(|e| {
        EngineError::Client(caravel_client::ClientError::Configuration(format!(
            "invalid host config update for {}: {}",
            id, e
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrays_extend_and_scalars_overwrite() {
        let mut base: JsonMap<String, Json> =
            serde_json::from_value(json!({"Env": ["A=1"], "User": "root"})).unwrap();
        let update: OptionsMap =
            serde_json::from_value(json!({"Env": ["B=2"], "User": "app"})).unwrap();
        update_kwargs(&mut base, &[&update]);
        assert_eq!(base["Env"], json!(["A=1", "B=2"]));
        assert_eq!(base["User"], json!("app"));
    }

    #[test]
    fn command_always_overwrites() {
        let mut base: JsonMap<String, Json> =
            serde_json::from_value(json!({"Cmd": ["run"]})).unwrap();
        let update: OptionsMap =
            serde_json::from_value(json!({"Cmd": ["serve", "--fast"]})).unwrap();
        update_kwargs(&mut base, &[&update]);
        assert_eq!(base["Cmd"], json!(["serve", "--fast"]));
    }

    #[test]
    fn objects_merge_key_wise() {
        let mut base: JsonMap<String, Json> =
            serde_json::from_value(json!({"Labels": {"a": "1", "b": "2"}})).unwrap();
        let update: OptionsMap =
            serde_json::from_value(json!({"Labels": {"b": "3"}})).unwrap();
        update_kwargs(&mut base, &[&update]);
        assert_eq!(base["Labels"], json!({"a": "1", "b": "3"}));
    }

    #[test]
    fn volumes_from_and_links_merge_by_key() {
        let mut base: JsonMap<String, Json> = serde_json::from_value(json!({
            "VolumesFrom": ["m.sock", "m.data:ro"],
            "Links": ["m.app:app", "m.db:db"],
        }))
        .unwrap();
        let update: OptionsMap = serde_json::from_value(json!({
            "VolumesFrom": ["m.data", "m.extra"],
            "Links": ["m.replica:db"],
        }))
        .unwrap();
        update_kwargs(&mut base, &[&update]);
        assert_eq!(
            base["VolumesFrom"],
            json!(["m.sock", "m.data", "m.extra"])
        );
        assert_eq!(base["Links"], json!(["m.app:app", "m.replica:db"]));
    }

    #[test]
    fn null_values_are_skipped() {
        let mut base: JsonMap<String, Json> =
            serde_json::from_value(json!({"User": "root"})).unwrap();
        let update: OptionsMap = serde_json::from_value(json!({"User": null})).unwrap();
        update_kwargs(&mut base, &[&update]);
        assert_eq!(base["User"], json!("root"));
    }
}
