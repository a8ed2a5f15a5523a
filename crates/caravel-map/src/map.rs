//! The container map: a named bundle of container, volume, network, and host
//! share definitions.

use caravel_core::{ConfigId, ItemKind, Value};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::container::ContainerConfiguration;
use crate::error::{MapError, MapResult};
use crate::host::HostVolumes;
use crate::input::{AttachedVolume, HostBind, NetworkMode, UsedVolume, PRESET_NETWORKS};
use crate::network::NetworkConfiguration;
use crate::volume::VolumeConfiguration;

/// Group name that expands to every non-abstract configuration of a map.
pub const ALL_GROUP: &str = "__all__";

/// Keys of a map document that are not container configurations.
const RESERVED_KEYS: &[&str] = &[
    "name",
    "repository",
    "default_tag",
    "default_domain",
    "host_root",
    "set_hostname",
    "use_attached_parent_name",
    "containers",
    "volumes",
    "host",
    "networks",
    "groups",
    "clients",
];

fn default_set_hostname() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContainerMap {
    pub name: String,
    pub repository: Option<Value<String>>,
    pub default_tag: Option<Value<String>>,
    pub default_domain: Option<Value<String>>,
    #[serde(default = "default_set_hostname")]
    pub set_hostname: bool,
    pub use_attached_parent_name: bool,
    pub clients: Vec<String>,
    pub containers: IndexMap<String, ContainerConfiguration>,
    pub volumes: IndexMap<String, VolumeConfiguration>,
    pub host: HostVolumes,
    pub networks: IndexMap<String, NetworkConfiguration>,
    pub groups: IndexMap<String, Vec<String>>,
}

impl ContainerMap {
    pub fn new(name: impl Into<String>) -> Self {
        ContainerMap {
            name: name.into(),
            set_hostname: true,
            ..Default::default()
        }
    }

    /// Loads a map from a structured document. Top-level keys outside the
    /// reserved set are container configurations; `host_root` and
    /// `host.root` both set the host volume root. The map name is taken from
    /// `name_hint` when given (caller-supplied name or source base name),
    /// falling back to the document's `name` key.
    pub fn from_document(name_hint: Option<&str>, document: Json) -> MapResult<Self> {
        let Json::Object(mut doc) = document else {
            return Err(MapError::configuration("map", "expected an object"));
        };

        let mut extra_containers = serde_json::Map::new();
        let keys: Vec<String> = doc.keys().cloned().collect();
        for key in keys {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                let value = doc.remove(&key).unwrap();
                extra_containers.insert(key, value);
            }
        }
        let host_root = doc.remove("host_root");

        let mut map: ContainerMap = serde_json::from_value(Json::Object(doc))
            .map_err(|e| MapError::configuration("map", e.to_string()))?;
        if let Some(name) = name_hint {
            map.name = name.to_string();
        }
        if map.name.is_empty() {
            return Err(MapError::configuration("name", "map name must be set"));
        }
        for (name, value) in extra_containers {
            let config: ContainerConfiguration = serde_json::from_value(value)
                .map_err(|e| MapError::configuration(name.clone(), e.to_string()))?;
            map.containers.insert(name, config);
        }
        if let Some(root) = host_root {
            match root {
                Json::String(root) => map.host.root = Some(root.into()),
                other => {
                    return Err(MapError::configuration(
                        "host_root",
                        format!("expected a string, found {}", other),
                    ))
                }
            }
        }
        debug!(
            map = %map.name,
            containers = map.containers.len(),
            "loaded container map"
        );
        Ok(map)
    }

    pub fn get(&self, config_name: &str) -> MapResult<&ContainerConfiguration> {
        self.containers.get(config_name).ok_or_else(|| {
            MapError::UnknownConfiguration {
                map: self.name.clone(),
                config: config_name.to_string(),
            }
        })
    }

    /// Resolves the effective configuration, folding every `extends` base
    /// left to right with the configuration itself applied last.
    pub fn extended_config(&self, config_name: &str) -> MapResult<ContainerConfiguration> {
        let mut visiting = IndexSet::new();
        self.extend_recursive(config_name, &mut visiting)
    }

    fn extend_recursive(
        &self,
        config_name: &str,
        visiting: &mut IndexSet<String>,
    ) -> MapResult<ContainerConfiguration> {
        if !visiting.insert(config_name.to_string()) {
            return Err(MapError::ExtendsCycle(config_name.to_string()));
        }
        let config = self.get(config_name)?;
        let result = if config.extends.is_empty() {
            config.clone()
        } else {
            let mut merged = ContainerConfiguration::default();
            for base_name in &config.extends {
                let base = self.extend_recursive(base_name, visiting)?;
                merged.merge_from(&base);
            }
            merged.merge_from(config);
            merged.is_abstract = config.is_abstract;
            merged
        };
        visiting.shift_remove(config_name);
        Ok(result)
    }

    /// A copy of this map with all non-abstract configurations in extended
    /// form. Abstract configurations are dropped.
    pub fn extended_map(&self) -> MapResult<Self> {
        let mut copy = self.clone();
        let mut containers = IndexMap::new();
        for (name, config) in &self.containers {
            if config.is_abstract {
                continue;
            }
            containers.insert(name.clone(), self.extended_config(name)?);
        }
        copy.containers = containers;
        Ok(copy)
    }

    /// Iterates non-abstract configurations in declaration order.
    pub fn iter_configs(&self) -> impl Iterator<Item = (&String, &ContainerConfiguration)> {
        self.containers.iter().filter(|(_, c)| !c.is_abstract)
    }

    /// Resolves an image reference against the repository prefix and the
    /// default tag. A leading `/` bypasses the repository and is stripped;
    /// any other `/` keeps the reference as-is; an explicit tag is kept.
    pub fn resolve_image(&self, image: &str) -> String {
        let (name, tag) = match image.rfind(':') {
            Some(idx) if !image[idx..].contains('/') => {
                (&image[..idx], Some(&image[idx + 1..]))
            }
            _ => (image, None),
        };
        let repo_name = if name.contains('/') {
            name.strip_prefix('/').unwrap_or(name).to_string()
        } else {
            match self
                .repository
                .as_ref()
                .map(|r| r.resolve())
                .filter(|r| !r.is_empty())
            {
                Some(prefix) => format!("{}/{}", prefix, name),
                None => name.to_string(),
            }
        };
        let tag = match tag {
            Some(tag) => tag.to_string(),
            None => self
                .default_tag
                .as_ref()
                .map(|t| t.resolve())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "latest".to_string()),
        };
        format!("{}:{}", repo_name, tag)
    }

    /// Image reference for a configuration, defaulting to the configuration
    /// name when no image is set.
    pub fn image_for(&self, config_name: &str, config: &ContainerConfiguration) -> String {
        self.resolve_image(config.image.as_deref().unwrap_or(config_name))
    }

    /// Default container paths of volume aliases, including paths introduced
    /// by `attaches` entries with an explicit mount point.
    pub fn default_volume_paths(&self) -> HashMap<String, Value<String>> {
        let mut paths: HashMap<String, Value<String>> = self
            .volumes
            .iter()
            .filter_map(|(alias, v)| {
                v.default_path.clone().map(|p| (alias.clone(), p))
            })
            .collect();
        for (_, config) in self.iter_configs() {
            for attached in &config.attaches {
                if let AttachedVolume::Path { alias, path } = attached {
                    paths
                        .entry(alias.clone())
                        .or_insert_with(|| Value::Constant(path.clone()));
                }
            }
        }
        paths
    }

    /// Expands a group reference. `__all__` selects every non-abstract
    /// configuration.
    pub fn group_members(&self, group: &str) -> Option<Vec<String>> {
        if group == ALL_GROUP {
            return Some(self.iter_configs().map(|(name, _)| name.clone()).collect());
        }
        self.groups.get(group).cloned()
    }

    /// Attached volume items and persistent container items of this map,
    /// as `(config name, instance/alias)` pairs.
    pub fn persistent_items(&self) -> (Vec<(String, String)>, Vec<(String, Option<String>)>) {
        let mut attached = Vec::new();
        let mut persistent = Vec::new();
        for (name, config) in self.iter_configs() {
            for a in &config.attaches {
                attached.push((name.clone(), a.alias().to_string()));
            }
            if config.is_persistent() {
                for instance in config.instance_names() {
                    persistent.push((name.clone(), instance));
                }
            }
        }
        (attached, persistent)
    }

    /// Generates each container instance node together with its direct
    /// dependencies: attached volumes, configured networks, used and linked
    /// containers, network-mode references, and the image.
    ///
    /// The map must be in extended form for the results to be complete.
    pub fn dependency_items(&self) -> MapResult<Vec<(ConfigId, Vec<ConfigId>)>> {
        let instances: HashMap<&str, &ContainerConfiguration> = self
            .iter_configs()
            .map(|(name, config)| (name.as_str(), config))
            .collect();
        // Alias -> attaching configuration, for plain attached names.
        let attaching: HashMap<&str, &str> = self
            .iter_configs()
            .flat_map(|(name, config)| {
                config
                    .attaches
                    .iter()
                    .map(move |a| (a.alias(), name.as_str()))
            })
            .collect();

        let container_ids = |config_name: &str, instance: Option<&str>| -> Vec<ConfigId> {
            let all = instances
                .get(config_name)
                .map(|c| c.instance_names())
                .unwrap_or_else(|| vec![None]);
            match instance {
                Some(i) => vec![ConfigId::container(
                    &self.name,
                    config_name,
                    Some(i.to_string()),
                )],
                None => all
                    .into_iter()
                    .map(|i| ConfigId::container(&self.name, config_name, i))
                    .collect(),
            }
        };

        let used_items = |used: &UsedVolume| -> Vec<ConfigId> {
            let (first, rest) = match used.alias().split_once('.') {
                Some((f, r)) => (f, Some(r)),
                None => (used.alias(), None),
            };
            if self.use_attached_parent_name {
                let attach_aliases: HashSet<&str> = instances
                    .get(first)
                    .map(|c| c.attaches.iter().map(|a| a.alias()).collect())
                    .unwrap_or_default();
                match rest {
                    Some(alias) if !attach_aliases.contains(alias) => {
                        container_ids(first, Some(alias))
                    }
                    _ => container_ids(first, None),
                }
            } else if let Some(&attaching_config) = attaching.get(first) {
                container_ids(attaching_config, None)
            } else {
                container_ids(first, rest)
            }
        };

        let linked_items = |target: &str| -> Vec<ConfigId> {
            match target.split_once('.') {
                Some((config, instance)) => container_ids(config, Some(instance)),
                None => container_ids(target, None),
            }
        };

        let mut result = Vec::new();
        for (config_name, config) in self.iter_configs() {
            let image = self.image_for(config_name, config);
            let (image_name, image_tag) = image
                .rsplit_once(':')
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .expect("resolved images always carry a tag");

            let mut deps: Vec<ConfigId> = Vec::new();
            let mut push_all = |items: Vec<ConfigId>| {
                for item in items {
                    if !deps.contains(&item) {
                        deps.push(item);
                    }
                }
            };

            if let Some(NetworkMode::ConfigRef { config, instance }) = &config.network_mode {
                push_all(container_ids(config, instance.as_deref()));
            }
            for endpoint in &config.networks {
                if PRESET_NETWORKS.contains(&endpoint.network_name.as_str()) {
                    continue;
                }
                push_all(vec![ConfigId::new(
                    ItemKind::Network,
                    &self.name,
                    &endpoint.network_name,
                    None,
                )]);
                for link in &endpoint.links {
                    push_all(linked_items(&link.container));
                }
            }
            for used in &config.uses {
                push_all(used_items(used));
            }
            for link in &config.links {
                push_all(linked_items(&link.container));
            }
            for attached in &config.attaches {
                push_all(vec![ConfigId::new(
                    ItemKind::Volume,
                    &self.name,
                    config_name,
                    Some(attached.alias().to_string()),
                )]);
            }
            push_all(vec![ConfigId::new(
                ItemKind::Image,
                &self.name,
                &image_name,
                Some(image_tag.clone()),
            )]);

            for instance in config.instance_names() {
                result.push((
                    ConfigId::container(&self.name, config_name, instance),
                    deps.clone(),
                ));
            }
        }
        Ok(result)
    }

    /// Verifies that every reference on the map resolves: group members,
    /// used volumes, host binds, volume paths, links, networks, and
    /// network-mode container references. Duplicate attached volume aliases
    /// are rejected.
    pub fn check_integrity(&self) -> MapResult<()> {
        let extended = self.extended_map()?;

        let mut instance_names: HashSet<String> = HashSet::new();
        let mut group_refs: HashSet<String> = HashSet::new();
        let mut shared: HashSet<String> = HashSet::new();
        let mut attached_names: Vec<String> = Vec::new();
        let mut attached_aliases: HashSet<String> = HashSet::new();
        let mut attached_with_path: HashSet<String> = HashSet::new();
        let mut used: HashSet<String> = HashSet::new();
        let mut bind_aliases: HashSet<String> = HashSet::new();
        let mut links: HashSet<String> = HashSet::new();
        let mut network_refs: HashSet<String> = HashSet::new();
        let mut net_container_refs: HashSet<String> = HashSet::new();

        for (name, config) in extended.iter_configs() {
            let names: Vec<String> = match config.instances.is_empty() {
                true => vec![name.clone()],
                false => config
                    .instances
                    .iter()
                    .map(|i| format!("{}.{}", name, i))
                    .collect(),
            };
            group_refs.extend(names.iter().cloned());
            if !config.instances.is_empty() {
                group_refs.insert(name.clone());
            }
            if !config.shares.is_empty() || !config.binds.is_empty() || !config.uses.is_empty() {
                shared.extend(names.iter().cloned());
            }
            instance_names.extend(names);

            for attached in &config.attaches {
                if self.use_attached_parent_name {
                    attached_names.push(format!("{}.{}", name, attached.alias()));
                } else {
                    attached_names.push(attached.alias().to_string());
                }
                attached_aliases.insert(attached.alias().to_string());
                if attached.path().is_some() {
                    attached_with_path.insert(attached.alias().to_string());
                }
            }
            used.extend(config.uses.iter().map(|u| u.alias().to_string()));
            bind_aliases.extend(config.binds.iter().filter_map(|b| match b {
                HostBind::Alias { alias, .. } => Some(alias.clone()),
                HostBind::Path { .. } => None,
            }));
            links.extend(config.links.iter().map(|l| l.container.clone()));
            for endpoint in &config.networks {
                if !PRESET_NETWORKS.contains(&endpoint.network_name.as_str()) {
                    network_refs.insert(endpoint.network_name.clone());
                }
            }
            if let Some(NetworkMode::ConfigRef { config: ref_name, instance }) =
                &config.network_mode
            {
                match instance {
                    Some(instance) => {
                        net_container_refs.insert(format!("{}.{}", ref_name, instance))
                    }
                    None => net_container_refs.insert(ref_name.clone()),
                };
            }
        }

        let group_names: HashSet<String> = self.groups.keys().cloned().collect();
        let ambiguous: Vec<_> = group_names.intersection(&group_refs).cloned().collect();
        if !ambiguous.is_empty() {
            return Err(MapError::Integrity(format!(
                "names are used both for container configurations and groups: {}",
                ambiguous.join(", ")
            )));
        }
        let missing_refs: Vec<_> = self
            .groups
            .values()
            .flatten()
            .filter(|member| !group_refs.contains(*member))
            .cloned()
            .collect();
        if !missing_refs.is_empty() {
            return Err(MapError::Integrity(format!(
                "group members are not defined as container configurations: {}",
                missing_refs.join(", ")
            )));
        }

        let mut seen = HashSet::new();
        let duplicates: Vec<_> = attached_names
            .iter()
            .filter(|name| !seen.insert((*name).clone()))
            .cloned()
            .collect();
        if !duplicates.is_empty() {
            return Err(MapError::Integrity(format!(
                "duplicate attached volumes: {}",
                duplicates.join(", ")
            )));
        }

        let shared_or_attached: HashSet<&String> =
            shared.iter().chain(attached_names.iter()).collect();
        let missing_shares: Vec<_> = used
            .iter()
            .filter(|alias| !shared_or_attached.contains(alias))
            .cloned()
            .collect();
        if !missing_shares.is_empty() {
            return Err(MapError::Integrity(format!(
                "no shared or attached volumes found for: {}",
                missing_shares.join(", ")
            )));
        }

        let missing_binds: Vec<_> = bind_aliases
            .iter()
            .filter(|alias| !self.host.contains(alias))
            .cloned()
            .collect();
        if !missing_binds.is_empty() {
            return Err(MapError::Integrity(format!(
                "no host share found for mapped volumes: {}",
                missing_binds.join(", ")
            )));
        }

        let volume_aliases: HashSet<&String> =
            bind_aliases.iter().chain(attached_aliases.iter()).collect();
        let missing_paths: Vec<_> = volume_aliases
            .iter()
            .filter(|alias| {
                !self.volumes.contains_key(**alias) && !attached_with_path.contains(**alias)
            })
            .map(|alias| (*alias).clone())
            .collect();
        if !missing_paths.is_empty() {
            return Err(MapError::Integrity(format!(
                "no volume path assignment found for: {}",
                missing_paths.join(", ")
            )));
        }

        let missing_links: Vec<_> = links
            .iter()
            .filter(|target| !instance_names.contains(*target))
            .cloned()
            .collect();
        if !missing_links.is_empty() {
            return Err(MapError::Integrity(format!(
                "no container instance found for links: {}",
                missing_links.join(", ")
            )));
        }

        let missing_networks: Vec<_> = network_refs
            .iter()
            .filter(|name| !self.networks.contains_key(*name))
            .cloned()
            .collect();
        if !missing_networks.is_empty() {
            return Err(MapError::Integrity(format!(
                "no network configuration found for: {}",
                missing_networks.join(", ")
            )));
        }

        let missing_net_containers: Vec<_> = net_container_refs
            .iter()
            .filter(|target| !instance_names.contains(*target))
            .cloned()
            .collect();
        if !missing_net_containers.is_empty() {
            return Err(MapError::Integrity(format!(
                "no container instance found for network mode references: {}",
                missing_net_containers.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn simple_map() -> ContainerMap {
        ContainerMap::from_document(
            None,
            json!({
                "name": "main",
                "repository": "registry.example.com",
                "volumes": {"app_log": "/var/log/app", "app_config": "/etc/app"},
                "host": {"root": "/srv", "app_config": "config"},
                "app": {
                    "image": "app-server",
                    "binds": ["app_config"],
                    "attaches": ["app_log"],
                },
                "web": {
                    "image": "nginx",
                    "uses": ["app_log"],
                    "links": ["app"],
                },
            }),
        )
        .unwrap()
    }

    #[test]
    fn unknown_top_level_keys_become_containers() {
        let map = simple_map();
        assert!(map.containers.contains_key("app"));
        assert!(map.containers.contains_key("web"));
        assert_eq!(map.containers.len(), 2);
    }

    #[test]
    fn name_hint_overrides_document_name() {
        let map =
            ContainerMap::from_document(Some("other"), json!({"name": "doc"})).unwrap();
        assert_eq!(map.name, "other");
    }

    #[test]
    fn image_resolution_table() {
        let mut map = ContainerMap::new("m");
        // No repository, no default tag.
        assert_eq!(map.resolve_image("config"), "config:latest");
        assert_eq!(map.resolve_image("image1"), "image1:latest");

        map.repository = Some("reg.example.com".into());
        assert_eq!(map.resolve_image("config"), "reg.example.com/config:latest");
        assert_eq!(map.resolve_image("image1"), "reg.example.com/image1:latest");
        assert_eq!(map.resolve_image("/image1"), "image1:latest");
        assert_eq!(map.resolve_image("image1:one"), "reg.example.com/image1:one");
        assert_eq!(map.resolve_image("/image1:two"), "image1:two");

        map.default_tag = Some("devel".into());
        assert_eq!(map.resolve_image("config"), "reg.example.com/config:devel");
        assert_eq!(map.resolve_image("/image1"), "image1:devel");
        assert_eq!(map.resolve_image("image1:one"), "reg.example.com/image1:one");

        map.repository = None;
        assert_eq!(map.resolve_image("config"), "config:devel");
    }

    #[test]
    fn registry_ports_are_not_tags() {
        let map = ContainerMap::new("m");
        assert_eq!(
            map.resolve_image("reg.example.com:5000/image1"),
            "reg.example.com:5000/image1:latest"
        );
    }

    #[test]
    fn extends_folds_left_to_right() {
        let map = ContainerMap::from_document(
            None,
            json!({
                "name": "m",
                "base": {"abstract": true, "image": "base", "clients": ["alpha"]},
                "mixin": {"abstract": true, "clients": ["beta"], "stop_timeout": 5},
                "svc": {"extends": ["base", "mixin"], "stop_timeout": 10},
            }),
        )
        .unwrap();
        let svc = map.extended_config("svc").unwrap();
        assert_eq!(svc.image.as_deref(), Some("base"));
        assert_eq!(svc.clients, vec!["alpha".to_string(), "beta".to_string()]);
        assert_eq!(svc.stop_timeout, Some(10));
        assert!(!svc.is_abstract);
    }

    #[test]
    fn extends_expansion_is_idempotent() {
        let map = ContainerMap::from_document(
            None,
            json!({
                "name": "m",
                "base": {"abstract": true, "image": "base", "shares": ["/data"]},
                "svc": {"extends": ["base"]},
            }),
        )
        .unwrap();
        let extended = map.extended_map().unwrap();
        let twice = extended.extended_map().unwrap();
        assert_eq!(
            extended.containers.get("svc"),
            twice.containers.get("svc")
        );
        assert!(!extended.containers.contains_key("base"));
    }

    #[test]
    fn extends_cycle_is_an_error() {
        let map = ContainerMap::from_document(
            None,
            json!({
                "name": "m",
                "a": {"extends": ["b"]},
                "b": {"extends": ["a"]},
            }),
        )
        .unwrap();
        assert!(matches!(
            map.extended_config("a"),
            Err(MapError::ExtendsCycle(_))
        ));
    }

    #[test]
    fn integrity_passes_for_consistent_map() {
        simple_map().check_integrity().unwrap();
    }

    #[test]
    fn integrity_rejects_dangling_use() {
        let map = ContainerMap::from_document(
            None,
            json!({
                "name": "m",
                "web": {"uses": ["missing_volume"]},
            }),
        )
        .unwrap();
        let err = map.check_integrity().unwrap_err();
        assert!(matches!(err, MapError::Integrity(_)));
    }

    #[test]
    fn integrity_rejects_unlabeled_network_mode_on_multi_instance_target() {
        let map = ContainerMap::from_document(
            None,
            json!({
                "name": "m",
                "app": {"instances": ["i1", "i2"]},
                "web": {"network_mode": "app"},
            }),
        )
        .unwrap();
        assert!(map.check_integrity().is_err());

        let labeled = ContainerMap::from_document(
            None,
            json!({
                "name": "m",
                "app": {"instances": ["i1", "i2"]},
                "web": {"network_mode": "app.i1"},
            }),
        )
        .unwrap();
        labeled.check_integrity().unwrap();
    }

    #[test]
    fn dependency_items_cover_all_relations() {
        let map = simple_map().extended_map().unwrap();
        let items = map.dependency_items().unwrap();
        let web = items
            .iter()
            .find(|(id, _)| id.config_name == "web")
            .unwrap();
        // app_log is attached to app, so using it depends on app.
        assert!(web
            .1
            .iter()
            .any(|d| d.kind == ItemKind::Container && d.config_name == "app"));
        assert!(web.1.iter().any(|d| d.kind == ItemKind::Image));

        let app = items
            .iter()
            .find(|(id, _)| id.config_name == "app")
            .unwrap();
        assert!(app
            .1
            .iter()
            .any(|d| d.kind == ItemKind::Volume
                && d.instance_name.as_deref() == Some("app_log")));
    }

    #[test]
    fn instances_expand_to_one_node_each() {
        let map = ContainerMap::from_document(
            None,
            json!({
                "name": "m",
                "app": {"instances": ["i1", "i2"]},
            }),
        )
        .unwrap()
        .extended_map()
        .unwrap();
        let items = map.dependency_items().unwrap();
        let instances: Vec<_> = items
            .iter()
            .filter(|(id, _)| id.config_name == "app")
            .map(|(id, _)| id.instance_name.clone())
            .collect();
        assert_eq!(
            instances,
            vec![Some("i1".to_string()), Some("i2".to_string())]
        );
    }

    #[test]
    fn all_group_expands_to_every_config() {
        let map = simple_map();
        let members = map.group_members(ALL_GROUP).unwrap();
        assert_eq!(members, vec!["app".to_string(), "web".to_string()]);
    }
}
