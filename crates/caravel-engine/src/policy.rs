//! Naming rules and the shared planning state.

use caravel_client::{ClientEntry, ClientRegistry, DEFAULT_CLIENT_NAME};
use caravel_core::{ConfigId, InputId, ItemKind, Value};
use caravel_map::{ContainerConfiguration, ContainerMap};
use std::collections::HashMap;

use crate::dep::DependencyResolver;
use crate::error::{EngineError, EngineResult};

/// Container name for a configuration instance:
/// `<map>.<config>[.<instance>]`.
pub fn cname(map_name: &str, config_name: &str, instance: Option<&str>) -> String {
    match instance {
        Some(instance) => format!("{}.{}.{}", map_name, config_name, instance),
        None => format!("{}.{}", map_name, config_name),
    }
}

/// Name of an attached volume (or its holder container):
/// `<map>.<alias>`, or `<map>.<parent>.<alias>` when the map disambiguates
/// attached names by parent.
pub fn aname(map_name: &str, alias: &str, parent: Option<&str>) -> String {
    match parent {
        Some(parent) => format!("{}.{}.{}", map_name, parent, alias),
        None => format!("{}.{}", map_name, alias),
    }
}

/// Network name: `<map>.<network>`.
pub fn nname(map_name: &str, network_name: &str) -> String {
    format!("{}.{}", map_name, network_name)
}

/// Host name assigned to a container; the client name is appended for
/// non-default clients and characters invalid in host names are replaced.
pub fn hostname(client_name: &str, container_name: &str) -> String {
    let base = if client_name == DEFAULT_CLIENT_NAME {
        container_name.to_string()
    } else {
        format!("{}-{}", container_name, client_name)
    };
    base.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// Splits a container name produced by [`cname`] back into map,
/// configuration, and instance.
pub fn resolve_cname(container_name: &str) -> Option<(String, String, Option<String>)> {
    let mut parts = container_name.splitn(3, '.');
    let map_name = parts.next()?.to_string();
    let config_name = parts.next()?.to_string();
    let instance = parts.next().map(|s| s.to_string());
    Some((map_name, config_name, instance))
}

/// Immutable planning state for one cycle: the extended maps, the client
/// registry, and the dependency resolvers built from them.
pub struct Policy {
    maps: HashMap<String, ContainerMap>,
    pub registry: ClientRegistry,
    forward: DependencyResolver,
    reverse: DependencyResolver,
    default_volume_paths: HashMap<String, HashMap<String, Value<String>>>,
    default_map: Option<String>,
}

impl Policy {
    /// Builds the policy from checked maps. Maps are expanded here; the
    /// originals stay untouched.
    pub fn new(maps: Vec<ContainerMap>, registry: ClientRegistry) -> EngineResult<Self> {
        let mut extended_maps = HashMap::new();
        let mut forward = DependencyResolver::new();
        let mut reverse = DependencyResolver::new();
        let mut default_volume_paths = HashMap::new();
        let default_map = maps.first().map(|m| m.name.clone());

        for map in maps {
            let extended = map.extended_map()?;
            let items = extended.dependency_items()?;
            forward.update(items.clone());
            reverse.update_backward(items);
            default_volume_paths.insert(extended.name.clone(), extended.default_volume_paths());
            extended_maps.insert(extended.name.clone(), extended);
        }
        Ok(Policy {
            maps: extended_maps,
            registry,
            forward,
            reverse,
            default_volume_paths,
            default_map,
        })
    }

    pub fn map(&self, map_name: &str) -> EngineResult<&ContainerMap> {
        self.maps
            .get(map_name)
            .ok_or_else(|| EngineError::UnknownMap(map_name.to_string()))
    }

    pub fn maps(&self) -> impl Iterator<Item = &ContainerMap> {
        self.maps.values()
    }

    pub fn default_map_name(&self) -> EngineResult<&str> {
        self.default_map
            .as_deref()
            .ok_or_else(|| EngineError::UnknownMap("<default>".to_string()))
    }

    pub fn config(
        &self,
        map_name: &str,
        config_name: &str,
    ) -> EngineResult<&ContainerConfiguration> {
        Ok(self.map(map_name)?.get(config_name)?)
    }

    /// Default container path of a volume alias on a map.
    pub fn default_volume_path(&self, map_name: &str, alias: &str) -> Option<String> {
        self.default_volume_paths
            .get(map_name)?
            .get(alias)
            .map(|p| p.resolve())
    }

    /// Dependency path of an item, dependencies first.
    pub fn dependencies(&self, item: &ConfigId) -> EngineResult<Vec<ConfigId>> {
        self.forward.resolve(item)
    }

    /// Dependent path of an item, outermost dependents first.
    pub fn dependents(&self, item: &ConfigId) -> EngineResult<Vec<ConfigId>> {
        self.reverse.resolve(item)
    }

    /// Effective clients for a configuration node.
    pub fn clients_for(
        &self,
        map_name: &str,
        config_name: &str,
    ) -> EngineResult<Vec<String>> {
        let map = self.map(map_name)?;
        // Volume and network nodes carry the owning config's name; fall back
        // to map clients when it is not a container configuration.
        let config_clients = map
            .containers
            .get(config_name)
            .map(|c| c.clients.clone())
            .unwrap_or_default();
        Ok(self
            .registry
            .effective_clients(&config_clients, &map.clients))
    }

    pub fn client(&self, name: &str) -> EngineResult<&ClientEntry> {
        Ok(self.registry.get(name)?)
    }

    /// Container name for a node of any kind.
    pub fn item_name(&self, id: &ConfigId) -> EngineResult<String> {
        match id.kind {
            ItemKind::Container => Ok(cname(
                &id.map_name,
                &id.config_name,
                id.instance_name.as_deref(),
            )),
            ItemKind::Volume => {
                let map = self.map(&id.map_name)?;
                let alias = id.instance_name.as_deref().unwrap_or(&id.config_name);
                let parent = map
                    .use_attached_parent_name
                    .then_some(id.config_name.as_str());
                Ok(aname(&id.map_name, alias, parent))
            }
            ItemKind::Network => Ok(nname(&id.map_name, &id.config_name)),
            ItemKind::Image => Ok(format!(
                "{}:{}",
                id.config_name,
                id.instance_name.as_deref().unwrap_or("latest")
            )),
        }
    }

    /// Expands caller selectors into concrete container nodes. A selector
    /// can be a configuration name, a `map.config[.instance]` reference, or
    /// a group name (including `__all__`).
    pub fn resolve_selectors(&self, selectors: &[&str]) -> EngineResult<Vec<ConfigId>> {
        let mut result: Vec<ConfigId> = Vec::new();
        let default_map = self.default_map_name()?.to_string();
        for selector in selectors {
            let input = InputId::parse(selector, &default_map);
            // Group references win over configuration names.
            if input.instance_names.is_empty() {
                if let Some(members) = self
                    .maps
                    .get(&input.map_name)
                    .and_then(|map| map.group_members(&input.config_name))
                {
                    for member in members {
                        // Members are `config[.instance]` references on the
                        // same map.
                        let (config, instance) = match member.split_once('.') {
                            Some((config, instance)) => {
                                (config.to_string(), vec![instance.to_string()])
                            }
                            None => (member.clone(), Vec::new()),
                        };
                        let member_input = InputId::new(&input.map_name, config, instance);
                        self.expand_input(&member_input, &mut result)?;
                    }
                    continue;
                }
            }
            self.expand_input(&input, &mut result)?;
        }
        Ok(result)
    }

    fn expand_input(&self, input: &InputId, result: &mut Vec<ConfigId>) -> EngineResult<()> {
        let map = self.map(&input.map_name)?;
        let config = map.get(&input.config_name)?;
        let instances: Vec<Option<String>> = if input.instance_names.is_empty() {
            config.instance_names()
        } else {
            input.instance_names.iter().cloned().map(Some).collect()
        };
        for instance in instances {
            let id = ConfigId::container(&input.map_name, &input.config_name, instance);
            if !result.contains(&id) {
                result.push(id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_names_are_dotted() {
        assert_eq!(cname("m", "app", None), "m.app");
        assert_eq!(cname("m", "app", Some("i1")), "m.app.i1");
        assert_eq!(aname("m", "sock", None), "m.sock");
        assert_eq!(aname("m", "sock", Some("app")), "m.app.sock");
        assert_eq!(nname("m", "backend"), "m.backend");
    }

    #[test]
    fn hostnames_replace_invalid_characters() {
        assert_eq!(hostname(DEFAULT_CLIENT_NAME, "m.app.i1"), "m-app-i1");
        assert_eq!(hostname("remote", "m.app"), "m-app-remote");
    }

    #[test]
    fn cname_round_trips() {
        let (map, config, instance) = resolve_cname("m.app.i1").unwrap();
        assert_eq!((map.as_str(), config.as_str()), ("m", "app"));
        assert_eq!(instance.as_deref(), Some("i1"));
        assert!(resolve_cname("justaname").is_none());
    }
}
