//! Volume comparison for update checks.
//!
//! Two variants share the bookkeeping: on daemons with named volumes, mounts
//! are compared against the expected volume names; on legacy daemons the
//! source paths of attached and shared volumes are compared across the
//! containers seen earlier in the traversal.

use bollard::models::ContainerInspectResponse;
use caravel_core::ConfigId;
use caravel_map::{ContainerConfiguration, ContainerMap, HostBind};
use std::collections::HashMap;
use tracing::debug;

use crate::error::EngineResult;
use crate::policy::{aname, Policy};

/// Mount table of a container: destination to volume name (named volumes)
/// or to source path (legacy).
pub fn instance_volumes(
    detail: &ContainerInspectResponse,
    named: bool,
) -> HashMap<String, String> {
    detail
        .mounts
        .iter()
        .flatten()
        .filter_map(|mount| {
            let destination = mount.destination.clone()?;
            let value = if named {
                mount.name.clone().or_else(|| mount.source.clone())?
            } else {
                mount.source.clone()?
            };
            Some((destination, value))
        })
        .collect()
}

/// Tracks the virtual filesystem paths of containers already checked in the
/// current traversal, keyed by (owner, instance, container path).
#[derive(Default)]
pub struct VolumeChecker {
    vfs_paths: HashMap<(String, Option<String>, String), String>,
}

impl VolumeChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the source of a legacy attached volume from its holder
    /// container.
    pub fn register_attached(
        &mut self,
        alias: &str,
        parent: Option<&str>,
        mapped_path: &str,
        source: Option<&String>,
    ) {
        let owner = match parent {
            Some(parent) => format!("{}.{}", parent, alias),
            None => alias.to_string(),
        };
        if let Some(source) = source {
            self.vfs_paths
                .insert((owner, None, mapped_path.to_string()), source.clone());
        }
    }

    /// Checks shares, binds, attached volumes, and used volumes of one
    /// container against its mount table. Returns `false` on the first
    /// mismatch.
    pub fn check(
        &mut self,
        policy: &Policy,
        map: &ContainerMap,
        id: &ConfigId,
        config: &ContainerConfiguration,
        named: bool,
        instance_volumes: &HashMap<String, String>,
    ) -> EngineResult<bool> {
        let owner = (id.config_name.clone(), id.instance_name.clone());
        for share in &config.shares {
            let path = share.resolve();
            if let Some(source) = instance_volumes.get(&path) {
                self.vfs_paths
                    .insert((owner.0.clone(), owner.1.clone(), path), source.clone());
            }
        }
        if !self.check_binds(policy, map, id, config, instance_volumes) {
            return Ok(false);
        }
        if !self.check_attached(policy, map, id, &id.config_name, config, named, instance_volumes)
        {
            return Ok(false);
        }
        self.check_used(policy, map, id, config, named, instance_volumes)
    }

    fn check_binds(
        &mut self,
        policy: &Policy,
        map: &ContainerMap,
        id: &ConfigId,
        config: &ContainerConfiguration,
        instance_volumes: &HashMap<String, String>,
    ) -> bool {
        for bind in &config.binds {
            let (container_path, host_path) = match bind {
                HostBind::Alias { alias, .. } => {
                    let Some(container_path) = policy.default_volume_path(&map.name, alias)
                    else {
                        return false;
                    };
                    let Ok(host_path) = map.host.path(alias, id.instance_name.as_deref())
                    else {
                        return false;
                    };
                    (container_path, host_path)
                }
                HostBind::Path {
                    container_path,
                    host_path,
                    ..
                } => (
                    container_path.clone(),
                    map.host.apply_root(host_path.resolve()),
                ),
            };
            let live = instance_volumes.get(&container_path);
            debug!(path = %container_path, expected = %host_path, live = ?live, "checking host bind");
            if live != Some(&host_path) {
                return false;
            }
            self.vfs_paths.insert(
                (
                    id.config_name.clone(),
                    id.instance_name.clone(),
                    container_path,
                ),
                host_path,
            );
        }
        true
    }

    fn check_attached(
        &mut self,
        policy: &Policy,
        map: &ContainerMap,
        id: &ConfigId,
        parent_name: &str,
        config: &ContainerConfiguration,
        named: bool,
        instance_volumes: &HashMap<String, String>,
    ) -> bool {
        for attached in &config.attaches {
            let alias = attached.alias();
            let path = match attached.path() {
                Some(path) => path.to_string(),
                None => match policy.default_volume_path(&map.name, alias) {
                    Some(path) => path,
                    None => return false,
                },
            };
            let live = instance_volumes.get(&path);
            if named {
                let parent = map.use_attached_parent_name.then_some(parent_name);
                let volume_name = aname(&map.name, alias, parent);
                debug!(alias = alias, expected = %volume_name, live = ?live, "checking attached volume");
                if live != Some(&volume_name) {
                    return false;
                }
            } else {
                let owner = match map.use_attached_parent_name {
                    true => format!("{}.{}", parent_name, alias),
                    false => alias.to_string(),
                };
                let attached_vfs = self.vfs_paths.get(&(owner, None, path.clone()));
                debug!(alias = alias, expected = ?attached_vfs, live = ?live, "checking attached path");
                match (attached_vfs, live) {
                    (Some(expected), Some(live)) if expected == live => {}
                    _ => return false,
                }
                let live = live.cloned().unwrap_or_default();
                self.vfs_paths.insert(
                    (id.config_name.clone(), id.instance_name.clone(), path),
                    live,
                );
            }
        }
        true
    }

    fn check_used(
        &mut self,
        policy: &Policy,
        map: &ContainerMap,
        id: &ConfigId,
        config: &ContainerConfiguration,
        named: bool,
        instance_volumes: &HashMap<String, String>,
    ) -> EngineResult<bool> {
        for used in &config.uses {
            let full_alias = used.alias().to_string();
            let (first, rest) = match full_alias.split_once('.') {
                Some((f, r)) => (f.to_string(), Some(r.to_string())),
                None => (full_alias.clone(), None),
            };

            let resolved = if map.use_attached_parent_name {
                let default_path = policy
                    .default_volume_path(&map.name, &full_alias)
                    .or_else(|| {
                        rest.as_deref()
                            .and_then(|alias| policy.default_volume_path(&map.name, alias))
                    });
                default_path.map(|path| (path, rest.clone(), Some(first.clone())))
            } else if rest.is_none() {
                policy
                    .default_volume_path(&map.name, &first)
                    .map(|path| (path, Some(first.clone()), None))
            } else {
                None
            };

            if let Some((default_path, used_alias, used_parent)) = resolved {
                let used_path = used.path().map(String::from).unwrap_or(default_path);
                if named {
                    let Some(used_alias) = used_alias else {
                        return Ok(false);
                    };
                    let volume_name =
                        aname(&map.name, &used_alias, used_parent.as_deref());
                    if instance_volumes.get(&used_path) != Some(&volume_name) {
                        debug!(alias = %full_alias, "used volume name differs");
                        return Ok(false);
                    }
                } else {
                    let used_vfs =
                        self.vfs_paths.get(&(full_alias.clone(), None, used_path.clone()));
                    let live = instance_volumes.get(&used_path);
                    match (used_vfs, live) {
                        (Some(expected), Some(live)) if expected == live => {}
                        _ => {
                            debug!(alias = %full_alias, "used path differs");
                            return Ok(false);
                        }
                    }
                }
                continue;
            }

            // The reference names another container; its shares, binds, and
            // attaches must appear on this container as well.
            let Ok(ref_config) = policy.config(&map.name, &first) else {
                debug!(alias = %full_alias, "used reference cannot be resolved");
                return Ok(false);
            };
            for share in &ref_config.shares {
                let path = share.resolve();
                let shared_vfs =
                    self.vfs_paths
                        .get(&(first.clone(), rest.clone(), path.clone()));
                let live = instance_volumes.get(&path);
                match (shared_vfs, live) {
                    (Some(expected), Some(live)) if expected == live => {}
                    (None, None) => {}
                    _ => {
                        debug!(alias = %full_alias, path = %path, "shared path differs");
                        return Ok(false);
                    }
                }
                if let Some(live) = live {
                    self.vfs_paths.insert(
                        (id.config_name.clone(), id.instance_name.clone(), path),
                        live.clone(),
                    );
                }
            }
            let ref_id = ConfigId::container(&map.name, &first, rest.clone());
            if !self.check_binds(policy, map, &ref_id, ref_config, instance_volumes) {
                return Ok(false);
            }
            if !self.check_attached(
                policy,
                map,
                id,
                &first,
                ref_config,
                named,
                instance_volumes,
            ) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
