//! Dependency resolution over configuration items.
//!
//! Nodes are [`ConfigId`] tuples; edges point from dependent to dependency.
//! Resolution follows container nodes transitively (volumes, networks, and
//! images have no further dependencies) and caches each node's resolved path,
//! so repeated lookups across a traversal stay cheap.

use caravel_core::{ConfigId, ItemKind};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{EngineError, EngineResult};

#[derive(Default)]
pub struct DependencyResolver {
    parents: HashMap<ConfigId, Vec<ConfigId>>,
    resolved: Mutex<HashMap<ConfigId, Vec<ConfigId>>>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds forward edges: `item` depends on each of `dependencies`.
    pub fn update(&mut self, items: impl IntoIterator<Item = (ConfigId, Vec<ConfigId>)>) {
        for (item, dependencies) in items {
            let entry = self.parents.entry(item).or_default();
            for dep in dependencies {
                if !entry.contains(&dep) {
                    entry.push(dep);
                }
            }
        }
    }

    /// Adds edges in the inverse direction: each of `dependencies` gains
    /// `item` as a dependent. Used to build the reverse resolver from the
    /// same edge set.
    pub fn update_backward(
        &mut self,
        items: impl IntoIterator<Item = (ConfigId, Vec<ConfigId>)>,
    ) {
        for (item, dependencies) in items {
            for dep in dependencies {
                let entry = self.parents.entry(dep).or_default();
                if !entry.contains(&item) {
                    entry.push(item.clone());
                }
            }
        }
    }

    /// Direct dependencies (or dependents) of an item.
    pub fn get(&self, item: &ConfigId) -> Vec<ConfigId> {
        self.parents.get(item).cloned().unwrap_or_default()
    }

    /// Transitively resolved dependency path of an item, dependencies before
    /// dependents, each node once.
    pub fn resolve(&self, item: &ConfigId) -> EngineResult<Vec<ConfigId>> {
        let mut visiting = Vec::new();
        let result = self.resolve_inner(item, &mut visiting)?;
        Ok(result)
    }

    fn resolve_inner(
        &self,
        item: &ConfigId,
        visiting: &mut Vec<ConfigId>,
    ) -> EngineResult<Vec<ConfigId>> {
        if let Some(cached) = self.resolved.lock().unwrap().get(item) {
            return Ok(cached.clone());
        }
        if visiting.contains(item) {
            return Err(EngineError::CircularDependency(item.to_string()));
        }
        let Some(parents) = self.parents.get(item) else {
            return Ok(Vec::new());
        };
        visiting.push(item.clone());
        let mut path: Vec<ConfigId> = Vec::new();
        for parent in parents {
            if parent.kind == ItemKind::Container {
                let parent_path = self.resolve_inner(parent, visiting)?;
                for dep in parent_path {
                    if !path.contains(&dep) {
                        path.push(dep);
                    }
                }
            }
        }
        for parent in parents {
            if !path.contains(parent) {
                path.push(parent.clone());
            }
        }
        visiting.pop();
        if path.contains(item) {
            return Err(EngineError::CircularDependency(item.to_string()));
        }
        self.resolved
            .lock()
            .unwrap()
            .insert(item.clone(), path.clone());
        Ok(path)
    }

    /// Clears cached resolutions, e.g. after adding edges.
    pub fn reset(&self) {
        self.resolved.lock().unwrap().clear();
    }
}

/// Merges the dependency paths of several requested items. Paths fully
/// contained in an earlier one are dropped, and shared prefixes are removed
/// from later paths so every node is visited once.
pub fn merge_dependency_paths(
    item_paths: Vec<(ConfigId, Vec<ConfigId>)>,
) -> Vec<(ConfigId, Vec<ConfigId>)> {
    let mut merged: Vec<(ConfigId, Vec<ConfigId>)> = Vec::new();
    for (item, mut path) in item_paths {
        let mut contained = false;
        let mut absorb_index = None;
        for (index, (merged_item, merged_path)) in merged.iter().enumerate() {
            if merged_path.contains(&item) || *merged_item == item {
                contained = true;
                break;
            }
            if path.contains(merged_item) {
                absorb_index = Some(index);
                break;
            }
            if merged_path.iter().any(|node| path.contains(node)) {
                path.retain(|node| !merged_path.contains(node));
            }
        }
        if contained {
            continue;
        }
        if let Some(index) = absorb_index {
            // The earlier item is itself part of this path; its nodes are
            // already covered here.
            let (absorbed_item, absorbed_path) = merged.remove(index);
            let mut expanded = absorbed_path;
            if !expanded.contains(&absorbed_item) {
                expanded.push(absorbed_item);
            }
            for node in path {
                if !expanded.contains(&node) {
                    expanded.push(node);
                }
            }
            merged.push((item, expanded));
        } else {
            merged.push((item, path));
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(name: &str) -> ConfigId {
        ConfigId::container("m", name, None)
    }

    #[test]
    fn resolves_chain_dependencies_first() {
        let mut resolver = DependencyResolver::new();
        resolver.update(vec![
            (container("a"), vec![container("b")]),
            (container("b"), vec![container("c")]),
        ]);
        let path = resolver.resolve(&container("a")).unwrap();
        assert_eq!(path, vec![container("c"), container("b")]);
    }

    #[test]
    fn reverse_edges_resolve_dependents_first() {
        let mut resolver = DependencyResolver::new();
        let edges = vec![
            (container("a"), vec![container("b")]),
            (container("b"), vec![container("c")]),
        ];
        resolver.update_backward(edges);
        let path = resolver.resolve(&container("c")).unwrap();
        assert_eq!(path, vec![container("a"), container("b")]);
    }

    #[test]
    fn detects_cycles() {
        let mut resolver = DependencyResolver::new();
        resolver.update(vec![
            (container("a"), vec![container("b")]),
            (container("b"), vec![container("a")]),
        ]);
        assert!(matches!(
            resolver.resolve(&container("a")),
            Err(EngineError::CircularDependency(_))
        ));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let mut resolver = DependencyResolver::new();
        resolver.update(vec![(container("a"), vec![container("a")])]);
        assert!(resolver.resolve(&container("a")).is_err());
    }

    #[test]
    fn non_container_nodes_do_not_recurse() {
        let mut resolver = DependencyResolver::new();
        let volume = ConfigId::new(caravel_core::ItemKind::Volume, "m", "a", Some("v".into()));
        resolver.update(vec![(container("a"), vec![volume.clone()])]);
        let path = resolver.resolve(&container("a")).unwrap();
        assert_eq!(path, vec![volume]);
    }

    #[test]
    fn merge_drops_contained_paths() {
        let paths = vec![
            (container("a"), vec![container("c"), container("b")]),
            (container("b"), vec![container("c")]),
        ];
        let merged = merge_dependency_paths(paths);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].0, container("a"));
    }

    #[test]
    fn merge_trims_shared_dependencies() {
        let paths = vec![
            (container("a"), vec![container("c")]),
            (container("b"), vec![container("c"), container("d")]),
        ];
        let merged = merge_dependency_paths(paths);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].1, vec![container("d")]);
    }
}
