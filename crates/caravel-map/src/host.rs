//! Host-side volume shares.

use caravel_core::Value;
use indexmap::IndexMap;
use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{MapError, MapResult};

/// A host path entry: one path for all instances, or a per-instance table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HostEntry {
    Single(Value<String>),
    PerInstance(IndexMap<String, Value<String>>),
}

impl<'de> Deserialize<'de> for HostEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Json::deserialize(deserializer)?;
        match value {
            Json::String(path) => Ok(HostEntry::Single(path.into())),
            Json::Object(map) => {
                let mut entries = IndexMap::new();
                for (instance, path) in map {
                    match path {
                        Json::String(p) => {
                            entries.insert(instance, Value::Constant(p));
                        }
                        other => {
                            return Err(DeError::custom(format!(
                                "host path for instance '{}' must be a string, found {}",
                                instance, other
                            )))
                        }
                    }
                }
                Ok(HostEntry::PerInstance(entries))
            }
            other => Err(DeError::custom(format!(
                "host shares must be strings or per-instance objects, found {}",
                other
            ))),
        }
    }
}

/// The `host` section of a map: volume aliases shared from the Docker host,
/// with an optional root that relative paths are joined to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostVolumes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<Value<String>>,
    #[serde(flatten)]
    pub entries: IndexMap<String, HostEntry>,
}

impl HostVolumes {
    /// Resolves the host path of an alias for an instance. Relative paths are
    /// joined to `root`.
    pub fn path(&self, alias: &str, instance: Option<&str>) -> MapResult<String> {
        let entry = self.entries.get(alias).ok_or_else(|| {
            MapError::Integrity(format!("no host share found for alias '{}'", alias))
        })?;
        let raw = match entry {
            HostEntry::Single(path) => path.resolve(),
            HostEntry::PerInstance(paths) => {
                let key = instance.unwrap_or("default");
                paths
                    .get(key)
                    .map(|p| p.resolve())
                    .ok_or_else(|| {
                        MapError::Integrity(format!(
                            "no host path defined for instance '{}' of alias '{}'",
                            key, alias
                        ))
                    })?
            }
        };
        Ok(self.apply_root(raw))
    }

    /// Joins a path to the configured root unless it is already absolute.
    pub fn apply_root(&self, path: String) -> String {
        if path.starts_with('/') {
            return path;
        }
        match &self.root {
            Some(root) => {
                let root = root.resolve();
                if root.is_empty() {
                    path
                } else {
                    format!("{}/{}", root.trim_end_matches('/'), path)
                }
            }
            None => path,
        }
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host(value: Json) -> HostVolumes {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn relative_paths_are_joined_to_root() {
        let volumes = host(json!({"root": "/srv", "cfg": "app/config"}));
        assert_eq!(volumes.path("cfg", None).unwrap(), "/srv/app/config");
    }

    #[test]
    fn absolute_paths_are_used_verbatim() {
        let volumes = host(json!({"root": "/srv", "cfg": "/etc/app"}));
        assert_eq!(volumes.path("cfg", None).unwrap(), "/etc/app");
    }

    #[test]
    fn per_instance_paths_resolve_by_label() {
        let volumes = host(json!({"root": "/srv", "cfg": {"i1": "cfg/a", "i2": "cfg/b"}}));
        assert_eq!(volumes.path("cfg", Some("i1")).unwrap(), "/srv/cfg/a");
        assert_eq!(volumes.path("cfg", Some("i2")).unwrap(), "/srv/cfg/b");
        assert!(volumes.path("cfg", Some("i3")).is_err());
    }

    #[test]
    fn missing_alias_is_an_error() {
        let volumes = host(json!({}));
        assert!(volumes.path("cfg", None).is_err());
    }
}
