//! Identifiers for items on a container map.
//!
//! Engine components address everything through [`ConfigId`] tuples: the item
//! kind, the map it lives on, the configuration name, and an optional
//! instance. For containers the instance is the instance label; for attached
//! volumes it is the volume alias; for images it is the tag.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Container,
    Volume,
    Network,
    Image,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemKind::Container => "container",
            ItemKind::Volume => "volume",
            ItemKind::Network => "network",
            ItemKind::Image => "image",
        };
        f.write_str(s)
    }
}

/// Identifies one concrete item: a single container instance, one attached
/// volume, a network, or an image tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigId {
    pub kind: ItemKind,
    pub map_name: String,
    pub config_name: String,
    pub instance_name: Option<String>,
}

impl ConfigId {
    pub fn new(
        kind: ItemKind,
        map_name: impl Into<String>,
        config_name: impl Into<String>,
        instance_name: Option<String>,
    ) -> Self {
        ConfigId {
            kind,
            map_name: map_name.into(),
            config_name: config_name.into(),
            instance_name,
        }
    }

    pub fn container(
        map_name: impl Into<String>,
        config_name: impl Into<String>,
        instance_name: Option<String>,
    ) -> Self {
        Self::new(ItemKind::Container, map_name, config_name, instance_name)
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance_name {
            Some(instance) => write!(
                f,
                "{} {}.{}.{}",
                self.kind, self.map_name, self.config_name, instance
            ),
            None => write!(f, "{} {}.{}", self.kind, self.map_name, self.config_name),
        }
    }
}

/// A selection as given by the caller: a configuration, optionally limited to
/// particular instances. An empty instance list selects all instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputId {
    pub kind: ItemKind,
    pub map_name: String,
    pub config_name: String,
    pub instance_names: Vec<String>,
}

impl InputId {
    pub fn new(
        map_name: impl Into<String>,
        config_name: impl Into<String>,
        instance_names: Vec<String>,
    ) -> Self {
        InputId {
            kind: ItemKind::Container,
            map_name: map_name.into(),
            config_name: config_name.into(),
            instance_names,
        }
    }

    /// Parses a dotted selector. `"web"` selects a configuration on the
    /// default map, `"main.web"` names the map explicitly, and
    /// `"main.web.i1"` limits the selection to one instance.
    pub fn parse(value: &str, default_map: &str) -> Self {
        let mut parts = value.splitn(3, '.');
        let first = parts.next().unwrap_or_default();
        match parts.next() {
            Some(config) => {
                let instances = parts.next().map(|i| vec![i.to_string()]).unwrap_or_default();
                InputId::new(first, config, instances)
            }
            None => InputId::new(default_map, first, Vec::new()),
        }
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.map_name, self.config_name)?;
        if !self.instance_names.is_empty() {
            write!(f, ".{}", self.instance_names.join(","))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_config_name() {
        let id = InputId::parse("web", "main");
        assert_eq!(id.map_name, "main");
        assert_eq!(id.config_name, "web");
        assert!(id.instance_names.is_empty());
    }

    #[test]
    fn parses_map_and_config() {
        let id = InputId::parse("other.app", "main");
        assert_eq!(id.map_name, "other");
        assert_eq!(id.config_name, "app");
    }

    #[test]
    fn parses_instance_selector() {
        let id = InputId::parse("main.app.i2", "main");
        assert_eq!(id.instance_names, vec!["i2".to_string()]);
    }

    #[test]
    fn config_id_display_includes_instance() {
        let id = ConfigId::container("m", "a", Some("i1".into()));
        assert_eq!(id.to_string(), "container m.a.i1");
    }
}
