//! Container configurations and their inheritance merge.

use caravel_core::Value;
use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::input::{
    self, AttachedVolume, ContainerLink, ExecCommand, HostBind, NetworkEndpoint, NetworkMode,
    PortBinding, UsedVolume,
};

pub type OptionsMap = serde_json::Map<String, Json>;

/// One container configuration on a map. All fields are optional; an unset
/// scalar is `None` and an unset list is empty, which keeps inheritance
/// merging straightforward.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfiguration {
    /// Abstract configurations are only used through `extends`.
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    #[serde(deserialize_with = "de_string_list")]
    pub extends: Vec<String>,
    pub image: Option<String>,
    #[serde(deserialize_with = "de_string_list")]
    pub instances: Vec<String>,
    #[serde(deserialize_with = "de_string_list")]
    pub clients: Vec<String>,
    #[serde(deserialize_with = "de_shares")]
    pub shares: Vec<Value<String>>,
    #[serde(deserialize_with = "de_binds")]
    pub binds: Vec<HostBind>,
    #[serde(deserialize_with = "de_attaches")]
    pub attaches: Vec<AttachedVolume>,
    #[serde(deserialize_with = "de_uses")]
    pub uses: Vec<UsedVolume>,
    #[serde(deserialize_with = "de_links")]
    pub links: Vec<ContainerLink>,
    #[serde(deserialize_with = "de_exposes")]
    pub exposes: Vec<PortBinding>,
    #[serde(deserialize_with = "de_user")]
    pub user: Option<Value<String>>,
    pub permissions: Option<String>,
    /// Seconds between the stop signal and the daemon's `SIGKILL`.
    pub stop_timeout: Option<u64>,
    pub stop_signal: Option<String>,
    pub network_mode: Option<NetworkMode>,
    #[serde(deserialize_with = "de_networks")]
    pub networks: Vec<NetworkEndpoint>,
    #[serde(deserialize_with = "de_exec_commands")]
    pub exec_commands: Vec<ExecCommand>,
    pub healthcheck: Option<Json>,
    pub persistent: Option<bool>,
    /// Extra fields for the create request, keyed by Docker API field name.
    pub create_options: Option<Value<OptionsMap>>,
    /// Extra `HostConfig` fields, keyed by Docker API field name.
    pub host_config: Option<Value<OptionsMap>>,
}

fn de_string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let value = Json::deserialize(d)?;
    input::string_list(&value).map_err(DeError::custom)
}

fn de_shares<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Value<String>>, D::Error> {
    let value = Json::deserialize(d)?;
    Ok(input::string_list(&value)
        .map_err(DeError::custom)?
        .into_iter()
        .map(Into::into)
        .collect())
}

fn de_binds<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<HostBind>, D::Error> {
    let value = Json::deserialize(d)?;
    input::host_binds(&value).map_err(DeError::custom)
}

fn de_attaches<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<AttachedVolume>, D::Error> {
    let value = Json::deserialize(d)?;
    input::attached_volumes(&value).map_err(DeError::custom)
}

fn de_uses<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<UsedVolume>, D::Error> {
    let value = Json::deserialize(d)?;
    input::used_volumes(&value).map_err(DeError::custom)
}

fn de_links<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ContainerLink>, D::Error> {
    let value = Json::deserialize(d)?;
    input::container_links(&value).map_err(DeError::custom)
}

fn de_exposes<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<PortBinding>, D::Error> {
    let value = Json::deserialize(d)?;
    input::port_bindings(&value).map_err(DeError::custom)
}

fn de_networks<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<NetworkEndpoint>, D::Error> {
    let value = Json::deserialize(d)?;
    input::network_endpoints(&value).map_err(DeError::custom)
}

fn de_exec_commands<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ExecCommand>, D::Error> {
    let value = Json::deserialize(d)?;
    input::exec_commands(&value).map_err(DeError::custom)
}

fn de_user<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value<String>>, D::Error> {
    let value = Json::deserialize(d)?;
    Ok(input::user_string(&value)
        .map_err(DeError::custom)?
        .map(Into::into))
}

/// Replaces list items whose key matches an update item in place; remaining
/// update items are appended in their own order.
fn merge_keyed<T: Clone, K: PartialEq>(current: &mut Vec<T>, update: &[T], key: impl Fn(&T) -> K) {
    let mut pending: Vec<bool> = vec![true; update.len()];
    for item in current.iter_mut() {
        if let Some(pos) = update.iter().position(|u| key(u) == key(item)) {
            *item = update[pos].clone();
            pending[pos] = false;
        }
    }
    for (item, keep) in update.iter().zip(pending) {
        if keep {
            current.push(item.clone());
        }
    }
}

/// Appends update items not already present, preserving first-occurrence
/// order.
fn merge_unique<T: Clone + PartialEq>(current: &mut Vec<T>, update: &[T]) {
    for item in update {
        if !current.contains(item) {
            current.push(item.clone());
        }
    }
}

fn merge_options(
    current: &mut Option<Value<OptionsMap>>,
    update: &Option<Value<OptionsMap>>,
) {
    let Some(update) = update else { return };
    match current {
        None => *current = Some(update.clone()),
        Some(existing) => {
            if existing.is_constant() && update.is_constant() {
                let mut merged = existing.resolve();
                for (key, value) in update.resolve() {
                    merged.insert(key, value);
                }
                *current = Some(Value::Constant(merged));
            } else {
                // One side is deferred; defer the merge as well.
                let base = existing.clone();
                let overlay = update.clone();
                *current = Some(Value::lazy_once(move || {
                    let mut merged = base.resolve();
                    for (key, value) in overlay.resolve() {
                        merged.insert(key, value);
                    }
                    merged
                }));
            }
        }
    }
}

impl ContainerConfiguration {
    /// Merges `other` into this configuration with inheritance semantics:
    /// scalars are overwritten when set, scalar lists are united, keyed lists
    /// are merged by key, and option maps merge key-wise. `abstract` and
    /// `extends` never merge.
    pub fn merge_from(&mut self, other: &Self) {
        if other.image.is_some() {
            self.image = other.image.clone();
        }
        merge_unique(&mut self.instances, &other.instances);
        merge_unique(&mut self.clients, &other.clients);
        merge_unique(&mut self.shares, &other.shares);
        merge_keyed(&mut self.binds, &other.binds, |b| b.merge_key().to_string());
        merge_keyed(&mut self.attaches, &other.attaches, |a| a.alias().to_string());
        merge_keyed(&mut self.uses, &other.uses, |u| u.alias().to_string());
        merge_keyed(&mut self.links, &other.links, |l| l.container.clone());
        merge_keyed(&mut self.exposes, &other.exposes, |p| {
            (p.exposed_port.clone(), p.interface.clone())
        });
        merge_keyed(&mut self.networks, &other.networks, |n| {
            n.network_name.clone()
        });
        merge_keyed(&mut self.exec_commands, &other.exec_commands, |e| {
            (
                e.cmd.resolve().as_line(),
                e.user.as_ref().map(|u| u.resolve()),
            )
        });
        if other.user.is_some() {
            self.user = other.user.clone();
        }
        if other.permissions.is_some() {
            self.permissions = other.permissions.clone();
        }
        if other.stop_timeout.is_some() {
            self.stop_timeout = other.stop_timeout;
        }
        if other.stop_signal.is_some() {
            self.stop_signal = other.stop_signal.clone();
        }
        if other.network_mode.is_some() {
            self.network_mode = other.network_mode.clone();
        }
        if other.healthcheck.is_some() {
            self.healthcheck = other.healthcheck.clone();
        }
        if other.persistent.is_some() {
            self.persistent = other.persistent;
        }
        merge_options(&mut self.create_options, &other.create_options);
        merge_options(&mut self.host_config, &other.host_config);
    }

    /// Whether this configuration survives `remove`/`shutdown` by default.
    pub fn is_persistent(&self) -> bool {
        self.persistent.unwrap_or(false)
    }

    /// Instance labels, with a single unnamed instance when none are given.
    pub fn instance_names(&self) -> Vec<Option<String>> {
        if self.instances.is_empty() {
            vec![None]
        } else {
            self.instances.iter().cloned().map(Some).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Json) -> ContainerConfiguration {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parses_loose_document() {
        let config = parse(json!({
            "image": "nginx",
            "instances": "i1",
            "binds": {"app_config": "ro"},
            "uses": ["app.sock"],
            "exposes": [[80, 8080]],
            "exec_commands": ["/usr/bin/reload"],
            "user": 2000,
        }));
        assert_eq!(config.image.as_deref(), Some("nginx"));
        assert_eq!(config.instances, vec!["i1".to_string()]);
        assert_eq!(config.binds.len(), 1);
        assert_eq!(config.user.unwrap().resolve(), "2000");
    }

    #[test]
    fn merge_overwrites_scalars_and_unites_lists() {
        let mut base = parse(json!({
            "image": "base",
            "clients": ["alpha"],
            "shares": ["/var/log/app"],
        }));
        let update = parse(json!({
            "image": "derived",
            "clients": ["beta", "alpha"],
        }));
        base.merge_from(&update);
        assert_eq!(base.image.as_deref(), Some("derived"));
        assert_eq!(base.clients, vec!["alpha".to_string(), "beta".to_string()]);
        assert_eq!(base.shares.len(), 1);
    }

    #[test]
    fn merge_replaces_keyed_entries_in_place() {
        let mut base = parse(json!({
            "binds": [["/etc/app", "config/a"], ["/var/lib/app", "data"]],
        }));
        let update = parse(json!({
            "binds": [["/etc/app", "config/b", "ro"], ["/srv/extra", "extra"]],
        }));
        base.merge_from(&update);
        assert_eq!(base.binds.len(), 3);
        match &base.binds[0] {
            HostBind::Path {
                host_path, readonly, ..
            } => {
                assert_eq!(host_path.resolve(), "config/b");
                assert!(*readonly);
            }
            other => panic!("unexpected bind {:?}", other),
        }
    }

    #[test]
    fn merge_is_idempotent() {
        let mut base = parse(json!({
            "image": "svc",
            "binds": [["/etc/app", "config"]],
            "exposes": [[80, 8080]],
            "create_options": {"Env": ["MODE=a"]},
        }));
        let update = parse(json!({
            "exposes": [[80, 9090]],
            "create_options": {"Cmd": ["run"]},
        }));
        base.merge_from(&update);
        let once = base.clone();
        base.merge_from(&update);
        assert_eq!(base, once);
    }

    #[test]
    fn option_maps_merge_key_wise() {
        let mut base = parse(json!({"create_options": {"Env": ["A=1"], "Tty": true}}));
        let update = parse(json!({"create_options": {"Env": ["A=2"]}}));
        base.merge_from(&update);
        let options = base.create_options.unwrap().resolve();
        assert_eq!(options["Env"], json!(["A=2"]));
        assert_eq!(options["Tty"], json!(true));
    }
}
