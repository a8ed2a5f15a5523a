//! Canonical input records and loose-shape conversion.
//!
//! Map documents may describe volumes, links, ports, commands, and network
//! endpoints in a number of shorthand shapes: a bare string, a tuple-style
//! array, or a single-key mapping. Conversion into the canonical records
//! happens once while a document is loaded; the rest of the engine only ever
//! sees the types defined here.

use caravel_core::Value;
use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Network names that Docker provides without any configuration.
pub const PRESET_NETWORKS: &[&str] = &["bridge", "host", "none"];

/// When a container starts one of its configured exec commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecPolicy {
    /// Run on every container start.
    #[default]
    Restart,
    /// Run only when the container was just created.
    Initial,
}

/// How running exec commands are matched during update checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CmdCheck {
    #[default]
    Full,
    Partial,
    None,
}

/// A host bind for a container, either referring to a host volume alias of
/// the map or naming both paths directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HostBind {
    Alias {
        alias: String,
        readonly: bool,
    },
    Path {
        container_path: String,
        host_path: Value<String>,
        readonly: bool,
    },
}

impl HostBind {
    /// Key for inheritance merging: the container-side path or the alias.
    pub fn merge_key(&self) -> &str {
        match self {
            HostBind::Alias { alias, .. } => alias,
            HostBind::Path { container_path, .. } => container_path,
        }
    }

    pub fn readonly(&self) -> bool {
        match self {
            HostBind::Alias { readonly, .. } | HostBind::Path { readonly, .. } => *readonly,
        }
    }
}

/// A volume attached to a configuration, shared with dependent containers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttachedVolume {
    /// Alias resolved through the map's `volumes` table.
    Alias { alias: String },
    /// Alias introduced here, mounted at an explicit path.
    Path { alias: String, path: String },
}

impl AttachedVolume {
    pub fn alias(&self) -> &str {
        match self {
            AttachedVolume::Alias { alias } | AttachedVolume::Path { alias, .. } => alias,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            AttachedVolume::Alias { .. } => None,
            AttachedVolume::Path { path, .. } => Some(path),
        }
    }
}

/// A volume used from another configuration: an attached alias,
/// `parent.alias`, or a container name whose shares are taken over.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UsedVolume {
    Alias {
        alias: String,
        readonly: bool,
    },
    Path {
        alias: String,
        path: String,
        readonly: bool,
    },
}

impl UsedVolume {
    pub fn alias(&self) -> &str {
        match self {
            UsedVolume::Alias { alias, .. } | UsedVolume::Path { alias, .. } => alias,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            UsedVolume::Alias { .. } => None,
            UsedVolume::Path { path, .. } => Some(path),
        }
    }

    pub fn readonly(&self) -> bool {
        match self {
            UsedVolume::Alias { readonly, .. } | UsedVolume::Path { readonly, .. } => *readonly,
        }
    }
}

/// Legacy container link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerLink {
    pub container: String,
    pub alias: Option<String>,
}

/// An exposed container port, optionally published on the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortBinding {
    /// Container port; may carry a protocol suffix such as `53/udp`.
    pub exposed_port: String,
    pub host_port: Option<Value<String>>,
    /// Virtual interface alias resolved through the client configuration.
    pub interface: Option<String>,
    pub ipv6: bool,
}

impl PortBinding {
    pub fn exposed(port: impl Into<String>) -> Self {
        PortBinding {
            exposed_port: port.into(),
            host_port: None,
            interface: None,
            ipv6: false,
        }
    }
}

/// A command line, either a shell string or an argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    Shell(String),
    Argv(Vec<String>),
}

impl Command {
    /// Single-line rendition used for process matching.
    pub fn as_line(&self) -> String {
        match self {
            Command::Shell(s) => s.clone(),
            Command::Argv(parts) => parts.join(" "),
        }
    }
}

/// A command run inside a container after it starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecCommand {
    pub cmd: Value<Command>,
    pub user: Option<Value<String>>,
    pub policy: ExecPolicy,
}

/// Settings for connecting a container to a configured network.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkEndpoint {
    pub network_name: String,
    pub aliases: Vec<String>,
    pub links: Vec<ContainerLink>,
    pub ipv4_address: Option<String>,
    pub ipv6_address: Option<String>,
    pub link_local_ips: Vec<String>,
}

impl NetworkEndpoint {
    pub fn named(name: impl Into<String>) -> Self {
        NetworkEndpoint {
            network_name: name.into(),
            aliases: Vec::new(),
            links: Vec::new(),
            ipv4_address: None,
            ipv6_address: None,
            link_local_ips: Vec::new(),
        }
    }
}

/// Networking applied to a container when no endpoint list is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMode {
    Bridge,
    Host,
    Disabled,
    /// Re-use the network stack of a container outside the map.
    Container(String),
    /// Re-use the network stack of a configuration on the same map.
    ConfigRef {
        config: String,
        instance: Option<String>,
    },
}

impl NetworkMode {
    /// The string form accepted back by the parser.
    pub fn as_ref_string(&self) -> String {
        match self {
            NetworkMode::Bridge => "bridge".to_string(),
            NetworkMode::Host => "host".to_string(),
            NetworkMode::Disabled => "none".to_string(),
            NetworkMode::Container(target) => format!("container:{}", target),
            NetworkMode::ConfigRef {
                config,
                instance: Some(instance),
            } => format!("{}.{}", config, instance),
            NetworkMode::ConfigRef {
                config,
                instance: None,
            } => config.clone(),
        }
    }
}

impl Serialize for NetworkMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.as_ref_string())
    }
}

// ---------------------------------------------------------------------------
// Loose-shape conversion
// ---------------------------------------------------------------------------

fn type_name(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Interprets a value as a read-only marker, if it is one. `true`/`false`
/// and the strings `ro`/`rw` qualify; anything else does not.
fn as_readonly(v: &Json) -> Option<bool> {
    match v {
        Json::Bool(b) => Some(*b),
        Json::String(s) if s == "ro" => Some(true),
        Json::String(s) if s == "rw" => Some(false),
        _ => None,
    }
}

fn readonly_of(v: &Json) -> Result<bool, String> {
    as_readonly(v).ok_or_else(|| {
        format!(
            "expected a boolean or 'ro'/'rw' as read-only marker, found {}",
            type_name(v)
        )
    })
}

fn string_of(v: &Json) -> Result<String, String> {
    match v {
        Json::String(s) => Ok(s.clone()),
        Json::Number(n) => Ok(n.to_string()),
        _ => Err(format!("expected a string, found {}", type_name(v))),
    }
}

fn opt_string(v: Option<&Json>) -> Result<Option<String>, String> {
    match v {
        None | Some(Json::Null) => Ok(None),
        Some(other) => string_of(other).map(Some),
    }
}

/// A user reference: a name, a `user:group` pair, or a numeric id.
pub fn user_string(v: &Json) -> Result<Option<String>, String> {
    match v {
        Json::Null => Ok(None),
        Json::String(s) => Ok(Some(s.clone())),
        Json::Number(n) => Ok(Some(n.to_string())),
        other => Err(format!(
            "expected a user name or id, found {}",
            type_name(other)
        )),
    }
}

/// Wraps a scalar into a one-element list; passes arrays through.
pub fn string_list(v: &Json) -> Result<Vec<String>, String> {
    match v {
        Json::Null => Ok(Vec::new()),
        Json::Array(items) => items.iter().map(string_of).collect(),
        other => Ok(vec![string_of(other)?]),
    }
}

/// Expands a field value into its list of items. Arrays convert per element;
/// an object with one of `canonical_keys` is a single record; any other
/// object contributes one item per entry, re-packed as a single-key map.
fn listed<T>(
    v: &Json,
    canonical_keys: &[&str],
    conv: impl Fn(&Json) -> Result<T, String>,
) -> Result<Vec<T>, String> {
    match v {
        Json::Null => Ok(Vec::new()),
        Json::Array(items) => items.iter().map(&conv).collect(),
        Json::Object(map) => {
            if map.keys().any(|k| canonical_keys.contains(&k.as_str())) {
                Ok(vec![conv(v)?])
            } else {
                map.iter()
                    .map(|(key, value)| {
                        let mut single = serde_json::Map::new();
                        single.insert(key.clone(), value.clone());
                        conv(&Json::Object(single))
                    })
                    .collect()
            }
        }
        other => Ok(vec![conv(other)?]),
    }
}

fn host_bind_from_parts(parts: &[Json]) -> Result<HostBind, String> {
    match parts {
        [alias] => Ok(HostBind::Alias {
            alias: string_of(alias)?,
            readonly: false,
        }),
        [first, second] => {
            if let Json::Array(sub) = second {
                match sub.as_slice() {
                    [host, ro] => Ok(HostBind::Path {
                        container_path: string_of(first)?,
                        host_path: string_of(host)?.into(),
                        readonly: readonly_of(ro)?,
                    }),
                    [only] => {
                        if let Some(ro) = as_readonly(only) {
                            Ok(HostBind::Alias {
                                alias: string_of(first)?,
                                readonly: ro,
                            })
                        } else {
                            Ok(HostBind::Path {
                                container_path: string_of(first)?,
                                host_path: string_of(only)?.into(),
                                readonly: false,
                            })
                        }
                    }
                    other => Err(format!(
                        "nested bind list must have one or two entries, found {}",
                        other.len()
                    )),
                }
            } else if let Some(ro) = as_readonly(second) {
                Ok(HostBind::Alias {
                    alias: string_of(first)?,
                    readonly: ro,
                })
            } else {
                Ok(HostBind::Path {
                    container_path: string_of(first)?,
                    host_path: string_of(second)?.into(),
                    readonly: false,
                })
            }
        }
        [c_path, h_path, ro] => Ok(HostBind::Path {
            container_path: string_of(c_path)?,
            host_path: string_of(h_path)?.into(),
            readonly: readonly_of(ro)?,
        }),
        other => Err(format!(
            "binds entries take one to three elements, found {}",
            other.len()
        )),
    }
}

pub fn host_bind(v: &Json) -> Result<HostBind, String> {
    match v {
        Json::String(s) => Ok(HostBind::Alias {
            alias: s.clone(),
            readonly: false,
        }),
        Json::Array(parts) => host_bind_from_parts(parts),
        Json::Object(map) => {
            if map.contains_key("alias") || map.contains_key("container_path") {
                let readonly = match map.get("readonly") {
                    Some(v) => readonly_of(v)?,
                    None => false,
                };
                if let Some(alias) = map.get("alias") {
                    return Ok(HostBind::Alias {
                        alias: string_of(alias)?,
                        readonly,
                    });
                }
                let container_path = string_of(&map["container_path"])?;
                let host_path = string_of(
                    map.get("host_path")
                        .ok_or("bind with container_path requires host_path")?,
                )?;
                return Ok(HostBind::Path {
                    container_path,
                    host_path: host_path.into(),
                    readonly,
                });
            }
            if map.len() != 1 {
                return Err(format!(
                    "only single-entry objects convert to a bind, found {} entries",
                    map.len()
                ));
            }
            let (key, value) = map.iter().next().unwrap();
            let mut parts = vec![Json::String(key.clone())];
            match value {
                Json::Array(sub) => parts.extend(sub.iter().cloned()),
                other => parts.push(other.clone()),
            }
            host_bind_from_parts(&parts)
        }
        other => Err(format!("cannot convert {} to a bind", type_name(other))),
    }
}

pub fn host_binds(v: &Json) -> Result<Vec<HostBind>, String> {
    listed(v, &["alias", "container_path"], host_bind)
}

pub fn attached_volume(v: &Json) -> Result<AttachedVolume, String> {
    match v {
        Json::String(s) => Ok(AttachedVolume::Alias { alias: s.clone() }),
        Json::Array(parts) => match parts.as_slice() {
            [alias] => Ok(AttachedVolume::Alias {
                alias: string_of(alias)?,
            }),
            [alias, path] => {
                if matches!(path, Json::Null) {
                    Ok(AttachedVolume::Alias {
                        alias: string_of(alias)?,
                    })
                } else {
                    Ok(AttachedVolume::Path {
                        alias: string_of(alias)?,
                        path: string_of(path)?,
                    })
                }
            }
            other => Err(format!(
                "attaches entries take one or two elements, found {}",
                other.len()
            )),
        },
        Json::Object(map) => {
            if map.contains_key("alias") {
                let alias = string_of(&map["alias"])?;
                if let Some(ro) = map.get("readonly") {
                    if readonly_of(ro)? {
                        return Err("attached volumes cannot be read-only".to_string());
                    }
                }
                return match opt_string(map.get("path"))? {
                    Some(path) => Ok(AttachedVolume::Path { alias, path }),
                    None => Ok(AttachedVolume::Alias { alias }),
                };
            }
            if map.len() != 1 {
                return Err(format!(
                    "only single-entry objects convert to an attached volume, found {} entries",
                    map.len()
                ));
            }
            let (alias, path) = map.iter().next().unwrap();
            Ok(AttachedVolume::Path {
                alias: alias.clone(),
                path: string_of(path)?,
            })
        }
        other => Err(format!(
            "cannot convert {} to an attached volume",
            type_name(other)
        )),
    }
}

pub fn attached_volumes(v: &Json) -> Result<Vec<AttachedVolume>, String> {
    listed(v, &["alias"], attached_volume)
}

fn used_volume_from_parts(parts: &[Json]) -> Result<UsedVolume, String> {
    match parts {
        [alias] => Ok(UsedVolume::Alias {
            alias: string_of(alias)?,
            readonly: false,
        }),
        [alias, second] => {
            if let Json::Array(sub) = second {
                match sub.as_slice() {
                    [path, ro] => Ok(UsedVolume::Path {
                        alias: string_of(alias)?,
                        path: string_of(path)?,
                        readonly: readonly_of(ro)?,
                    }),
                    [only] => {
                        if let Some(ro) = as_readonly(only) {
                            Ok(UsedVolume::Alias {
                                alias: string_of(alias)?,
                                readonly: ro,
                            })
                        } else {
                            Ok(UsedVolume::Path {
                                alias: string_of(alias)?,
                                path: string_of(only)?,
                                readonly: false,
                            })
                        }
                    }
                    other => Err(format!(
                        "nested uses list must have one or two entries, found {}",
                        other.len()
                    )),
                }
            } else if let Some(ro) = as_readonly(second) {
                Ok(UsedVolume::Alias {
                    alias: string_of(alias)?,
                    readonly: ro,
                })
            } else {
                Ok(UsedVolume::Path {
                    alias: string_of(alias)?,
                    path: string_of(second)?,
                    readonly: false,
                })
            }
        }
        [alias, path, ro] => Ok(UsedVolume::Path {
            alias: string_of(alias)?,
            path: string_of(path)?,
            readonly: readonly_of(ro)?,
        }),
        other => Err(format!(
            "uses entries take one to three elements, found {}",
            other.len()
        )),
    }
}

pub fn used_volume(v: &Json) -> Result<UsedVolume, String> {
    match v {
        Json::String(s) => Ok(UsedVolume::Alias {
            alias: s.clone(),
            readonly: false,
        }),
        Json::Array(parts) => used_volume_from_parts(parts),
        Json::Object(map) => {
            if map.contains_key("alias") {
                let alias = string_of(&map["alias"])?;
                let readonly = match map.get("readonly") {
                    Some(v) => readonly_of(v)?,
                    None => false,
                };
                return match opt_string(map.get("path"))? {
                    Some(path) => Ok(UsedVolume::Path {
                        alias,
                        path,
                        readonly,
                    }),
                    None => Ok(UsedVolume::Alias { alias, readonly }),
                };
            }
            if map.len() != 1 {
                return Err(format!(
                    "only single-entry objects convert to a used volume, found {} entries",
                    map.len()
                ));
            }
            let (alias, value) = map.iter().next().unwrap();
            let mut parts = vec![Json::String(alias.clone())];
            match value {
                Json::Array(sub) => parts.extend(sub.iter().cloned()),
                other => parts.push(other.clone()),
            }
            used_volume_from_parts(&parts)
        }
        other => Err(format!(
            "cannot convert {} to a used volume",
            type_name(other)
        )),
    }
}

pub fn used_volumes(v: &Json) -> Result<Vec<UsedVolume>, String> {
    listed(v, &["alias"], used_volume)
}

pub fn container_link(v: &Json) -> Result<ContainerLink, String> {
    match v {
        Json::String(s) => Ok(ContainerLink {
            container: s.clone(),
            alias: None,
        }),
        Json::Array(parts) => match parts.as_slice() {
            [container] => Ok(ContainerLink {
                container: string_of(container)?,
                alias: None,
            }),
            [container, alias] => Ok(ContainerLink {
                container: string_of(container)?,
                alias: opt_string(Some(alias))?,
            }),
            other => Err(format!(
                "links entries take one or two elements, found {}",
                other.len()
            )),
        },
        Json::Object(map) if map.contains_key("container") => Ok(ContainerLink {
            container: string_of(&map["container"])?,
            alias: opt_string(map.get("alias"))?,
        }),
        Json::Object(map) if map.len() == 1 => {
            let (container, alias) = map.iter().next().unwrap();
            Ok(ContainerLink {
                container: container.clone(),
                alias: opt_string(Some(alias))?,
            })
        }
        other => Err(format!("cannot convert {} to a link", type_name(other))),
    }
}

pub fn container_links(v: &Json) -> Result<Vec<ContainerLink>, String> {
    listed(v, &["container"], container_link)
}

fn port_binding_from_parts(parts: &[Json]) -> Result<PortBinding, String> {
    match parts {
        [port] => Ok(PortBinding::exposed(string_of(port)?)),
        [port, second] => match second {
            Json::Object(_) => {
                let mut binding = port_binding_kwargs(second)?;
                binding.exposed_port = string_of(port)?;
                Ok(binding)
            }
            Json::Null => Ok(PortBinding::exposed(string_of(port)?)),
            Json::Array(sub) => match sub.as_slice() {
                [host_port, interface] => Ok(PortBinding {
                    exposed_port: string_of(port)?,
                    host_port: Some(string_of(host_port)?.into()),
                    interface: opt_string(Some(interface))?,
                    ipv6: false,
                }),
                [host_port, interface, ipv6] => Ok(PortBinding {
                    exposed_port: string_of(port)?,
                    host_port: Some(string_of(host_port)?.into()),
                    interface: opt_string(Some(interface))?,
                    ipv6: readonly_like_bool(ipv6)?,
                }),
                other => Err(format!(
                    "nested port binding takes two or three elements, found {}",
                    other.len()
                )),
            },
            scalar => Ok(PortBinding {
                exposed_port: string_of(port)?,
                host_port: Some(string_of(scalar)?.into()),
                interface: None,
                ipv6: false,
            }),
        },
        [port, host_port, interface] => Ok(PortBinding {
            exposed_port: string_of(port)?,
            host_port: Some(string_of(host_port)?.into()),
            interface: opt_string(Some(interface))?,
            ipv6: false,
        }),
        [port, host_port, interface, ipv6] => Ok(PortBinding {
            exposed_port: string_of(port)?,
            host_port: Some(string_of(host_port)?.into()),
            interface: opt_string(Some(interface))?,
            ipv6: readonly_like_bool(ipv6)?,
        }),
        other => Err(format!(
            "exposes entries take one to four elements, found {}",
            other.len()
        )),
    }
}

fn readonly_like_bool(v: &Json) -> Result<bool, String> {
    match v {
        Json::Bool(b) => Ok(*b),
        other => Err(format!("expected a boolean, found {}", type_name(other))),
    }
}

fn port_binding_kwargs(v: &Json) -> Result<PortBinding, String> {
    let map = v.as_object().expect("kwargs caller passes objects");
    Ok(PortBinding {
        exposed_port: string_of(map.get("exposed_port").unwrap_or(&Json::Null))?,
        host_port: opt_string(map.get("host_port"))?.map(Into::into),
        interface: opt_string(map.get("interface"))?,
        ipv6: match map.get("ipv6") {
            Some(v) => readonly_like_bool(v)?,
            None => false,
        },
    })
}

pub fn port_binding(v: &Json) -> Result<PortBinding, String> {
    match v {
        Json::String(_) | Json::Number(_) => Ok(PortBinding::exposed(string_of(v)?)),
        Json::Array(parts) => port_binding_from_parts(parts),
        Json::Object(map) => {
            if map.contains_key("exposed_port") {
                return port_binding_kwargs(v);
            }
            if map.len() != 1 {
                return Err(format!(
                    "only single-entry objects convert to a port binding, found {} entries",
                    map.len()
                ));
            }
            let (port, value) = map.iter().next().unwrap();
            let mut parts = vec![Json::String(port.clone())];
            match value {
                Json::Array(sub) if !sub.is_empty() => parts.push(Json::Array(sub.clone())),
                Json::Null => {}
                other => parts.push(other.clone()),
            }
            port_binding_from_parts(&parts)
        }
        other => Err(format!(
            "cannot convert {} to a port binding",
            type_name(other)
        )),
    }
}

pub fn port_bindings(v: &Json) -> Result<Vec<PortBinding>, String> {
    listed(v, &["exposed_port"], port_binding)
}

fn command_of(v: &Json) -> Result<Command, String> {
    match v {
        Json::String(s) => Ok(Command::Shell(s.clone())),
        Json::Array(parts) => Ok(Command::Argv(
            parts.iter().map(string_of).collect::<Result<_, _>>()?,
        )),
        other => Err(format!("cannot convert {} to a command", type_name(other))),
    }
}

fn exec_policy_of(v: &Json) -> Result<ExecPolicy, String> {
    match v {
        Json::String(s) if s == "restart" => Ok(ExecPolicy::Restart),
        Json::String(s) if s == "initial" => Ok(ExecPolicy::Initial),
        other => Err(format!(
            "expected 'restart' or 'initial' as exec policy, found {}",
            type_name(other)
        )),
    }
}

pub fn exec_command(v: &Json) -> Result<ExecCommand, String> {
    match v {
        Json::String(_) => Ok(ExecCommand {
            cmd: Value::Constant(command_of(v)?),
            user: None,
            policy: ExecPolicy::Restart,
        }),
        Json::Array(parts) => match parts.as_slice() {
            [cmd] => Ok(ExecCommand {
                cmd: Value::Constant(command_of(cmd)?),
                user: None,
                policy: ExecPolicy::Restart,
            }),
            [cmd, user] => Ok(ExecCommand {
                cmd: Value::Constant(command_of(cmd)?),
                user: opt_string(Some(user))?.map(Into::into),
                policy: ExecPolicy::Restart,
            }),
            [cmd, user, policy] => Ok(ExecCommand {
                cmd: Value::Constant(command_of(cmd)?),
                user: opt_string(Some(user))?.map(Into::into),
                policy: exec_policy_of(policy)?,
            }),
            other => Err(format!(
                "exec entries take one to three elements, found {}",
                other.len()
            )),
        },
        Json::Object(map) if map.contains_key("cmd") => Ok(ExecCommand {
            cmd: Value::Constant(command_of(&map["cmd"])?),
            user: opt_string(map.get("user"))?.map(Into::into),
            policy: match map.get("policy") {
                Some(p) => exec_policy_of(p)?,
                None => ExecPolicy::Restart,
            },
        }),
        other => Err(format!(
            "cannot convert {} to an exec command",
            type_name(other)
        )),
    }
}

pub fn exec_commands(v: &Json) -> Result<Vec<ExecCommand>, String> {
    listed(v, &["cmd"], exec_command)
}

fn endpoint_from_kwargs(name: String, map: &serde_json::Map<String, Json>) -> Result<NetworkEndpoint, String> {
    Ok(NetworkEndpoint {
        network_name: name,
        aliases: match map.get("aliases") {
            Some(v) => string_list(v)?,
            None => Vec::new(),
        },
        links: match map.get("links") {
            Some(v) => container_links(v)?,
            None => Vec::new(),
        },
        ipv4_address: opt_string(map.get("ipv4_address"))?,
        ipv6_address: opt_string(map.get("ipv6_address"))?,
        link_local_ips: match map.get("link_local_ips") {
            Some(v) => string_list(v)?,
            None => Vec::new(),
        },
    })
}

fn endpoint_from_parts(name: String, parts: &[Json]) -> Result<NetworkEndpoint, String> {
    let mut endpoint = NetworkEndpoint::named(name);
    let mut iter = parts.iter();
    if let Some(aliases) = iter.next() {
        endpoint.aliases = string_list(aliases)?;
    }
    if let Some(links) = iter.next() {
        endpoint.links = container_links(links)?;
    }
    if let Some(ipv4) = iter.next() {
        endpoint.ipv4_address = opt_string(Some(ipv4))?;
    }
    if let Some(ipv6) = iter.next() {
        endpoint.ipv6_address = opt_string(Some(ipv6))?;
    }
    if let Some(lls) = iter.next() {
        endpoint.link_local_ips = string_list(lls)?;
    }
    if iter.next().is_some() {
        return Err("network endpoints take at most six elements".to_string());
    }
    Ok(endpoint)
}

pub fn network_endpoint(v: &Json) -> Result<NetworkEndpoint, String> {
    match v {
        Json::String(s) => Ok(NetworkEndpoint::named(s.clone())),
        Json::Array(parts) => match parts.as_slice() {
            [name] => Ok(NetworkEndpoint::named(string_of(name)?)),
            [name, Json::Object(kwargs)] => endpoint_from_kwargs(string_of(name)?, kwargs),
            [name, rest @ ..] => endpoint_from_parts(string_of(name)?, rest),
            [] => Err("network endpoints cannot be empty lists".to_string()),
        },
        Json::Object(map) => {
            if map.contains_key("network_name") {
                return endpoint_from_kwargs(
                    string_of(&map["network_name"])?,
                    map,
                );
            }
            if map.len() != 1 {
                return Err(format!(
                    "only single-entry objects convert to a network endpoint, found {} entries",
                    map.len()
                ));
            }
            let (name, value) = map.iter().next().unwrap();
            match value {
                Json::Null => Ok(NetworkEndpoint::named(name.clone())),
                Json::String(alias) => Ok(NetworkEndpoint {
                    aliases: vec![alias.clone()],
                    ..NetworkEndpoint::named(name.clone())
                }),
                Json::Object(kwargs) => endpoint_from_kwargs(name.clone(), kwargs),
                Json::Array(parts) => endpoint_from_parts(name.clone(), parts),
                other => Err(format!(
                    "cannot convert {} to network endpoint settings",
                    type_name(other)
                )),
            }
        }
        other => Err(format!(
            "cannot convert {} to a network endpoint",
            type_name(other)
        )),
    }
}

pub fn network_endpoints(v: &Json) -> Result<Vec<NetworkEndpoint>, String> {
    listed(v, &["network_name"], network_endpoint)
}

pub fn network_mode(v: &Json) -> Result<NetworkMode, String> {
    match v {
        Json::Null => Ok(NetworkMode::Disabled),
        Json::String(s) => match s.as_str() {
            "" | "none" | "disabled" => Ok(NetworkMode::Disabled),
            "bridge" | "default" => Ok(NetworkMode::Bridge),
            "host" => Ok(NetworkMode::Host),
            other if other.starts_with("container:") => Ok(NetworkMode::Container(
                other["container:".len()..].to_string(),
            )),
            other if other.starts_with('/') => {
                Ok(NetworkMode::Container(other[1..].to_string()))
            }
            other => {
                let (config, instance) = match other.split_once('.') {
                    Some((c, i)) => (c.to_string(), Some(i.to_string())),
                    None => (other.to_string(), None),
                };
                Ok(NetworkMode::ConfigRef { config, instance })
            }
        },
        Json::Array(parts) => match parts.as_slice() {
            [config, instance] => Ok(NetworkMode::ConfigRef {
                config: string_of(config)?,
                instance: opt_string(Some(instance))?,
            }),
            other => Err(format!(
                "container network references take two elements, found {}",
                other.len()
            )),
        },
        other => Err(format!(
            "cannot convert {} to a network mode",
            type_name(other)
        )),
    }
}

// ---------------------------------------------------------------------------
// Deserialize impls routed through the converters
// ---------------------------------------------------------------------------

macro_rules! deserialize_via {
    ($ty:ty, $conv:path) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let value = Json::deserialize(deserializer)?;
                $conv(&value).map_err(DeError::custom)
            }
        }
    };
}

deserialize_via!(HostBind, host_bind);
deserialize_via!(AttachedVolume, attached_volume);
deserialize_via!(UsedVolume, used_volume);
deserialize_via!(ContainerLink, container_link);
deserialize_via!(PortBinding, port_binding);
deserialize_via!(ExecCommand, exec_command);
deserialize_via!(NetworkEndpoint, network_endpoint);
deserialize_via!(NetworkMode, network_mode);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bind_from_string_is_alias() {
        let bind = host_bind(&json!("app_config")).unwrap();
        assert_eq!(
            bind,
            HostBind::Alias {
                alias: "app_config".into(),
                readonly: false
            }
        );
    }

    #[test]
    fn bind_from_pair_distinguishes_readonly_marker() {
        let alias = host_bind(&json!(["config", "ro"])).unwrap();
        assert_eq!(
            alias,
            HostBind::Alias {
                alias: "config".into(),
                readonly: true
            }
        );
        let path = host_bind(&json!(["/var/lib/app", "app/data"])).unwrap();
        assert_eq!(
            path,
            HostBind::Path {
                container_path: "/var/lib/app".into(),
                host_path: "app/data".into(),
                readonly: false
            }
        );
    }

    #[test]
    fn bind_from_nested_map() {
        let bind = host_bind(&json!({"/var/lib/app": ["app/data", true]})).unwrap();
        assert_eq!(
            bind,
            HostBind::Path {
                container_path: "/var/lib/app".into(),
                host_path: "app/data".into(),
                readonly: true
            }
        );
    }

    #[test]
    fn binds_field_accepts_multi_entry_map() {
        let binds = host_binds(&json!({"/a": "h1", "/b": ["h2", "ro"]})).unwrap();
        assert_eq!(binds.len(), 2);
        assert!(binds[1].readonly());
    }

    #[test]
    fn clean_is_idempotent_for_binds() {
        let bind = host_bind(&json!(["/var/lib/app", "app/data", "ro"])).unwrap();
        let reparsed: HostBind =
            serde_json::from_value(serde_json::to_value(&bind).unwrap()).unwrap();
        assert_eq!(bind, reparsed);
    }

    #[test]
    fn attached_rejects_readonly() {
        let err = attached_volume(&json!({"alias": "sock", "readonly": true})).unwrap_err();
        assert!(err.contains("read-only"));
    }

    #[test]
    fn attached_pair_sets_path() {
        let attached = attached_volume(&json!(["sock", "/var/run/app"])).unwrap();
        assert_eq!(attached.alias(), "sock");
        assert_eq!(attached.path(), Some("/var/run/app"));
    }

    #[test]
    fn used_accepts_parent_scoped_alias() {
        let used = used_volume(&json!("app.sock")).unwrap();
        assert_eq!(used.alias(), "app.sock");
        assert!(!used.readonly());
    }

    #[test]
    fn link_pair_sets_alias() {
        let link = container_link(&json!(["svc", "database"])).unwrap();
        assert_eq!(link.container, "svc");
        assert_eq!(link.alias.as_deref(), Some("database"));
    }

    #[test]
    fn port_only_number() {
        let port = port_binding(&json!(8080)).unwrap();
        assert_eq!(port.exposed_port, "8080");
        assert!(port.host_port.is_none());
    }

    #[test]
    fn port_with_interface_tuple() {
        let port = port_binding(&json!([443, [8443, "private"]])).unwrap();
        assert_eq!(port.host_port.as_ref().unwrap().resolve(), "8443");
        assert_eq!(port.interface.as_deref(), Some("private"));
    }

    #[test]
    fn port_map_form() {
        let ports = port_bindings(&json!({"80": 8080, "53": [53, "dns", true]})).unwrap();
        assert_eq!(ports.len(), 2);
        assert!(ports.iter().any(|p| p.ipv6));
    }

    #[test]
    fn exec_command_with_user_and_policy() {
        let cmd = exec_command(&json!([["/usr/bin/migrate", "--apply"], "app", "initial"])).unwrap();
        assert_eq!(cmd.policy, ExecPolicy::Initial);
        assert_eq!(cmd.cmd.resolve().as_line(), "/usr/bin/migrate --apply");
        assert_eq!(cmd.user.unwrap().resolve(), "app");
    }

    #[test]
    fn endpoint_with_alias_shorthand() {
        let endpoint = network_endpoint(&json!({"backend": "db"})).unwrap();
        assert_eq!(endpoint.network_name, "backend");
        assert_eq!(endpoint.aliases, vec!["db".to_string()]);
    }

    #[test]
    fn endpoint_kwargs() {
        let endpoint = network_endpoint(&json!({
            "backend": {"aliases": ["db"], "ipv4_address": "10.1.0.4"}
        }))
        .unwrap();
        assert_eq!(endpoint.ipv4_address.as_deref(), Some("10.1.0.4"));
    }

    #[test]
    fn network_mode_variants() {
        assert_eq!(network_mode(&json!("disabled")).unwrap(), NetworkMode::Disabled);
        assert_eq!(network_mode(&json!("host")).unwrap(), NetworkMode::Host);
        assert_eq!(
            network_mode(&json!("/external")).unwrap(),
            NetworkMode::Container("external".into())
        );
        assert_eq!(
            network_mode(&json!("container:abc123")).unwrap(),
            NetworkMode::Container("abc123".into())
        );
        assert_eq!(
            network_mode(&json!("app.i1")).unwrap(),
            NetworkMode::ConfigRef {
                config: "app".into(),
                instance: Some("i1".into())
            }
        );
    }
}
