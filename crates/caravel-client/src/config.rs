//! Per-client settings and capability flags.

use caravel_core::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Registry credentials for image pulls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryAuth {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub serveraddress: Option<String>,
}

/// Capabilities advertised by a Docker daemon. Derived from the API version
/// once per client, unless set explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientFeatures {
    /// Named volumes instead of `tianon/true` holder containers.
    pub named_volumes: bool,
    /// `HostConfig` accepted at container creation.
    pub host_config_on_create: bool,
    /// `StopSignal` accepted at container creation.
    pub stop_signal_on_create: bool,
    /// Resource limits adjustable without recreating the container.
    pub update_host_config: bool,
    /// Network endpoints and user-defined networks.
    pub networks: bool,
    /// `top` endpoint for matching running exec commands. CLI-style
    /// backends lack this; without it every restart command is re-run.
    pub exec_top: bool,
}

impl Default for ClientFeatures {
    fn default() -> Self {
        Self::for_api_version("1.25")
    }
}

fn version_tuple(version: &str) -> (u32, u32) {
    let mut parts = version.split('.');
    let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (major, minor)
}

impl ClientFeatures {
    /// Feature set implied by a Docker API version.
    pub fn for_api_version(version: &str) -> Self {
        let v = version_tuple(version);
        ClientFeatures {
            named_volumes: v >= (1, 21),
            host_config_on_create: v >= (1, 15),
            stop_signal_on_create: v >= (1, 21),
            update_host_config: v >= (1, 22),
            networks: v >= (1, 21),
            exec_top: true,
        }
    }
}

/// Settings for one Docker client connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfiguration {
    /// Daemon address; unix socket path or http(s)/tcp URL. Unset connects
    /// with the local defaults.
    pub base_url: Option<String>,
    /// Pinned API version; probed from the daemon when unset.
    pub api_version: Option<String>,
    /// Request timeout in seconds.
    pub timeout: Option<u64>,
    /// Default seconds between stop signal and `SIGKILL`.
    pub stop_timeout: Option<u64>,
    /// Default seconds to wait for containers to finish.
    pub wait_timeout: Option<u64>,
    /// Domain name override for created containers.
    pub domainname: Option<Value<String>>,
    /// Virtual interface aliases to IPv4 addresses for port publishing.
    pub interfaces: IndexMap<String, Value<String>>,
    /// Virtual interface aliases to IPv6 addresses.
    pub interfaces_ipv6: IndexMap<String, Value<String>>,
    /// Registry name to credentials for pulls.
    pub auth_configs: HashMap<String, RegistryAuth>,
    /// Explicit capability flags; probed from the daemon when unset.
    pub features: Option<ClientFeatures>,
}

impl ClientConfiguration {
    /// Capability flags, falling back to version-derived defaults.
    pub fn features(&self) -> ClientFeatures {
        self.features.unwrap_or_else(|| {
            self.api_version
                .as_deref()
                .map(ClientFeatures::for_api_version)
                .unwrap_or_default()
        })
    }

    /// Resolves the interface address for a port binding.
    pub fn interface_address(&self, alias: &str, ipv6: bool) -> Option<String> {
        let table = if ipv6 {
            &self.interfaces_ipv6
        } else {
            &self.interfaces
        };
        table.get(alias).map(|addr| addr.resolve())
    }

    /// Credentials for the registry an image reference points at; an image
    /// without a registry host uses the `default` entry if present.
    pub fn auth_for_image(&self, image: &str) -> Option<&RegistryAuth> {
        let registry = image
            .split('/')
            .next()
            .filter(|first| first.contains('.') || first.contains(':'));
        match registry {
            Some(registry) => self.auth_configs.get(registry),
            None => self.auth_configs.get("default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn features_follow_api_version() {
        let old = ClientFeatures::for_api_version("1.14");
        assert!(!old.host_config_on_create);
        assert!(!old.named_volumes);

        let modern = ClientFeatures::for_api_version("1.25");
        assert!(modern.host_config_on_create);
        assert!(modern.named_volumes);
        assert!(modern.update_host_config);
    }

    #[test]
    fn interface_lookup_prefers_matching_family() {
        let mut config = ClientConfiguration::default();
        config.interfaces.insert("private".into(), "10.0.0.1".into());
        config
            .interfaces_ipv6
            .insert("private".into(), "fd00::1".into());
        assert_eq!(
            config.interface_address("private", false).as_deref(),
            Some("10.0.0.1")
        );
        assert_eq!(
            config.interface_address("private", true).as_deref(),
            Some("fd00::1")
        );
    }

    #[test]
    fn auth_lookup_uses_registry_host() {
        let mut config = ClientConfiguration::default();
        config.auth_configs.insert(
            "registry.example.com".into(),
            RegistryAuth {
                username: Some("ci".into()),
                ..Default::default()
            },
        );
        assert!(config
            .auth_for_image("registry.example.com/app:latest")
            .is_some());
        assert!(config.auth_for_image("library/ubuntu:latest").is_none());
    }
}
