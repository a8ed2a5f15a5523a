//! Resolution of symbolic client names to live connections and settings.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::api::DockerApi;
use crate::config::{ClientConfiguration, ClientFeatures};
use crate::error::{ClientError, ClientResult};

/// Name of the client used when neither a configuration nor a map names any.
pub const DEFAULT_CLIENT_NAME: &str = "__default__";

pub struct ClientEntry {
    pub api: Arc<dyn DockerApi>,
    pub config: ClientConfiguration,
}

/// Registry of Docker clients by symbolic name.
#[derive(Default)]
pub struct ClientRegistry {
    clients: HashMap<String, ClientEntry>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        config: ClientConfiguration,
        api: Arc<dyn DockerApi>,
    ) {
        self.clients.insert(name.into(), ClientEntry { api, config });
    }

    pub fn get(&self, name: &str) -> ClientResult<&ClientEntry> {
        self.clients
            .get(name)
            .ok_or_else(|| ClientError::UnknownClient(name.to_string()))
    }

    pub fn client_names(&self) -> impl Iterator<Item = &String> {
        self.clients.keys()
    }

    /// The effective client set for a configuration: configuration clients
    /// override map clients; with neither, the default client is used.
    pub fn effective_clients(
        &self,
        config_clients: &[String],
        map_clients: &[String],
    ) -> Vec<String> {
        if !config_clients.is_empty() {
            config_clients.to_vec()
        } else if !map_clients.is_empty() {
            map_clients.to_vec()
        } else {
            vec![DEFAULT_CLIENT_NAME.to_string()]
        }
    }

    /// Probes API versions once and fills in capability flags for clients
    /// that have none set explicitly.
    pub async fn probe_features(&mut self) -> ClientResult<()> {
        for (name, entry) in self.clients.iter_mut() {
            if entry.config.features.is_some() {
                continue;
            }
            let version = entry.api.version().await?;
            let api_version = version
                .api_version
                .or(entry.config.api_version.clone())
                .unwrap_or_default();
            let features = ClientFeatures::for_api_version(&api_version);
            debug!(
                client = %name,
                api_version = %api_version,
                "probed client capabilities"
            );
            entry.config.api_version = Some(api_version);
            entry.config.features = Some(features);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_clients_prefer_configuration() {
        let registry = ClientRegistry::new();
        let config = vec!["alpha".to_string()];
        let map = vec!["beta".to_string()];
        assert_eq!(registry.effective_clients(&config, &map), config);
        assert_eq!(registry.effective_clients(&[], &map), map);
        assert_eq!(
            registry.effective_clients(&[], &[]),
            vec![DEFAULT_CLIENT_NAME.to_string()]
        );
    }

    #[test]
    fn unknown_client_is_an_error() {
        let registry = ClientRegistry::new();
        assert!(matches!(
            registry.get("missing"),
            Err(ClientError::UnknownClient(_))
        ));
    }
}
