//! Per-client name and image caches.
//!
//! Populated once per planning cycle from `list_*` calls so that state
//! classification can decide presence without an inspect round-trip per
//! node. The runner invalidates entries locally on every create and remove.

use caravel_client::{ClientResult, DockerApi};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::debug;

#[derive(Default, Clone)]
pub struct ClientNames {
    pub containers: HashSet<String>,
    pub volumes: HashSet<String>,
    pub networks: HashSet<String>,
    /// Image tag to image id.
    pub images: HashMap<String, String>,
}

/// Cached daemon state per client name.
#[derive(Default)]
pub struct NameCache {
    entries: Mutex<HashMap<String, ClientNames>>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads names and image tags for a client unless already cached.
    pub async fn ensure(
        &self,
        client_name: &str,
        api: &dyn DockerApi,
        with_volumes: bool,
        with_networks: bool,
    ) -> ClientResult<()> {
        if self.entries.lock().unwrap().contains_key(client_name) {
            return Ok(());
        }
        let mut names = ClientNames::default();
        for container in api.list_containers(true).await? {
            for name in container.names.unwrap_or_default() {
                names
                    .containers
                    .insert(name.trim_start_matches('/').to_string());
            }
        }
        if with_volumes {
            for volume in api.list_volumes().await? {
                names.volumes.insert(volume.name);
            }
        }
        if with_networks {
            for network in api.list_networks().await? {
                if let Some(name) = network.name {
                    names.networks.insert(name);
                }
            }
        }
        for image in api.list_images().await? {
            for tag in &image.repo_tags {
                names.images.insert(tag.clone(), image.id.clone());
            }
        }
        debug!(
            client = client_name,
            containers = names.containers.len(),
            images = names.images.len(),
            "cached daemon names"
        );
        self.entries
            .lock()
            .unwrap()
            .insert(client_name.to_string(), names);
        Ok(())
    }

    pub fn snapshot(&self, client_name: &str) -> ClientNames {
        self.entries
            .lock()
            .unwrap()
            .get(client_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_container(&self, client_name: &str, name: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(client_name)
            .map(|n| n.containers.contains(name))
            .unwrap_or(false)
    }

    pub fn has_volume(&self, client_name: &str, name: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(client_name)
            .map(|n| n.volumes.contains(name))
            .unwrap_or(false)
    }

    pub fn has_network(&self, client_name: &str, name: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(client_name)
            .map(|n| n.networks.contains(name))
            .unwrap_or(false)
    }

    pub fn image_id(&self, client_name: &str, tag: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(client_name)
            .and_then(|n| n.images.get(tag).cloned())
    }

    pub fn add_container(&self, client_name: &str, name: &str) {
        if let Some(names) = self.entries.lock().unwrap().get_mut(client_name) {
            names.containers.insert(name.to_string());
        }
    }

    pub fn remove_container(&self, client_name: &str, name: &str) {
        if let Some(names) = self.entries.lock().unwrap().get_mut(client_name) {
            names.containers.remove(name);
        }
    }

    pub fn add_volume(&self, client_name: &str, name: &str) {
        if let Some(names) = self.entries.lock().unwrap().get_mut(client_name) {
            names.volumes.insert(name.to_string());
        }
    }

    pub fn remove_volume(&self, client_name: &str, name: &str) {
        if let Some(names) = self.entries.lock().unwrap().get_mut(client_name) {
            names.volumes.remove(name);
        }
    }

    pub fn add_network(&self, client_name: &str, name: &str) {
        if let Some(names) = self.entries.lock().unwrap().get_mut(client_name) {
            names.networks.insert(name.to_string());
        }
    }

    pub fn remove_network(&self, client_name: &str, name: &str) {
        if let Some(names) = self.entries.lock().unwrap().get_mut(client_name) {
            names.networks.remove(name);
        }
    }

    pub fn add_image(&self, client_name: &str, tag: &str, id: &str) {
        if let Some(names) = self.entries.lock().unwrap().get_mut(client_name) {
            names.images.insert(tag.to_string(), id.to_string());
        }
    }

    /// Drops everything; the next access reloads from the daemons.
    pub fn refresh(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Makes sure an image tag is available on the client, pulling it when
    /// missing, and returns its id.
    pub async fn ensure_image(
        &self,
        client_name: &str,
        api: &dyn DockerApi,
        image: &str,
        pull: bool,
        credentials: Option<bollard::auth::DockerCredentials>,
    ) -> ClientResult<String> {
        let tag = normalize_tag(image);
        if !pull {
            if let Some(id) = self.image_id(client_name, &tag) {
                return Ok(id);
            }
        }
        let (name, tag_part) = tag.rsplit_once(':').expect("normalized tags have a colon");
        api.pull_image(name, tag_part, credentials).await?;
        let inspected = api.inspect_image(&tag).await?;
        let id = inspected
            .id
            .ok_or_else(|| caravel_client::ClientError::ImageNotFound(tag.clone()))?;
        self.add_image(client_name, &tag, &id);
        Ok(id)
    }
}

/// Appends `:latest` to tag-less image references.
pub fn normalize_tag(image: &str) -> String {
    match image.rfind(':') {
        Some(idx) if !image[idx..].contains('/') => image.to_string(),
        _ => format!("{}:latest", image),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_untagged_references() {
        assert_eq!(normalize_tag("ubuntu"), "ubuntu:latest");
        assert_eq!(normalize_tag("ubuntu:20.04"), "ubuntu:20.04");
        assert_eq!(
            normalize_tag("reg.example.com:5000/app"),
            "reg.example.com:5000/app:latest"
        );
    }
}
