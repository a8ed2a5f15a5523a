//! In-memory Docker fake for engine tests.
//!
//! Keeps containers, volumes, networks, and image tags in plain maps,
//! records every mutating call, and can be told to fail on a specific
//! operation to exercise partial-result handling.

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::models::{
    ContainerConfig, ContainerCreateBody, ContainerInspectResponse, ContainerState,
    ContainerStateStatusEnum, ContainerSummary, ContainerTopResponse, ContainerUpdateBody,
    EndpointSettings, HostConfig, ImageInspect, ImageSummary, MountPoint, Network,
    NetworkContainer, NetworkCreateRequest, SystemVersion, Volume, VolumeCreateOptions,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use caravel_client::{ClientError, ClientResult, DockerApi};

use crate::state::INITIAL_START_TIME;

const STARTED_TIME: &str = "2024-06-01T00:00:00Z";

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub body: ContainerCreateBody,
    /// Image id resolved from the tag at creation time; stays fixed when the
    /// tag later moves to a new image.
    pub image_id: String,
    pub running: bool,
    pub started_at: String,
    pub exit_code: i64,
    pub networks: HashMap<String, EndpointSettings>,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub containers: HashMap<String, FakeContainer>,
    pub volumes: HashMap<String, Volume>,
    pub networks: HashMap<String, Network>,
    /// Image tag to image id.
    pub images: HashMap<String, String>,
    next_id: u64,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// An in-memory daemon implementing [`DockerApi`].
#[derive(Default)]
pub struct FakeDocker {
    pub state: Mutex<FakeState>,
    /// Every call that would mutate daemon state, in order.
    pub log: Mutex<Vec<String>>,
    /// When set, any logged operation starting with this string fails.
    pub fail_on: Mutex<Option<String>>,
}

impl FakeDocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, tag: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .images
            .insert(tag.to_string(), format!("sha256:{}", tag.replace([':', '/'], "-")));
        self
    }

    /// Seeds a stopped container as if it had been created earlier.
    pub fn with_container(self, name: &str, image_id: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id("ctr");
            state.containers.insert(
                name.to_string(),
                FakeContainer {
                    id,
                    body: ContainerCreateBody {
                        image: Some(image_id.to_string()),
                        ..Default::default()
                    },
                    image_id: image_id.to_string(),
                    running: false,
                    started_at: INITIAL_START_TIME.to_string(),
                    exit_code: 0,
                    networks: HashMap::new(),
                },
            );
        }
        self
    }

    pub fn set_fail_on(&self, operation: &str) {
        *self.fail_on.lock().unwrap() = Some(operation.to_string());
    }

    pub fn operations(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn container_running(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .map(|c| c.running)
            .unwrap_or(false)
    }

    pub fn set_exit_code(&self, name: &str, code: i64) {
        let mut state = self.state.lock().unwrap();
        if let Some(container) = state.containers.get_mut(name) {
            container.exit_code = code;
            container.running = false;
            container.started_at = STARTED_TIME.to_string();
        }
    }

    fn record(&self, operation: String) -> ClientResult<()> {
        if let Some(fail_on) = self.fail_on.lock().unwrap().as_deref() {
            if operation.starts_with(fail_on) {
                return Err(ClientError::Configuration(format!(
                    "injected failure on {}",
                    operation
                )));
            }
        }
        self.log.lock().unwrap().push(operation);
        Ok(())
    }

    fn mounts_of(body: &ContainerCreateBody) -> Vec<MountPoint> {
        let mut mounts = Vec::new();
        if let Some(host_config) = &body.host_config {
            for bind in host_config.binds.iter().flatten() {
                let mut parts = bind.splitn(3, ':');
                let source = parts.next().unwrap_or_default().to_string();
                let destination = parts.next().unwrap_or_default().to_string();
                mounts.push(MountPoint {
                    source: Some(source),
                    destination: Some(destination),
                    ..Default::default()
                });
            }
        }
        for path in body.volumes.iter().flat_map(|v| v.keys()) {
            mounts.push(MountPoint {
                source: Some(format!("/var/lib/docker/vfs/{}", path.trim_start_matches('/'))),
                destination: Some(path.clone()),
                ..Default::default()
            });
        }
        mounts
    }
}

#[async_trait]
impl DockerApi for FakeDocker {
    async fn version(&self) -> ClientResult<SystemVersion> {
        Ok(SystemVersion {
            api_version: Some("1.41".to_string()),
            version: Some("24.0".to_string()),
            ..Default::default()
        })
    }

    async fn list_containers(&self, _all: bool) -> ClientResult<Vec<ContainerSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .map(|(name, container)| {
                let status = if container.running {
                    "Up 5 minutes".to_string()
                } else if container.started_at == INITIAL_START_TIME {
                    "Created".to_string()
                } else {
                    format!("Exited ({})", container.exit_code)
                };
                ContainerSummary {
                    id: Some(container.id.clone()),
                    names: Some(vec![format!("/{}", name)]),
                    status: Some(status),
                    ..Default::default()
                }
            })
            .collect())
    }

    async fn inspect_container(&self, name: &str) -> ClientResult<ContainerInspectResponse> {
        let state = self.state.lock().unwrap();
        let container = state
            .containers
            .get(name)
            .ok_or_else(|| ClientError::Configuration(format!("no such container {}", name)))?;
        let status = if container.running {
            ContainerStateStatusEnum::RUNNING
        } else {
            ContainerStateStatusEnum::EXITED
        };
        Ok(ContainerInspectResponse {
            id: Some(container.id.clone()),
            name: Some(format!("/{}", name)),
            image: Some(container.image_id.clone()),
            state: Some(ContainerState {
                status: Some(status),
                running: Some(container.running),
                restarting: Some(false),
                pid: Some(if container.running { 4242 } else { 0 }),
                exit_code: Some(container.exit_code),
                started_at: Some(container.started_at.clone()),
                ..Default::default()
            }),
            config: Some(ContainerConfig {
                image: container.body.image.clone(),
                env: container.body.env.clone(),
                cmd: container.body.cmd.clone(),
                entrypoint: container.body.entrypoint.clone(),
                ..Default::default()
            }),
            host_config: container.body.host_config.clone(),
            mounts: Some(Self::mounts_of(&container.body)),
            network_settings: Some(bollard::models::NetworkSettings {
                networks: Some(container.networks.clone()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn create_container(
        &self,
        name: &str,
        body: ContainerCreateBody,
    ) -> ClientResult<String> {
        self.record(format!("create-container {}", name))?;
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("ctr");
        let image_id = body
            .image
            .as_ref()
            .and_then(|tag| state.images.get(tag).cloned())
            .or_else(|| body.image.clone())
            .unwrap_or_default();
        state.containers.insert(
            name.to_string(),
            FakeContainer {
                id: id.clone(),
                body,
                image_id,
                running: false,
                started_at: INITIAL_START_TIME.to_string(),
                exit_code: 0,
                networks: HashMap::new(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, name: &str) -> ClientResult<()> {
        self.record(format!("start-container {}", name))?;
        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| ClientError::Configuration(format!("no such container {}", name)))?;
        container.running = true;
        container.started_at = STARTED_TIME.to_string();
        Ok(())
    }

    async fn stop_container(&self, name: &str, _timeout: Option<i32>) -> ClientResult<()> {
        self.record(format!("stop-container {}", name))?;
        let mut state = self.state.lock().unwrap();
        if let Some(container) = state.containers.get_mut(name) {
            container.running = false;
        }
        Ok(())
    }

    async fn restart_container(&self, name: &str, _timeout: Option<i32>) -> ClientResult<()> {
        self.record(format!("restart-container {}", name))?;
        let mut state = self.state.lock().unwrap();
        if let Some(container) = state.containers.get_mut(name) {
            container.running = true;
            container.started_at = STARTED_TIME.to_string();
        }
        Ok(())
    }

    async fn kill_container(&self, name: &str, signal: &str) -> ClientResult<()> {
        self.record(format!("kill-container {} {}", name, signal))?;
        let mut state = self.state.lock().unwrap();
        if let Some(container) = state.containers.get_mut(name) {
            container.running = false;
        }
        Ok(())
    }

    async fn wait_container(
        &self,
        name: &str,
        _timeout: Option<Duration>,
    ) -> ClientResult<i64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .get(name)
            .map(|c| c.exit_code)
            .unwrap_or(0))
    }

    async fn remove_container(
        &self,
        name: &str,
        _force: bool,
        _remove_volumes: bool,
    ) -> ClientResult<()> {
        self.record(format!("remove-container {}", name))?;
        self.state.lock().unwrap().containers.remove(name);
        Ok(())
    }

    async fn container_logs(&self, name: &str, _timestamps: bool) -> ClientResult<String> {
        Ok(format!("logs of {}\n", name))
    }

    async fn top_processes(
        &self,
        _name: &str,
        _ps_args: &str,
    ) -> ClientResult<ContainerTopResponse> {
        Ok(ContainerTopResponse {
            titles: Some(vec!["PID".into(), "USER".into(), "ARGS".into()]),
            processes: Some(Vec::new()),
        })
    }

    async fn update_container(
        &self,
        name: &str,
        _update: ContainerUpdateBody,
    ) -> ClientResult<()> {
        self.record(format!("update-container {}", name))?;
        Ok(())
    }

    async fn create_exec(
        &self,
        container: &str,
        cmd: Vec<String>,
        _user: Option<String>,
    ) -> ClientResult<String> {
        self.record(format!("exec {} {}", container, cmd.join(" ")))?;
        let mut state = self.state.lock().unwrap();
        Ok(state.next_id("exec"))
    }

    async fn start_exec(&self, _exec_id: &str) -> ClientResult<()> {
        Ok(())
    }

    async fn create_volume(&self, options: VolumeCreateOptions) -> ClientResult<Volume> {
        let name = options.name.clone().unwrap_or_default();
        self.record(format!("create-volume {}", name))?;
        let volume = Volume {
            name: name.clone(),
            driver: options.driver.clone().unwrap_or_else(|| "local".to_string()),
            mountpoint: format!("/var/lib/docker/volumes/{}/_data", name),
            ..Default::default()
        };
        self.state
            .lock()
            .unwrap()
            .volumes
            .insert(name, volume.clone());
        Ok(volume)
    }

    async fn remove_volume(&self, name: &str) -> ClientResult<()> {
        self.record(format!("remove-volume {}", name))?;
        self.state.lock().unwrap().volumes.remove(name);
        Ok(())
    }

    async fn list_volumes(&self) -> ClientResult<Vec<Volume>> {
        Ok(self.state.lock().unwrap().volumes.values().cloned().collect())
    }

    async fn inspect_volume(&self, name: &str) -> ClientResult<Volume> {
        self.state
            .lock()
            .unwrap()
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::Configuration(format!("no such volume {}", name)))
    }

    async fn create_network(&self, request: NetworkCreateRequest) -> ClientResult<String> {
        self.record(format!("create-network {}", request.name))?;
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("net");
        state.networks.insert(
            request.name.clone(),
            Network {
                id: Some(id.clone()),
                name: Some(request.name.clone()),
                driver: request.driver.clone(),
                internal: request.internal,
                containers: Some(HashMap::new()),
                ..Default::default()
            },
        );
        Ok(id)
    }

    async fn remove_network(&self, name: &str) -> ClientResult<()> {
        self.record(format!("remove-network {}", name))?;
        self.state.lock().unwrap().networks.remove(name);
        Ok(())
    }

    async fn list_networks(&self) -> ClientResult<Vec<Network>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .networks
            .values()
            .cloned()
            .collect())
    }

    async fn inspect_network(&self, name: &str) -> ClientResult<Network> {
        self.state
            .lock()
            .unwrap()
            .networks
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::Configuration(format!("no such network {}", name)))
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        endpoint: EndpointSettings,
    ) -> ClientResult<()> {
        self.record(format!("connect-network {} {}", network, container))?;
        let mut state = self.state.lock().unwrap();
        let endpoint_id = state.next_id("ep");
        let (network_id, container_id) = {
            let net = state
                .networks
                .get(network)
                .ok_or_else(|| ClientError::Configuration(format!("no such network {}", network)))?;
            let container_entry = state
                .containers
                .get(container)
                .ok_or_else(|| ClientError::Configuration(format!("no such container {}", container)))?;
            (net.id.clone().unwrap_or_default(), container_entry.id.clone())
        };
        if let Some(net) = state.networks.get_mut(network) {
            net.containers.get_or_insert_with(HashMap::new).insert(
                container_id,
                NetworkContainer {
                    name: Some(container.to_string()),
                    endpoint_id: Some(endpoint_id.clone()),
                    ..Default::default()
                },
            );
        }
        if let Some(container_entry) = state.containers.get_mut(container) {
            container_entry.networks.insert(
                network.to_string(),
                EndpointSettings {
                    network_id: Some(network_id),
                    endpoint_id: Some(endpoint_id),
                    aliases: endpoint.aliases,
                    links: endpoint.links,
                    ..Default::default()
                },
            );
        }
        Ok(())
    }

    async fn disconnect_network(&self, network: &str, container: &str) -> ClientResult<()> {
        self.record(format!("disconnect-network {} {}", network, container))?;
        let mut state = self.state.lock().unwrap();
        let container_id = state
            .containers
            .get(container)
            .map(|c| c.id.clone())
            .unwrap_or_default();
        if let Some(net) = state.networks.get_mut(network) {
            if let Some(containers) = net.containers.as_mut() {
                containers.remove(&container_id);
            }
        }
        if let Some(container_entry) = state.containers.get_mut(container) {
            container_entry.networks.remove(network);
        }
        Ok(())
    }

    async fn list_images(&self) -> ClientResult<Vec<ImageSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .images
            .iter()
            .map(|(tag, id)| ImageSummary {
                id: id.clone(),
                repo_tags: vec![tag.clone()],
                ..Default::default()
            })
            .collect())
    }

    async fn inspect_image(&self, name: &str) -> ClientResult<ImageInspect> {
        let state = self.state.lock().unwrap();
        let id = state
            .images
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::ImageNotFound(name.to_string()))?;
        Ok(ImageInspect {
            id: Some(id),
            ..Default::default()
        })
    }

    async fn pull_image(
        &self,
        from_image: &str,
        tag: &str,
        _credentials: Option<DockerCredentials>,
    ) -> ClientResult<()> {
        let full = format!("{}:{}", from_image, tag);
        self.record(format!("pull {}", full))?;
        let mut state = self.state.lock().unwrap();
        let id = format!("sha256:{}", full.replace([':', '/'], "-"));
        state.images.insert(full, id);
        Ok(())
    }

    async fn tag_image(&self, name: &str, repo: &str, tag: &str) -> ClientResult<()> {
        self.record(format!("tag {} {}:{}", name, repo, tag))?;
        let mut state = self.state.lock().unwrap();
        if let Some(id) = state.images.get(name).cloned() {
            state.images.insert(format!("{}:{}", repo, tag), id);
        }
        Ok(())
    }
}
