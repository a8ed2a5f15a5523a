//! The Docker capability surface consumed by the engine.
//!
//! The engine talks to daemons exclusively through this trait, with
//! `bollard::models` as the wire types. The production implementation is
//! [`crate::docker::DockerClient`]; tests substitute in-memory fakes.

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::models::{
    ContainerCreateBody, ContainerInspectResponse, ContainerSummary, ContainerTopResponse,
    ContainerUpdateBody, EndpointSettings, ImageInspect, ImageSummary, Network,
    NetworkCreateRequest, SystemVersion, Volume, VolumeCreateOptions,
};
use std::time::Duration;

use crate::error::ClientResult;

#[async_trait]
pub trait DockerApi: Send + Sync {
    async fn version(&self) -> ClientResult<SystemVersion>;

    // Containers
    async fn list_containers(&self, all: bool) -> ClientResult<Vec<ContainerSummary>>;
    async fn inspect_container(&self, name: &str) -> ClientResult<ContainerInspectResponse>;
    /// Creates a container and returns its id.
    async fn create_container(
        &self,
        name: &str,
        body: ContainerCreateBody,
    ) -> ClientResult<String>;
    async fn start_container(&self, name: &str) -> ClientResult<()>;
    /// Stops a container, waiting up to `timeout` before the daemon kills it.
    async fn stop_container(&self, name: &str, timeout: Option<i32>) -> ClientResult<()>;
    async fn restart_container(&self, name: &str, timeout: Option<i32>) -> ClientResult<()>;
    async fn kill_container(&self, name: &str, signal: &str) -> ClientResult<()>;
    /// Waits for a container to exit and returns its exit code.
    async fn wait_container(&self, name: &str, timeout: Option<Duration>) -> ClientResult<i64>;
    async fn remove_container(
        &self,
        name: &str,
        force: bool,
        remove_volumes: bool,
    ) -> ClientResult<()>;
    async fn container_logs(&self, name: &str, timestamps: bool) -> ClientResult<String>;
    async fn top_processes(&self, name: &str, ps_args: &str)
        -> ClientResult<ContainerTopResponse>;
    async fn update_container(
        &self,
        name: &str,
        update: ContainerUpdateBody,
    ) -> ClientResult<()>;

    // Exec
    /// Creates an exec instance and returns its id.
    async fn create_exec(
        &self,
        container: &str,
        cmd: Vec<String>,
        user: Option<String>,
    ) -> ClientResult<String>;
    async fn start_exec(&self, exec_id: &str) -> ClientResult<()>;

    // Volumes
    async fn create_volume(&self, options: VolumeCreateOptions) -> ClientResult<Volume>;
    async fn remove_volume(&self, name: &str) -> ClientResult<()>;
    async fn list_volumes(&self) -> ClientResult<Vec<Volume>>;
    async fn inspect_volume(&self, name: &str) -> ClientResult<Volume>;

    // Networks
    async fn create_network(&self, request: NetworkCreateRequest) -> ClientResult<String>;
    async fn remove_network(&self, name: &str) -> ClientResult<()>;
    async fn list_networks(&self) -> ClientResult<Vec<Network>>;
    async fn inspect_network(&self, name: &str) -> ClientResult<Network>;
    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        endpoint: EndpointSettings,
    ) -> ClientResult<()>;
    async fn disconnect_network(&self, network: &str, container: &str) -> ClientResult<()>;

    // Images
    async fn list_images(&self) -> ClientResult<Vec<ImageSummary>>;
    async fn inspect_image(&self, name: &str) -> ClientResult<ImageInspect>;
    async fn pull_image(
        &self,
        from_image: &str,
        tag: &str,
        credentials: Option<DockerCredentials>,
    ) -> ClientResult<()>;
    async fn tag_image(&self, name: &str, repo: &str, tag: &str) -> ClientResult<()>;
}
