//! Bollard-backed implementation of [`DockerApi`].

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::models::{
    ContainerCreateBody, ContainerInspectResponse, ContainerSummary, ContainerTopResponse,
    ContainerUpdateBody, EndpointSettings, ImageInspect, ImageSummary, Network,
    NetworkConnectRequest, NetworkCreateRequest, NetworkDisconnectRequest, SystemVersion, Volume,
    VolumeCreateOptions,
};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptions, InspectContainerOptions,
    InspectNetworkOptions, KillContainerOptions, ListContainersOptions, ListImagesOptions,
    ListNetworksOptions, ListVolumesOptions, LogsOptions, RemoveContainerOptions,
    RemoveVolumeOptions, RestartContainerOptions, StartContainerOptions, StopContainerOptions,
    TagImageOptions, TopOptions, WaitContainerOptions,
};
use bollard::Docker;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::DockerApi;
use crate::config::ClientConfiguration;
use crate::error::{ClientError, ClientResult};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// A live connection to one Docker daemon.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connects according to the client configuration: an http/tcp URL, a
    /// unix socket path, or the local defaults.
    pub fn connect(config: &ClientConfiguration) -> ClientResult<Self> {
        let timeout = config.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let docker = match config.base_url.as_deref() {
            Some(url) if url.starts_with("http") || url.starts_with("tcp") => {
                Docker::connect_with_http(url, timeout, bollard::API_DEFAULT_VERSION)?
            }
            Some(path) => {
                Docker::connect_with_unix(path, timeout, bollard::API_DEFAULT_VERSION)?
            }
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(DockerClient { docker })
    }

    pub fn from_docker(docker: Docker) -> Self {
        DockerClient { docker }
    }
}

#[async_trait]
impl DockerApi for DockerClient {
    async fn version(&self) -> ClientResult<SystemVersion> {
        Ok(self.docker.version().await?)
    }

    async fn list_containers(&self, all: bool) -> ClientResult<Vec<ContainerSummary>> {
        let options = ListContainersOptions {
            all,
            ..Default::default()
        };
        Ok(self.docker.list_containers(Some(options)).await?)
    }

    async fn inspect_container(&self, name: &str) -> ClientResult<ContainerInspectResponse> {
        Ok(self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await?)
    }

    async fn create_container(
        &self,
        name: &str,
        body: ContainerCreateBody,
    ) -> ClientResult<String> {
        let options = CreateContainerOptionsBuilder::new().name(name).build();
        let response = self.docker.create_container(Some(options), body).await?;
        for warning in &response.warnings {
            warn!(container = name, "daemon warning on create: {}", warning);
        }
        Ok(response.id)
    }

    async fn start_container(&self, name: &str) -> ClientResult<()> {
        self.docker
            .start_container(name, None::<StartContainerOptions>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, name: &str, timeout: Option<i32>) -> ClientResult<()> {
        let options = StopContainerOptions {
            t: timeout,
            signal: None,
        };
        self.docker.stop_container(name, Some(options)).await?;
        Ok(())
    }

    async fn restart_container(&self, name: &str, timeout: Option<i32>) -> ClientResult<()> {
        let options = RestartContainerOptions {
            t: timeout,
            ..Default::default()
        };
        self.docker.restart_container(name, Some(options)).await?;
        Ok(())
    }

    async fn kill_container(&self, name: &str, signal: &str) -> ClientResult<()> {
        let options = KillContainerOptions {
            signal: signal.to_string(),
        };
        self.docker.kill_container(name, Some(options)).await?;
        Ok(())
    }

    async fn wait_container(&self, name: &str, timeout: Option<Duration>) -> ClientResult<i64> {
        let mut stream = self
            .docker
            .wait_container(name, None::<WaitContainerOptions>);
        let next = stream.next();
        let response = match timeout {
            Some(limit) => tokio::time::timeout(limit, next)
                .await
                .map_err(|_| ClientError::WaitTimeout(name.to_string()))?,
            None => next.await,
        };
        match response {
            Some(Ok(result)) => Ok(result.status_code),
            // A nonzero exit is reported as an error variant carrying the
            // status code; surface it as a normal exit code.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(err)) => Err(err.into()),
            None => Ok(0),
        }
    }

    async fn remove_container(
        &self,
        name: &str,
        force: bool,
        remove_volumes: bool,
    ) -> ClientResult<()> {
        let options = RemoveContainerOptions {
            force,
            v: remove_volumes,
            ..Default::default()
        };
        self.docker.remove_container(name, Some(options)).await?;
        Ok(())
    }

    async fn container_logs(&self, name: &str, timestamps: bool) -> ClientResult<String> {
        let options = LogsOptions {
            stdout: true,
            stderr: true,
            timestamps,
            ..Default::default()
        };
        let mut stream = self.docker.logs(name, Some(options));
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            output.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
        }
        Ok(output)
    }

    async fn top_processes(
        &self,
        name: &str,
        ps_args: &str,
    ) -> ClientResult<ContainerTopResponse> {
        let options = TopOptions {
            ps_args: ps_args.to_string(),
        };
        Ok(self.docker.top_processes(name, Some(options)).await?)
    }

    async fn update_container(
        &self,
        name: &str,
        update: ContainerUpdateBody,
    ) -> ClientResult<()> {
        self.docker.update_container(name, update).await?;
        Ok(())
    }

    async fn create_exec(
        &self,
        container: &str,
        cmd: Vec<String>,
        user: Option<String>,
    ) -> ClientResult<String> {
        let options = bollard::exec::CreateExecOptions {
            cmd: Some(cmd),
            user,
            attach_stdout: Some(false),
            attach_stderr: Some(false),
            ..Default::default()
        };
        let created = self.docker.create_exec(container, options).await?;
        Ok(created.id)
    }

    async fn start_exec(&self, exec_id: &str) -> ClientResult<()> {
        let options = bollard::exec::StartExecOptions {
            detach: true,
            ..Default::default()
        };
        self.docker.start_exec(exec_id, Some(options)).await?;
        Ok(())
    }

    async fn create_volume(&self, options: VolumeCreateOptions) -> ClientResult<Volume> {
        Ok(self.docker.create_volume(options).await?)
    }

    async fn remove_volume(&self, name: &str) -> ClientResult<()> {
        self.docker
            .remove_volume(name, None::<RemoveVolumeOptions>)
            .await?;
        Ok(())
    }

    async fn list_volumes(&self) -> ClientResult<Vec<Volume>> {
        let response = self
            .docker
            .list_volumes(None::<ListVolumesOptions>)
            .await?;
        Ok(response.volumes.unwrap_or_default())
    }

    async fn inspect_volume(&self, name: &str) -> ClientResult<Volume> {
        Ok(self.docker.inspect_volume(name).await?)
    }

    async fn create_network(&self, request: NetworkCreateRequest) -> ClientResult<String> {
        let name = request.name.clone();
        let response = self.docker.create_network(request).await?;
        debug!(network = %name, id = %response.id, "created network");
        Ok(response.id)
    }

    async fn remove_network(&self, name: &str) -> ClientResult<()> {
        self.docker.remove_network(name).await?;
        Ok(())
    }

    async fn list_networks(&self) -> ClientResult<Vec<Network>> {
        Ok(self
            .docker
            .list_networks(None::<ListNetworksOptions>)
            .await?)
    }

    async fn inspect_network(&self, name: &str) -> ClientResult<Network> {
        Ok(self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions>)
            .await?)
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        endpoint: EndpointSettings,
    ) -> ClientResult<()> {
        let request = NetworkConnectRequest {
            container: Some(container.to_string()),
            endpoint_config: Some(endpoint),
        };
        self.docker.connect_network(network, request).await?;
        Ok(())
    }

    async fn disconnect_network(&self, network: &str, container: &str) -> ClientResult<()> {
        let request = NetworkDisconnectRequest {
            container: Some(container.to_string()),
            force: Some(false),
        };
        self.docker.disconnect_network(network, request).await?;
        Ok(())
    }

    async fn list_images(&self) -> ClientResult<Vec<ImageSummary>> {
        Ok(self.docker.list_images(None::<ListImagesOptions>).await?)
    }

    async fn inspect_image(&self, name: &str) -> ClientResult<ImageInspect> {
        Ok(self.docker.inspect_image(name).await?)
    }

    async fn pull_image(
        &self,
        from_image: &str,
        tag: &str,
        credentials: Option<DockerCredentials>,
    ) -> ClientResult<()> {
        debug!(image = from_image, tag = tag, "pulling image");
        let options = CreateImageOptions {
            from_image: Some(from_image.to_string()),
            tag: Some(tag.to_string()),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, credentials);
        while let Some(progress) = stream.next().await {
            let info = progress?;
            if let Some(status) = info.status {
                debug!(image = from_image, "{}", status);
            }
        }
        Ok(())
    }

    async fn tag_image(&self, name: &str, repo: &str, tag: &str) -> ClientResult<()> {
        let options = TagImageOptions {
            repo: Some(repo.to_string()),
            tag: Some(tag.to_string()),
        };
        self.docker.tag_image(name, Some(options)).await?;
        Ok(())
    }
}
