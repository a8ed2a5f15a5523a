//! The state generator family: basic presence and run-state classification.

use bollard::models::ContainerInspectResponse;
use caravel_core::{ConfigId, ItemKind};
use tracing::debug;

use crate::cache::{normalize_tag, NameCache};
use crate::dep::merge_dependency_paths;
use crate::error::EngineResult;
use crate::options::ActionOptions;
use crate::policy::Policy;
use crate::state::update::{self, UpdateContext};
use crate::state::{
    ConfigState, InstanceState, StateExtra, StateFlags, StateKind, INITIAL_START_TIME,
};

pub struct StateGenerator<'a> {
    pub policy: &'a Policy,
    pub cache: &'a NameCache,
    pub options: &'a ActionOptions,
    pub kind: StateKind,
}

impl<'a> StateGenerator<'a> {
    /// Generates states for the requested items in traversal order. For the
    /// dependency-following kinds, the dependency paths of all requested
    /// items are merged so shared dependencies are classified once.
    pub async fn states(&self, inputs: &[ConfigId]) -> EngineResult<Vec<ConfigState>> {
        let mut update_contexts: Vec<UpdateContext> = Vec::new();
        let mut result = Vec::new();
        match self.kind {
            StateKind::Single => {
                for id in inputs {
                    self.item_states(id, false, &mut update_contexts, &mut result)
                        .await?;
                }
            }
            StateKind::Forward | StateKind::Update | StateKind::Reverse => {
                let mut paths = Vec::new();
                for id in inputs {
                    let path = match self.kind {
                        StateKind::Reverse => self.policy.dependents(id)?,
                        _ => self.policy.dependencies(id)?,
                    };
                    paths.push((id.clone(), path));
                }
                for (id, path) in merge_dependency_paths(paths) {
                    debug!(item = %id, path_len = path.len(), "following dependency path");
                    for dep in &path {
                        self.item_states(dep, true, &mut update_contexts, &mut result)
                            .await?;
                    }
                    self.item_states(&id, false, &mut update_contexts, &mut result)
                        .await?;
                }
            }
        }
        Ok(result)
    }

    /// Classifies one item on every effective client.
    async fn item_states(
        &self,
        id: &ConfigId,
        dependent: bool,
        update_contexts: &mut Vec<UpdateContext>,
        result: &mut Vec<ConfigState>,
    ) -> EngineResult<()> {
        let clients = self.policy.clients_for(&id.map_name, &id.config_name)?;
        for client_name in clients {
            let entry = self.policy.client(&client_name)?;
            let features = entry.config.features();
            self.cache
                .ensure(
                    &client_name,
                    entry.api.as_ref(),
                    features.named_volumes,
                    features.networks,
                )
                .await?;

            let state = match id.kind {
                ItemKind::Container => {
                    self.container_state(&client_name, id, dependent, update_contexts)
                        .await?
                }
                ItemKind::Volume => {
                    if features.named_volumes {
                        self.volume_state(&client_name, id, dependent).await?
                    } else {
                        self.container_state(&client_name, id, dependent, update_contexts)
                            .await?
                    }
                }
                ItemKind::Network => {
                    self.network_state(&client_name, id, dependent, update_contexts)
                        .await?
                }
                ItemKind::Image => self.image_state(&client_name, id, dependent).await?,
            };
            debug!(item = %id, client = %client_name, state = ?state.state, "classified");
            result.push(state);
        }
        Ok(())
    }

    fn forced(&self, id: &ConfigId) -> bool {
        self.options.is_forced(&id.map_name, &id.config_name)
    }

    async fn container_state(
        &self,
        client_name: &str,
        id: &ConfigId,
        dependent: bool,
        update_contexts: &mut Vec<UpdateContext>,
    ) -> EngineResult<ConfigState> {
        let name = self.policy.item_name(id)?;
        if !self.cache.has_container(client_name, &name) {
            let mut state = ConfigState::absent(client_name, id.clone(), dependent);
            state.flags.forced_reset = self.forced(id);
            return Ok(state);
        }
        let entry = self.policy.client(client_name)?;
        let detail = entry.api.inspect_container(&name).await?;
        let mut state = self.classify_container(client_name, id, dependent, &detail);
        if self.kind == StateKind::Update {
            let context = self
                .update_context(client_name, update_contexts)
                .await?;
            update::check(self, client_name, id, &name, &detail, &mut state, context).await?;
        }
        Ok(state)
    }

    fn classify_container(
        &self,
        client_name: &str,
        id: &ConfigId,
        dependent: bool,
        detail: &ContainerInspectResponse,
    ) -> ConfigState {
        let mut flags = StateFlags::default();
        let mut extra = StateExtra::default();
        extra.id = detail.id.clone();

        let container_state = detail.state.clone().unwrap_or_default();
        let running = container_state.running.unwrap_or(false);
        let state = if running {
            extra.pid = container_state.pid;
            InstanceState::Running
        } else {
            if container_state.started_at.as_deref() == Some(INITIAL_START_TIME) {
                flags.initial = true;
            } else {
                extra.exit_code = container_state.exit_code;
                if let Some(code) = container_state.exit_code {
                    if self.options.nonrecoverable_exit_codes.contains(&code) {
                        flags.nonrecoverable = true;
                    }
                }
            }
            if container_state.restarting.unwrap_or(false) {
                flags.restarting = true;
            }
            InstanceState::Present
        };
        if let Ok(config) = self.policy.config(&id.map_name, &id.config_name) {
            flags.persistent = config.is_persistent();
        }
        flags.forced_reset = self.forced(id);
        ConfigState {
            client_name: client_name.to_string(),
            config_id: id.clone(),
            dependent,
            state,
            flags,
            extra,
        }
    }

    async fn volume_state(
        &self,
        client_name: &str,
        id: &ConfigId,
        dependent: bool,
    ) -> EngineResult<ConfigState> {
        let name = self.policy.item_name(id)?;
        let mut state = ConfigState::absent(client_name, id.clone(), dependent);
        state.flags.forced_reset = self.forced(id);
        if self.cache.has_volume(client_name, &name) {
            let entry = self.policy.client(client_name)?;
            let volume = entry.api.inspect_volume(&name).await?;
            state.state = InstanceState::Present;
            state.extra.id = Some(volume.name);
        }
        Ok(state)
    }

    async fn network_state(
        &self,
        client_name: &str,
        id: &ConfigId,
        dependent: bool,
        update_contexts: &mut Vec<UpdateContext>,
    ) -> EngineResult<ConfigState> {
        let name = self.policy.item_name(id)?;
        let mut state = ConfigState::absent(client_name, id.clone(), dependent);
        state.flags.forced_reset = self.forced(id);
        if !self.cache.has_network(client_name, &name) {
            return Ok(state);
        }
        let entry = self.policy.client(client_name)?;
        let detail = entry.api.inspect_network(&name).await?;
        state.state = InstanceState::Present;
        state.extra.id = detail.id.clone();
        if let Some(containers) = &detail.containers {
            state.extra.connected_containers = containers
                .values()
                .filter_map(|c| c.name.clone())
                .collect();
        }
        if self.kind == StateKind::Update {
            let context = self.update_context(client_name, update_contexts).await?;
            context.register_network(&detail);
            let network_config = self
                .policy
                .map(&id.map_name)?
                .networks
                .get(&id.config_name)
                .cloned()
                .unwrap_or_default();
            if !update::network_matches(&network_config, &detail) {
                state.flags.misc_mismatch = true;
            }
        }
        Ok(state)
    }

    async fn image_state(
        &self,
        client_name: &str,
        id: &ConfigId,
        dependent: bool,
    ) -> EngineResult<ConfigState> {
        let tag = normalize_tag(&self.policy.item_name(id)?);
        let mut state = ConfigState::absent(client_name, id.clone(), dependent);
        if self.kind == StateKind::Update && self.options.pull_before_update {
            let entry = self.policy.client(client_name)?;
            let credentials = update::credentials_for(&entry.config, &tag);
            let image_id = self
                .cache
                .ensure_image(client_name, entry.api.as_ref(), &tag, true, credentials)
                .await?;
            state.state = InstanceState::Present;
            state.extra.id = Some(image_id);
            return Ok(state);
        }
        if let Some(image_id) = self.cache.image_id(client_name, &tag) {
            state.state = InstanceState::Present;
            state.extra.id = Some(image_id);
        }
        Ok(state)
    }

    /// Per-client context shared across all update checks of a traversal.
    async fn update_context<'c>(
        &self,
        client_name: &str,
        contexts: &'c mut Vec<UpdateContext>,
    ) -> EngineResult<&'c mut UpdateContext> {
        if let Some(pos) = contexts.iter().position(|c| c.client_name == client_name) {
            return Ok(&mut contexts[pos]);
        }
        let entry = self.policy.client(client_name)?;
        let context =
            UpdateContext::new(client_name, entry.api.as_ref(), self.cache).await?;
        contexts.push(context);
        Ok(contexts.last_mut().unwrap())
    }
}

