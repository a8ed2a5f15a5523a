//! Execution of emitted operation lists against Docker clients.
//!
//! Operations are grouped by client; independent clients run concurrently
//! while the per-client order is preserved. Every successful operation is
//! recorded; the first failure aborts remaining work at the next operation
//! boundary and is surfaced with the partial results attached.

pub mod attached;
pub mod cmd;
pub mod image;
pub mod kwargs;
pub mod network;
pub mod script;
pub mod signal_stop;

use caravel_core::ItemKind;
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::action::{ItemAction, Operation};
use crate::cache::NameCache;
use crate::error::{ActionOutput, ActionRunnerError, EngineError, EngineResult};
use crate::options::ActionOptions;
use crate::policy::Policy;

/// Image used for transient permission-adjustment containers.
pub const CORE_IMAGE: &str = "busybox:latest";
/// No-op image backing legacy attached volume containers.
pub const BASE_IMAGE: &str = "tianon/true:latest";

pub struct Runner<'a> {
    pub policy: &'a Policy,
    pub cache: &'a NameCache,
    pub options: &'a ActionOptions,
}

impl Runner<'_> {
    /// Executes the operations, preserving per-client order. Returns the
    /// outputs of all operations, or the first failure with every output
    /// collected up to that point.
    pub async fn run(&self, actions: Vec<ItemAction>) -> EngineResult<Vec<ActionOutput>> {
        let mut per_client: IndexMap<String, Vec<ItemAction>> = IndexMap::new();
        for action in actions {
            per_client
                .entry(action.client_name.clone())
                .or_default()
                .push(action);
        }

        let abort = AtomicBool::new(false);
        let workers = per_client
            .into_iter()
            .map(|(client_name, actions)| self.run_client(client_name, actions, &abort));
        let finished = futures::future::join_all(workers).await;

        let mut outputs = Vec::new();
        let mut failure: Option<(String, ItemAction, Operation, EngineError)> = None;
        for (client_name, client_outputs, client_failure) in finished {
            outputs.extend(client_outputs);
            if failure.is_none() {
                if let Some((action, operation, error)) = client_failure {
                    failure = Some((client_name, action, operation, error));
                }
            }
        }

        match failure {
            None => Ok(outputs),
            Some((client_name, action, operation, error)) => match error {
                EngineError::Client(source) => Err(EngineError::Runner(Box::new(
                    ActionRunnerError {
                        client_name,
                        config_id: action.config_id,
                        operation,
                        results: outputs,
                        source,
                    },
                ))),
                other => Err(other),
            },
        }
    }

    async fn run_client(
        &self,
        client_name: String,
        actions: Vec<ItemAction>,
        abort: &AtomicBool,
    ) -> (
        String,
        Vec<ActionOutput>,
        Option<(ItemAction, Operation, EngineError)>,
    ) {
        let mut outputs = Vec::new();
        for action in actions {
            for operation in action.operations.clone() {
                if abort.load(Ordering::SeqCst) {
                    debug!(client = %client_name, "aborting remaining operations");
                    return (client_name, outputs, None);
                }
                match self.run_one(&client_name, &action, &operation).await {
                    Ok(result) => outputs.push(ActionOutput {
                        client_name: client_name.clone(),
                        config_id: action.config_id.clone(),
                        operation: operation.clone(),
                        result,
                    }),
                    Err(error) => {
                        warn!(
                            client = %client_name,
                            item = %action.config_id,
                            ?operation,
                            "operation failed: {}",
                            error
                        );
                        abort.store(true, Ordering::SeqCst);
                        return (client_name, outputs, Some((action, operation, error)));
                    }
                }
            }
        }
        (client_name, outputs, None)
    }

    /// Executes a single operation and returns its result payload, if any.
    async fn run_one(
        &self,
        client_name: &str,
        action: &ItemAction,
        operation: &Operation,
    ) -> EngineResult<Option<Json>> {
        let id = &action.config_id;
        let entry = self.policy.client(client_name)?;
        let features = entry.config.features();
        let item_name = self.policy.item_name(id)?;
        info!(client = %client_name, item = %id, ?operation, "running");

        match (id.kind, operation) {
            // Containers
            (ItemKind::Container, Operation::Create) => {
                let body = kwargs::instance_create_body(
                    self.policy,
                    client_name,
                    id,
                    &item_name,
                    &action.extra,
                )?;
                let container_id = entry.api.create_container(&item_name, body).await?;
                self.cache.add_container(client_name, &item_name);
                Ok(Some(Json::String(container_id)))
            }
            (ItemKind::Container, Operation::Start) => {
                entry.api.start_container(&item_name).await?;
                Ok(None)
            }
            (ItemKind::Container, Operation::Restart) => {
                let timeout = kwargs::stop_timeout(self.policy, id, &entry.config)?;
                entry
                    .api
                    .restart_container(&item_name, timeout.map(|t| t as i32))
                    .await?;
                Ok(None)
            }
            (ItemKind::Container, Operation::SignalStop) => {
                signal_stop::signal_stop(self.policy, entry, id, &item_name).await?;
                Ok(None)
            }
            (ItemKind::Container, Operation::Kill) => {
                let config = self.policy.config(&id.map_name, &id.config_name)?;
                let signal = config.stop_signal.clone().unwrap_or_else(|| "SIGKILL".into());
                entry.api.kill_container(&item_name, &signal).await?;
                Ok(None)
            }
            (ItemKind::Container, Operation::Wait) => {
                let timeout = entry
                    .config
                    .wait_timeout
                    .map(std::time::Duration::from_secs);
                let code = entry.api.wait_container(&item_name, timeout).await?;
                Ok(Some(Json::from(code)))
            }
            (ItemKind::Container, Operation::Remove) => {
                entry.api.remove_container(&item_name, false, false).await?;
                self.cache.remove_container(client_name, &item_name);
                Ok(None)
            }
            (ItemKind::Container, Operation::ConnectAll) => {
                network::connect_all(self.policy, entry, id, &item_name).await?;
                Ok(None)
            }
            (ItemKind::Container, Operation::Connect { endpoints }) => {
                network::connect(self.policy, entry, id, &item_name, endpoints).await?;
                Ok(None)
            }
            (ItemKind::Container, Operation::Disconnect { networks }) => {
                network::disconnect(self.policy, entry, id, &item_name, networks).await?;
                Ok(None)
            }
            (ItemKind::Container, Operation::ExecAll { initial }) => {
                let results =
                    cmd::exec_all(self.policy, entry, id, &item_name, *initial).await?;
                Ok(results)
            }
            (ItemKind::Container, Operation::ExecCommands { commands }) => {
                let results =
                    cmd::exec_commands(self.policy, entry, id, &item_name, commands).await?;
                Ok(results)
            }
            (ItemKind::Container, Operation::UpdateHostConfig) => {
                let update = kwargs::host_config_update(self.policy, id)?;
                entry.api.update_container(&item_name, update).await?;
                Ok(None)
            }
            (ItemKind::Container, Operation::RunScript(spec)) => {
                let result = script::run_script(self, client_name, id, &item_name, spec).await?;
                Ok(Some(result))
            }

            // Attached volumes
            (ItemKind::Volume, Operation::Create) => {
                if features.named_volumes {
                    attached::create_volume(self.policy, self.cache, entry, client_name, id)
                        .await?;
                } else {
                    attached::create_attached(
                        self.policy,
                        self.cache,
                        entry,
                        client_name,
                        id,
                        &item_name,
                    )
                    .await?;
                }
                Ok(None)
            }
            (ItemKind::Volume, Operation::Start) => {
                if !features.named_volumes {
                    entry.api.start_container(&item_name).await?;
                }
                Ok(None)
            }
            (ItemKind::Volume, Operation::PrepareVolume) => {
                attached::prepare(self, client_name, id, &item_name).await?;
                Ok(None)
            }
            (ItemKind::Volume, Operation::Remove) => {
                if features.named_volumes {
                    entry.api.remove_volume(&item_name).await?;
                    self.cache.remove_volume(client_name, &item_name);
                } else {
                    entry.api.remove_container(&item_name, false, true).await?;
                    self.cache.remove_container(client_name, &item_name);
                }
                Ok(None)
            }
            (ItemKind::Volume, Operation::SignalStop) => {
                if !features.named_volumes {
                    signal_stop::signal_stop(self.policy, entry, id, &item_name).await?;
                }
                Ok(None)
            }

            // Networks
            (ItemKind::Network, Operation::Create) => {
                let request = network::create_request(self.policy, id, &item_name)?;
                let network_id = entry.api.create_network(request).await?;
                self.cache.add_network(client_name, &item_name);
                Ok(Some(Json::String(network_id)))
            }
            (ItemKind::Network, Operation::Remove) => {
                entry.api.remove_network(&item_name).await?;
                self.cache.remove_network(client_name, &item_name);
                Ok(None)
            }
            (ItemKind::Network, Operation::DisconnectAll { containers }) => {
                for container in containers {
                    entry.api.disconnect_network(&item_name, container).await?;
                }
                Ok(None)
            }

            // Images
            (ItemKind::Image, Operation::Pull) => {
                let result = image::pull(self.cache, entry, client_name, id).await?;
                Ok(result)
            }

            (kind, operation) => Err(EngineError::InvalidOperation {
                kind,
                operation: operation.clone(),
            }),
        }
    }
}
