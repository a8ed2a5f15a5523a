//! Low-level operations and the action generator family.
//!
//! Action generators map classified states to ordered operation lists; the
//! runner executes them. Which generator runs for which intent is decided by
//! the engine's intent table.

pub mod script;
pub mod simple;
pub mod update;

use caravel_core::ConfigId;
use caravel_map::{ExecCommand, NetworkEndpoint, OptionsMap};

use crate::error::EngineResult;
use crate::options::ActionOptions;
use crate::policy::Policy;
use crate::state::ConfigState;

/// One operation against a Docker client.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create,
    Start,
    Restart,
    /// Send the configured stop signal and wait for the container to stop.
    SignalStop,
    Kill,
    Remove,
    /// Wait for the container to exit.
    Wait,
    /// Connect the container to all of its configured networks.
    ConnectAll,
    Connect {
        endpoints: Vec<NetworkEndpoint>,
    },
    Disconnect {
        networks: Vec<String>,
    },
    /// Disconnect the listed containers from a network.
    DisconnectAll {
        containers: Vec<String>,
    },
    /// Run all configured exec commands (restart policy only unless the
    /// container was just created).
    ExecAll {
        initial: bool,
    },
    /// Run specific exec commands.
    ExecCommands {
        commands: Vec<ExecCommand>,
    },
    /// Adjust owner and permissions on an attached volume.
    PrepareVolume,
    /// Apply changed resource limits in place.
    UpdateHostConfig,
    Pull,
    /// One-shot script container flow.
    RunScript(ScriptSpec),
}

/// Settings of a script run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScriptSpec {
    /// Host path of the script file or directory.
    pub script_path: Option<String>,
    pub entrypoint: Option<String>,
    /// Command template; `{script_path}` is substituted with the path inside
    /// the container.
    pub command_format: Option<Vec<String>>,
    pub timestamps: bool,
}

/// Operations for one item on one client, executed in order.
#[derive(Debug, Clone)]
pub struct ItemAction {
    pub client_name: String,
    pub config_id: ConfigId,
    pub operations: Vec<Operation>,
    /// Extra create/start fields from the caller, highest merge precedence.
    pub extra: OptionsMap,
}

impl ItemAction {
    pub fn new(state: &ConfigState, operations: Vec<Operation>) -> Self {
        ItemAction {
            client_name: state.client_name.clone(),
            config_id: state.config_id.clone(),
            operations,
            extra: OptionsMap::new(),
        }
    }

    pub fn with_extra(state: &ConfigState, operations: Vec<Operation>, extra: OptionsMap) -> Self {
        ItemAction {
            client_name: state.client_name.clone(),
            config_id: state.config_id.clone(),
            operations,
            extra,
        }
    }
}

/// Derived operation sequences.
pub mod derived {
    use super::Operation;

    /// Create and start.
    pub fn startup() -> Vec<Operation> {
        vec![Operation::Create, Operation::Start]
    }

    /// Stop and remove.
    pub fn shutdown() -> Vec<Operation> {
        vec![Operation::SignalStop, Operation::Remove]
    }

    /// Stop, remove, create, and start.
    pub fn reset() -> Vec<Operation> {
        vec![
            Operation::SignalStop,
            Operation::Remove,
            Operation::Create,
            Operation::Start,
        ]
    }

    /// Remove, create, and start.
    pub fn relaunch() -> Vec<Operation> {
        vec![Operation::Remove, Operation::Create, Operation::Start]
    }
}

/// Context handed to action generators.
pub struct ActionContext<'a> {
    pub policy: &'a Policy,
    pub options: &'a ActionOptions,
}

impl ActionContext<'_> {
    /// Caller kwargs applied to the requested items (never to dependencies).
    pub fn extra_for(&self, state: &ConfigState) -> OptionsMap {
        if state.dependent {
            OptionsMap::new()
        } else {
            self.options.kwargs.clone()
        }
    }

    pub fn features(&self, client_name: &str) -> EngineResult<caravel_client::ClientFeatures> {
        Ok(self.policy.client(client_name)?.config.features())
    }
}

/// Maps one classified state to the operations needed for an intent.
pub trait ActionGenerator: Send + Sync {
    fn actions_for(
        &self,
        state: &ConfigState,
        context: &ActionContext<'_>,
    ) -> EngineResult<Vec<ItemAction>>;
}
