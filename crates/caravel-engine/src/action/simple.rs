//! Action generators for the basic intents.

use caravel_core::ItemKind;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

use crate::action::{derived, ActionContext, ActionGenerator, ItemAction, Operation};
use crate::error::EngineResult;
use crate::state::{ConfigState, InstanceState};

/// `create`: everything absent is created; present items are left alone.
pub struct CreateActionGenerator;

impl ActionGenerator for CreateActionGenerator {
    fn actions_for(
        &self,
        state: &ConfigState,
        context: &ActionContext<'_>,
    ) -> EngineResult<Vec<ItemAction>> {
        if state.state != InstanceState::Absent {
            return Ok(Vec::new());
        }
        Ok(match state.config_id.kind {
            ItemKind::Image => vec![ItemAction::new(state, vec![Operation::Pull])],
            ItemKind::Container => vec![ItemAction::with_extra(
                state,
                vec![Operation::Create, Operation::ConnectAll],
                context.extra_for(state),
            )],
            _ => vec![ItemAction::new(state, vec![Operation::Create])],
        })
    }
}

/// `start`: non-running containers are started and their exec commands run;
/// initial attached containers are started and prepared.
pub struct StartActionGenerator;

impl ActionGenerator for StartActionGenerator {
    fn actions_for(
        &self,
        state: &ConfigState,
        context: &ActionContext<'_>,
    ) -> EngineResult<Vec<ItemAction>> {
        match state.config_id.kind {
            ItemKind::Volume
                if state.state == InstanceState::Present && state.flags.initial =>
            {
                Ok(vec![ItemAction::new(
                    state,
                    vec![Operation::Start, Operation::PrepareVolume],
                )])
            }
            ItemKind::Container if state.state == InstanceState::Present => {
                Ok(vec![ItemAction::with_extra(
                    state,
                    vec![
                        Operation::Start,
                        Operation::ConnectAll,
                        Operation::ExecAll {
                            initial: state.flags.initial,
                        },
                    ],
                    context.extra_for(state),
                )])
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// `restart`: restarts only the named containers.
pub struct RestartActionGenerator;

impl ActionGenerator for RestartActionGenerator {
    fn actions_for(
        &self,
        state: &ConfigState,
        context: &ActionContext<'_>,
    ) -> EngineResult<Vec<ItemAction>> {
        if state.config_id.kind != ItemKind::Container
            || state.state == InstanceState::Absent
            || state.flags.initial
        {
            return Ok(Vec::new());
        }
        let mut operations = vec![Operation::Restart];
        if context.options.restart_exec_commands {
            operations.push(Operation::ExecAll { initial: false });
        }
        Ok(vec![ItemAction::new(state, operations)])
    }
}

/// `stop`: signal-stops running containers in reverse dependency order.
pub struct StopActionGenerator;

impl ActionGenerator for StopActionGenerator {
    fn actions_for(
        &self,
        state: &ConfigState,
        _context: &ActionContext<'_>,
    ) -> EngineResult<Vec<ItemAction>> {
        if state.config_id.kind == ItemKind::Container
            && state.state != InstanceState::Absent
            && !state.flags.initial
        {
            return Ok(vec![ItemAction::new(state, vec![Operation::SignalStop])]);
        }
        Ok(Vec::new())
    }
}

/// `remove`: removes stopped containers; persistent containers and attached
/// volumes only on request. Networks disconnect their containers first.
pub struct RemoveActionGenerator;

impl ActionGenerator for RemoveActionGenerator {
    fn actions_for(
        &self,
        state: &ConfigState,
        context: &ActionContext<'_>,
    ) -> EngineResult<Vec<ItemAction>> {
        if state.state != InstanceState::Present {
            return Ok(Vec::new());
        }
        let options = context.options;
        Ok(match state.config_id.kind {
            ItemKind::Container => {
                if state.flags.persistent && !options.remove_persistent {
                    debug!(item = %state.config_id, "skipping persistent container");
                    Vec::new()
                } else {
                    vec![ItemAction::new(state, vec![Operation::Remove])]
                }
            }
            ItemKind::Volume if options.remove_attached => {
                vec![ItemAction::new(state, vec![Operation::Remove])]
            }
            ItemKind::Network => {
                let mut operations = Vec::new();
                if !state.extra.connected_containers.is_empty() {
                    operations.push(Operation::DisconnectAll {
                        containers: state.extra.connected_containers.clone(),
                    });
                }
                operations.push(Operation::Remove);
                vec![ItemAction::new(state, operations)]
            }
            _ => Vec::new(),
        })
    }
}

/// `startup`: create-and-start with recovery for nonrecoverable containers.
/// Recreating a missing attached volume forces the owning container to be
/// recreated as well, so it picks the new volume up.
#[derive(Default)]
pub struct StartupActionGenerator {
    recreated_volumes: Mutex<HashSet<(String, String)>>,
}

impl ActionGenerator for StartupActionGenerator {
    fn actions_for(
        &self,
        state: &ConfigState,
        context: &ActionContext<'_>,
    ) -> EngineResult<Vec<ItemAction>> {
        Ok(match state.config_id.kind {
            ItemKind::Volume => {
                let record_recreated = || {
                    self.recreated_volumes.lock().unwrap().insert((
                        state.config_id.map_name.clone(),
                        state.config_id.config_name.clone(),
                    ));
                };
                match state.state {
                    InstanceState::Absent => {
                        record_recreated();
                        vec![ItemAction::new(
                            state,
                            vec![
                                Operation::Create,
                                Operation::Start,
                                Operation::PrepareVolume,
                            ],
                        )]
                    }
                    InstanceState::Present if state.flags.nonrecoverable => {
                        record_recreated();
                        vec![ItemAction::new(state, {
                            let mut ops = derived::relaunch();
                            ops.push(Operation::PrepareVolume);
                            ops
                        })]
                    }
                    InstanceState::Present if state.flags.initial => vec![ItemAction::new(
                        state,
                        vec![Operation::Start, Operation::PrepareVolume],
                    )],
                    _ => Vec::new(),
                }
            }
            ItemKind::Container => {
                let attached_recreated = self.recreated_volumes.lock().unwrap().contains(&(
                    state.config_id.map_name.clone(),
                    state.config_id.config_name.clone(),
                ));
                match state.state {
                    InstanceState::Absent => vec![ItemAction::with_extra(
                        state,
                        {
                            let mut ops = derived::startup();
                            ops.push(Operation::ConnectAll);
                            ops.push(Operation::ExecAll { initial: true });
                            ops
                        },
                        context.extra_for(state),
                    )],
                    InstanceState::Running if attached_recreated => {
                        debug!(item = %state.config_id, "attached volume was recreated, resetting");
                        vec![ItemAction::with_extra(
                            state,
                            {
                                let mut ops = derived::reset();
                                ops.push(Operation::ConnectAll);
                                ops.push(Operation::ExecAll { initial: true });
                                ops
                            },
                            context.extra_for(state),
                        )]
                    }
                    InstanceState::Present
                        if state.flags.nonrecoverable
                            || (attached_recreated && !state.flags.initial) =>
                    {
                        vec![ItemAction::with_extra(
                            state,
                            {
                                let mut ops = derived::relaunch();
                                ops.push(Operation::ConnectAll);
                                ops.push(Operation::ExecAll { initial: true });
                                ops
                            },
                            context.extra_for(state),
                        )]
                    }
                    InstanceState::Present => vec![ItemAction::new(
                        state,
                        vec![
                            Operation::Start,
                            Operation::ExecAll {
                                initial: state.flags.initial,
                            },
                        ],
                    )],
                    InstanceState::Running => Vec::new(),
                }
            }
            ItemKind::Network if state.state == InstanceState::Absent => {
                vec![ItemAction::new(state, vec![Operation::Create])]
            }
            ItemKind::Image if state.state == InstanceState::Absent => {
                vec![ItemAction::new(state, vec![Operation::Pull])]
            }
            _ => Vec::new(),
        })
    }
}

/// `shutdown`: stop and remove in one reverse traversal. Persistent
/// containers are stopped but kept unless removal is requested.
pub struct ShutdownActionGenerator;

impl ActionGenerator for ShutdownActionGenerator {
    fn actions_for(
        &self,
        state: &ConfigState,
        context: &ActionContext<'_>,
    ) -> EngineResult<Vec<ItemAction>> {
        let options = context.options;
        Ok(match state.config_id.kind {
            ItemKind::Network if state.state == InstanceState::Present => {
                let mut operations = Vec::new();
                if !state.extra.connected_containers.is_empty() {
                    operations.push(Operation::DisconnectAll {
                        containers: state.extra.connected_containers.clone(),
                    });
                }
                operations.push(Operation::Remove);
                vec![ItemAction::new(state, operations)]
            }
            ItemKind::Volume
                if state.state == InstanceState::Present && options.remove_attached =>
            {
                vec![ItemAction::new(state, vec![Operation::Remove])]
            }
            ItemKind::Container => {
                let removable = !state.flags.persistent || options.remove_persistent;
                let running =
                    state.state == InstanceState::Running || state.flags.restarting;
                if removable && running {
                    vec![ItemAction::new(state, derived::shutdown())]
                } else if removable && state.state == InstanceState::Present {
                    vec![ItemAction::new(state, vec![Operation::Remove])]
                } else if !removable && running {
                    debug!(item = %state.config_id, "stopping persistent container without removal");
                    vec![ItemAction::new(state, vec![Operation::SignalStop])]
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        })
    }
}

/// `signal`: kill running containers.
pub struct SignalActionGenerator;

impl ActionGenerator for SignalActionGenerator {
    fn actions_for(
        &self,
        state: &ConfigState,
        _context: &ActionContext<'_>,
    ) -> EngineResult<Vec<ItemAction>> {
        if state.config_id.kind == ItemKind::Container
            && state.state == InstanceState::Running
        {
            return Ok(vec![ItemAction::new(state, vec![Operation::Kill])]);
        }
        Ok(Vec::new())
    }
}

/// `pull`: pulls configured images, all of them or only missing tags.
pub struct PullActionGenerator;

impl ActionGenerator for PullActionGenerator {
    fn actions_for(
        &self,
        state: &ConfigState,
        context: &ActionContext<'_>,
    ) -> EngineResult<Vec<ItemAction>> {
        if state.config_id.kind == ItemKind::Image
            && (context.options.pull_all_images || state.state == InstanceState::Absent)
        {
            return Ok(vec![ItemAction::new(state, vec![Operation::Pull])]);
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_client::ClientRegistry;
    use caravel_core::ConfigId;
    use caravel_map::ContainerMap;
    use crate::options::ActionOptions;
    use crate::policy::Policy;
    use crate::state::StateFlags;

    fn test_policy() -> Policy {
        let map = ContainerMap::from_document(
            None,
            serde_json::json!({"name": "m", "app": {"image": "ubuntu"}}),
        )
        .unwrap();
        Policy::new(vec![map], ClientRegistry::new()).unwrap()
    }

    fn container_state(state: InstanceState, flags: StateFlags) -> ConfigState {
        ConfigState {
            client_name: "__default__".to_string(),
            config_id: ConfigId::container("m", "app", None),
            dependent: false,
            state,
            flags,
            extra: Default::default(),
        }
    }

    #[test]
    fn create_ignores_present_containers() {
        let policy = test_policy();
        let options = ActionOptions::default();
        let context = ActionContext {
            policy: &policy,
            options: &options,
        };
        let absent = container_state(InstanceState::Absent, StateFlags::default());
        let actions = CreateActionGenerator.actions_for(&absent, &context).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].operations[0], Operation::Create);

        let present = container_state(InstanceState::Present, StateFlags::default());
        assert!(CreateActionGenerator
            .actions_for(&present, &context)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn startup_relaunches_nonrecoverable_containers() {
        let policy = test_policy();
        let options = ActionOptions::default();
        let context = ActionContext {
            policy: &policy,
            options: &options,
        };
        let state = container_state(
            InstanceState::Present,
            StateFlags {
                nonrecoverable: true,
                ..Default::default()
            },
        );
        let actions = StartupActionGenerator::default()
            .actions_for(&state, &context)
            .unwrap();
        assert_eq!(
            &actions[0].operations[..3],
            &[Operation::Remove, Operation::Create, Operation::Start]
        );
    }

    #[test]
    fn remove_skips_persistent_by_default() {
        let policy = test_policy();
        let options = ActionOptions::default();
        let context = ActionContext {
            policy: &policy,
            options: &options,
        };
        let state = container_state(
            InstanceState::Present,
            StateFlags {
                persistent: true,
                ..Default::default()
            },
        );
        assert!(RemoveActionGenerator
            .actions_for(&state, &context)
            .unwrap()
            .is_empty());

        let options = ActionOptions {
            remove_persistent: true,
            ..Default::default()
        };
        let context = ActionContext {
            policy: &policy,
            options: &options,
        };
        assert_eq!(
            RemoveActionGenerator
                .actions_for(&state, &context)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn shutdown_stops_but_keeps_persistent_containers() {
        let policy = test_policy();
        let options = ActionOptions::default();
        let context = ActionContext {
            policy: &policy,
            options: &options,
        };
        let state = container_state(
            InstanceState::Running,
            StateFlags {
                persistent: true,
                ..Default::default()
            },
        );
        let actions = ShutdownActionGenerator.actions_for(&state, &context).unwrap();
        assert_eq!(actions[0].operations, vec![Operation::SignalStop]);
    }
}
