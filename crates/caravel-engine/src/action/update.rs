//! Action generation for the `update` intent.

use caravel_core::ItemKind;
use tracing::debug;

use crate::action::{derived, ActionContext, ActionGenerator, ItemAction, Operation};
use crate::error::EngineResult;
use crate::state::{ConfigState, InstanceState};

/// Converts update-state findings into the smallest set of operations that
/// brings an item in line: recreate on hard mismatches, in-place host-config
/// updates for fixable limit differences, network reconnects, and re-running
/// missing exec commands.
pub struct UpdateActionGenerator;

impl ActionGenerator for UpdateActionGenerator {
    fn actions_for(
        &self,
        state: &ConfigState,
        context: &ActionContext<'_>,
    ) -> EngineResult<Vec<ItemAction>> {
        let options = context.options;
        match state.config_id.kind {
            ItemKind::Network => {
                if state.state == InstanceState::Absent {
                    debug!(item = %state.config_id, "network not found, creating");
                    return Ok(vec![ItemAction::new(state, vec![Operation::Create])]);
                }
                if state.flags.needs_reset() {
                    debug!(item = %state.config_id, "network outdated, resetting");
                    let mut operations = Vec::new();
                    if !state.extra.connected_containers.is_empty() {
                        operations.push(Operation::DisconnectAll {
                            containers: state.extra.connected_containers.clone(),
                        });
                    }
                    operations.push(Operation::Remove);
                    operations.push(Operation::Create);
                    return Ok(vec![ItemAction::new(state, operations)]);
                }
                Ok(Vec::new())
            }
            ItemKind::Image => {
                if state.state == InstanceState::Absent {
                    return Ok(vec![ItemAction::new(state, vec![Operation::Pull])]);
                }
                Ok(Vec::new())
            }
            ItemKind::Volume => {
                let operations = if state.state == InstanceState::Absent {
                    debug!(item = %state.config_id, "attached item not found, creating");
                    vec![Operation::Create, Operation::Start]
                } else if state.flags.needs_reset() {
                    debug!(item = %state.config_id, "attached item outdated, recreating");
                    if state.state == InstanceState::Running {
                        derived::reset()
                    } else {
                        derived::relaunch()
                    }
                } else if state.flags.initial {
                    vec![Operation::Start]
                } else {
                    return Ok(Vec::new());
                };
                let mut operations = operations;
                operations.push(Operation::PrepareVolume);
                Ok(vec![ItemAction::new(state, operations)])
            }
            ItemKind::Container => {
                if state.state == InstanceState::Absent {
                    debug!(item = %state.config_id, "container not found, creating and starting");
                    let mut ops = derived::startup();
                    ops.push(Operation::ConnectAll);
                    ops.push(Operation::ExecAll { initial: true });
                    return Ok(vec![ItemAction::with_extra(
                        state,
                        ops,
                        context.extra_for(state),
                    )]);
                }

                // Limit differences alone can be fixed in place when the
                // daemon supports it; force_update still wins.
                let features = context.features(&state.client_name)?;
                let fixable_limits = state.flags.host_config_mismatch
                    && features.update_host_config
                    && !options.skip_limit_reset;
                let reset_needed = state.flags.needs_reset()
                    || (state.flags.host_config_mismatch && !fixable_limits);

                if reset_needed {
                    debug!(item = %state.config_id, "container outdated, recreating");
                    let mut ops = if state.state == InstanceState::Running
                        || state.flags.restarting
                    {
                        derived::reset()
                    } else {
                        derived::relaunch()
                    };
                    ops.push(Operation::ConnectAll);
                    ops.push(Operation::ExecAll { initial: true });
                    return Ok(vec![ItemAction::with_extra(
                        state,
                        ops,
                        context.extra_for(state),
                    )]);
                }

                let mut operations = Vec::new();
                if fixable_limits {
                    debug!(item = %state.config_id, "updating host config in place");
                    operations.push(Operation::UpdateHostConfig);
                }
                if state.flags.network_disconnected {
                    operations.push(Operation::Connect {
                        endpoints: state.extra.disconnected.clone(),
                    });
                }
                if state.flags.network_mismatch {
                    operations.push(Operation::Disconnect {
                        networks: state
                            .extra
                            .reconnect
                            .iter()
                            .map(|ep| ep.network_name.clone())
                            .collect(),
                    });
                    operations.push(Operation::Connect {
                        endpoints: state.extra.reconnect.clone(),
                    });
                }
                if state.flags.network_left {
                    operations.push(Operation::Disconnect {
                        networks: state.extra.left.clone(),
                    });
                }
                let start_needed = state.state != InstanceState::Running
                    && (state.flags.initial || !state.flags.persistent);
                if start_needed {
                    debug!(item = %state.config_id, "container stopped, starting");
                    operations.push(Operation::Start);
                    operations.push(Operation::ExecAll {
                        initial: state.flags.initial,
                    });
                } else if state.flags.exec_missing && !state.extra.missing_exec.is_empty() {
                    debug!(
                        item = %state.config_id,
                        missing = state.extra.missing_exec.len(),
                        "re-running missing exec commands"
                    );
                    operations.push(Operation::ExecCommands {
                        commands: state.extra.missing_exec.clone(),
                    });
                }
                if operations.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![ItemAction::new(state, operations)])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_client::{ClientConfiguration, ClientFeatures, ClientRegistry};
    use caravel_core::ConfigId;
    use caravel_map::ContainerMap;
    use crate::options::ActionOptions;
    use crate::policy::Policy;
    use crate::state::StateFlags;
    use std::sync::Arc;

    fn policy_with_features(features: ClientFeatures) -> Policy {
        let map = ContainerMap::from_document(
            None,
            serde_json::json!({"name": "m", "app": {"image": "ubuntu"}}),
        )
        .unwrap();
        let mut registry = ClientRegistry::new();
        registry.insert(
            "__default__",
            ClientConfiguration {
                features: Some(features),
                ..Default::default()
            },
            Arc::new(crate::testing::FakeDocker::new()),
        );
        Policy::new(vec![map], registry).unwrap()
    }

    fn state_with_flags(state: InstanceState, flags: StateFlags) -> ConfigState {
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
    fn in_sync_container_yields_no_operations() {
        let policy = policy_with_features(ClientFeatures::default());
        let options = ActionOptions::default();
        let context = ActionContext {
            policy: &policy,
            options: &options,
        };
        let state = state_with_flags(InstanceState::Running, StateFlags::default());
        assert!(UpdateActionGenerator
            .actions_for(&state, &context)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn image_mismatch_resets_running_container() {
        let policy = policy_with_features(ClientFeatures::default());
        let options = ActionOptions::default();
        let context = ActionContext {
            policy: &policy,
            options: &options,
        };
        let state = state_with_flags(
            InstanceState::Running,
            StateFlags {
                image_mismatch: true,
                ..Default::default()
            },
        );
        let actions = UpdateActionGenerator.actions_for(&state, &context).unwrap();
        assert_eq!(
            &actions[0].operations[..4],
            &[
                Operation::SignalStop,
                Operation::Remove,
                Operation::Create,
                Operation::Start
            ]
        );
    }

    #[test]
    fn limit_mismatch_updates_in_place_when_supported() {
        let policy = policy_with_features(ClientFeatures::default());
        let options = ActionOptions::default();
        let context = ActionContext {
            policy: &policy,
            options: &options,
        };
        let state = state_with_flags(
            InstanceState::Running,
            StateFlags {
                host_config_mismatch: true,
                ..Default::default()
            },
        );
        let actions = UpdateActionGenerator.actions_for(&state, &context).unwrap();
        assert_eq!(actions[0].operations, vec![Operation::UpdateHostConfig]);
    }

    #[test]
    fn limit_mismatch_resets_without_update_support() {
        let features = ClientFeatures {
            update_host_config: false,
            ..Default::default()
        };
        let policy = policy_with_features(features);
        let options = ActionOptions::default();
        let context = ActionContext {
            policy: &policy,
            options: &options,
        };
        let state = state_with_flags(
            InstanceState::Running,
            StateFlags {
                host_config_mismatch: true,
                ..Default::default()
            },
        );
        let actions = UpdateActionGenerator.actions_for(&state, &context).unwrap();
        assert_eq!(actions[0].operations[0], Operation::SignalStop);
    }

    #[test]
    fn forced_update_wins_over_fixable_limits() {
        let policy = policy_with_features(ClientFeatures::default());
        let options = ActionOptions {
            force_update: std::collections::HashSet::from(["app".to_string()]),
            ..Default::default()
        };
        let context = ActionContext {
            policy: &policy,
            options: &options,
        };
        let state = state_with_flags(
            InstanceState::Running,
            StateFlags {
                host_config_mismatch: true,
                forced_reset: true,
                ..Default::default()
            },
        );
        let actions = UpdateActionGenerator.actions_for(&state, &context).unwrap();
        assert_eq!(actions[0].operations[0], Operation::SignalStop);
    }
}
