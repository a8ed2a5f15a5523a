//! Action generation for one-shot script runs.

use caravel_core::ItemKind;

use crate::action::simple::StartupActionGenerator;
use crate::action::{ActionContext, ActionGenerator, ItemAction, Operation, ScriptSpec};
use crate::error::{EngineError, EngineResult};
use crate::state::{ConfigState, InstanceState};

/// Runs a script in a container created only for this purpose. Dependencies
/// are brought up as for `startup`; the target container itself must not
/// exist beforehand unless `remove_existing_before` is set.
pub struct ScriptActionGenerator {
    pub spec: ScriptSpec,
    startup: StartupActionGenerator,
}

impl ScriptActionGenerator {
    pub fn new(spec: ScriptSpec) -> Self {
        ScriptActionGenerator {
            spec,
            startup: StartupActionGenerator::default(),
        }
    }
}

impl ActionGenerator for ScriptActionGenerator {
    fn actions_for(
        &self,
        state: &ConfigState,
        context: &ActionContext<'_>,
    ) -> EngineResult<Vec<ItemAction>> {
        if state.dependent || state.config_id.kind != ItemKind::Container {
            return self.startup.actions_for(state, context);
        }

        let mut actions = Vec::new();
        if state.state != InstanceState::Absent {
            if !context.options.remove_existing_before {
                return Err(EngineError::ScriptAction(format!(
                    "container {} existed on client '{}' prior to running the script",
                    state.config_id, state.client_name
                )));
            }
            let operations = if state.state == InstanceState::Running || state.flags.restarting
            {
                vec![Operation::SignalStop, Operation::Remove]
            } else {
                vec![Operation::Remove]
            };
            actions.push(ItemAction::new(state, operations));
        }
        actions.push(ItemAction::with_extra(
            state,
            vec![Operation::RunScript(self.spec.clone())],
            context.extra_for(state),
        ));
        Ok(actions)
    }
}
