//! Exec command execution inside running containers.

use caravel_client::ClientEntry;
use caravel_core::{shortcuts, ConfigId};
use caravel_map::{Command, ExecCommand, ExecPolicy};
use serde_json::{json, Value as Json};
use tracing::debug;

use crate::error::EngineResult;
use crate::policy::Policy;

fn argv_of(command: &Command) -> Vec<String> {
    match command {
        Command::Shell(line) => {
            shlex::split(line).unwrap_or_else(|| vec![line.clone()])
        }
        Command::Argv(parts) => parts.clone(),
    }
}

/// Creates and starts exec instances for the given commands. Returns the
/// exec ids, if any were started.
pub async fn exec_commands(
    policy: &Policy,
    entry: &ClientEntry,
    id: &ConfigId,
    container_name: &str,
    commands: &[ExecCommand],
) -> EngineResult<Option<Json>> {
    let config = policy.config(&id.map_name, &id.config_name)?;
    let default_user = config
        .user
        .as_ref()
        .and_then(|u| shortcuts::extract_user(&u.resolve()));
    let mut exec_ids = Vec::new();
    for command in commands {
        let argv = argv_of(&command.cmd.resolve());
        let user = command
            .user
            .as_ref()
            .map(|u| u.resolve())
            .or_else(|| default_user.clone());
        debug!(container = container_name, cmd = %argv.join(" "), ?user, "running exec command");
        let exec_id = entry.api.create_exec(container_name, argv, user).await?;
        entry.api.start_exec(&exec_id).await?;
        exec_ids.push(exec_id);
    }
    if exec_ids.is_empty() {
        Ok(None)
    } else {
        Ok(Some(json!(exec_ids)))
    }
}

/// Runs all configured exec commands of a container configuration. Commands
/// with the `initial` policy only run right after creation.
pub async fn exec_all(
    policy: &Policy,
    entry: &ClientEntry,
    id: &ConfigId,
    container_name: &str,
    initial: bool,
) -> EngineResult<Option<Json>> {
    let config = policy.config(&id.map_name, &id.config_name)?;
    let commands: Vec<ExecCommand> = config
        .exec_commands
        .iter()
        .filter(|cmd| initial || cmd.policy == ExecPolicy::Restart)
        .cloned()
        .collect();
    if commands.is_empty() {
        return Ok(None);
    }
    exec_commands(policy, entry, id, container_name, &commands).await
}
