//! Options recognized by the top-level actions.

use caravel_map::{CmdCheck, OptionsMap};
use std::collections::HashSet;

/// Option catalogue for a planning cycle. Each action reads the subset it
/// recognizes; everything else is ignored.
#[derive(Debug, Clone)]
pub struct ActionOptions {
    /// Remove the one-shot script container afterwards (script).
    pub remove_existing_after: bool,
    /// Remove a pre-existing container before a script run instead of
    /// failing (script).
    pub remove_existing_before: bool,
    /// Also remove persistent containers (remove/shutdown).
    pub remove_persistent: bool,
    /// Also remove attached volumes (remove/shutdown).
    pub remove_attached: bool,
    /// Pull every configured image, not only missing tags (pull).
    pub pull_all_images: bool,
    /// Refresh images before comparing ids (update).
    pub pull_before_update: bool,
    /// Allow pulls from insecure registries (pull, update).
    pub pull_insecure_registry: bool,
    /// Prepare attached volume permissions through a transient container on
    /// the client; disable to skip preparation entirely.
    pub prepare_local: bool,
    /// Exit codes that always trigger a recreate (update/startup).
    pub nonrecoverable_exit_codes: HashSet<i64>,
    /// Configuration names (or `map.config` references) forced to recreate.
    pub force_update: HashSet<String>,
    /// Keep running with mismatched limits instead of resetting when the
    /// daemon cannot update them in place (update).
    pub skip_limit_reset: bool,
    /// Also recreate persistent containers on image change (update).
    pub update_persistent: bool,
    /// How running exec commands are matched (update).
    pub check_exec_commands: CmdCheck,
    /// Re-run configured exec commands after a restart (restart).
    pub restart_exec_commands: bool,
    /// Extra create/start fields for the selected containers, by Docker API
    /// field name. Highest merge precedence.
    pub kwargs: OptionsMap,
    /// Seconds to wait for script containers; falls back to the client's
    /// `wait_timeout` (script).
    pub wait_timeout: Option<u64>,
    /// Mount point of the script directory inside one-shot containers.
    pub container_script_dir: String,
}

impl Default for ActionOptions {
    fn default() -> Self {
        ActionOptions {
            remove_existing_after: true,
            remove_existing_before: false,
            remove_persistent: false,
            remove_attached: false,
            pull_all_images: true,
            pull_before_update: false,
            pull_insecure_registry: false,
            prepare_local: true,
            nonrecoverable_exit_codes: HashSet::from([-127, -1]),
            force_update: HashSet::new(),
            skip_limit_reset: false,
            update_persistent: false,
            check_exec_commands: CmdCheck::Full,
            restart_exec_commands: false,
            kwargs: OptionsMap::new(),
            wait_timeout: None,
            container_script_dir: "/tmp/script_run".to_string(),
        }
    }
}

impl ActionOptions {
    /// Whether a configuration is listed in `force_update`.
    pub fn is_forced(&self, map_name: &str, config_name: &str) -> bool {
        self.force_update.contains(config_name)
            || self
                .force_update
                .contains(&format!("{}.{}", map_name, config_name))
    }
}
