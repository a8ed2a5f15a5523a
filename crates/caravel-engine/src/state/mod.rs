//! State classification of configuration items against live Docker state.

pub mod base;
pub mod update;
mod volumes;

use caravel_core::ConfigId;
use caravel_map::{ExecCommand, NetworkEndpoint};

/// `StartedAt` value of containers that were created but never started.
pub const INITIAL_START_TIME: &str = "0001-01-01T00:00:00Z";

/// Base state of an item on a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Absent,
    /// Exists but is not running.
    Present,
    Running,
}

/// Detail flags refining the base state. The comparison flags are only
/// populated by the update generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateFlags {
    /// Created but never started.
    pub initial: bool,
    pub restarting: bool,
    /// Exited with a code that restarting cannot fix.
    pub nonrecoverable: bool,
    pub persistent: bool,
    /// Listed in the `force_update` option.
    pub forced_reset: bool,
    pub image_mismatch: bool,
    pub volume_mismatch: bool,
    pub missing_link: bool,
    /// Not connected to a configured network.
    pub network_disconnected: bool,
    /// Connected with settings differing from the configuration.
    pub network_mismatch: bool,
    /// Connected to networks it is not configured for.
    pub network_left: bool,
    /// Configured restart exec commands are not running.
    pub exec_missing: bool,
    /// Resource limits differ from the configured host config.
    pub host_config_mismatch: bool,
    /// Environment, command, entrypoint, ports, or driver differences.
    pub misc_mismatch: bool,
}

impl StateFlags {
    /// Whether the item has to be recreated to match its configuration.
    /// Limit mismatches are excluded; they may be fixable in place.
    pub fn needs_reset(&self) -> bool {
        self.nonrecoverable
            || self.forced_reset
            || self.image_mismatch
            || self.volume_mismatch
            || self.missing_link
            || self.misc_mismatch
    }

    pub fn network_actions_needed(&self) -> bool {
        self.network_disconnected || self.network_mismatch || self.network_left
    }
}

/// Additional findings attached to a state.
#[derive(Debug, Clone, Default)]
pub struct StateExtra {
    pub id: Option<String>,
    pub pid: Option<i64>,
    pub exit_code: Option<i64>,
    /// Containers connected to a network item.
    pub connected_containers: Vec<String>,
    /// Endpoints the container still has to be connected to.
    pub disconnected: Vec<NetworkEndpoint>,
    /// Endpoints connected with differing settings.
    pub reconnect: Vec<NetworkEndpoint>,
    /// Networks the container is connected to but not configured for.
    pub left: Vec<String>,
    /// Restart exec commands that are not running.
    pub missing_exec: Vec<ExecCommand>,
}

/// Classified state of one item on one client.
#[derive(Debug, Clone)]
pub struct ConfigState {
    pub client_name: String,
    pub config_id: ConfigId,
    /// Visited as a dependency of the requested items rather than being
    /// requested itself.
    pub dependent: bool,
    pub state: InstanceState,
    pub flags: StateFlags,
    pub extra: StateExtra,
}

impl ConfigState {
    pub fn absent(client_name: &str, config_id: ConfigId, dependent: bool) -> Self {
        ConfigState {
            client_name: client_name.to_string(),
            config_id,
            dependent,
            state: InstanceState::Absent,
            flags: StateFlags::default(),
            extra: StateExtra::default(),
        }
    }
}

/// Traversal variants of the state generator family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// Only the requested items.
    Single,
    /// Dependencies first, then the requested items.
    Forward,
    /// Dependents first, then the requested items.
    Reverse,
    /// Forward traversal with full configuration comparison.
    Update,
}
