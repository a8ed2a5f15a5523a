//! Stopping containers with their configured signal and timeout.

use caravel_client::{ClientEntry, ClientError};
use caravel_core::ConfigId;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::EngineResult;
use crate::policy::Policy;
use crate::runner::kwargs;

const DEFAULT_STOP_TIMEOUT: u64 = 10;
/// Extra seconds granted after the daemon's `SIGKILL` so the signal can be
/// processed.
const KILL_GRACE: u64 = 10;

/// Stops a container. `SIGTERM` (or no setting) uses the daemon's stop
/// endpoint; any other signal is sent directly, followed by a wait.
pub async fn signal_stop(
    policy: &Policy,
    entry: &ClientEntry,
    id: &ConfigId,
    container_name: &str,
) -> EngineResult<()> {
    let config = policy.config(&id.map_name, &id.config_name)?;
    let timeout = kwargs::stop_timeout(policy, id, &entry.config)?;
    let effective = timeout.unwrap_or(DEFAULT_STOP_TIMEOUT);
    match config.stop_signal.as_deref() {
        None | Some("SIGTERM") => {
            entry
                .api
                .stop_container(container_name, timeout.map(|t| t as i32))
                .await?;
            // The daemon kills the container after the timeout; wait a
            // little longer so the kill has taken effect.
            match entry
                .api
                .wait_container(
                    container_name,
                    Some(Duration::from_secs(effective + KILL_GRACE)),
                )
                .await
            {
                Ok(_) | Err(ClientError::WaitTimeout(_)) => {}
                Err(other) => {
                    warn!(
                        container = container_name,
                        "wait after stop failed: {}", other
                    );
                }
            }
        }
        Some(signal) => {
            debug!(
                container = container_name,
                signal = signal,
                "sending stop signal and waiting"
            );
            entry.api.kill_container(container_name, signal).await?;
            entry
                .api
                .wait_container(container_name, Some(Duration::from_secs(effective)))
                .await?;
        }
    }
    Ok(())
}
