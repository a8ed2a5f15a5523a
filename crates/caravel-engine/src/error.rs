//! Engine error taxonomy.
//!
//! Load and integrity errors surface before any daemon call; planning errors
//! before execution. Execution failures carry the partial results
//! accumulated up to the failing operation, so callers can see exactly which
//! operations completed.

use caravel_client::ClientError;
use caravel_core::ConfigId;
use caravel_map::MapError;
use serde_json::Value as Json;
use thiserror::Error;

use crate::action::Operation;

/// The result of one successfully executed operation.
#[derive(Debug, Clone)]
pub struct ActionOutput {
    pub client_name: String,
    pub config_id: ConfigId,
    pub operation: Operation,
    pub result: Option<Json>,
}

/// Execution failure, wrapping the client error together with the failed
/// operation and everything that succeeded before it.
#[derive(Error, Debug)]
#[error("error while running {operation:?} on {config_id} (client '{client_name}'): {source}")]
pub struct ActionRunnerError {
    pub client_name: String,
    pub config_id: ConfigId,
    pub operation: Operation,
    /// Outputs of all operations completed before the failure.
    pub results: Vec<ActionOutput>,
    #[source]
    pub source: ClientError,
}

impl ActionRunnerError {
    /// Consumes the error and returns the underlying client error, giving up
    /// the partial results.
    pub fn into_source(self) -> ClientError {
        self.source
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Map(#[from] MapError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Circular dependency: {0}")]
    CircularDependency(String),

    #[error("Container map '{0}' is not registered")]
    UnknownMap(String),

    #[error("Invalid operation {operation:?} for {kind} items")]
    InvalidOperation {
        kind: caravel_core::ItemKind,
        operation: Operation,
    },

    #[error("Script action failed: {0}")]
    ScriptAction(String),

    #[error(transparent)]
    Runner(#[from] Box<ActionRunnerError>),
}

pub type EngineResult<T> = Result<T, EngineError>;
