//! Engine error types.

use everyday_core::{RoutineId, RoutineState};
use everyday_storage::StorageError;

/// Result type alias for engine operations.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Errors surfaced by the engine and the routine service.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Operation referenced an unknown routine
    #[error("Routine not found: {0}")]
    NotFound(RoutineId),

    /// Import line with a wrong field count or an unparseable field
    #[error("Malformed record on line {line}: {reason}")]
    MalformedRecord {
        /// 1-based line number
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Routine data violating a model invariant
    #[error("Invalid routine: {0}")]
    InvalidRoutine(String),

    /// State transition not allowed from the routine's current state
    #[error("Cannot {action} routine {id} while it is {from}")]
    InvalidTransition {
        /// Routine the transition was requested for
        id: RoutineId,
        /// State it was in
        from: RoutineState,
        /// Requested action
        action: &'static str,
    },

    /// Advancement asked for more days than a single run may cover
    #[error("Cannot advance {requested} days at once (at most {max})")]
    TooManyDays {
        /// Requested number of days
        requested: u32,
        /// Largest allowed number of days
        max: u32,
    },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
