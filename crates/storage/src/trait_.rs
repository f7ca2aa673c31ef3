//! Storage trait abstraction.

use async_trait::async_trait;
use everyday_core::{Routine, RoutineId, ScoreRecord};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Marker key holding the last day that was advanced.
pub const LAST_ADVANCED_DAY: &str = "last_advanced_day";

/// Marker key holding the last day a reminder was issued.
pub const LAST_REMINDER_DAY: &str = "last_reminder_day";

/// Storage abstraction for Everyday data.
///
/// Writes are staged and only become durable on [`RoutineStore::commit`];
/// [`RoutineStore::rollback`] discards everything staged since the last
/// commit. Reads observe staged writes.
#[async_trait]
pub trait RoutineStore: Send + Sync {
    // === Routine operations ===

    /// Save a routine (create or full replace by id). Existing routines keep
    /// their position in store order; new ones are appended.
    async fn save_routine(&mut self, routine: &Routine) -> Result<()>;

    /// Save several routines.
    async fn save_routines(&mut self, routines: &[Routine]) -> Result<()> {
        for routine in routines {
            self.save_routine(routine).await?;
        }
        Ok(())
    }

    /// Load a routine by ID.
    async fn load_routine(&self, id: RoutineId) -> Result<Option<Routine>>;

    /// List all routines in store order.
    async fn list_routines(&self) -> Result<Vec<Routine>>;

    /// Delete a routine. Fails with `NotFound` for unknown ids.
    async fn delete_routine(&mut self, id: RoutineId) -> Result<()>;

    /// Replace the whole roster.
    async fn replace_routines(&mut self, routines: &[Routine]) -> Result<()>;

    // === Score operations ===

    /// Save a score record, keyed by its timestamp.
    async fn save_score(&mut self, record: &ScoreRecord) -> Result<()>;

    /// List all score records, oldest first.
    async fn list_scores(&self) -> Result<Vec<ScoreRecord>>;

    // === Marker operations ===

    /// Load an integer marker.
    async fn load_marker(&self, key: &str) -> Result<Option<i64>>;

    /// Save an integer marker.
    async fn save_marker(&mut self, key: &str, value: i64) -> Result<()>;

    // === Transaction support ===

    /// Commit pending changes with a message.
    async fn commit(&mut self, message: &str) -> Result<()>;

    /// Rollback pending changes.
    async fn rollback(&mut self) -> Result<()>;
}
