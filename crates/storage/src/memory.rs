//! In-memory storage backend, used by tests and ephemeral sessions.

use everyday_core::{Routine, RoutineId, ScoreRecord};
use tracing::debug;

use super::snapshot::{Staged, StoreSnapshot};
use super::{Result, RoutineStore, StorageError};

/// Storage backend that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Staged,
    commits: usize,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `snapshot` as committed state.
    pub fn with_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Staged::new(snapshot),
            commits: 0,
        }
    }

    /// Number of commits that actually applied changes.
    pub fn commits(&self) -> usize {
        self.commits
    }
}

#[async_trait::async_trait]
impl RoutineStore for MemoryStorage {
    async fn save_routine(&mut self, routine: &Routine) -> Result<()> {
        self.state.stage().upsert_routine(routine);
        Ok(())
    }

    async fn load_routine(&self, id: RoutineId) -> Result<Option<Routine>> {
        Ok(self.state.view().routine(id).cloned())
    }

    async fn list_routines(&self) -> Result<Vec<Routine>> {
        Ok(self.state.view().routines.clone())
    }

    async fn delete_routine(&mut self, id: RoutineId) -> Result<()> {
        if !self.state.stage().remove_routine(id) {
            return Err(StorageError::NotFound(format!("routine {}", id)));
        }
        Ok(())
    }

    async fn replace_routines(&mut self, routines: &[Routine]) -> Result<()> {
        self.state.stage().routines = routines.to_vec();
        Ok(())
    }

    async fn save_score(&mut self, record: &ScoreRecord) -> Result<()> {
        self.state.stage().upsert_score(record);
        Ok(())
    }

    async fn list_scores(&self) -> Result<Vec<ScoreRecord>> {
        Ok(self.state.view().scores.clone())
    }

    async fn load_marker(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.state.view().markers.get(key).copied())
    }

    async fn save_marker(&mut self, key: &str, value: i64) -> Result<()> {
        self.state.stage().markers.insert(key.to_string(), value);
        Ok(())
    }

    async fn commit(&mut self, message: &str) -> Result<()> {
        if self.state.promote() {
            self.commits += 1;
            debug!("Committed: {}", message);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.state.discard();
        Ok(())
    }
}
