//! JSON file storage implementation.
//!
//! Keeps the whole store in a single `everyday.json` document under the data
//! directory. Writes are staged in memory and only reach disk on commit, where
//! the document is written to a temporary file and renamed over the old one so
//! a crash never leaves a half-written store behind.

use std::path::{Path, PathBuf};

use everyday_core::{Routine, RoutineId, ScoreRecord};
use tokio::fs;
use tracing::{debug, info};

use super::snapshot::{Staged, StoreSnapshot};
use super::{Result, RoutineStore, StorageError};

const STORE_FILE: &str = "everyday.json";
const STORE_TMP_FILE: &str = "everyday.json.tmp";

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    state: Staged,
}

impl JsonStorage {
    /// Open storage rooted at `root`, creating the directory if needed and
    /// loading the existing document if there is one.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        let snapshot = read_snapshot(&root.join(STORE_FILE)).await?.unwrap_or_default();
        info!(
            "Opened store at {} ({} routines, {} scores)",
            root.display(),
            snapshot.routines.len(),
            snapshot.scores.len()
        );

        Ok(Self {
            root,
            state: Staged::new(snapshot),
        })
    }

    fn store_path(&self) -> PathBuf {
        self.root.join(STORE_FILE)
    }

    fn tmp_path(&self) -> PathBuf {
        self.root.join(STORE_TMP_FILE)
    }
}

#[async_trait::async_trait]
impl RoutineStore for JsonStorage {
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
        if self.state.view().routine(id).is_none() {
            return Err(StorageError::NotFound(format!("routine {}", id)));
        }
        self.state.stage().remove_routine(id);
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
        let Some(pending) = self.state.pending() else {
            debug!("Nothing to commit: {}", message);
            return Ok(());
        };

        let json = serde_json::to_string_pretty(pending)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, self.store_path()).await?;

        self.state.promote();
        debug!("Committed: {}", message);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.state.discard() {
            debug!("Rolled back pending changes");
        }
        Ok(())
    }
}

async fn read_snapshot(path: &Path) -> Result<Option<StoreSnapshot>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
