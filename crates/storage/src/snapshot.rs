//! In-memory snapshot of everything a store holds, plus write staging.

use std::collections::BTreeMap;

use everyday_core::{Routine, RoutineId, ScoreRecord};
use serde::{Deserialize, Serialize};

/// Everything a store persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Routines in store order
    #[serde(default)]
    pub routines: Vec<Routine>,

    /// Score records, oldest first
    #[serde(default)]
    pub scores: Vec<ScoreRecord>,

    /// Integer markers by key
    #[serde(default)]
    pub markers: BTreeMap<String, i64>,
}

impl StoreSnapshot {
    /// Find a routine by id.
    pub fn routine(&self, id: RoutineId) -> Option<&Routine> {
        self.routines.iter().find(|r| r.id == id)
    }

    /// Insert or replace a routine by id.
    pub fn upsert_routine(&mut self, routine: &Routine) {
        match self.routines.iter_mut().find(|r| r.id == routine.id) {
            Some(existing) => *existing = routine.clone(),
            None => self.routines.push(routine.clone()),
        }
    }

    /// Remove a routine, returning whether it existed.
    pub fn remove_routine(&mut self, id: RoutineId) -> bool {
        let before = self.routines.len();
        self.routines.retain(|r| r.id != id);
        self.routines.len() != before
    }

    /// Insert or replace a score by timestamp, keeping chronological order.
    pub fn upsert_score(&mut self, record: &ScoreRecord) {
        match self.scores.binary_search_by(|s| s.timestamp.cmp(&record.timestamp)) {
            Ok(index) => self.scores[index] = *record,
            Err(index) => self.scores.insert(index, *record),
        }
    }
}

/// A committed snapshot with an optional pending copy that receives writes.
#[derive(Debug, Clone, Default)]
pub(crate) struct Staged {
    committed: StoreSnapshot,
    pending: Option<StoreSnapshot>,
}

impl Staged {
    pub(crate) fn new(committed: StoreSnapshot) -> Self {
        Self {
            committed,
            pending: None,
        }
    }

    /// The state readers should see.
    pub(crate) fn view(&self) -> &StoreSnapshot {
        self.pending.as_ref().unwrap_or(&self.committed)
    }

    /// The pending copy, created from the committed state on first write.
    pub(crate) fn stage(&mut self) -> &mut StoreSnapshot {
        let committed = &self.committed;
        self.pending.get_or_insert_with(|| committed.clone())
    }

    pub(crate) fn pending(&self) -> Option<&StoreSnapshot> {
        self.pending.as_ref()
    }

    /// Promote the pending copy. Returns false when nothing was staged.
    pub(crate) fn promote(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                self.committed = pending;
                true
            }
            None => false,
        }
    }

    pub(crate) fn discard(&mut self) -> bool {
        self.pending.take().is_some()
    }
}
