//! Backlog → current rebalancing.

use everyday_core::{Routine, RoutineId, RoutineState};
use tracing::debug;

/// Minimum size of the current working set.
pub const MIN_CURRENT: usize = 3;

/// Share of active routines that should be current.
pub const CURRENT_PART: f64 = 0.4;

/// Keeps a bounded working set of current routines.
#[derive(Debug, Clone, Copy)]
pub struct Rebalancer {
    min_current: usize,
    current_part: f64,
}

impl Default for Rebalancer {
    fn default() -> Self {
        Self {
            min_current: MIN_CURRENT,
            current_part: CURRENT_PART,
        }
    }
}

impl Rebalancer {
    /// Create a rebalancer with explicit limits.
    pub fn new(min_current: usize, current_part: f64) -> Self {
        Self {
            min_current,
            current_part,
        }
    }

    /// Target number of current routines for this roster.
    pub fn quota(&self, routines: &[Routine]) -> usize {
        let active = routines.iter().filter(|r| r.state.is_active()).count();
        let share = (active as f64 * self.current_part).floor() as usize;
        self.min_current.max(share)
    }

    /// Promote backlog routines, lowest progress first, until the quota is
    /// met or the backlog runs out. Ties keep store order. Returns the
    /// promoted ids.
    pub fn rebalance(&self, routines: &mut [Routine]) -> Vec<RoutineId> {
        let quota = self.quota(routines);
        let current = routines.iter().filter(|r| r.is_current()).count();
        if current >= quota {
            return Vec::new();
        }

        let mut backlog: Vec<usize> = routines
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state == RoutineState::Backlog)
            .map(|(index, _)| index)
            .collect();
        backlog.sort_by_key(|&index| routines[index].progress);

        let promoted: Vec<RoutineId> = backlog
            .into_iter()
            .take(quota - current)
            .map(|index| {
                let routine = &mut routines[index];
                routine.state = RoutineState::Current;
                routine.id
            })
            .collect();

        debug!(
            "Rebalanced: quota {}, had {}, promoted {}",
            quota,
            current,
            promoted.len()
        );
        promoted
    }
}
