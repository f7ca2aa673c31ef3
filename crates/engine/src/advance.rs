//! The advancement engine - applies one elapsed day to the routine roster.

use everyday_core::{Routine, RoutineId, RoutineState, ScoreRecord, Time, PROGRESS_FULL};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::weights::ScoreCalculator;

/// Default probability that a learned routine is demoted back to the backlog
/// on each advanced day.
pub const CHANCE_TO_DOWNPLAY: f64 = 0.2;

/// What happened while advancing a single day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayOutcome {
    /// Score achieved on the advanced day
    pub score: ScoreRecord,
    /// Routines that reached full progress and became learned
    pub mastered: Vec<RoutineId>,
    /// Unfinished routines that lost a point of progress
    pub decayed: Vec<RoutineId>,
    /// Learned routines sent back to the backlog
    pub demoted: Vec<RoutineId>,
    /// Backlog routines promoted by the rebalancing that follows advancement
    pub promoted: Vec<RoutineId>,
}

/// Applies the daily state transition.
///
/// ```text
/// weigh current set → record score → progress/decay → demote learned
/// ```
#[derive(Debug)]
pub struct AdvancementEngine {
    calculator: ScoreCalculator,
    chance_to_downplay: f64,
    rng: StdRng,
}

impl AdvancementEngine {
    /// Create an engine with an entropy-seeded random source.
    pub fn new(calculator: ScoreCalculator) -> Self {
        Self {
            calculator,
            chance_to_downplay: CHANCE_TO_DOWNPLAY,
            rng: StdRng::from_entropy(),
        }
    }

    /// Set the demotion probability.
    pub fn with_chance_to_downplay(mut self, chance: f64) -> Self {
        self.chance_to_downplay = chance;
        self
    }

    /// Reseed the random source for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Advance `routines` by one day stamped `timestamp`.
    ///
    /// The score reflects the current set as it was before any mutation.
    /// Routine order is preserved. `weekend` suspends decay of unfinished
    /// routines.
    pub fn advance(&mut self, routines: &mut [Routine], timestamp: Time, weekend: bool) -> DayOutcome {
        self.calculator.recompute_weights(routines);
        let score = ScoreRecord::new(timestamp, self.calculator.daily_score(routines));

        let mut mastered = Vec::new();
        let mut decayed = Vec::new();
        let mut demoted = Vec::new();

        for routine in routines.iter_mut().filter(|r| r.is_current()) {
            if routine.finished_today {
                routine.finished_today = false;
                routine.progress = (routine.progress + 1).min(PROGRESS_FULL);
                if routine.is_learned() {
                    debug!("Routine {} learned", routine.id);
                    routine.state = RoutineState::Learned;
                    mastered.push(routine.id);
                }
            } else if routine.progress > 0 && !weekend {
                routine.progress -= 1;
                decayed.push(routine.id);
            }
        }

        // Routines learned a moment ago are eligible too.
        for routine in routines.iter_mut().filter(|r| r.state == RoutineState::Learned) {
            if self.rng.gen::<f64>() < self.chance_to_downplay {
                debug!("Routine {} demoted to backlog", routine.id);
                routine.progress = routine.progress.saturating_sub(1);
                routine.state = RoutineState::Backlog;
                demoted.push(routine.id);
            }
        }

        self.calculator.recompute_weights(routines);

        DayOutcome {
            score,
            mastered,
            decayed,
            demoted,
            promoted: Vec::new(),
        }
    }
}
