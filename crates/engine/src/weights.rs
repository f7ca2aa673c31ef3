//! Score weighting for the current working set.
//!
//! Each current routine is worth a share of `SCORE_MAX` proportional to how
//! much progress it still lacks, so the least-mastered habits pay the most.

use everyday_core::{Routine, PROGRESS_FULL, SCORE_MAX};
use serde::{Deserialize, Serialize};

/// How much progress a routine is considered to lack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LackingProgressRule {
    /// `PROGRESS_FULL - progress`; a mastered routine carries no weight
    #[default]
    Remaining,
    /// `PROGRESS_FULL - progress + 1`; a mastered routine keeps one point
    Residual,
}

impl LackingProgressRule {
    /// Lacking progress of a single routine.
    pub fn lacking(&self, routine: &Routine) -> u32 {
        let remaining = u32::from(PROGRESS_FULL.saturating_sub(routine.progress));
        match self {
            LackingProgressRule::Remaining => remaining,
            LackingProgressRule::Residual => remaining + 1,
        }
    }
}

/// Computes per-routine weights and the daily score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreCalculator {
    rule: LackingProgressRule,
}

impl ScoreCalculator {
    /// Create a calculator using `rule`.
    pub fn new(rule: LackingProgressRule) -> Self {
        Self { rule }
    }

    /// Recompute `current_score` for every routine.
    ///
    /// Only current routines receive weight; everything else is zeroed. When
    /// the current set lacks no progress at all, every weight is zero.
    pub fn recompute_weights(&self, routines: &mut [Routine]) {
        let total: u32 = routines
            .iter()
            .filter(|r| r.is_current())
            .map(|r| self.rule.lacking(r))
            .sum();

        let score_for_point = if total == 0 {
            0.0
        } else {
            SCORE_MAX / total as f32
        };

        for routine in routines.iter_mut() {
            routine.current_score = if routine.is_current() {
                self.rule.lacking(routine) as f32 * score_for_point
            } else {
                0.0
            };
        }
    }

    /// Sum of the weights of current routines finished today.
    ///
    /// Expects weights to be up to date.
    pub fn daily_score(&self, routines: &[Routine]) -> f32 {
        routines
            .iter()
            .filter(|r| r.is_current() && r.finished_today)
            .map(|r| r.current_score)
            .sum::<f32>()
            .clamp(0.0, SCORE_MAX)
    }

    /// Recompute weights and return today's score so far.
    pub fn score(&self, routines: &mut [Routine]) -> f32 {
        self.recompute_weights(routines);
        self.daily_score(routines)
    }
}
