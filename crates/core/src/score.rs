//! Score model - one record per advanced day.

use chrono::SubsecRound;
use serde::{Deserialize, Serialize};
use crate::Time;

/// Upper bound of a daily score.
pub const SCORE_MAX: f32 = 10.0;

/// Scores above this are at least "normal".
pub const NORMAL_SCORE: f32 = 3.9;

/// Scores above this are "great".
pub const GREAT_SCORE: f32 = 7.9;

/// The score achieved on one advanced day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Instant the record represents
    pub timestamp: Time,

    /// Achieved score in `[0, SCORE_MAX]`
    pub score: f32,
}

impl ScoreRecord {
    /// Create a new score record. The timestamp is kept to millisecond
    /// precision.
    pub fn new(timestamp: Time, score: f32) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(3),
            score,
        }
    }

    /// Tier of the achieved score.
    pub fn tier(&self) -> ScoreTier {
        ScoreTier::from_score(self.score)
    }
}

/// Coarse classification of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreTier {
    /// At most `NORMAL_SCORE`
    Low,
    /// Above `NORMAL_SCORE`, at most `GREAT_SCORE`
    Normal,
    /// Above `GREAT_SCORE`
    Great,
}

impl ScoreTier {
    /// Classify a score.
    pub fn from_score(score: f32) -> Self {
        if score > GREAT_SCORE {
            ScoreTier::Great
        } else if score > NORMAL_SCORE {
            ScoreTier::Normal
        } else {
            ScoreTier::Low
        }
    }
}

impl std::fmt::Display for ScoreTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreTier::Low => write!(f, "low"),
            ScoreTier::Normal => write!(f, "normal"),
            ScoreTier::Great => write!(f, "great"),
        }
    }
}
