//! Routine model - a habit the user is trying to learn.

use serde::{Deserialize, Serialize};
use crate::id::RoutineId;

/// Progress at which a routine counts as mastered.
pub const PROGRESS_FULL: u8 = 10;

/// A routine is a trackable habit with mastery progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    /// Unique identifier
    pub id: RoutineId,

    /// User-facing name
    pub label: String,

    /// Cumulative mastery in `[0, PROGRESS_FULL]`
    pub progress: u8,

    /// Lifecycle state
    pub state: RoutineState,

    /// Whether the routine was done today (only ever true while current)
    pub finished_today: bool,

    /// Share of today's score this routine is worth. Derived from the whole
    /// current set and never persisted.
    #[serde(skip)]
    pub current_score: f32,
}

impl Routine {
    /// Create a new routine in the backlog with no progress.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: RoutineId::new(),
            label: label.into(),
            progress: 0,
            state: RoutineState::Backlog,
            finished_today: false,
            current_score: 0.0,
        }
    }

    /// Set the initial state.
    pub fn with_state(mut self, state: RoutineState) -> Self {
        self.state = state;
        self
    }

    /// Set the initial progress, clamped to `PROGRESS_FULL`.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(PROGRESS_FULL);
        self
    }

    /// Whether progress has reached `PROGRESS_FULL`.
    pub fn is_learned(&self) -> bool {
        self.progress == PROGRESS_FULL
    }

    /// Whether the routine is in the current working set.
    pub fn is_current(&self) -> bool {
        self.state == RoutineState::Current
    }

    /// Progress including today's completion, as shown on a progress bar.
    pub fn full_progress(&self) -> u8 {
        self.progress + u8::from(self.finished_today)
    }
}

/// Lifecycle state of a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutineState {
    /// Queued, not tracked for the daily score
    Backlog,
    /// Actively worked on
    Current,
    /// Reached full mastery
    Learned,
    /// Put aside by the user; ignored by advancement and rebalancing
    Paused,
}

impl RoutineState {
    /// All states in listing order.
    pub const ALL: [RoutineState; 4] = [
        RoutineState::Current,
        RoutineState::Backlog,
        RoutineState::Learned,
        RoutineState::Paused,
    ];

    /// Stable upper-case name used by the exchange format.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutineState::Backlog => "BACKLOG",
            RoutineState::Current => "CURRENT",
            RoutineState::Learned => "LEARNED",
            RoutineState::Paused => "PAUSED",
        }
    }

    /// Position of this state in listing order.
    pub fn rank(&self) -> usize {
        match self {
            RoutineState::Current => 0,
            RoutineState::Backlog => 1,
            RoutineState::Learned => 2,
            RoutineState::Paused => 3,
        }
    }

    /// Whether routines in this state count towards the rebalancing quota.
    pub fn is_active(&self) -> bool {
        !matches!(self, RoutineState::Paused)
    }
}

impl std::fmt::Display for RoutineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a state name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown routine state `{0}`")]
pub struct ParseStateError(pub String);

impl std::str::FromStr for RoutineState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BACKLOG" => Ok(RoutineState::Backlog),
            "CURRENT" => Ok(RoutineState::Current),
            "LEARNED" => Ok(RoutineState::Learned),
            "PAUSED" => Ok(RoutineState::Paused),
            other => Err(ParseStateError(other.to_string())),
        }
    }
}

/// Routines split by state, each keeping store order.
#[derive(Debug, Clone, Default)]
pub struct SortedRoutines {
    /// Backlog routines
    pub backlog: Vec<Routine>,
    /// Current routines
    pub current: Vec<Routine>,
    /// Learned routines
    pub learned: Vec<Routine>,
    /// Paused routines
    pub paused: Vec<Routine>,
}

impl SortedRoutines {
    /// Partition routines by state.
    pub fn from_routines(routines: impl IntoIterator<Item = Routine>) -> Self {
        let mut sorted = Self::default();
        for routine in routines {
            match routine.state {
                RoutineState::Backlog => sorted.backlog.push(routine),
                RoutineState::Current => sorted.current.push(routine),
                RoutineState::Learned => sorted.learned.push(routine),
                RoutineState::Paused => sorted.paused.push(routine),
            }
        }
        sorted
    }
}
