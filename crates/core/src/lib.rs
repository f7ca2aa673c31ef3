//! Everyday core data models.
//!
//! This crate defines the routine and score structures shared by the
//! storage backends and the advancement engine.

#![warn(missing_docs)]

// Core identities
mod id;

// Routines and scores
mod routine;
mod score;

// Re-exports
pub use id::*;

pub use routine::{ParseStateError, Routine, RoutineState, SortedRoutines, PROGRESS_FULL};
pub use score::{ScoreRecord, ScoreTier, GREAT_SCORE, NORMAL_SCORE, SCORE_MAX};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
