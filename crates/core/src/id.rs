//! Unique identifiers for Everyday entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a Routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoutineId(Ulid);

impl RoutineId {
    /// Generate a new RoutineId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RoutineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoutineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RoutineId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
