//! Everyday engine - scoring, daily advancement, rebalancing and the
//! routine service built on top of them.

#![warn(missing_docs)]

pub mod error;
pub mod weights;
pub mod calendar;
pub mod advance;
pub mod rebalance;
pub mod exchange;
pub mod config;
pub mod service;

pub use error::{EngineError, Result};
pub use weights::{LackingProgressRule, ScoreCalculator};
pub use calendar::{Clock, FixedClock, SystemClock, WeekendRule};
pub use advance::{AdvancementEngine, DayOutcome, CHANCE_TO_DOWNPLAY};
pub use rebalance::{Rebalancer, CURRENT_PART, MIN_CURRENT};
pub use config::{EverydayConfig, CONFIG_FILE};
pub use service::{RoutineService, MAX_ADVANCE_DAYS};
