//! TOML-based engine configuration.
//!
//! Stored as `config.toml` inside the data directory. Every key is optional;
//! missing keys take the defaults the engine was designed around.

use std::path::Path;

use chrono::{FixedOffset, Offset};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::advance::{AdvancementEngine, CHANCE_TO_DOWNPLAY};
use crate::calendar::WeekendRule;
use crate::error::{EngineError, Result};
use crate::rebalance::{Rebalancer, CURRENT_PART, MIN_CURRENT};
use crate::weights::{LackingProgressRule, ScoreCalculator};

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

const MAX_OFFSET_MINUTES: i32 = 24 * 60;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EverydayConfig {
    /// Smallest current working set the rebalancer keeps
    #[serde(default = "default_min_current")]
    pub min_current: usize,

    /// Share of active routines that should be current
    #[serde(default = "default_current_part")]
    pub current_part: f64,

    /// Daily probability of demoting a learned routine
    #[serde(default = "default_chance_to_downplay")]
    pub chance_to_downplay: f64,

    /// How lacking progress is counted when weighting routines
    #[serde(default)]
    pub lacking_progress: LackingProgressRule,

    /// Which day decides weekend decay suspension
    #[serde(default)]
    pub weekend_rule: WeekendRule,

    /// Offset from UTC used to turn instants into calendar days
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Seed for the demotion random source; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_min_current() -> usize {
    MIN_CURRENT
}
fn default_current_part() -> f64 {
    CURRENT_PART
}
fn default_chance_to_downplay() -> f64 {
    CHANCE_TO_DOWNPLAY
}

impl Default for EverydayConfig {
    fn default() -> Self {
        Self {
            min_current: default_min_current(),
            current_part: default_current_part(),
            chance_to_downplay: default_chance_to_downplay(),
            lacking_progress: LackingProgressRule::default(),
            weekend_rule: WeekendRule::default(),
            utc_offset_minutes: 0,
            seed: None,
        }
    }
}

impl EverydayConfig {
    /// Load from `dir/config.toml`, writing the defaults there if the file
    /// does not exist yet.
    pub async fn load_or_init(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let cfg: EverydayConfig = toml::from_str(&content)
                    .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save(dir).await?;
                info!("Wrote default configuration to {}", path.display());
                Ok(cfg)
            }
            Err(e) => Err(EngineError::Config(format!("{}: {}", path.display(), e))),
        }
    }

    /// Persist to `dir/config.toml`.
    pub async fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.current_part) {
            return Err(invalid("current_part", "must be within 0..=1"));
        }
        if !(0.0..=1.0).contains(&self.chance_to_downplay) {
            return Err(invalid("chance_to_downplay", "must be within 0..=1"));
        }
        if self.utc_offset_minutes.abs() >= MAX_OFFSET_MINUTES {
            return Err(invalid("utc_offset_minutes", "must be less than a day"));
        }
        Ok(())
    }

    /// Offset used for calendar days.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| chrono::Utc.fix())
    }

    /// Score calculator for this configuration.
    pub fn calculator(&self) -> ScoreCalculator {
        ScoreCalculator::new(self.lacking_progress)
    }

    /// Rebalancer for this configuration.
    pub fn rebalancer(&self) -> Rebalancer {
        Rebalancer::new(self.min_current, self.current_part)
    }

    /// Advancement engine for this configuration.
    pub fn advancement_engine(&self) -> AdvancementEngine {
        let engine = AdvancementEngine::new(self.calculator())
            .with_chance_to_downplay(self.chance_to_downplay);
        match self.seed {
            Some(seed) => engine.with_seed(seed),
            None => engine,
        }
    }
}

fn invalid(key: &str, message: &str) -> EngineError {
    EngineError::Config(format!("invalid value for '{}': {}", key, message))
}
