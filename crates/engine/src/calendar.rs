//! Clocks, local days and weekend handling.

use std::sync::{Mutex, PoisonError};

use chrono::{Datelike, Duration, FixedOffset, NaiveDate, Weekday};
use everyday_core::Time;
use serde::{Deserialize, Serialize};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Time;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Time {
        chrono::Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<Time>,
}

impl FixedClock {
    /// Create a clock stopped at `now`.
    pub fn new(now: Time) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: Time) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Time {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Which day decides whether decay is suspended for the weekend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeekendRule {
    /// The real current day at the time advancement runs
    #[default]
    WallClock,
    /// The day being advanced
    AdvancedDay,
}

impl WeekendRule {
    /// Whether advancing the day at `advanced` counts as a weekend.
    pub fn is_weekend(&self, now: Time, advanced: Time, offset: FixedOffset) -> bool {
        let instant = match self {
            WeekendRule::WallClock => now,
            WeekendRule::AdvancedDay => advanced,
        };
        is_weekend(local_date(instant, offset))
    }
}

/// Calendar date of `instant` at `offset`.
pub fn local_date(instant: Time, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// Saturday or Sunday.
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Day marker for `date`: days since the common era.
pub fn day_number(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce())
}

/// Days elapsed between the `last` advanced day and `today`.
pub fn missed_days(last: i64, today: i64) -> u32 {
    u32::try_from(today - last).unwrap_or(0)
}

/// Timestamps for backfilling `missed` days ending at `now`: oldest first,
/// one day apart, the last one day before `now`.
pub fn backfill_timestamps(now: Time, missed: u32) -> Vec<Time> {
    let start = now - Duration::days(i64::from(missed));
    (0..missed)
        .map(|i| start + Duration::days(i64::from(i)))
        .collect()
}
