//! Routine service - the operations the UI layer calls.
//!
//! Every mutation runs under one write lock as a read-modify-write against
//! the store, followed by a commit; on any error the staged changes are
//! rolled back, so an operation either fully applies or leaves the store as
//! it was. Queries share a read lock and only ever see committed state.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, FixedOffset, NaiveDate};
use everyday_core::{Routine, RoutineId, RoutineState, ScoreRecord, Time, PROGRESS_FULL};
use everyday_storage::{RoutineStore, LAST_ADVANCED_DAY, LAST_REMINDER_DAY};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::advance::{AdvancementEngine, DayOutcome};
use crate::calendar::{self, Clock, WeekendRule};
use crate::config::EverydayConfig;
use crate::error::{EngineError, Result};
use crate::exchange;
use crate::rebalance::Rebalancer;
use crate::weights::ScoreCalculator;

/// Most days a single advancement or catch-up run applies.
pub const MAX_ADVANCE_DAYS: u32 = 3660;

struct Inner<S> {
    store: S,
    engine: AdvancementEngine,
}

/// Serialized access to a routine store.
pub struct RoutineService<S: RoutineStore> {
    inner: Arc<RwLock<Inner<S>>>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    calculator: ScoreCalculator,
    rebalancer: Rebalancer,
    weekend_rule: WeekendRule,
}

impl<S: RoutineStore> Clone for RoutineService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
            offset: self.offset,
            calculator: self.calculator,
            rebalancer: self.rebalancer,
            weekend_rule: self.weekend_rule,
        }
    }
}

impl<S: RoutineStore> RoutineService<S> {
    /// Create a service over `store`.
    pub fn new(store: S, clock: Arc<dyn Clock>, config: &EverydayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Inner {
                store,
                engine: config.advancement_engine(),
            })),
            clock,
            offset: config.offset(),
            calculator: config.calculator(),
            rebalancer: config.rebalancer(),
            weekend_rule: config.weekend_rule,
        })
    }

    // === Queries ===

    /// All routines: current, backlog, learned, then paused, each by
    /// ascending progress, with weights filled in.
    pub async fn list_routines(&self) -> Result<Vec<Routine>> {
        let inner = self.inner.read().await;
        let mut routines = inner.store.list_routines().await?;
        self.calculator.recompute_weights(&mut routines);
        routines.sort_by_key(|r| (r.state.rank(), r.progress));
        Ok(routines)
    }

    /// A single routine, with its weight filled in.
    pub async fn get_routine(&self, id: RoutineId) -> Result<Routine> {
        let mut routines = self.list_routines().await?;
        let index = routines
            .iter()
            .position(|r| r.id == id)
            .ok_or(EngineError::NotFound(id))?;
        Ok(routines.swap_remove(index))
    }

    /// Score earned so far today.
    pub async fn current_score(&self) -> Result<f32> {
        let inner = self.inner.read().await;
        let mut routines = inner.store.list_routines().await?;
        Ok(self.calculator.score(&mut routines))
    }

    /// All score records, oldest first.
    pub async fn score_history(&self) -> Result<Vec<ScoreRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.store.list_scores().await?)
    }

    /// Score per local calendar date. When a date has several records the
    /// latest one wins.
    pub async fn daily_scores(&self) -> Result<BTreeMap<NaiveDate, f32>> {
        let scores = self.score_history().await?;
        Ok(scores
            .into_iter()
            .map(|s| (calendar::local_date(s.timestamp, self.offset), s.score))
            .collect())
    }

    // === Roster mutations ===

    /// Add a routine to the backlog, then rebalance. Returns the routine as
    /// stored, which may already have been promoted.
    pub async fn add_routine(&self, label: &str) -> Result<Routine> {
        exchange::validate_label(label)?;
        let mut inner = self.inner.write().await;
        let result = self.add_in(&mut inner.store, label).await;
        finish(&mut inner.store, result, "Add routine").await
    }

    async fn add_in(&self, store: &mut S, label: &str) -> Result<Routine> {
        let routine = Routine::new(label);
        store.save_routine(&routine).await?;
        self.rebalance_in(store).await?;
        info!("Added routine {} ({})", routine.id, label);
        self.weighed(store, routine.id).await
    }

    /// Replace a routine by id.
    pub async fn update_routine(&self, routine: &Routine) -> Result<()> {
        validate_routine(routine)?;
        let mut inner = self.inner.write().await;
        let result = self.update_in(&mut inner.store, routine).await;
        finish(&mut inner.store, result, "Update routine").await
    }

    async fn update_in(&self, store: &mut S, routine: &Routine) -> Result<()> {
        load(store, routine.id).await?;
        store.save_routine(routine).await?;
        debug!("Updated routine {}", routine.id);
        Ok(())
    }

    /// Change a routine's label.
    pub async fn rename_routine(&self, id: RoutineId, label: &str) -> Result<Routine> {
        exchange::validate_label(label)?;
        self.modify(id, "Rename routine", |routine| {
            routine.label = label.to_string();
            Ok(())
        })
        .await
    }

    /// Mark a current routine as done today.
    pub async fn complete_routine(&self, id: RoutineId) -> Result<Routine> {
        self.modify(id, "Complete routine", |routine| {
            require_state(routine, RoutineState::Current, "complete")?;
            routine.finished_today = true;
            Ok(())
        })
        .await
    }

    /// Take back today's completion of a current routine.
    pub async fn undo_routine(&self, id: RoutineId) -> Result<Routine> {
        self.modify(id, "Undo routine", |routine| {
            require_state(routine, RoutineState::Current, "undo")?;
            routine.finished_today = false;
            Ok(())
        })
        .await
    }

    /// Delete a routine, then rebalance.
    pub async fn delete_routine(&self, id: RoutineId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let result = self.delete_in(&mut inner.store, id).await;
        finish(&mut inner.store, result, "Delete routine").await
    }

    async fn delete_in(&self, store: &mut S, id: RoutineId) -> Result<()> {
        load(store, id).await?;
        store.delete_routine(id).await?;
        self.rebalance_in(store).await?;
        info!("Deleted routine {}", id);
        Ok(())
    }

    /// Pause a routine, then rebalance.
    pub async fn pause_routine(&self, id: RoutineId) -> Result<Routine> {
        self.transition(id, "Pause routine", |routine| {
            if routine.state == RoutineState::Paused {
                return Err(invalid_transition(routine, "pause"));
            }
            routine.state = RoutineState::Paused;
            routine.finished_today = false;
            Ok(())
        })
        .await
    }

    /// Resume a paused routine, then rebalance. Mastered routines go back to
    /// learned, everything else to the backlog.
    pub async fn continue_routine(&self, id: RoutineId) -> Result<Routine> {
        self.transition(id, "Continue routine", |routine| {
            require_state(routine, RoutineState::Paused, "continue")?;
            routine.state = if routine.is_learned() {
                RoutineState::Learned
            } else {
                RoutineState::Backlog
            };
            routine.finished_today = false;
            Ok(())
        })
        .await
    }

    /// Apply `change` to one routine without rebalancing.
    async fn modify<F>(&self, id: RoutineId, message: &str, change: F) -> Result<Routine>
    where
        F: FnOnce(&mut Routine) -> Result<()> + Send,
    {
        let mut inner = self.inner.write().await;
        let result = async {
            let mut routine = load(&inner.store, id).await?;
            change(&mut routine)?;
            inner.store.save_routine(&routine).await?;
            debug!("{}: {}", message, id);
            self.weighed(&inner.store, id).await
        }
        .await;
        finish(&mut inner.store, result, message).await
    }

    /// Apply `change` to one routine, then rebalance.
    async fn transition<F>(&self, id: RoutineId, message: &str, change: F) -> Result<Routine>
    where
        F: FnOnce(&mut Routine) -> Result<()> + Send,
    {
        let mut inner = self.inner.write().await;
        let result = async {
            let store = &mut inner.store;
            let mut routine = load(store, id).await?;
            change(&mut routine)?;
            store.save_routine(&routine).await?;
            self.rebalance_in(store).await?;
            info!("{}: {} is now {}", message, id, routine.state);
            self.weighed(store, id).await
        }
        .await;
        finish(&mut inner.store, result, message).await
    }

    /// Staged routine `id` with its weight filled in.
    async fn weighed(&self, store: &S, id: RoutineId) -> Result<Routine> {
        let mut routines = store.list_routines().await?;
        self.calculator.recompute_weights(&mut routines);
        routines
            .into_iter()
            .find(|r| r.id == id)
            .ok_or(EngineError::NotFound(id))
    }

    async fn rebalance_in(&self, store: &mut S) -> Result<Vec<RoutineId>> {
        let mut routines = store.list_routines().await?;
        let promoted = self.rebalancer.rebalance(&mut routines);
        if !promoted.is_empty() {
            let promoted_set: HashSet<RoutineId> = promoted.iter().copied().collect();
            let changed: Vec<Routine> = routines
                .into_iter()
                .filter(|r| promoted_set.contains(&r.id))
                .collect();
            store.save_routines(&changed).await?;
            info!("Promoted {} routine(s) from backlog", promoted.len());
        }
        Ok(promoted)
    }

    // === Advancement ===

    /// Advance `missed_days` days, the first stamped `start` and each next
    /// one a day later. Every day is committed on its own; if a day fails,
    /// earlier days stay applied and the error is returned.
    pub async fn advance(&self, missed_days: u32, start: Time) -> Result<Vec<DayOutcome>> {
        if missed_days > MAX_ADVANCE_DAYS {
            return Err(EngineError::TooManyDays {
                requested: missed_days,
                max: MAX_ADVANCE_DAYS,
            });
        }
        let mut inner = self.inner.write().await;
        let mut outcomes = Vec::new();
        for day in 0..missed_days {
            let timestamp = start + Duration::days(i64::from(day));
            let result = self.advance_day(&mut inner, timestamp, None).await;
            outcomes.push(finish(&mut inner.store, result, "Advance day").await?);
        }
        Ok(outcomes)
    }

    /// Advance every day elapsed since the last advanced day.
    ///
    /// The first call only records today. Each committed day also moves the
    /// marker, so an interrupted catch-up resumes where it stopped.
    pub async fn catch_up(&self) -> Result<Vec<DayOutcome>> {
        let now = self.clock.now();
        let today = calendar::day_number(calendar::local_date(now, self.offset));

        let mut inner = self.inner.write().await;
        let mut last = match inner.store.load_marker(LAST_ADVANCED_DAY).await? {
            Some(last) => last,
            None => {
                let result = inner
                    .store
                    .save_marker(LAST_ADVANCED_DAY, today)
                    .await
                    .map_err(EngineError::from);
                finish(&mut inner.store, result, "Start day tracking").await?;
                info!("Started day tracking at day {}", today);
                return Ok(Vec::new());
            }
        };

        if last > today {
            warn!("Last advanced day {} is ahead of today {}; clock moved back?", last, today);
        }
        let mut missed = calendar::missed_days(last, today);
        if missed == 0 {
            return Ok(Vec::new());
        }
        if missed > MAX_ADVANCE_DAYS {
            warn!(
                "Skipping {} missed day(s) beyond the last {}",
                missed - MAX_ADVANCE_DAYS,
                MAX_ADVANCE_DAYS
            );
            last += i64::from(missed - MAX_ADVANCE_DAYS);
            missed = MAX_ADVANCE_DAYS;
        }

        info!("Catching up {} missed day(s)", missed);
        let mut outcomes = Vec::new();
        for (offset, timestamp) in (1..).zip(calendar::backfill_timestamps(now, missed)) {
            let result = self.advance_day(&mut inner, timestamp, Some(last + offset)).await;
            outcomes.push(finish(&mut inner.store, result, "Catch up day").await?);
        }
        Ok(outcomes)
    }

    async fn advance_day(
        &self,
        inner: &mut Inner<S>,
        timestamp: Time,
        marker: Option<i64>,
    ) -> Result<DayOutcome> {
        let weekend = self
            .weekend_rule
            .is_weekend(self.clock.now(), timestamp, self.offset);

        let mut routines = inner.store.list_routines().await?;
        let mut outcome = inner.engine.advance(&mut routines, timestamp, weekend);
        outcome.promoted = self.rebalancer.rebalance(&mut routines);

        inner.store.save_routines(&routines).await?;
        inner.store.save_score(&outcome.score).await?;
        if let Some(day) = marker {
            inner.store.save_marker(LAST_ADVANCED_DAY, day).await?;
        }

        info!(
            "Advanced {}: score {:.1}, {} learned, {} decayed, {} demoted, {} promoted{}",
            timestamp,
            outcome.score.score,
            outcome.mastered.len(),
            outcome.decayed.len(),
            outcome.demoted.len(),
            outcome.promoted.len(),
            if weekend { " (weekend)" } else { "" }
        );
        Ok(outcome)
    }

    // === Reminders ===

    /// Whether today's reminder should go out: at most once per day, and
    /// only while some current routine is unfinished. Best-effort: store
    /// failures are logged and reported as "not due".
    pub async fn reminder_due(&self) -> bool {
        match self.check_reminder().await {
            Ok(due) => due,
            Err(e) => {
                warn!("Skipping reminder check: {}", e);
                false
            }
        }
    }

    async fn check_reminder(&self) -> Result<bool> {
        let today = calendar::day_number(calendar::local_date(self.clock.now(), self.offset));
        let mut inner = self.inner.write().await;
        if inner.store.load_marker(LAST_REMINDER_DAY).await? == Some(today) {
            return Ok(false);
        }

        let result = async {
            inner.store.save_marker(LAST_REMINDER_DAY, today).await?;
            let routines = inner.store.list_routines().await?;
            Ok::<_, EngineError>(routines.iter().any(|r| r.is_current() && !r.finished_today))
        }
        .await;
        finish(&mut inner.store, result, "Record reminder day").await
    }

    // === Export / import ===

    /// Routines in the exchange format, in store order.
    pub async fn export_routines(&self) -> Result<String> {
        let inner = self.inner.read().await;
        Ok(exchange::encode_routines(&inner.store.list_routines().await?))
    }

    /// Score records in the exchange format, oldest first.
    pub async fn export_scores(&self) -> Result<String> {
        Ok(exchange::encode_scores(&self.score_history().await?))
    }

    /// Replace the whole roster with the routines in `text`, then rebalance.
    /// Nothing changes if any line is malformed. Returns the number of
    /// routines imported.
    pub async fn import_routines(&self, text: &str) -> Result<usize> {
        let routines = exchange::decode_routines(text)?;
        let mut inner = self.inner.write().await;
        let result = self.replace_roster_in(&mut inner.store, &routines).await;
        let count = finish(&mut inner.store, result, "Import routines").await?;
        info!("Imported {} routine(s)", count);
        Ok(count)
    }

    /// Add the score records in `text` whose timestamps are not stored yet.
    /// Nothing changes if any line is malformed. Returns the number added.
    pub async fn import_scores(&self, text: &str) -> Result<usize> {
        let records = exchange::decode_scores(text)?;
        let mut inner = self.inner.write().await;
        let result = add_missing_scores_in(&mut inner.store, &records).await;
        let added = finish(&mut inner.store, result, "Import scores").await?;
        info!("Imported {} score record(s)", added);
        Ok(added)
    }

    /// Import a roster and, optionally, score records as one transaction.
    /// Both payloads are decoded before anything is touched, so a malformed
    /// line in either leaves the store unchanged. Returns the number of
    /// routines imported and of score records added.
    pub async fn import_all(&self, routines: &str, scores: Option<&str>) -> Result<(usize, usize)> {
        let routines = exchange::decode_routines(routines)?;
        let records = match scores {
            Some(text) => exchange::decode_scores(text)?,
            None => Vec::new(),
        };

        let mut inner = self.inner.write().await;
        let result = async {
            let count = self.replace_roster_in(&mut inner.store, &routines).await?;
            let added = add_missing_scores_in(&mut inner.store, &records).await?;
            Ok::<_, EngineError>((count, added))
        }
        .await;
        let (count, added) = finish(&mut inner.store, result, "Import").await?;
        info!("Imported {} routine(s) and {} score record(s)", count, added);
        Ok((count, added))
    }

    async fn replace_roster_in(&self, store: &mut S, routines: &[Routine]) -> Result<usize> {
        store.replace_routines(routines).await?;
        self.rebalance_in(store).await?;
        Ok(routines.len())
    }
}

/// Stage the records whose timestamps are not stored yet. Duplicates within
/// `records` count once.
async fn add_missing_scores_in<S: RoutineStore>(store: &mut S, records: &[ScoreRecord]) -> Result<usize> {
    let mut known: HashSet<Time> = store
        .list_scores()
        .await?
        .into_iter()
        .map(|s| s.timestamp)
        .collect();
    let mut added = 0;
    for record in records {
        if known.insert(record.timestamp) {
            store.save_score(record).await?;
            added += 1;
        }
    }
    Ok(added)
}

/// Commit on success, roll back on failure.
async fn finish<S: RoutineStore, T>(store: &mut S, result: Result<T>, message: &str) -> Result<T> {
    match result {
        Ok(value) => match store.commit(message).await {
            Ok(()) => Ok(value),
            Err(e) => {
                rollback(store).await;
                Err(e.into())
            }
        },
        Err(e) => {
            rollback(store).await;
            Err(e)
        }
    }
}

async fn rollback<S: RoutineStore>(store: &mut S) {
    if let Err(e) = store.rollback().await {
        warn!("Rollback failed: {}", e);
    }
}

async fn load<S: RoutineStore>(store: &S, id: RoutineId) -> Result<Routine> {
    store
        .load_routine(id)
        .await?
        .ok_or(EngineError::NotFound(id))
}

fn validate_routine(routine: &Routine) -> Result<()> {
    exchange::validate_label(&routine.label)?;
    if routine.progress > PROGRESS_FULL {
        return Err(EngineError::InvalidRoutine(format!(
            "progress {} exceeds {}",
            routine.progress, PROGRESS_FULL
        )));
    }
    if routine.finished_today && !routine.is_current() {
        return Err(EngineError::InvalidRoutine(format!(
            "{} routine cannot be finished today",
            routine.state
        )));
    }
    Ok(())
}

fn require_state(routine: &Routine, state: RoutineState, action: &'static str) -> Result<()> {
    if routine.state == state {
        Ok(())
    } else {
        Err(invalid_transition(routine, action))
    }
}

fn invalid_transition(routine: &Routine, action: &'static str) -> EngineError {
    EngineError::InvalidTransition {
        id: routine.id,
        from: routine.state,
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::FixedClock;
    use chrono::TimeZone;
    use everyday_storage::{MemoryStorage, StorageError};

    /// Wednesday, noon UTC.
    fn wednesday() -> Time {
        chrono::Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
    }

    fn config() -> EverydayConfig {
        EverydayConfig {
            chance_to_downplay: 0.0,
            seed: Some(7),
            ..Default::default()
        }
    }

    fn service_with<S: RoutineStore>(store: S) -> (RoutineService<S>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(wednesday()));
        let service = RoutineService::new(store, clock.clone(), &config()).unwrap();
        (service, clock)
    }

    fn service() -> (RoutineService<MemoryStorage>, Arc<FixedClock>) {
        service_with(MemoryStorage::new())
    }

    fn service_at(config: EverydayConfig, now: Time) -> (RoutineService<MemoryStorage>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(now));
        let service = RoutineService::new(MemoryStorage::new(), clock.clone(), &config).unwrap();
        (service, clock)
    }

    async fn labels<S: RoutineStore>(service: &RoutineService<S>) -> Vec<String> {
        service
            .list_routines()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.label)
            .collect()
    }

    async fn add_all<S: RoutineStore>(service: &RoutineService<S>, labels: &[&str]) -> Vec<Routine> {
        let mut added = Vec::new();
        for label in labels {
            added.push(service.add_routine(label).await.unwrap());
        }
        added
    }

    /// Memory store whose commits start failing once its budget is spent.
    struct FlakyStore {
        inner: MemoryStorage,
        commits_left: usize,
    }

    #[async_trait::async_trait]
    impl RoutineStore for FlakyStore {
        async fn save_routine(&mut self, routine: &Routine) -> everyday_storage::Result<()> {
            self.inner.save_routine(routine).await
        }
        async fn load_routine(&self, id: RoutineId) -> everyday_storage::Result<Option<Routine>> {
            self.inner.load_routine(id).await
        }
        async fn list_routines(&self) -> everyday_storage::Result<Vec<Routine>> {
            self.inner.list_routines().await
        }
        async fn delete_routine(&mut self, id: RoutineId) -> everyday_storage::Result<()> {
            self.inner.delete_routine(id).await
        }
        async fn replace_routines(&mut self, routines: &[Routine]) -> everyday_storage::Result<()> {
            self.inner.replace_routines(routines).await
        }
        async fn save_score(&mut self, record: &ScoreRecord) -> everyday_storage::Result<()> {
            self.inner.save_score(record).await
        }
        async fn list_scores(&self) -> everyday_storage::Result<Vec<ScoreRecord>> {
            self.inner.list_scores().await
        }
        async fn load_marker(&self, key: &str) -> everyday_storage::Result<Option<i64>> {
            self.inner.load_marker(key).await
        }
        async fn save_marker(&mut self, key: &str, value: i64) -> everyday_storage::Result<()> {
            self.inner.save_marker(key, value).await
        }
        async fn commit(&mut self, message: &str) -> everyday_storage::Result<()> {
            if self.commits_left == 0 {
                return Err(StorageError::Other("disk full".to_string()));
            }
            self.commits_left -= 1;
            self.inner.commit(message).await
        }
        async fn rollback(&mut self) -> everyday_storage::Result<()> {
            self.inner.rollback().await
        }
    }

    #[tokio::test]
    async fn test_add_fills_current_set_first() {
        let (service, _) = service();
        let added = add_all(&service, &["Run", "Read", "Stretch", "Piano"]).await;

        assert!(added[..3].iter().all(|r| r.is_current()));
        assert_eq!(added[3].state, RoutineState::Backlog);

        let listed = service.list_routines().await.unwrap();
        assert_eq!(listed.len(), 4);
        assert_eq!(listed[3].state, RoutineState::Backlog);
        assert!(listed[..3].iter().all(|r| (r.current_score - 10.0 / 3.0).abs() < 1e-4));
    }

    #[tokio::test]
    async fn test_invalid_label_is_rejected() {
        let (service, _) = service();
        assert!(matches!(
            service.add_routine("a;b").await,
            Err(EngineError::InvalidRoutine(_))
        ));
        assert!(service.list_routines().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_then_advance() {
        let (service, clock) = service();
        let added = add_all(&service, &["Run", "Read", "Stretch"]).await;

        service.complete_routine(added[0].id).await.unwrap();
        let expected = 10.0 / 3.0;
        assert!((service.current_score().await.unwrap() - expected).abs() < 1e-4);

        let outcomes = service.advance(1, clock.now()).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!((outcomes[0].score.score - expected).abs() < 1e-4);

        let run = service.get_routine(added[0].id).await.unwrap();
        assert_eq!(run.progress, 1);
        assert!(!run.finished_today);
        assert_eq!(service.score_history().await.unwrap().len(), 1);

        // Unfinished on a weekday: decays back.
        let outcomes = service.advance(1, clock.now() + Duration::days(1)).await.unwrap();
        assert_eq!(outcomes[0].decayed, vec![added[0].id]);
        assert_eq!(service.get_routine(added[0].id).await.unwrap().progress, 0);
        assert_eq!(outcomes[0].score.score, 0.0);
    }

    #[tokio::test]
    async fn test_mastered_routine_frees_a_slot() {
        let (service, clock) = service();
        let imported = service
            .import_routines("Stretch;9;CURRENT;true\nRun;0;CURRENT;false\nRead;0;CURRENT;false\nPiano;2;BACKLOG;false\n")
            .await
            .unwrap();
        assert_eq!(imported, 4);

        let outcome = service.advance(1, clock.now()).await.unwrap().remove(0);
        assert_eq!(outcome.mastered.len(), 1);
        assert_eq!(outcome.promoted.len(), 1);

        let listed = service.list_routines().await.unwrap();
        let stretch = listed.iter().find(|r| r.label == "Stretch").unwrap();
        let piano = listed.iter().find(|r| r.label == "Piano").unwrap();
        assert_eq!(stretch.state, RoutineState::Learned);
        assert_eq!(stretch.progress, PROGRESS_FULL);
        assert_eq!(piano.state, RoutineState::Current);
    }

    #[tokio::test]
    async fn test_unknown_routine_is_not_found() {
        let (service, _) = service();
        let id = RoutineId::new();
        assert!(matches!(service.complete_routine(id).await, Err(EngineError::NotFound(x)) if x == id));
        assert!(matches!(service.delete_routine(id).await, Err(EngineError::NotFound(_))));
        assert!(matches!(service.get_routine(id).await, Err(EngineError::NotFound(_))));
        assert!(matches!(service.pause_routine(id).await, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_only_current_routines_can_be_completed() {
        let (service, _) = service();
        let added = add_all(&service, &["Run", "Read", "Stretch", "Piano"]).await;
        assert!(matches!(
            service.complete_routine(added[3].id).await,
            Err(EngineError::InvalidTransition { action: "complete", .. })
        ));

        let done = service.complete_routine(added[0].id).await.unwrap();
        assert!(done.finished_today);
        let undone = service.undo_routine(added[0].id).await.unwrap();
        assert!(!undone.finished_today);
    }

    #[tokio::test]
    async fn test_pause_and_continue() {
        let (service, _) = service();
        let added = add_all(&service, &["Run", "Read", "Stretch", "Piano"]).await;
        service.complete_routine(added[0].id).await.unwrap();

        let paused = service.pause_routine(added[0].id).await.unwrap();
        assert_eq!(paused.state, RoutineState::Paused);
        assert!(!paused.finished_today);
        // Piano takes the freed slot.
        assert!(service.get_routine(added[3].id).await.unwrap().is_current());
        assert!(matches!(
            service.pause_routine(added[0].id).await,
            Err(EngineError::InvalidTransition { action: "pause", .. })
        ));

        let resumed = service.continue_routine(added[0].id).await.unwrap();
        assert_eq!(resumed.state, RoutineState::Backlog);
        assert!(matches!(
            service.continue_routine(added[1].id).await,
            Err(EngineError::InvalidTransition { action: "continue", .. })
        ));
    }

    #[tokio::test]
    async fn test_continue_mastered_routine_returns_to_learned() {
        let (service, _) = service();
        service.import_routines("Meditate;10;PAUSED;false\n").await.unwrap();
        let id = service.list_routines().await.unwrap()[0].id;

        let resumed = service.continue_routine(id).await.unwrap();
        assert_eq!(resumed.state, RoutineState::Learned);
    }

    #[tokio::test]
    async fn test_delete_rebalances() {
        let (service, _) = service();
        let added = add_all(&service, &["Run", "Read", "Stretch", "Piano"]).await;
        service.delete_routine(added[1].id).await.unwrap();

        let listed = service.list_routines().await.unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.iter().all(|r| r.is_current()));
    }

    #[tokio::test]
    async fn test_update_and_rename() {
        let (service, _) = service();
        let mut routine = service.add_routine("Run").await.unwrap();

        routine.progress = PROGRESS_FULL + 1;
        assert!(matches!(
            service.update_routine(&routine).await,
            Err(EngineError::InvalidRoutine(_))
        ));

        routine.progress = 6;
        service.update_routine(&routine).await.unwrap();
        assert_eq!(service.get_routine(routine.id).await.unwrap().progress, 6);

        let renamed = service.rename_routine(routine.id, "Run 5k").await.unwrap();
        assert_eq!(renamed.label, "Run 5k");

        let stranger = Routine::new("Ghost");
        assert!(matches!(
            service.update_routine(&stranger).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_order_groups_by_state_then_progress() {
        let (service, _) = service();
        service
            .import_routines(
                "Piano;4;PAUSED;false\nMeditate;10;LEARNED;false\nRun;5;CURRENT;false\nRead;1;CURRENT;false\n\
                 Stretch;2;CURRENT;false\nSwim;3;BACKLOG;false\n",
            )
            .await
            .unwrap();

        let labels: Vec<String> = service
            .list_routines()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.label)
            .collect();
        assert_eq!(labels, ["Read", "Stretch", "Run", "Swim", "Meditate", "Piano"]);
    }

    #[tokio::test]
    async fn test_malformed_import_changes_nothing() {
        let (service, _) = service();
        add_all(&service, &["Run", "Read"]).await;
        let before = service.export_routines().await.unwrap();

        let err = service
            .import_routines("Swim;1;BACKLOG;false\nbad line\n")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedRecord { line: 2, .. }));
        assert_eq!(service.export_routines().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_import_replaces_roster_and_rebalances() {
        let (service, _) = service();
        add_all(&service, &["Run", "Read"]).await;

        service
            .import_routines("Swim;1;BACKLOG;false\nYoga;0;BACKLOG;false\n")
            .await
            .unwrap();
        let listed = service.list_routines().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|r| r.is_current()));
        assert!(listed.iter().all(|r| r.label != "Run"));
    }

    #[tokio::test]
    async fn test_score_import_adds_only_missing_records() {
        let (service, clock) = service();
        add_all(&service, &["Run"]).await;
        service.advance(2, clock.now()).await.unwrap();

        let exported = service.export_scores().await.unwrap();
        let extra = format!("{}{};5\n", exported, wednesday().timestamp_millis() - 86_400_000);

        assert_eq!(service.import_scores(&extra).await.unwrap(), 1);
        assert_eq!(service.score_history().await.unwrap().len(), 3);
        assert_eq!(service.import_scores(&extra).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_daily_scores_by_local_date() {
        let (service, clock) = service();
        add_all(&service, &["Run"]).await;
        service.advance(3, clock.now()).await.unwrap();

        let daily = service.daily_scores().await.unwrap();
        let dates: Vec<NaiveDate> = daily.keys().copied().collect();
        assert_eq!(
            dates,
            [14, 15, 16]
                .iter()
                .map(|d| NaiveDate::from_ymd_opt(2026, 10, *d).unwrap())
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_failed_day_keeps_earlier_days() {
        let store = FlakyStore {
            inner: MemoryStorage::new(),
            commits_left: 4,
        };
        let (service, clock) = service_with(store);
        add_all(&service, &["Run", "Read", "Stretch"]).await;

        // One commit left: the first day lands, the second does not.
        let err = service.advance(3, clock.now()).await.unwrap_err();
        assert!(matches!(err, EngineError::Storage(StorageError::Other(_))));
        assert_eq!(service.score_history().await.unwrap().len(), 1);
        assert_eq!(service.list_routines().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_catch_up_replays_missed_days() {
        let (service, clock) = service();
        add_all(&service, &["Run", "Read", "Stretch"]).await;

        assert!(service.catch_up().await.unwrap().is_empty());
        assert!(service.catch_up().await.unwrap().is_empty());

        clock.advance(Duration::days(3));
        let outcomes = service.catch_up().await.unwrap();
        assert_eq!(outcomes.len(), 3);
        let stamps: Vec<Time> = outcomes.iter().map(|o| o.score.timestamp).collect();
        assert_eq!(
            stamps,
            vec![wednesday(), wednesday() + Duration::days(1), wednesday() + Duration::days(2)]
        );

        assert!(service.catch_up().await.unwrap().is_empty());
        assert_eq!(service.score_history().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_catch_up_ignores_clock_moving_back() {
        let (service, clock) = service();
        service.catch_up().await.unwrap();
        clock.set(wednesday() - Duration::days(2));
        assert!(service.catch_up().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reminder_once_per_day() {
        let (service, clock) = service();
        assert!(!service.reminder_due().await);

        clock.advance(Duration::days(1));
        let added = add_all(&service, &["Run"]).await;
        assert!(service.reminder_due().await);
        assert!(!service.reminder_due().await);

        clock.advance(Duration::days(1));
        service.complete_routine(added[0].id).await.unwrap();
        assert!(!service.reminder_due().await);
    }

    #[tokio::test]
    async fn test_concurrent_mutations_are_serialized() {
        let (service, _) = service();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move { service.add_routine(&format!("Habit {}", i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let listed = service.list_routines().await.unwrap();
        assert_eq!(listed.len(), 16);
        // floor(16 * 0.4) = 6
        assert_eq!(listed.iter().filter(|r| r.is_current()).count(), 6);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EverydayConfig {
            current_part: 2.0,
            ..Default::default()
        };
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(wednesday()));
        assert!(RoutineService::new(MemoryStorage::new(), clock, &config).is_err());
    }

    #[tokio::test]
    async fn test_import_all_with_bad_scores_changes_nothing() {
        let (service, _) = service();
        add_all(&service, &["Old"]).await;

        let err = service
            .import_all("New;1;BACKLOG;false\n", Some("garbage\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedRecord { line: 1, .. }));
        assert_eq!(labels(&service).await, ["Old"]);
        assert!(service.score_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_all_applies_both_payloads() {
        let (service, _) = service();
        add_all(&service, &["Old"]).await;

        let imported = service
            .import_all("New;1;BACKLOG;false\n", Some("1700000000000;4.5\n"))
            .await
            .unwrap();
        assert_eq!(imported, (1, 1));
        assert_eq!(labels(&service).await, ["New"]);
        assert_eq!(service.score_history().await.unwrap()[0].score, 4.5);

        assert_eq!(service.import_all("Solo;0;BACKLOG;false\n", None).await.unwrap(), (1, 0));
    }

    #[tokio::test]
    async fn test_duplicate_scores_in_one_import_count_once() {
        let (service, _) = service();
        let added = service
            .import_scores("1700000000000;1\n1700000000000;2\n")
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(service.score_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_advance_rejects_excessive_day_count() {
        let (service, clock) = service();
        add_all(&service, &["Run"]).await;

        let err = service.advance(u32::MAX, clock.now()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::TooManyDays { requested: u32::MAX, max: MAX_ADVANCE_DAYS }
        ));
        assert!(service.score_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_catch_up_replays_at_most_the_day_limit() {
        let (service, clock) = service();
        service.catch_up().await.unwrap();

        clock.advance(Duration::days(i64::from(MAX_ADVANCE_DAYS) + 5));
        let outcomes = service.catch_up().await.unwrap();
        assert_eq!(outcomes.len(), MAX_ADVANCE_DAYS as usize);
        assert!(service.catch_up().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wall_clock_saturday_suspends_decay() {
        let saturday = wednesday() + Duration::days(3);
        let (service, _) = service_at(config(), saturday);
        service.import_routines("Run;5;CURRENT;false\n").await.unwrap();

        // The advanced day is a weekday, but the wall clock says Saturday.
        let outcome = service.advance(1, wednesday()).await.unwrap().remove(0);
        assert!(outcome.decayed.is_empty());
        assert_eq!(service.list_routines().await.unwrap()[0].progress, 5);
    }

    #[tokio::test]
    async fn test_wall_clock_weekday_decays_a_saturday_stamp() {
        let (service, _) = service_at(config(), wednesday());
        service.import_routines("Run;5;CURRENT;false\n").await.unwrap();

        let outcome = service
            .advance(1, wednesday() + Duration::days(3))
            .await
            .unwrap()
            .remove(0);
        assert_eq!(outcome.decayed.len(), 1);
        assert_eq!(service.list_routines().await.unwrap()[0].progress, 4);
    }

    #[tokio::test]
    async fn test_advanced_day_rule_follows_the_advanced_day() {
        let config = EverydayConfig {
            weekend_rule: WeekendRule::AdvancedDay,
            ..config()
        };
        let (service, _) = service_at(config, wednesday());
        service.import_routines("Run;5;CURRENT;false\n").await.unwrap();

        let saturday = wednesday() + Duration::days(3);
        let outcome = service.advance(1, saturday).await.unwrap().remove(0);
        assert!(outcome.decayed.is_empty());
        assert_eq!(service.list_routines().await.unwrap()[0].progress, 5);

        let monday = saturday + Duration::days(2);
        let outcome = service.advance(1, monday).await.unwrap().remove(0);
        assert_eq!(outcome.decayed.len(), 1);
        assert_eq!(service.list_routines().await.unwrap()[0].progress, 4);
    }
}
