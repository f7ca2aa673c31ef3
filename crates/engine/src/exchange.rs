//! Plain-text export/import format.
//!
//! Routines are written one per line as `label;progress;state;finishedToday`
//! and scores as `timestamp;score`, with the timestamp in epoch milliseconds.
//! Blank lines are ignored. Decoding fails on the first bad line.

use chrono::TimeZone;
use everyday_core::{Routine, RoutineState, ScoreRecord, PROGRESS_FULL, SCORE_MAX};

use crate::error::{EngineError, Result};

const SEPARATOR: char = ';';

/// Check that `label` can be stored and exported.
pub fn validate_label(label: &str) -> Result<()> {
    if label.trim().is_empty() {
        return Err(EngineError::InvalidRoutine("label must not be empty".to_string()));
    }
    if label.contains([SEPARATOR, '\n', '\r']) {
        return Err(EngineError::InvalidRoutine(format!(
            "label must not contain `{}` or line breaks",
            SEPARATOR
        )));
    }
    Ok(())
}

/// Encode routines, one line each.
pub fn encode_routines(routines: &[Routine]) -> String {
    routines
        .iter()
        .map(|r| {
            format!(
                "{label};{progress};{state};{finished}\n",
                label = r.label,
                progress = r.progress,
                state = r.state,
                finished = r.finished_today,
            )
        })
        .collect()
}

/// Decode routines. Every routine gets a fresh id.
pub fn decode_routines(text: &str) -> Result<Vec<Routine>> {
    records(text)
        .map(|(line, fields)| {
            let [label, progress, state, finished] = fields_exact::<4>(line, &fields)?;

            validate_label(label).map_err(|e| malformed(line, e.to_string()))?;
            let progress: u8 = progress
                .parse()
                .map_err(|_| malformed(line, format!("invalid progress `{}`", progress)))?;
            if progress > PROGRESS_FULL {
                return Err(malformed(
                    line,
                    format!("progress {} exceeds {}", progress, PROGRESS_FULL),
                ));
            }
            let state: RoutineState = state.parse().map_err(|e| malformed(line, format!("{}", e)))?;
            let finished_today = parse_bool(finished)
                .ok_or_else(|| malformed(line, format!("invalid flag `{}`", finished)))?;
            if finished_today && state != RoutineState::Current {
                return Err(malformed(line, format!("{} routine cannot be finished today", state)));
            }

            let mut routine = Routine::new(label).with_state(state).with_progress(progress);
            routine.finished_today = finished_today;
            Ok(routine)
        })
        .collect()
}

/// Encode score records, one line each.
pub fn encode_scores(scores: &[ScoreRecord]) -> String {
    scores
        .iter()
        .map(|s| format!("{};{}\n", s.timestamp.timestamp_millis(), s.score))
        .collect()
}

/// Decode score records.
pub fn decode_scores(text: &str) -> Result<Vec<ScoreRecord>> {
    records(text)
        .map(|(line, fields)| {
            let [timestamp, score] = fields_exact::<2>(line, &fields)?;

            let millis: i64 = timestamp
                .parse()
                .map_err(|_| malformed(line, format!("invalid timestamp `{}`", timestamp)))?;
            let timestamp = chrono::Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| malformed(line, format!("timestamp {} out of range", millis)))?;
            let score: f32 = score
                .parse()
                .map_err(|_| malformed(line, format!("invalid score `{}`", score)))?;
            if !(0.0..=SCORE_MAX).contains(&score) {
                return Err(malformed(line, format!("score {} outside 0..={}", score, SCORE_MAX)));
            }

            Ok(ScoreRecord::new(timestamp, score))
        })
        .collect()
}

/// Non-blank lines with their 1-based numbers, split into fields.
fn records(text: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| (index + 1, line.split(SEPARATOR).collect()))
}

fn fields_exact<'a, const N: usize>(line: usize, fields: &[&'a str]) -> Result<[&'a str; N]> {
    <[&str; N]>::try_from(fields)
        .map_err(|_| malformed(line, format!("expected {} fields, found {}", N, fields.len())))
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn malformed(line: usize, reason: String) -> EngineError {
    EngineError::MalformedRecord { line, reason }
}
