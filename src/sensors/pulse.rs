//! Pulse: development cadence, measured as the fraction of days in the window
//! with at least one event.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::normalization::ActivityEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PulseStatus {
    Stagnant,
    #[serde(rename = "Low Activity")]
    LowActivity,
    Sporadic,
    Consistent,
    #[serde(rename = "High Cadence")]
    HighCadence,
}

impl PulseStatus {
    /// Bucket an active-day ratio. Each upper bound is exclusive.
    pub fn classify(active_ratio: f64) -> (Self, u32) {
        if active_ratio <= 0.0 {
            (PulseStatus::Stagnant, 0)
        } else if active_ratio < 0.2 {
            (PulseStatus::LowActivity, 20)
        } else if active_ratio < 0.5 {
            (PulseStatus::Sporadic, 50)
        } else if active_ratio < 0.8 {
            (PulseStatus::Consistent, 80)
        } else {
            (PulseStatus::HighCadence, 100)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DailyActivity {
    /// `YYYY-MM-DD`, UTC
    pub date: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PulseReport {
    pub score: u32,
    pub previous_score: u32,
    pub status: PulseStatus,
    /// One entry per day of the window, oldest first, zero-filled
    pub daily_activity: Vec<DailyActivity>,
}

fn utc_day(ts: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(ts).map(|t| t.date_naive())
}

fn counts_by_day(events: &[ActivityEvent]) -> BTreeMap<NaiveDate, u32> {
    let mut days = BTreeMap::new();
    for day in events.iter().filter_map(|e| utc_day(e.ts)) {
        *days.entry(day).or_insert(0) += 1;
    }
    days
}

/// Score and status for one window.
pub fn cadence(events: &[ActivityEvent], timeframe_days: u32) -> (PulseStatus, u32) {
    if timeframe_days == 0 {
        return PulseStatus::classify(0.0);
    }
    let active: BTreeSet<NaiveDate> = events.iter().filter_map(|e| utc_day(e.ts)).collect();
    PulseStatus::classify(active.len() as f64 / timeframe_days as f64)
}

/// The last `timeframe_days` UTC days ending on `today`, oldest first.
pub fn daily_series(
    events: &[ActivityEvent],
    timeframe_days: u32,
    today: NaiveDate,
) -> Vec<DailyActivity> {
    let counts = counts_by_day(events);
    (0..timeframe_days)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(back.into())))
        .map(|day| DailyActivity {
            date: day.format("%Y-%m-%d").to_string(),
            count: counts.get(&day).copied().unwrap_or(0),
        })
        .collect()
}

pub fn compute(
    current: &[ActivityEvent],
    previous: &[ActivityEvent],
    timeframe_days: u32,
    today: NaiveDate,
) -> PulseReport {
    let (status, score) = cadence(current, timeframe_days);
    let (_, previous_score) = cadence(previous, timeframe_days);
    PulseReport {
        score,
        previous_score,
        status,
        daily_activity: daily_series(current, timeframe_days, today),
    }
}
