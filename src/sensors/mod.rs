//! # Sensors
//!
//! Each event-based sensor is a pure function of two windows of events: the
//! last `N` days and the `N` days before that. [`SensorEngine`] resolves the
//! repository, runs one bounded range query per window and hands the decoded
//! events to the pure functions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::normalization::{ActivityEvent, decode_events};
use crate::repositories::{EventRepository, RepoRepository, RepositoryError};

pub mod codebase_age;
pub mod pulse;
pub mod time_sink;
pub mod truck_factor;

pub use codebase_age::CodebaseAgeReport;
pub use pulse::PulseReport;
pub use time_sink::TimeSinkReport;
pub use truck_factor::TruckFactorReport;

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_TIMEFRAME_DAYS: u32 = 30;
pub const MAX_TIMEFRAME_DAYS: u32 = 365;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("timeframe_days must be between 1 and {MAX_TIMEFRAME_DAYS}, got {0}")]
    InvalidTimeframe(u32),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Apply the default and bounds to a requested timeframe.
pub fn resolve_timeframe(requested: Option<u32>) -> Result<u32, SensorError> {
    let days = requested.unwrap_or(DEFAULT_TIMEFRAME_DAYS);
    if (1..=MAX_TIMEFRAME_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(SensorError::InvalidTimeframe(days))
    }
}

/// `[start_ms, end_ms)`; an open end means "up to now and beyond".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: Option<i64>,
}

/// The current window and the equal-length window immediately before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPair {
    pub current: TimeWindow,
    pub previous: TimeWindow,
}

impl WindowPair {
    pub fn ending_at(now_ms: i64, timeframe_days: u32) -> Self {
        let span = i64::from(timeframe_days) * DAY_MS;
        let current_start = now_ms - span;
        Self {
            current: TimeWindow {
                start_ms: current_start,
                end_ms: None,
            },
            previous: TimeWindow {
                start_ms: current_start - span,
                end_ms: Some(current_start),
            },
        }
    }
}

/// Decoded events for both windows
#[derive(Debug, Clone, Default)]
pub struct WindowedEvents {
    pub current: Vec<ActivityEvent>,
    pub previous: Vec<ActivityEvent>,
}

/// `round(100 * part / whole)`, 0 for an empty whole.
pub(crate) fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        0
    } else {
        (100.0 * part as f64 / whole as f64).round() as u32
    }
}

/// The three event-based reports, computed over one load of the windows
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventSensors {
    pub time_sink: TimeSinkReport,
    pub truck_factor: TruckFactorReport,
    pub pulse: PulseReport,
}

#[derive(Debug, Clone)]
pub struct SensorEngine {
    repos: RepoRepository,
    events: EventRepository,
}

impl SensorEngine {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            repos: RepoRepository::new(db.clone()),
            events: EventRepository::new(db),
        }
    }

    /// Load both windows for a repository, or `None` when it was never ingested.
    pub async fn load(
        &self,
        github_repo_id: i64,
        windows: WindowPair,
    ) -> Result<Option<WindowedEvents>, SensorError> {
        let Some(repo) = self.repos.find_by_github_id(github_repo_id).await? else {
            debug!(github_repo_id, "Unknown repository, returning empty sensors");
            return Ok(None);
        };
        Ok(Some(self.load_for(repo.id, windows).await?))
    }

    async fn load_for(
        &self,
        repository_id: Uuid,
        windows: WindowPair,
    ) -> Result<WindowedEvents, SensorError> {
        let current = self
            .events
            .find_in_window(
                repository_id,
                windows.current.start_ms,
                windows.current.end_ms,
            )
            .await?;
        let previous = self
            .events
            .find_in_window(
                repository_id,
                windows.previous.start_ms,
                windows.previous.end_ms,
            )
            .await?;
        Ok(WindowedEvents {
            current: decode_events(current),
            previous: decode_events(previous),
        })
    }

    pub async fn time_sink(
        &self,
        github_repo_id: i64,
        timeframe_days: u32,
        now: DateTime<Utc>,
    ) -> Result<TimeSinkReport, SensorError> {
        let windows = WindowPair::ending_at(now.timestamp_millis(), timeframe_days);
        Ok(match self.load(github_repo_id, windows).await? {
            Some(w) => time_sink::compute(&w.current, &w.previous),
            None => TimeSinkReport::empty(),
        })
    }

    pub async fn truck_factor(
        &self,
        github_repo_id: i64,
        timeframe_days: u32,
        now: DateTime<Utc>,
    ) -> Result<TruckFactorReport, SensorError> {
        let windows = WindowPair::ending_at(now.timestamp_millis(), timeframe_days);
        Ok(match self.load(github_repo_id, windows).await? {
            Some(w) => truck_factor::compute(&w.current, &w.previous),
            None => TruckFactorReport::empty(),
        })
    }

    /// Unknown repositories still get a zero-filled daily series.
    pub async fn pulse(
        &self,
        github_repo_id: i64,
        timeframe_days: u32,
        now: DateTime<Utc>,
    ) -> Result<PulseReport, SensorError> {
        let windows = WindowPair::ending_at(now.timestamp_millis(), timeframe_days);
        let loaded = self.load(github_repo_id, windows).await?.unwrap_or_default();
        Ok(pulse::compute(
            &loaded.current,
            &loaded.previous,
            timeframe_days,
            now.date_naive(),
        ))
    }

    /// All three event-based sensors from a single load.
    pub async fn event_sensors(
        &self,
        github_repo_id: i64,
        timeframe_days: u32,
        now: DateTime<Utc>,
    ) -> Result<EventSensors, SensorError> {
        let windows = WindowPair::ending_at(now.timestamp_millis(), timeframe_days);
        let loaded = self.load(github_repo_id, windows).await?;
        let (time_sink, truck_factor) = match &loaded {
            Some(w) => (
                time_sink::compute(&w.current, &w.previous),
                truck_factor::compute(&w.current, &w.previous),
            ),
            None => (TimeSinkReport::empty(), TruckFactorReport::empty()),
        };
        let w = loaded.unwrap_or_default();
        Ok(EventSensors {
            time_sink,
            truck_factor,
            pulse: pulse::compute(&w.current, &w.previous, timeframe_days, now.date_naive()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_defaults_and_bounds() {
        assert_eq!(resolve_timeframe(None).unwrap(), 30);
        assert_eq!(resolve_timeframe(Some(1)).unwrap(), 1);
        assert_eq!(resolve_timeframe(Some(365)).unwrap(), 365);
        assert!(matches!(
            resolve_timeframe(Some(0)),
            Err(SensorError::InvalidTimeframe(0))
        ));
        assert!(resolve_timeframe(Some(366)).is_err());
    }

    #[test]
    fn windows_are_adjacent_and_equal_length() {
        let now = 100 * DAY_MS;
        let pair = WindowPair::ending_at(now, 7);
        assert_eq!(pair.current.start_ms, 93 * DAY_MS);
        assert_eq!(pair.current.end_ms, None);
        assert_eq!(pair.previous.start_ms, 86 * DAY_MS);
        assert_eq!(pair.previous.end_ms, Some(pair.current.start_ms));
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 2), 50);
        assert_eq!(percent(1, 8), 13);
        assert_eq!(percent(2, 3), 67);
    }
}
