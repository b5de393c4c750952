//! Integration tests for sensors computed over the event store.

mod test_utils;

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use signalkit::{
    ingest::{IngestService, RepoMetadata},
    normalization::ActivityEvent,
    sensors::{SensorEngine, pulse::PulseStatus},
};
use test_utils::setup_test_db;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn days_ago(days: i64) -> i64 {
    (now() - Duration::days(days)).timestamp_millis()
}

fn merged_pr(pr: i64, author: &str, files: &[&str], ts: i64) -> Vec<ActivityEvent> {
    let merged_at = DateTime::from_timestamp_millis(ts).unwrap().to_rfc3339();
    let mut events = vec![ActivityEvent::merge(pr, author, merged_at, ts)];
    events.extend(
        files
            .iter()
            .map(|file| ActivityEvent::file_change(pr, *file, 5, 1, ts)),
    );
    events
}

async fn engine_with(github_repo_id: i64, events: Vec<ActivityEvent>) -> SensorEngine {
    let db = Arc::new(setup_test_db().await.unwrap());
    IngestService::new(db.clone())
        .ingest(
            &RepoMetadata::from_full_name(github_repo_id, "octo/sensors", false),
            &events,
        )
        .await
        .unwrap();
    SensorEngine::new(db)
}

#[tokio::test]
async fn time_sink_counts_rework_within_the_current_window() {
    let mut events = merged_pr(1, "alice", &["src/a.rs", "src/b.rs"], days_ago(5));
    events.extend(merged_pr(2, "bob", &["src/a.rs", "src/c.rs"], days_ago(2)));
    let engine = engine_with(700, events).await;

    let report = engine.time_sink(700, 30, now()).await.unwrap();

    assert_eq!(report.total_touches, 4);
    assert_eq!(report.rework_touches, 1);
    assert_eq!(report.score, 25);
    assert_eq!(report.previous_score, 0);
    assert_eq!(report.churn_files[0].file, "src/a.rs");
    assert_eq!(report.churn_files[0].pr_count, 2);
}

#[tokio::test]
async fn events_outside_both_windows_are_ignored() {
    let mut events = merged_pr(1, "alice", &["src/a.rs"], days_ago(3));
    // Older than twice the timeframe
    events.extend(merged_pr(2, "alice", &["src/a.rs"], days_ago(90)));
    let engine = engine_with(701, events).await;

    let report = engine.time_sink(701, 30, now()).await.unwrap();

    assert_eq!(report.total_touches, 1);
    assert_eq!(report.rework_touches, 0);
    assert_eq!(report.previous_score, 0);
}

#[tokio::test]
async fn previous_window_feeds_previous_score() {
    let mut events = merged_pr(1, "alice", &["src/a.rs"], days_ago(40));
    events.extend(merged_pr(2, "alice", &["src/a.rs"], days_ago(35)));
    let engine = engine_with(702, events).await;

    let report = engine.time_sink(702, 30, now()).await.unwrap();

    assert_eq!(report.score, 0);
    assert_eq!(report.total_touches, 0);
    assert_eq!(report.previous_score, 50);
}

#[tokio::test]
async fn single_owner_of_a_busy_file_is_a_hero() {
    let mut events = Vec::new();
    for pr in 1..=3 {
        events.extend(merged_pr(pr, "alice", &["src/core.rs"], days_ago(pr)));
    }
    let engine = engine_with(703, events).await;

    let report = engine.truck_factor(703, 30, now()).await.unwrap();

    assert_eq!(report.risk_score, 100);
    assert_eq!(report.total_files, 1);
    assert_eq!(report.heroes.len(), 1);
    assert_eq!(report.heroes[0].author, "alice");
    assert_eq!(report.heroes[0].top_files, vec!["src/core.rs".to_string()]);
}

#[tokio::test]
async fn shared_files_carry_no_truck_factor_risk() {
    let mut events = Vec::new();
    events.extend(merged_pr(1, "alice", &["src/core.rs"], days_ago(1)));
    events.extend(merged_pr(2, "bob", &["src/core.rs"], days_ago(2)));
    events.extend(merged_pr(3, "carol", &["src/core.rs"], days_ago(3)));
    let engine = engine_with(704, events).await;

    let report = engine.truck_factor(704, 30, now()).await.unwrap();

    assert_eq!(report.total_files, 1);
    assert_eq!(report.risk_score, 0);
    assert!(report.heroes.is_empty());
}

#[tokio::test]
async fn pulse_reports_active_days_and_a_full_series() {
    let mut events = merged_pr(1, "alice", &["a.rs"], days_ago(0));
    events.extend(merged_pr(2, "alice", &["a.rs"], days_ago(3)));
    events.extend(merged_pr(3, "alice", &["a.rs"], days_ago(10)));
    let engine = engine_with(705, events).await;

    let report = engine.pulse(705, 14, now()).await.unwrap();

    assert_eq!(report.status, PulseStatus::Sporadic);
    assert_eq!(report.score, 50);
    assert_eq!(report.daily_activity.len(), 14);
    assert_eq!(report.daily_activity.last().unwrap().date, "2025-03-01");
    assert_eq!(report.daily_activity.last().unwrap().count, 2);
}

#[tokio::test]
async fn unknown_repository_yields_empty_reports() {
    let engine = engine_with(706, merged_pr(1, "alice", &["a.rs"], days_ago(1))).await;

    let sensors = engine.event_sensors(999_999, 7, now()).await.unwrap();

    assert_eq!(sensors.time_sink.score, 0);
    assert!(sensors.time_sink.churn_files.is_empty());
    assert_eq!(sensors.truck_factor.risk_score, 0);
    assert!(sensors.truck_factor.heroes.is_empty());
    assert_eq!(sensors.pulse.score, 0);
    assert_eq!(sensors.pulse.daily_activity.len(), 7);
    assert!(sensors.pulse.daily_activity.iter().all(|d| d.count == 0));
}

#[tokio::test]
async fn sensors_are_idempotent() {
    let mut events = merged_pr(1, "alice", &["src/a.rs", "src/b.rs"], days_ago(4));
    events.extend(merged_pr(2, "bob", &["src/a.rs"], days_ago(1)));
    let engine = engine_with(707, events).await;

    let first = engine.event_sensors(707, 30, now()).await.unwrap();
    let second = engine.event_sensors(707, 30, now()).await.unwrap();

    assert_eq!(first.time_sink, second.time_sink);
    assert_eq!(first.truck_factor, second.truck_factor);
    assert_eq!(first.pulse, second.pulse);
}
