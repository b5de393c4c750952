//! Integration tests for ingestion and the event store.

mod test_utils;

use std::sync::Arc;

use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait};
use signalkit::{
    ingest::{IngestService, RepoMetadata},
    models::{Event, Repository},
    normalization::{ActivityEvent, decode_events},
    repositories::{EventRepository, RepoRepository},
};
use test_utils::setup_test_db;

fn sample_batch() -> Vec<ActivityEvent> {
    vec![
        ActivityEvent::merge(1, "alice", "2025-01-10T12:00:00Z", 1_000),
        ActivityEvent::file_change(1, "src/lib.rs", 10, 2, 1_000),
        ActivityEvent::file_change(1, "README.md", 1, 0, 1_000),
        ActivityEvent::merge(2, "bob", "2025-01-11T12:00:00Z", 2_000),
        ActivityEvent::file_change(2, "src/lib.rs", 4, 4, 2_000),
    ]
}

#[tokio::test]
async fn ingest_creates_repository_and_events() {
    let db = Arc::new(setup_test_db().await.unwrap());
    let service = IngestService::new(db.clone());
    let repo = RepoMetadata::from_full_name(501, "octo/demo", false);

    let summary = service.ingest(&repo, &sample_batch()).await.unwrap();
    assert_eq!(summary.inserted, 5);

    let stored = RepoRepository::new(db.clone())
        .find_by_github_id(501)
        .await
        .unwrap()
        .expect("repository row exists");
    assert_eq!(stored.id, summary.repository_id);
    assert_eq!(stored.name, "demo");
    assert_eq!(stored.full_name, "octo/demo");

    let count = EventRepository::new(db)
        .count_for_repository(stored.id)
        .await
        .unwrap();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn ingesting_twice_keeps_one_repository_and_duplicates_events() {
    let db = Arc::new(setup_test_db().await.unwrap());
    let service = IngestService::new(db.clone());
    let repo = RepoMetadata::from_full_name(502, "octo/demo", false);
    let batch = sample_batch();

    let first = service.ingest(&repo, &batch).await.unwrap();
    let second = service.ingest(&repo, &batch).await.unwrap();

    assert_eq!(first.repository_id, second.repository_id);
    assert_eq!(Repository::find().count(&*db).await.unwrap(), 1);
    assert_eq!(
        Event::find().count(&*db).await.unwrap(),
        2 * batch.len() as u64
    );
}

#[tokio::test]
async fn reingest_refreshes_repository_metadata() {
    let db = Arc::new(setup_test_db().await.unwrap());
    let service = IngestService::new(db.clone());

    service
        .ingest(&RepoMetadata::from_full_name(503, "octo/old", false), &[])
        .await
        .unwrap();
    service
        .ingest(&RepoMetadata::from_full_name(503, "octo/renamed", true), &[])
        .await
        .unwrap();

    let stored = RepoRepository::new(db)
        .find_by_github_id(503)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.full_name, "octo/renamed");
    assert_eq!(stored.name, "renamed");
    assert!(stored.is_private);
}

#[tokio::test]
async fn large_batches_are_chunked_into_one_transaction() {
    let db = Arc::new(setup_test_db().await.unwrap());
    let service = IngestService::new(db.clone());
    let events: Vec<_> = (0..250)
        .map(|i| ActivityEvent::file_change(i, format!("src/file_{i}.rs"), 1, 1, i))
        .collect();

    let summary = service
        .ingest(&RepoMetadata::from_full_name(504, "octo/big", false), &events)
        .await
        .unwrap();

    assert_eq!(summary.inserted, 250);
    assert_eq!(Event::find().count(&*db).await.unwrap(), 250);
}

#[tokio::test]
async fn find_since_is_inclusive_and_scoped_to_repository() {
    let db = Arc::new(setup_test_db().await.unwrap());
    let service = IngestService::new(db.clone());

    let target = service
        .ingest(
            &RepoMetadata::from_full_name(505, "octo/a", false),
            &sample_batch(),
        )
        .await
        .unwrap();
    service
        .ingest(
            &RepoMetadata::from_full_name(506, "octo/b", false),
            &sample_batch(),
        )
        .await
        .unwrap();

    let events = EventRepository::new(db);
    let all = events.find_since(target.repository_id, 0).await.unwrap();
    assert_eq!(all.len(), 5);

    let later = events.find_since(target.repository_id, 2_000).await.unwrap();
    assert_eq!(later.len(), 2);
    assert!(later.iter().all(|e| e.ts >= 2_000));

    let none = events.find_since(target.repository_id, 2_001).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn find_in_window_applies_half_open_bounds_in_ts_order() {
    let db = Arc::new(setup_test_db().await.unwrap());
    let service = IngestService::new(db.clone());
    let events = vec![
        ActivityEvent::merge(3, "carol", "2025-01-03T00:00:00Z", 300),
        ActivityEvent::merge(1, "alice", "2025-01-01T00:00:00Z", 100),
        ActivityEvent::merge(2, "bob", "2025-01-02T00:00:00Z", 200),
    ];
    let summary = service
        .ingest(&RepoMetadata::from_full_name(507, "octo/w", false), &events)
        .await
        .unwrap();

    let repo = EventRepository::new(db);
    let bounded = decode_events(
        repo.find_in_window(summary.repository_id, 100, Some(300))
            .await
            .unwrap(),
    );
    let ts: Vec<i64> = bounded.iter().map(|e| e.ts).collect();
    assert_eq!(ts, vec![100, 200]);

    let open = decode_events(
        repo.find_in_window(summary.repository_id, 200, None)
            .await
            .unwrap(),
    );
    let ts: Vec<i64> = open.iter().map(|e| e.ts).collect();
    assert_eq!(ts, vec![200, 300]);
}

#[tokio::test]
async fn stored_events_decode_back_to_the_ingested_values() {
    let db = Arc::new(setup_test_db().await.unwrap());
    let summary = IngestService::new(db.clone())
        .ingest(
            &RepoMetadata::from_full_name(508, "octo/decode", false),
            &sample_batch(),
        )
        .await
        .unwrap();

    let stored = decode_events(
        EventRepository::new(db)
            .find_in_window(summary.repository_id, 0, None)
            .await
            .unwrap(),
    );

    assert_eq!(stored.len(), 5);
    assert!(stored.contains(&ActivityEvent::file_change(2, "src/lib.rs", 4, 4, 2_000)));
    assert!(stored.contains(&ActivityEvent::merge(
        1,
        "alice",
        "2025-01-10T12:00:00Z",
        1_000
    )));
}

#[tokio::test]
async fn failed_event_append_rolls_back_new_repository() {
    let db = Arc::new(setup_test_db().await.unwrap());
    db.execute_unprepared("DROP TABLE events").await.unwrap();

    let result = IngestService::new(db.clone())
        .ingest(
            &RepoMetadata::from_full_name(509, "octo/atomic", false),
            &sample_batch(),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(Repository::find().count(&*db).await.unwrap(), 0);
}

#[tokio::test]
async fn failed_event_append_keeps_previous_metadata() {
    let db = Arc::new(setup_test_db().await.unwrap());
    let service = IngestService::new(db.clone());
    service
        .ingest(&RepoMetadata::from_full_name(510, "octo/before", false), &[])
        .await
        .unwrap();

    db.execute_unprepared("DROP TABLE events").await.unwrap();
    let result = service
        .ingest(
            &RepoMetadata::from_full_name(510, "octo/after", true),
            &sample_batch(),
        )
        .await;
    assert!(result.is_err());

    let stored = RepoRepository::new(db)
        .find_by_github_id(510)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.full_name, "octo/before");
    assert!(!stored.is_private);
}
