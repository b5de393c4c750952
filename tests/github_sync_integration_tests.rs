//! Integration tests for pull request sync against a mocked GitHub.

mod test_utils;

use std::sync::Arc;

use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;
use signalkit::{
    connectors::github::{GitHubClient, GitHubError},
    ingest::{IngestError, IngestService, RepoMetadata},
    models::{Event, Repository},
    normalization::{EventKind, decode_events},
    repositories::{EventRepository, RepoRepository},
};
use test_utils::setup_test_db;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "gho_sync_token";

fn repo() -> RepoMetadata {
    RepoMetadata::from_full_name(900, "octo/demo", false)
}

async fn mock_pull_list(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/repos/octo/demo/pulls"))
        .and(query_param("state", "closed"))
        .and(query_param("sort", "updated"))
        .and(query_param("direction", "desc"))
        .and(query_param("per_page", "20"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "number": 11,
                "merged_at": "2025-02-20T10:00:00Z",
                "user": { "login": "alice" }
            },
            {
                "number": 12,
                "merged_at": null,
                "user": { "login": "bob" }
            },
            {
                "number": 13,
                "merged_at": "2025-02-21T09:30:00Z",
                "user": null
            }
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn sync_ingests_merged_pull_requests_and_their_files() {
    let server = MockServer::start().await;
    mock_pull_list(&server).await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/demo/pulls/11/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "filename": "src/a.rs", "additions": 3, "deletions": 1 },
            { "filename": "src/b.rs", "additions": 7, "deletions": 0 }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/demo/pulls/13/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "filename": "src/a.rs", "additions": 1, "deletions": 1 }
        ])))
        .mount(&server)
        .await;

    let db = Arc::new(setup_test_db().await.unwrap());
    let github = GitHubClient::new(&server.uri(), &server.uri()).unwrap();

    let summary = IngestService::new(db.clone())
        .sync_repository(&github, TOKEN, &repo(), 20)
        .await
        .unwrap();

    // Two merges plus three file changes; PR 12 was closed without merging
    assert_eq!(summary.prs, 2);
    assert_eq!(summary.count, 5);

    let stored = RepoRepository::new(db.clone())
        .find_by_github_id(900)
        .await
        .unwrap()
        .unwrap();
    let events = decode_events(
        EventRepository::new(db)
            .find_in_window(stored.id, 0, None)
            .await
            .unwrap(),
    );
    assert_eq!(events.len(), 5);
    assert_eq!(
        events
            .iter()
            .filter(|e| e.kind() == EventKind::PrMerged)
            .count(),
        2
    );
    // Every event of a pull request carries its merge timestamp
    let pr13_ts = chrono::DateTime::parse_from_rfc3339("2025-02-21T09:30:00Z")
        .unwrap()
        .timestamp_millis();
    assert!(
        events
            .iter()
            .filter(|e| e.payload.pr_id() == 13)
            .all(|e| e.ts == pr13_ts)
    );
}

#[tokio::test]
async fn failed_file_fetch_keeps_the_merge_event() {
    let server = MockServer::start().await;
    mock_pull_list(&server).await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/demo/pulls/11/files"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/demo/pulls/13/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "filename": "src/a.rs", "additions": 1, "deletions": 1 }
        ])))
        .mount(&server)
        .await;

    let db = Arc::new(setup_test_db().await.unwrap());
    let github = GitHubClient::new(&server.uri(), &server.uri()).unwrap();

    let summary = IngestService::new(db.clone())
        .sync_repository(&github, TOKEN, &repo(), 20)
        .await
        .unwrap();

    assert_eq!(summary.prs, 2);
    assert_eq!(summary.count, 3);
    assert_eq!(Event::find().count(&*db).await.unwrap(), 3);
}

#[tokio::test]
async fn sync_without_merged_pull_requests_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/demo/pulls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "number": 1, "merged_at": null, "user": { "login": "alice" } }
        ])))
        .mount(&server)
        .await;

    let db = Arc::new(setup_test_db().await.unwrap());
    let github = GitHubClient::new(&server.uri(), &server.uri()).unwrap();

    let summary = IngestService::new(db.clone())
        .sync_repository(&github, TOKEN, &repo(), 20)
        .await
        .unwrap();

    assert_eq!(summary.prs, 0);
    assert_eq!(summary.count, 0);
    assert_eq!(Repository::find().count(&*db).await.unwrap(), 0);
}

#[tokio::test]
async fn rate_limited_pull_listing_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/demo/pulls"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("retry-after", "17")
                .set_body_json(json!({ "message": "API rate limit exceeded" })),
        )
        .mount(&server)
        .await;

    let db = Arc::new(setup_test_db().await.unwrap());
    let github = GitHubClient::new(&server.uri(), &server.uri()).unwrap();

    let err = IngestService::new(db)
        .sync_repository(&github, TOKEN, &repo(), 20)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::GitHub(GitHubError::RateLimited { retry_after: 17 })
    ));
}
