//! # Ingestion Handlers
//!
//! Pull-request sync from GitHub, pre-normalized batch ingest, and the raw
//! event listing used to inspect what the sensors will read.

use std::sync::LazyLock;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::SessionContext;
use crate::error::{ApiError, validation_error};
use crate::ingest::{IngestService, IngestSummary, RepoMetadata, SyncSummary};
use crate::normalization::{ActivityEvent, IngestEvent};
use crate::repositories::{EventRepository, RepoRepository};
use crate::server::AppState;

/// `owner/name` where neither segment is made only of dots
static FULL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9_.-]*[A-Za-z0-9_-][A-Za-z0-9_.-]*/[A-Za-z0-9_.-]*[A-Za-z0-9_-][A-Za-z0-9_.-]*$",
    )
    .expect("valid regex literal")
});

const MAX_SYNC_LIMIT: u32 = 100;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// GitHub repository id
    pub repo_id: i64,
    /// `owner/name`
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    /// Closed pull requests to inspect (1-100, defaults to the configured limit)
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestRequest {
    pub repo: RepoMetadata,
    pub events: Vec<IngestEvent>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Lower bound in epoch milliseconds, inclusive (default 0)
    pub since: Option<i64>,
}

/// A stored event as written by ingestion
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventRecord {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    /// Epoch milliseconds
    pub ts: i64,
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventsResponse {
    pub events: Vec<EventRecord>,
}

pub(crate) fn validate_full_name(full_name: &str) -> Result<(), ApiError> {
    if FULL_NAME.is_match(full_name) {
        Ok(())
    } else {
        Err(validation_error(
            "Invalid repository name",
            serde_json::json!({ "fullName": "Expected owner/name" }),
        ))
    }
}

fn resolve_limit(requested: Option<u32>, default: u32) -> Result<u32, ApiError> {
    let limit = requested.unwrap_or(default);
    if (1..=MAX_SYNC_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(validation_error(
            "Invalid limit",
            serde_json::json!({ "limit": format!("Must be between 1 and {MAX_SYNC_LIMIT}") }),
        ))
    }
}

/// Sync recent merged pull requests from GitHub
#[utoipa::path(
    post,
    path = "/repos/sync",
    security(("bearer_auth" = [])),
    request_body = SyncRequest,
    responses(
        (status = 200, description = "Events written and merged pull requests seen", body = SyncSummary, example = json!({
            "count": 7,
            "prs": 2
        })),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Missing, invalid or expired session", body = ApiError),
        (status = 429, description = "GitHub rate limit hit", body = ApiError),
        (status = 502, description = "GitHub error", body = ApiError)
    ),
    tag = "ingest"
)]
pub async fn sync_repository(
    State(state): State<AppState>,
    session: SessionContext,
    Json(body): Json<SyncRequest>,
) -> Result<Json<SyncSummary>, ApiError> {
    validate_full_name(&body.full_name)?;
    let limit = resolve_limit(body.limit, state.config.sync_pr_limit)?;
    let repo = RepoMetadata::from_full_name(body.repo_id, &body.full_name, body.private);

    tracing::info!(user = %session.login, repo = %repo.full_name, limit, "Syncing repository");
    let summary = IngestService::new(state.db.clone())
        .sync_repository(&state.github, &session.access_token, &repo, limit)
        .await?;
    Ok(Json(summary))
}

/// Ingest a pre-normalized batch of events
#[utoipa::path(
    post,
    path = "/ingest",
    security(("bearer_auth" = [])),
    request_body = IngestRequest,
    responses(
        (status = 201, description = "Repository upserted and events appended", body = IngestSummary),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Missing, invalid or expired session", body = ApiError)
    ),
    tag = "ingest"
)]
pub async fn ingest_events(
    State(state): State<AppState>,
    _session: SessionContext,
    Json(body): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestSummary>), ApiError> {
    validate_full_name(&body.repo.full_name)?;

    let events = body
        .events
        .into_iter()
        .enumerate()
        .map(|(index, event)| {
            ActivityEvent::try_from(event).map_err(|error| {
                validation_error(
                    "Invalid event",
                    serde_json::json!({ "index": index, "error": error.to_string() }),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let summary = IngestService::new(state.db.clone())
        .ingest(&body.repo, &events)
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Events of a repository from `since` onwards, oldest first
#[utoipa::path(
    get,
    path = "/repos/{github_repo_id}/events",
    security(("bearer_auth" = [])),
    params(
        ("github_repo_id" = i64, Path, description = "GitHub repository id"),
        EventsQuery
    ),
    responses(
        (status = 200, description = "Stored events; empty for unknown repositories", body = EventsResponse),
        (status = 401, description = "Missing, invalid or expired session", body = ApiError)
    ),
    tag = "ingest"
)]
pub async fn list_events(
    State(state): State<AppState>,
    _session: SessionContext,
    Path(github_repo_id): Path<i64>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let Some(repo) = RepoRepository::new(state.db.clone())
        .find_by_github_id(github_repo_id)
        .await?
    else {
        return Ok(Json(EventsResponse { events: Vec::new() }));
    };

    let mut rows = EventRepository::new(state.db.clone())
        .find_since(repo.id, query.since.unwrap_or(0))
        .await?;
    rows.sort_by_key(|row| row.ts);

    Ok(Json(EventsResponse {
        events: rows
            .into_iter()
            .map(|row| EventRecord {
                id: row.id,
                kind: row.kind,
                ts: row.ts,
                payload: row.payload,
            })
            .collect(),
    }))
}
