//! # Sensor Handlers
//!
//! Sensors are readable with or without a session. The event-based sensors
//! only need the event store; Codebase Age reads repository files through the
//! caller's GitHub token and falls back to a canned report without one.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::ingest::validate_full_name;
use crate::auth::MaybeSession;
use crate::error::ApiError;
use crate::repositories::RepoRepository;
use crate::sensors::{
    CodebaseAgeReport, PulseReport, SensorEngine, TimeSinkReport, TruckFactorReport, codebase_age,
    resolve_timeframe,
};
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SensorQuery {
    /// Window length in days (1-365, default 30)
    pub timeframe_days: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CodebaseAgeQuery {
    /// `owner/name` to inspect; defaults to the stored repository's full name
    pub full_name: Option<String>,
}

/// All four sensors for one repository
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SensorsResponse {
    pub time_sink: TimeSinkReport,
    pub truck_factor: TruckFactorReport,
    pub pulse: PulseReport,
    pub codebase_age: CodebaseAgeReport,
}

/// Inspect the repository's manifests when a session is present, otherwise
/// answer with the canned report.
async fn codebase_age_for(
    state: &AppState,
    session: MaybeSession,
    github_repo_id: i64,
    full_name: Option<String>,
) -> Result<CodebaseAgeReport, ApiError> {
    let Some(session) = session.0 else {
        return Ok(codebase_age::placeholder_report(github_repo_id));
    };

    let full_name = match full_name {
        Some(name) => Some(name),
        None => RepoRepository::new(state.db.clone())
            .find_by_github_id(github_repo_id)
            .await?
            .map(|repo| repo.full_name),
    };

    Ok(match full_name {
        Some(full_name) => {
            codebase_age::inspect(&state.github, &session.access_token, &full_name).await
        }
        None => codebase_age::placeholder_report(github_repo_id),
    })
}

/// Share of file touches that rework files already touched in the window
#[utoipa::path(
    get,
    path = "/repos/{github_repo_id}/sensors/time-sink",
    params(
        ("github_repo_id" = i64, Path, description = "GitHub repository id"),
        SensorQuery
    ),
    responses(
        (status = 200, description = "Time Sink report", body = TimeSinkReport),
        (status = 400, description = "Invalid timeframe", body = ApiError)
    ),
    tag = "sensors"
)]
pub async fn time_sink(
    State(state): State<AppState>,
    Path(github_repo_id): Path<i64>,
    Query(query): Query<SensorQuery>,
) -> Result<Json<TimeSinkReport>, ApiError> {
    let days = resolve_timeframe(query.timeframe_days)?;
    let report = SensorEngine::new(state.db.clone())
        .time_sink(github_repo_id, days, Utc::now())
        .await?;
    Ok(Json(report))
}

/// Knowledge concentration across authors
#[utoipa::path(
    get,
    path = "/repos/{github_repo_id}/sensors/truck-factor",
    params(
        ("github_repo_id" = i64, Path, description = "GitHub repository id"),
        SensorQuery
    ),
    responses(
        (status = 200, description = "Truck Factor report", body = TruckFactorReport),
        (status = 400, description = "Invalid timeframe", body = ApiError)
    ),
    tag = "sensors"
)]
pub async fn truck_factor(
    State(state): State<AppState>,
    Path(github_repo_id): Path<i64>,
    Query(query): Query<SensorQuery>,
) -> Result<Json<TruckFactorReport>, ApiError> {
    let days = resolve_timeframe(query.timeframe_days)?;
    let report = SensorEngine::new(state.db.clone())
        .truck_factor(github_repo_id, days, Utc::now())
        .await?;
    Ok(Json(report))
}

/// Merge cadence and daily activity
#[utoipa::path(
    get,
    path = "/repos/{github_repo_id}/sensors/pulse",
    params(
        ("github_repo_id" = i64, Path, description = "GitHub repository id"),
        SensorQuery
    ),
    responses(
        (status = 200, description = "Pulse report", body = PulseReport),
        (status = 400, description = "Invalid timeframe", body = ApiError)
    ),
    tag = "sensors"
)]
pub async fn pulse(
    State(state): State<AppState>,
    Path(github_repo_id): Path<i64>,
    Query(query): Query<SensorQuery>,
) -> Result<Json<PulseReport>, ApiError> {
    let days = resolve_timeframe(query.timeframe_days)?;
    let report = SensorEngine::new(state.db.clone())
        .pulse(github_repo_id, days, Utc::now())
        .await?;
    Ok(Json(report))
}

/// Estimated stack era from `package.json` and `tsconfig.json`
#[utoipa::path(
    get,
    path = "/repos/{github_repo_id}/sensors/codebase-age",
    params(
        ("github_repo_id" = i64, Path, description = "GitHub repository id"),
        CodebaseAgeQuery
    ),
    responses(
        (status = 200, description = "Codebase Age report", body = CodebaseAgeReport),
        (status = 400, description = "Invalid repository name", body = ApiError),
        (status = 401, description = "Authorization header present but invalid", body = ApiError)
    ),
    tag = "sensors"
)]
pub async fn codebase_age(
    State(state): State<AppState>,
    session: MaybeSession,
    Path(github_repo_id): Path<i64>,
    Query(query): Query<CodebaseAgeQuery>,
) -> Result<Json<CodebaseAgeReport>, ApiError> {
    if let Some(full_name) = &query.full_name {
        validate_full_name(full_name)?;
    }
    let report = codebase_age_for(&state, session, github_repo_id, query.full_name).await?;
    Ok(Json(report))
}

/// Every sensor in one response
#[utoipa::path(
    get,
    path = "/repos/{github_repo_id}/sensors",
    params(
        ("github_repo_id" = i64, Path, description = "GitHub repository id"),
        SensorQuery
    ),
    responses(
        (status = 200, description = "All sensor reports", body = SensorsResponse),
        (status = 400, description = "Invalid timeframe", body = ApiError),
        (status = 401, description = "Authorization header present but invalid", body = ApiError)
    ),
    tag = "sensors"
)]
pub async fn all_sensors(
    State(state): State<AppState>,
    session: MaybeSession,
    Path(github_repo_id): Path<i64>,
    Query(query): Query<SensorQuery>,
) -> Result<Json<SensorsResponse>, ApiError> {
    let days = resolve_timeframe(query.timeframe_days)?;
    let events = SensorEngine::new(state.db.clone())
        .event_sensors(github_repo_id, days, Utc::now())
        .await?;
    let codebase_age = codebase_age_for(&state, session, github_repo_id, None).await?;

    Ok(Json(SensorsResponse {
        time_sink: events.time_sink,
        truck_factor: events.truck_factor,
        pulse: events.pulse,
        codebase_age,
    }))
}
