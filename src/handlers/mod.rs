//! # API Handlers
//!
//! HTTP endpoints for SignalKit: service info and health, the GitHub login
//! flow, GitHub discovery, ingestion, and sensors.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db;
use crate::error::{ApiError, service_unavailable};
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod auth;
pub mod github;
pub mod ingest;
pub mod sensors;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "ok")]
    pub database: String,
}

/// Liveness plus a `SELECT 1` against the event store
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service and database healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    if let Err(error) = db::health_check(&state.db).await {
        tracing::warn!(%error, "Database health check failed");
        return Err(service_unavailable("Database unreachable"));
    }
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        database: "ok".to_string(),
    }))
}
