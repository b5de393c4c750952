//! # GitHub Discovery Handlers
//!
//! Lists what the signed-in user can analyze. Both endpoints fall back to the
//! user's personal scope when the token cannot see app installations.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::SessionContext;
use crate::connectors::github::{Installation, RepositorySummary};
use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InstallationsResponse {
    pub installations: Vec<Installation>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RepositoriesResponse {
    pub repositories: Vec<RepositorySummary>,
}

/// GitHub App installations visible to the user
#[utoipa::path(
    get,
    path = "/github/installations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Installations, or the user's own account when none are visible", body = InstallationsResponse),
        (status = 401, description = "Missing, invalid or expired session", body = ApiError),
        (status = 429, description = "GitHub rate limit hit", body = ApiError),
        (status = 502, description = "GitHub error", body = ApiError)
    ),
    tag = "github"
)]
pub async fn list_installations(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<InstallationsResponse>, ApiError> {
    let installations = state
        .github
        .list_installations(&session.access_token)
        .await?;
    Ok(Json(InstallationsResponse { installations }))
}

/// Repositories reachable through an installation
#[utoipa::path(
    get,
    path = "/github/installations/{installation_id}/repositories",
    security(("bearer_auth" = [])),
    params(
        ("installation_id" = i64, Path, description = "Installation id, or the user id for the personal fallback")
    ),
    responses(
        (status = 200, description = "Repositories, or the user's repositories as a fallback", body = RepositoriesResponse),
        (status = 401, description = "Missing, invalid or expired session", body = ApiError),
        (status = 429, description = "GitHub rate limit hit", body = ApiError),
        (status = 502, description = "GitHub error", body = ApiError)
    ),
    tag = "github"
)]
pub async fn list_installation_repositories(
    State(state): State<AppState>,
    session: SessionContext,
    Path(installation_id): Path<i64>,
) -> Result<Json<RepositoriesResponse>, ApiError> {
    let repositories = state
        .github
        .list_installation_repositories(&session.access_token, installation_id)
        .await?;
    Ok(Json(RepositoriesResponse { repositories }))
}
