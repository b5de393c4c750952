//! # GitHub Login Handlers
//!
//! Login issues a state token and the GitHub authorize URL; the callback
//! redeems the state, exchanges the code, records the user and opens a
//! session.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{SessionContext, issue_session};
use crate::connectors::github::AuthType;
use crate::crypto::generate_random_token;
use crate::error::{ApiError, validation_error};
use crate::repositories::{OAuthStateRepository, SessionRepository, UserRepository};
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoginQuery {
    /// `oauth` (default) or `app`
    pub auth_type: Option<AuthType>,
    /// Where GitHub should send the user back; defaults to the configured callback
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub authorize_url: String,
    pub state: String,
    pub auth_type: AuthType,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackRequest {
    pub code: String,
    pub state: String,
}

/// Locally stored profile of the signed-in user
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub github_user_id: i64,
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    /// Bearer token for subsequent requests
    pub session_token: String,
    /// RFC 3339
    pub expires_at: String,
    pub auth_type: AuthType,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user: UserInfo,
    pub auth_type: AuthType,
    /// RFC 3339
    pub expires_at: String,
}

fn validate_redirect_uri(raw: &str) -> Result<(), ApiError> {
    let invalid = |reason: &str| {
        validation_error(
            "Invalid redirect_uri",
            serde_json::json!({ "redirect_uri": reason }),
        )
    };
    let url = Url::parse(raw).map_err(|_| invalid("Must be an absolute URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("Must use http or https"));
    }
    if url.fragment().is_some() {
        return Err(invalid("Must not contain a fragment"));
    }
    Ok(())
}

/// Start the GitHub login flow
#[utoipa::path(
    get,
    path = "/auth/github/login",
    params(LoginQuery),
    responses(
        (status = 200, description = "Authorize URL and persisted state", body = LoginResponse),
        (status = 400, description = "Unknown or unconfigured auth type, or bad redirect URI", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Json<LoginResponse>, ApiError> {
    let auth_type = query.auth_type.unwrap_or_default();
    let redirect_uri = query
        .redirect_uri
        .unwrap_or_else(|| state.config.default_redirect_uri());
    validate_redirect_uri(&redirect_uri)?;

    let state_token = generate_random_token();
    let authorize_url = state
        .github
        .authorize_url(auth_type, &state_token, &redirect_uri)?;

    OAuthStateRepository::new(state.db.clone())
        .create(
            &state_token,
            auth_type,
            &redirect_uri,
            state.config.oauth_state_ttl_minutes,
        )
        .await?;

    tracing::info!(%auth_type, "Issued GitHub login state");
    Ok(Json(LoginResponse {
        authorize_url: authorize_url.to_string(),
        state: state_token,
        auth_type,
    }))
}

/// Complete the GitHub login flow
#[utoipa::path(
    post,
    path = "/auth/github/callback",
    request_body = CallbackRequest,
    responses(
        (status = 201, description = "Session created", body = SessionResponse),
        (status = 400, description = "Unknown, expired or reused state", body = ApiError),
        (status = 401, description = "GitHub rejected the authorization code", body = ApiError),
        (status = 502, description = "GitHub error", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn callback(
    State(state): State<AppState>,
    Json(body): Json<CallbackRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    if body.code.trim().is_empty() {
        return Err(validation_error(
            "Missing authorization code",
            serde_json::json!({ "code": "Required" }),
        ));
    }

    let oauth_state = OAuthStateRepository::new(state.db.clone())
        .consume(&body.state)
        .await?
        .ok_or_else(|| {
            validation_error(
                "Invalid or expired OAuth state",
                serde_json::json!({ "state": "Unknown, expired or already used" }),
            )
        })?;
    let auth_type = AuthType::parse(&oauth_state.auth_type).unwrap_or_default();

    let access_token = state
        .github
        .exchange_code(auth_type, &body.code, &oauth_state.redirect_uri)
        .await?;
    let profile = state.github.get_user(&access_token).await?;

    let user = UserRepository::new(state.db.clone())
        .upsert_from_github(&profile)
        .await?;
    let issued = issue_session(&state, &user, auth_type, &access_token).await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session_token: issued.token.to_string(),
            expires_at: issued.expires_at.to_rfc3339(),
            auth_type,
            user: UserInfo {
                github_user_id: user.github_user_id,
                login: user.login,
                name: user.name,
                avatar_url: user.avatar_url,
            },
        }),
    ))
}

/// Current session's user
#[utoipa::path(
    get,
    path = "/auth/me",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Signed-in user", body = MeResponse),
        (status = 401, description = "Missing, invalid or expired session", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn me(session: SessionContext) -> Json<MeResponse> {
    Json(MeResponse {
        user: UserInfo {
            github_user_id: session.github_user_id,
            login: session.login,
            name: session.name,
            avatar_url: session.avatar_url,
        },
        auth_type: session.auth_type,
        expires_at: session.expires_at.to_rfc3339(),
    })
}

/// End the current session
#[utoipa::path(
    post,
    path = "/auth/logout",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 401, description = "Missing, invalid or expired session", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<StatusCode, ApiError> {
    SessionRepository::new(state.db.clone())
        .delete(session.session_id)
        .await?;
    tracing::info!(session_id = %session.session_id, "Session ended");
    Ok(StatusCode::NO_CONTENT)
}
