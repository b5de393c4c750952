//! # Authentication
//!
//! Requests authenticate with `Authorization: Bearer <session_id>.<secret>`,
//! the token handed out by the GitHub callback. Resolution yields a
//! [`SessionContext`] carrying the user and the decrypted GitHub access token;
//! handlers receive it explicitly rather than reading any ambient state.

use std::fmt;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use uuid::Uuid;

use crate::connectors::github::AuthType;
use crate::crypto;
use crate::error::{ApiError, unauthorized};
use crate::models::user;
use crate::repositories::{NewSession, SessionRepository, UserRepository};
use crate::server::AppState;

/// Authenticated caller, resolved once per request.
#[derive(Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub github_user_id: i64,
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub auth_type: AuthType,
    pub expires_at: DateTime<FixedOffset>,
    pub access_token: String,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("login", &self.login)
            .field("auth_type", &self.auth_type)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// A bearer token as issued to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub session_id: Uuid,
    pub secret: String,
}

impl SessionToken {
    pub fn parse(raw: &str) -> Option<Self> {
        let (id, secret) = raw.split_once('.')?;
        if secret.is_empty() {
            return None;
        }
        Some(Self {
            session_id: Uuid::parse_str(id).ok()?,
            secret: secret.to_string(),
        })
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.session_id, self.secret)
    }
}

/// A freshly created session and the token to return to the client
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: SessionToken,
    pub expires_at: DateTime<FixedOffset>,
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let header = value
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;
    header
        .strip_prefix("Bearer ")
        .map(Some)
        .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
}

/// Create a session for a user who just completed the GitHub flow.
pub async fn issue_session(
    state: &AppState,
    user: &user::Model,
    auth_type: AuthType,
    access_token: &str,
) -> Result<IssuedSession, ApiError> {
    let session_id = Uuid::new_v4();
    let secret = crypto::generate_random_token();
    let ciphertext =
        crypto::encrypt_access_token(&state.crypto_key, session_id, user.id, access_token)
            .map_err(|e| anyhow::anyhow!("failed to seal access token: {e}"))?;
    let expires_at =
        Utc::now().fixed_offset() + Duration::hours(state.config.session_ttl_hours as i64);

    SessionRepository::new(state.db.clone())
        .create(NewSession {
            id: session_id,
            user_id: user.id,
            auth_type,
            secret_hash: crypto::hash_secret(&secret),
            access_token_ciphertext: ciphertext,
            expires_at,
        })
        .await?;

    tracing::info!(%session_id, user_id = %user.id, %auth_type, "Session created");
    Ok(IssuedSession {
        token: SessionToken { session_id, secret },
        expires_at,
    })
}

/// Resolve a raw bearer token to its session.
///
/// Unknown, expired and tampered tokens all fail with 401. Expired rows are
/// removed on sight.
pub async fn resolve_session(state: &AppState, raw_token: &str) -> Result<SessionContext, ApiError> {
    let invalid = || unauthorized(Some("Invalid session token"));
    let token = SessionToken::parse(raw_token).ok_or_else(invalid)?;

    let sessions = SessionRepository::new(state.db.clone());
    let session = sessions
        .find_by_id(token.session_id)
        .await?
        .ok_or_else(invalid)?;

    if !crypto::verify_secret(&token.secret, &session.secret_hash) {
        tracing::warn!(session_id = %session.id, "Session secret mismatch");
        return Err(invalid());
    }

    if session.expires_at <= Utc::now().fixed_offset() {
        sessions.delete(session.id).await?;
        return Err(unauthorized(Some("Session expired")));
    }

    let user = UserRepository::new(state.db.clone())
        .find_by_id(session.user_id)
        .await?
        .ok_or_else(invalid)?;

    let access_token = crypto::decrypt_access_token(
        &state.crypto_key,
        session.id,
        session.user_id,
        &session.access_token_ciphertext,
    )
    .map_err(|error| {
        tracing::error!(session_id = %session.id, %error, "Failed to open session access token");
        invalid()
    })?;

    let auth_type = AuthType::parse(&session.auth_type).unwrap_or_default();

    Ok(SessionContext {
        session_id: session.id,
        user_id: user.id,
        github_user_id: user.github_user_id,
        login: user.login,
        name: user.name,
        avatar_url: user.avatar_url,
        auth_type,
        expires_at: session.expires_at,
        access_token,
    })
}

/// Middleware for routes that require a session.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())?
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))?;
    let session = resolve_session(&state, token).await?;
    tracing::debug!(user = %session.login, "Authenticated session");

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .ok_or_else(|| unauthorized(Some("Session required")))
    }
}

/// Session for routes that work with or without one.
///
/// No `Authorization` header yields `None`; a header carrying a bad token is
/// still rejected.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<SessionContext>);

impl FromRequestParts<AppState> for MaybeSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<SessionContext>() {
            return Ok(Self(Some(session.clone())));
        }
        match bearer_token(&parts.headers)? {
            Some(token) => Ok(Self(Some(resolve_session(state, token).await?))),
            None => Ok(Self(None)),
        }
    }
}
