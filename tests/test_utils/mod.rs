//! Test utilities for database and router testing.
//!
//! In-memory SQLite databases with migrations applied, plus helpers for
//! building app state against a mocked GitHub and signing a user in.

use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use signalkit::{
    auth::{IssuedSession, issue_session},
    config::AppConfig,
    connectors::github::{AuthType, GitHubClient, GitHubUser},
    crypto::CryptoKey,
    models::user,
    repositories::UserRepository,
    server::AppState,
};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Test profile config pointing GitHub at `github_base`.
#[allow(dead_code)]
pub fn test_config(github_base: &str) -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        crypto_key: Some(vec![7u8; 32]),
        github_client_id: Some("test-client-id".to_string()),
        github_client_secret: Some("test-client-secret".to_string()),
        github_oauth_base: github_base.to_string(),
        github_api_base: github_base.to_string(),
        ..AppConfig::default()
    }
}

/// App state over a fresh database, with GitHub served from `github_base`.
#[allow(dead_code)]
pub async fn test_state(github_base: &str) -> Result<AppState> {
    let config = test_config(github_base);
    let db = setup_test_db().await?;
    let crypto_key = CryptoKey::new(vec![7u8; 32])?;
    let github = GitHubClient::from_config(&config)?;
    Ok(AppState::new(config, db, crypto_key, github))
}

/// A GitHub profile for fixtures.
#[allow(dead_code)]
pub fn github_user(id: i64, login: &str) -> GitHubUser {
    GitHubUser {
        id,
        login: login.to_string(),
        name: Some(format!("{login} name")),
        avatar_url: Some(format!("https://avatars.test/{login}")),
        email: None,
    }
}

/// Record a user and open a session holding `access_token`.
#[allow(dead_code)]
pub async fn sign_in(
    state: &AppState,
    login: &str,
    access_token: &str,
) -> Result<(user::Model, IssuedSession)> {
    let user = UserRepository::new(state.db.clone())
        .upsert_from_github(&github_user(42, login))
        .await?;
    let issued = issue_session(state, &user, AuthType::OAuth, access_token)
        .await
        .map_err(|e| anyhow::anyhow!("failed to issue session: {}", e.message))?;
    Ok((user, issued))
}
