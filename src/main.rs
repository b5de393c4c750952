//! # SignalKit Main Entry Point

use anyhow::Context;
use signalkit::{
    config::ConfigLoader,
    connectors::GitHubClient,
    crypto::CryptoKey,
    db::init_pool,
    migration::{Migrator, MigratorTrait},
    server::{AppState, run_server},
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load()?;
    init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = init_pool(&config).await?;
    Migrator::up(&db, None)
        .await
        .context("failed to apply database migrations")?;

    let key_bytes = config
        .crypto_key
        .clone()
        .context("SIGNALKIT_CRYPTO_KEY is required")?;
    let crypto_key = CryptoKey::new(key_bytes)?;
    let github = GitHubClient::from_config(&config)?;

    let state = AppState::new(config.clone(), db, crypto_key, github);
    run_server(config, state).await
}
