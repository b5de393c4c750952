//! # Server Configuration
//!
//! Router assembly, shared state and the OpenAPI document for SignalKit.

use std::{sync::Arc, time::Duration};

use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::session_middleware;
use crate::cleanup::ExpirySweeper;
use crate::config::AppConfig;
use crate::connectors::github::GitHubClient;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub crypto_key: CryptoKey,
    pub github: GitHubClient,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: DatabaseConnection,
        crypto_key: CryptoKey,
        github: GitHubClient,
    ) -> Self {
        Self {
            config: Arc::new(config),
            db: Arc::new(db),
            crypto_key,
            github,
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/logout", post(handlers::auth::logout))
        .route(
            "/github/installations",
            get(handlers::github::list_installations),
        )
        .route(
            "/github/installations/{installation_id}/repositories",
            get(handlers::github::list_installation_repositories),
        )
        .route("/repos/sync", post(handlers::ingest::sync_repository))
        .route("/ingest", post(handlers::ingest::ingest_events))
        .route(
            "/repos/{github_repo_id}/events",
            get(handlers::ingest::list_events),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ));

    let public = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/auth/github/login", get(handlers::auth::login))
        .route("/auth/github/callback", post(handlers::auth::callback))
        .route(
            "/repos/{github_repo_id}/sensors",
            get(handlers::sensors::all_sensors),
        )
        .route(
            "/repos/{github_repo_id}/sensors/time-sink",
            get(handlers::sensors::time_sink),
        )
        .route(
            "/repos/{github_repo_id}/sensors/truck-factor",
            get(handlers::sensors::truck_factor),
        )
        .route(
            "/repos/{github_repo_id}/sensors/pulse",
            get(handlers::sensors::pulse),
        )
        .route(
            "/repos/{github_repo_id}/sensors/codebase-age",
            get(handlers::sensors::codebase_age),
        );

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(trace_context_middleware))
}

/// Starts the server and the expiry sweeper; both stop on Ctrl-C.
pub async fn run_server(config: AppConfig, state: AppState) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let shutdown = CancellationToken::new();

    let sweeper = tokio::spawn(
        ExpirySweeper::new(state.db.clone())
            .with_interval(Duration::from_secs(config.sweep_interval_secs))
            .run(shutdown.clone()),
    );
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "SignalKit listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    sweeper.await?;
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::auth::login,
        crate::handlers::auth::callback,
        crate::handlers::auth::me,
        crate::handlers::auth::logout,
        crate::handlers::github::list_installations,
        crate::handlers::github::list_installation_repositories,
        crate::handlers::ingest::sync_repository,
        crate::handlers::ingest::ingest_events,
        crate::handlers::ingest::list_events,
        crate::handlers::sensors::all_sensors,
        crate::handlers::sensors::time_sink,
        crate::handlers::sensors::truck_factor,
        crate::handlers::sensors::pulse,
        crate::handlers::sensors::codebase_age,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::error::ProviderError,
            crate::handlers::HealthResponse,
            crate::handlers::auth::LoginResponse,
            crate::handlers::auth::CallbackRequest,
            crate::handlers::auth::SessionResponse,
            crate::handlers::auth::MeResponse,
            crate::handlers::auth::UserInfo,
            crate::connectors::github::AuthType,
            crate::connectors::github::Installation,
            crate::connectors::github::InstallationAccount,
            crate::connectors::github::RepositorySummary,
            crate::handlers::github::InstallationsResponse,
            crate::handlers::github::RepositoriesResponse,
            crate::handlers::ingest::SyncRequest,
            crate::handlers::ingest::IngestRequest,
            crate::handlers::ingest::EventRecord,
            crate::handlers::ingest::EventsResponse,
            crate::ingest::RepoMetadata,
            crate::ingest::IngestSummary,
            crate::ingest::SyncSummary,
            crate::normalization::EventKind,
            crate::normalization::IngestEvent,
            crate::normalization::IngestPayload,
            crate::handlers::sensors::SensorsResponse,
            crate::sensors::TimeSinkReport,
            crate::sensors::time_sink::ChurnFile,
            crate::sensors::TruckFactorReport,
            crate::sensors::truck_factor::Hero,
            crate::sensors::PulseReport,
            crate::sensors::pulse::PulseStatus,
            crate::sensors::pulse::DailyActivity,
            crate::sensors::CodebaseAgeReport,
            crate::sensors::codebase_age::AgeMarker,
            crate::sensors::codebase_age::MarkerStatus,
        )
    ),
    tags(
        (name = "root", description = "Service info and health"),
        (name = "auth", description = "GitHub login and sessions"),
        (name = "github", description = "Installations and repositories"),
        (name = "ingest", description = "Pull request sync and event ingestion"),
        (name = "sensors", description = "Engineering health sensors"),
    ),
    info(
        title = "SignalKit API",
        description = "Engineering health sensors computed from GitHub pull request activity",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
