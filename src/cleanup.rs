//! # Expiry Sweeper
//!
//! Background task that removes expired sessions and unredeemed OAuth states.
//! Expired rows are already rejected on read; the sweep only keeps the
//! tables from growing.

use std::sync::Arc;

use metrics::counter;
use sea_orm::DatabaseConnection;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::repositories::{OAuthStateRepository, RepositoryResult, SessionRepository};

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Rows removed by one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub sessions: u64,
    pub oauth_states: u64,
}

pub struct ExpirySweeper {
    sessions: SessionRepository,
    oauth_states: OAuthStateRepository,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            sessions: SessionRepository::new(db.clone()),
            oauth_states: OAuthStateRepository::new(db),
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sweep on every interval until the shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Starting expiry sweeper");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.interval) => {
                    if let Err(err) = self.sweep().await {
                        error!(error = %err, "Expiry sweep failed");
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    }

    pub async fn sweep(&self) -> RepositoryResult<SweepStats> {
        let stats = SweepStats {
            sessions: self.sessions.delete_expired().await?,
            oauth_states: self.oauth_states.delete_expired().await?,
        };

        counter!("expired_sessions_deleted_total").increment(stats.sessions);
        counter!("expired_oauth_states_deleted_total").increment(stats.oauth_states);
        debug!(
            sessions = stats.sessions,
            oauth_states = stats.oauth_states,
            "Expiry sweep finished"
        );
        Ok(stats)
    }
}
