//! Ingestion
//!
//! Two entry points feed the event store: a pre-normalized batch posted by a
//! client, and a sync that reads recent pull requests from GitHub. Both upsert the
//! repository row by GitHub id and append events in one transaction, so a
//! failed append leaves the repository row untouched.

use std::sync::Arc;

use metrics::counter;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::connectors::github::{GitHubClient, GitHubError};
use crate::normalization::{ActivityEvent, NormalizationError, normalize_merged_pull_request};
use crate::repositories::{RepositoryError, event, repo as repo_store};

/// Repository identity and metadata accompanying every ingest
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepoMetadata {
    /// GitHub repository id
    pub id: i64,
    pub name: String,
    /// `owner/name`
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
}

impl RepoMetadata {
    /// Build metadata from a full name, taking the short name from after the slash.
    pub fn from_full_name(id: i64, full_name: &str, private: bool) -> Self {
        let name = full_name
            .split_once('/')
            .map_or(full_name, |(_, name)| name)
            .to_string();
        Self {
            id,
            name,
            full_name: full_name.to_string(),
            private,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    GitHub(#[from] GitHubError),
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
}

/// Result of an ingest call
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub repository_id: Uuid,
    pub inserted: u64,
}

/// Result of a pull-request sync: events written and merged PRs seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SyncSummary {
    pub count: usize,
    pub prs: usize,
}

#[derive(Debug, Clone)]
pub struct IngestService {
    db: Arc<DatabaseConnection>,
}

impl IngestService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Upsert the repository then append the events, atomically.
    ///
    /// Ingesting the same batch twice keeps one repository row and stores the
    /// events twice.
    #[instrument(skip(self, repo, events), fields(github_repo_id = repo.id, events = events.len()))]
    pub async fn ingest(
        &self,
        repo: &RepoMetadata,
        events: &[ActivityEvent],
    ) -> Result<IngestSummary, IngestError> {
        let txn = self.db.begin().await.map_err(RepositoryError::from)?;
        let row = repo_store::upsert_by_github_id(
            &txn,
            repo.id,
            &repo.name,
            &repo.full_name,
            repo.private,
        )
        .await?;
        let inserted = event::insert_batch(&txn, row.id, events).await?;
        txn.commit().await.map_err(RepositoryError::from)?;

        counter!("ingest_events_total").increment(inserted);
        info!(repository_id = %row.id, inserted, "Ingested events");

        Ok(IngestSummary {
            repository_id: row.id,
            inserted,
        })
    }

    /// Fetch recently closed pull requests, keep the merged ones, and ingest a
    /// merge event plus one file-change event per changed file.
    ///
    /// File lists are fetched one pull request at a time. A failed fetch is
    /// logged and that pull request contributes only its merge event.
    #[instrument(skip(self, github, access_token, repo), fields(repo = %repo.full_name))]
    pub async fn sync_repository(
        &self,
        github: &GitHubClient,
        access_token: &str,
        repo: &RepoMetadata,
        limit: u32,
    ) -> Result<SyncSummary, IngestError> {
        let merged: Vec<_> = github
            .list_closed_pull_requests(access_token, &repo.full_name, limit)
            .await?
            .into_iter()
            .filter(|pr| pr.merged_at.is_some())
            .collect();

        let mut events = Vec::new();
        for pr in &merged {
            let files = match github
                .list_pull_request_files(access_token, &repo.full_name, pr.number)
                .await
            {
                Ok(files) => files,
                Err(error) => {
                    counter!("ingest_pull_request_file_fetch_failures_total").increment(1);
                    warn!(pr = pr.number, %error, "Failed to fetch pull request files, skipping");
                    Vec::new()
                }
            };

            match normalize_merged_pull_request(pr, &files) {
                Ok(pr_events) => events.extend(pr_events),
                Err(error) => warn!(pr = pr.number, %error, "Skipping pull request"),
            }
        }

        if !events.is_empty() {
            self.ingest(repo, &events).await?;
        }

        Ok(SyncSummary {
            count: events.len(),
            prs: merged.len(),
        })
    }
}
