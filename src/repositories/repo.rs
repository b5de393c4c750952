//! Repository metadata persistence.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use super::RepositoryResult;
use crate::error::is_unique_violation;
use crate::models::repository::{self, Entity as Repository};

/// Repository for `repositories` rows
#[derive(Debug, Clone)]
pub struct RepoRepository {
    db: Arc<DatabaseConnection>,
}

impl RepoRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds a repository by its GitHub id
    pub async fn find_by_github_id(
        &self,
        github_repo_id: i64,
    ) -> RepositoryResult<Option<repository::Model>> {
        find_by_github_id_in(&*self.db, github_repo_id).await
    }
}

async fn find_by_github_id_in<C>(
    conn: &C,
    github_repo_id: i64,
) -> RepositoryResult<Option<repository::Model>>
where
    C: ConnectionTrait,
{
    Ok(Repository::find()
        .filter(repository::Column::GithubRepoId.eq(github_repo_id))
        .one(conn)
        .await?)
}

/// Insert or refresh metadata for a GitHub repository.
///
/// Name, full name and visibility are overwritten on every call; concurrent
/// writers for the same repository resolve as last write wins.
///
/// `conn` may be a connection or a transaction. The insert runs in a nested
/// transaction (a savepoint inside a transaction) so a lost race can fall back
/// to an update.
///
/// # Arguments
///
/// * `conn` - Connection or open transaction
/// * `github_repo_id` - Provider-assigned repository id
/// * `name` - Short repository name
/// * `full_name` - `owner/name`
/// * `is_private` - Visibility flag
///
/// # Returns
///
/// The stored row after the write
pub async fn upsert_by_github_id<C>(
    conn: &C,
    github_repo_id: i64,
    name: &str,
    full_name: &str,
    is_private: bool,
) -> RepositoryResult<repository::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    if let Some(existing) = find_by_github_id_in(conn, github_repo_id).await? {
        return update_metadata(conn, existing, name, full_name, is_private).await;
    }

    let now = Utc::now().fixed_offset();
    let am = repository::ActiveModel {
        id: Set(Uuid::new_v4()),
        github_repo_id: Set(github_repo_id),
        name: Set(name.to_string()),
        full_name: Set(full_name.to_string()),
        is_private: Set(is_private),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let savepoint = conn.begin().await?;
    match am.insert(&savepoint).await {
        Ok(model) => {
            savepoint.commit().await?;
            Ok(model)
        }
        // Another ingestion created the row between our read and insert
        Err(err) if is_unique_violation(&err) => {
            savepoint.rollback().await?;
            let existing = find_by_github_id_in(conn, github_repo_id)
                .await?
                .ok_or(err)?;
            update_metadata(conn, existing, name, full_name, is_private).await
        }
        Err(err) => Err(err.into()),
    }
}

async fn update_metadata<C>(
    conn: &C,
    existing: repository::Model,
    name: &str,
    full_name: &str,
    is_private: bool,
) -> RepositoryResult<repository::Model>
where
    C: ConnectionTrait,
{
    let mut am: repository::ActiveModel = existing.into();
    am.name = Set(name.to_string());
    am.full_name = Set(full_name.to_string());
    am.is_private = Set(is_private);
    am.updated_at = Set(Utc::now().fixed_offset());
    Ok(am.update(conn).await?)
}
