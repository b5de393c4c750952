//! # OAuth State Repository
//!
//! CSRF state tokens for the GitHub login flow. A state is redeemable once.

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use super::RepositoryResult;
use crate::connectors::github::AuthType;
use crate::models::oauth_state::{self, Entity, Model};

/// Repository for OAuth state database operations
#[derive(Debug, Clone)]
pub struct OAuthStateRepository {
    db: Arc<DatabaseConnection>,
}

impl OAuthStateRepository {
    /// Create a new OAuth state repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Persist a freshly issued state token
    pub async fn create(
        &self,
        state: &str,
        auth_type: AuthType,
        redirect_uri: &str,
        ttl_minutes: u64,
    ) -> RepositoryResult<Model> {
        let now = Utc::now().fixed_offset();
        let am = oauth_state::ActiveModel {
            id: Set(Uuid::new_v4()),
            state: Set(state.to_string()),
            auth_type: Set(auth_type.as_str().to_string()),
            redirect_uri: Set(redirect_uri.to_string()),
            expires_at: Set(now + Duration::minutes(ttl_minutes as i64)),
            created_at: Set(now),
        };
        Ok(am.insert(&*self.db).await?)
    }

    /// Redeem a state token.
    ///
    /// The row is deleted whether or not it has expired. Returns the state only
    /// when this call removed it and it was still valid, so a replayed or
    /// concurrently redeemed token yields `None`.
    pub async fn consume(&self, state: &str) -> RepositoryResult<Option<Model>> {
        let Some(found) = Entity::find()
            .filter(oauth_state::Column::State.eq(state))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        let deleted = Entity::delete_by_id(found.id).exec(&*self.db).await?;
        if deleted.rows_affected == 0 || found.is_expired_at(Utc::now().fixed_offset()) {
            return Ok(None);
        }
        Ok(Some(found))
    }

    /// Clean up expired OAuth states
    pub async fn delete_expired(&self) -> RepositoryResult<u64> {
        let result = Entity::delete_many()
            .filter(oauth_state::Column::ExpiresAt.lte(Utc::now().fixed_offset()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
