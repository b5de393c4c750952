//! Session persistence
//!
//! Rows are written once at login and removed at logout or when found
//! expired. Callers seal the access token before handing it over, since the
//! ciphertext is bound to the session id they chose.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use super::RepositoryResult;
use crate::connectors::github::AuthType;
use crate::models::session::{self, Entity as Session};

/// Fields for a new session row
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub auth_type: AuthType,
    pub secret_hash: String,
    pub access_token_ciphertext: Vec<u8>,
    pub expires_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone)]
pub struct SessionRepository {
    db: Arc<DatabaseConnection>,
}

impl SessionRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: NewSession) -> RepositoryResult<session::Model> {
        let now = Utc::now().fixed_offset();
        let am = session::ActiveModel {
            id: Set(new.id),
            user_id: Set(new.user_id),
            auth_type: Set(new.auth_type.as_str().to_string()),
            secret_hash: Set(new.secret_hash),
            access_token_ciphertext: Set(new.access_token_ciphertext),
            expires_at: Set(new.expires_at),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(am.insert(&*self.db).await?)
    }

    /// Look up a session regardless of expiry.
    pub async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<session::Model>> {
        Ok(Session::find_by_id(id).one(&*self.db).await?)
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        let result = Session::delete_by_id(id).exec(&*self.db).await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn delete_expired(&self) -> RepositoryResult<u64> {
        let result = Session::delete_many()
            .filter(session::Column::ExpiresAt.lte(Utc::now().fixed_offset()))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
