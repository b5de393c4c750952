//! User persistence

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use super::RepositoryResult;
use crate::connectors::github::GitHubUser;
use crate::models::user::{self, Entity as User};

#[derive(Debug, Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<user::Model>> {
        Ok(User::find_by_id(id).one(&*self.db).await?)
    }

    pub async fn find_by_github_id(
        &self,
        github_user_id: i64,
    ) -> RepositoryResult<Option<user::Model>> {
        Ok(User::find()
            .filter(user::Column::GithubUserId.eq(github_user_id))
            .one(&*self.db)
            .await?)
    }

    /// Record a successful login, refreshing the profile fields.
    pub async fn upsert_from_github(&self, profile: &GitHubUser) -> RepositoryResult<user::Model> {
        let now = Utc::now().fixed_offset();

        if let Some(existing) = self.find_by_github_id(profile.id).await? {
            let mut am: user::ActiveModel = existing.into();
            am.login = Set(profile.login.clone());
            am.name = Set(profile.name.clone());
            am.avatar_url = Set(profile.avatar_url.clone());
            am.updated_at = Set(now);
            return Ok(am.update(&*self.db).await?);
        }

        let am = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            github_user_id: Set(profile.id),
            login: Set(profile.login.clone()),
            name: Set(profile.name.clone()),
            avatar_url: Set(profile.avatar_url.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(am.insert(&*self.db).await?)
    }
}
