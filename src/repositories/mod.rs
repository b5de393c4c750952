//! # Repository Layer
//!
//! Thin wrappers over SeaORM for each table. Every repository holds an
//! `Arc<DatabaseConnection>` and is cheap to construct per request.

use thiserror::Error;

pub mod event;
pub mod oauth_state;
pub mod repo;
pub mod session;
pub mod user;

pub use event::EventRepository;
pub use oauth_state::OAuthStateRepository;
pub use repo::RepoRepository;
pub use session::{NewSession, SessionRepository};
pub use user::UserRepository;

/// Errors surfaced by the repository layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
