//! Database migrations for SignalKit.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000001_create_users;
mod m2025_06_01_000002_create_repositories;
mod m2025_06_01_000003_create_events;
mod m2025_06_02_000001_create_sessions;
mod m2025_06_02_000002_create_oauth_states;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000001_create_users::Migration),
            Box::new(m2025_06_01_000002_create_repositories::Migration),
            Box::new(m2025_06_01_000003_create_events::Migration),
            Box::new(m2025_06_02_000001_create_sessions::Migration),
            Box::new(m2025_06_02_000002_create_oauth_states::Migration),
        ]
    }
}
