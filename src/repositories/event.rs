//! Event store access.
//!
//! Events are append-only: this repository exposes inserts and reads, never
//! updates or deletes.

use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use super::RepositoryResult;
use crate::models::event::{self, Entity as Event};
use crate::normalization::ActivityEvent;

/// Rows per INSERT statement; keeps bind parameters under SQLite's limit
const INSERT_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct EventRepository {
    db: Arc<DatabaseConnection>,
}

impl EventRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Every event of the repository with `ts >= start_ms`, in no particular order.
    pub async fn find_since(
        &self,
        repository_id: Uuid,
        start_ms: i64,
    ) -> RepositoryResult<Vec<event::Model>> {
        Ok(Event::find()
            .filter(event::Column::RepositoryId.eq(repository_id))
            .filter(event::Column::Ts.gte(start_ms))
            .all(&*self.db)
            .await?)
    }

    /// Events in `[start_ms, end_ms)`, or `[start_ms, ∞)` without an end,
    /// sorted by `ts` ascending.
    pub async fn find_in_window(
        &self,
        repository_id: Uuid,
        start_ms: i64,
        end_ms: Option<i64>,
    ) -> RepositoryResult<Vec<event::Model>> {
        let mut query = Event::find()
            .filter(event::Column::RepositoryId.eq(repository_id))
            .filter(event::Column::Ts.gte(start_ms));
        if let Some(end_ms) = end_ms {
            query = query.filter(event::Column::Ts.lt(end_ms));
        }

        Ok(query
            .order_by_asc(event::Column::Ts)
            .order_by_asc(event::Column::CreatedAt)
            .order_by_asc(event::Column::Id)
            .all(&*self.db)
            .await?)
    }

    pub async fn count_for_repository(&self, repository_id: Uuid) -> RepositoryResult<u64> {
        Ok(Event::find()
            .filter(event::Column::RepositoryId.eq(repository_id))
            .count(&*self.db)
            .await?)
    }
}
/// Append a batch of events for one repository on `conn`, usually the
/// caller's transaction.
///
/// No deduplication happens here: inserting the same batch twice stores
/// every event twice.
pub async fn insert_batch<C>(
    conn: &C,
    repository_id: Uuid,
    events: &[ActivityEvent],
) -> RepositoryResult<u64>
where
    C: ConnectionTrait,
{
    let now = Utc::now().fixed_offset();
    let rows: Vec<event::ActiveModel> = events
        .iter()
        .map(|e| event::ActiveModel {
            id: Set(Uuid::new_v4()),
            repository_id: Set(repository_id),
            kind: Set(e.kind().as_str().to_string()),
            ts: Set(e.ts),
            payload: Set(e.payload.to_json()),
            created_at: Set(now),
        })
        .collect();

    for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
        Event::insert_many(chunk.to_vec())
            .exec_without_returning(conn)
            .await?;
    }

    Ok(events.len() as u64)
}

