use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use radar_core::EventSnapshot;

use super::PgStore;
use crate::error::StorageError;
use crate::traits::SnapshotStore;

const SELECT_BY_EVENT_ID: &str = r#"
    SELECT id, event_id, title, event_url, started_at, ended_at,
           "limit", accepted, waiting, updated_at, retrieved_at,
           owner_nickname, series_title, hash_digest
    FROM events_cache
    WHERE event_id = $1"#;

const UPSERT: &str = r#"
    INSERT INTO events_cache (
        event_id, title, event_url, started_at, ended_at, "limit",
        accepted, waiting, updated_at, retrieved_at, owner_nickname,
        series_title, hash_digest
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    ON CONFLICT (event_id) DO UPDATE SET
        title = EXCLUDED.title,
        event_url = EXCLUDED.event_url,
        started_at = EXCLUDED.started_at,
        ended_at = EXCLUDED.ended_at,
        "limit" = EXCLUDED."limit",
        accepted = EXCLUDED.accepted,
        waiting = EXCLUDED.waiting,
        updated_at = EXCLUDED.updated_at,
        retrieved_at = EXCLUDED.retrieved_at,
        owner_nickname = EXCLUDED.owner_nickname,
        series_title = EXCLUDED.series_title,
        hash_digest = EXCLUDED.hash_digest
    RETURNING id"#;

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: i64,
    event_id: i64,
    title: String,
    event_url: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    limit: i32,
    accepted: i32,
    waiting: i32,
    updated_at: Option<DateTime<Utc>>,
    retrieved_at: DateTime<Utc>,
    owner_nickname: String,
    series_title: String,
    hash_digest: String,
}

impl From<SnapshotRow> for EventSnapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            id: row.id,
            event_id: row.event_id,
            title: row.title,
            event_url: row.event_url,
            started_at: row.started_at,
            ended_at: row.ended_at,
            limit: row.limit,
            accepted: row.accepted,
            waiting: row.waiting,
            updated_at: row.updated_at,
            retrieved_at: row.retrieved_at,
            owner_nickname: row.owner_nickname,
            series_title: row.series_title,
            hash_digest: row.hash_digest,
        }
    }
}

async fn find(conn: &mut PgConnection, event_id: i64) -> Result<Option<EventSnapshot>, StorageError> {
    let row = sqlx::query_as::<_, SnapshotRow>(SELECT_BY_EVENT_ID)
        .bind(event_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(EventSnapshot::from))
}

async fn upsert(conn: &mut PgConnection, s: &EventSnapshot) -> Result<i64, StorageError> {
    let id = sqlx::query_scalar::<_, i64>(UPSERT)
        .bind(s.event_id)
        .bind(&s.title)
        .bind(&s.event_url)
        .bind(s.started_at)
        .bind(s.ended_at)
        .bind(s.limit)
        .bind(s.accepted)
        .bind(s.waiting)
        .bind(s.updated_at)
        .bind(s.retrieved_at)
        .bind(&s.owner_nickname)
        .bind(&s.series_title)
        .bind(&s.hash_digest)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

#[async_trait::async_trait]
impl SnapshotStore for PgStore {
    async fn find_by_event_id(&self, event_id: i64) -> Result<Option<EventSnapshot>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, event_id).await
    }

    async fn upsert(&self, snapshot: &EventSnapshot) -> Result<i64, StorageError> {
        let mut conn = self.pool.acquire().await?;
        upsert(&mut conn, snapshot).await
    }

    /// Read and replace under a per-event advisory lock, so two concurrent
    /// runs cannot both observe "no previous snapshot".
    async fn swap(
        &self,
        snapshot: &EventSnapshot,
    ) -> Result<(Option<EventSnapshot>, i64), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(snapshot.event_id)
            .execute(&mut *tx)
            .await?;
        let previous = find(&mut *tx, snapshot.event_id).await?;
        let id = upsert(&mut *tx, snapshot).await?;
        tx.commit().await?;
        Ok((previous, id))
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM events_cache WHERE retrieved_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
