use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Result, Snapshot, Version,
    store::{EventStore, EventStream, StreamAppend, validate_streams},
};

const EVENT_COLUMNS: &str =
    "seq, id, event_type, aggregate_id, aggregate_type, version, recorded_at, payload, metadata";

/// Advisory lock key guarding appends to the log.
const LOG_LOCK_KEY: i64 = 0x6576_656e_745f_6c6f;

#[derive(FromRow)]
struct EventRow {
    seq: i64,
    id: Uuid,
    event_type: String,
    aggregate_id: Uuid,
    aggregate_type: String,
    version: i64,
    recorded_at: DateTime<Utc>,
    payload: serde_json::Value,
    metadata: Json<HashMap<String, serde_json::Value>>,
}

impl From<EventRow> for EventEnvelope {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: EventId::from_uuid(row.id),
            event_type: row.event_type,
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            aggregate_type: row.aggregate_type,
            version: Version::new(row.version),
            timestamp: row.recorded_at,
            payload: row.payload,
            metadata: row.metadata.0,
            position: u64::try_from(row.seq).unwrap_or_default(),
        }
    }
}

#[derive(FromRow)]
struct SnapshotRow {
    aggregate_id: Uuid,
    aggregate_type: String,
    version: i64,
    taken_at: DateTime<Utc>,
    state: serde_json::Value,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            aggregate_type: row.aggregate_type,
            version: Version::new(row.version),
            taken_at: row.taken_at,
            state: row.state,
        }
    }
}

/// PostgreSQL-backed event store.
///
/// Every append runs in one transaction holding an advisory lock over the
/// log, so version checks across the order and promo code streams are atomic
/// and `seq` values are drawn in commit order. Readers resuming after a
/// position therefore never miss an event that commits later with a lower
/// `seq`. The `unique_aggregate_version` constraint still backs up appends
/// made without an expected version.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn stream_version(
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: AggregateId,
    ) -> Result<Version> {
        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&mut **tx)
                .await?;
        Ok(Version::new(current.unwrap_or(0)))
    }

    async fn insert_stream(
        tx: &mut Transaction<'_, Postgres>,
        stream: &StreamAppend,
    ) -> Result<Version> {
        let aggregate_id = stream.aggregate_id();

        if let Some(expected) = stream.options.expected_version {
            let actual = Self::stream_version(tx, aggregate_id).await?;
            if actual != expected {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual,
                });
            }
        }

        let n = stream.events.len();
        let mut ids = Vec::with_capacity(n);
        let mut types = Vec::with_capacity(n);
        let mut versions = Vec::with_capacity(n);
        let mut recorded = Vec::with_capacity(n);
        let mut payloads = Vec::with_capacity(n);
        let mut metadata = Vec::with_capacity(n);
        for event in &stream.events {
            ids.push(event.event_id.as_uuid());
            types.push(event.event_type.clone());
            versions.push(event.version.as_i64());
            recorded.push(event.timestamp);
            payloads.push(event.payload.clone());
            metadata.push(serde_json::to_value(&event.metadata)?);
        }

        // Row order of the unnest is the insertion order, so `seq` follows
        // the versions within a stream.
        sqlx::query(
            r#"
            INSERT INTO events (id, event_type, aggregate_id, aggregate_type, version, recorded_at, payload, metadata)
            SELECT e.id, e.event_type, $3, $4, e.version, e.recorded_at, e.payload, e.metadata
            FROM UNNEST($1::uuid[], $2::text[], $5::bigint[], $6::timestamptz[], $7::jsonb[], $8::jsonb[])
                WITH ORDINALITY AS e(id, event_type, version, recorded_at, payload, metadata, ord)
            ORDER BY e.ord
            "#,
        )
        .bind(&ids)
        .bind(&types)
        .bind(aggregate_id.as_uuid())
        .bind(&stream.events[0].aggregate_type)
        .bind(&versions)
        .bind(&recorded)
        .bind(&payloads)
        .bind(&metadata)
        .execute(&mut **tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db)
                if db.constraint() == Some("unique_aggregate_version") =>
            {
                EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected: stream
                        .options
                        .expected_version
                        .unwrap_or_else(|| Version::new(stream.events[0].version.as_i64() - 1)),
                    actual: stream.events[0].version,
                }
            }
            _ => EventStoreError::Database(e),
        })?;

        Ok(stream.events[n - 1].version)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append_streams(&self, streams: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_streams(&streams)?;
        let start = std::time::Instant::now();

        // Dropping the transaction on an early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        // Held until commit: the next writer draws its `seq` only after this
        // batch is visible.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(LOG_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let mut versions = Vec::with_capacity(streams.len());
        for stream in &streams {
            versions.push(Self::insert_stream(&mut tx, stream).await?);
        }

        tx.commit().await?;
        metrics::histogram!("event_store_append_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        tracing::debug!(streams = streams.len(), "events appended");
        Ok(versions)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        self.get_events_for_aggregate_from_version(aggregate_id, Version::initial())
            .await
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE aggregate_id = $1 AND version >= $2 ORDER BY version"
        ))
        .bind(aggregate_id.as_uuid())
        .bind(from_version.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EventEnvelope::from).collect())
    }

    async fn stream_events_after(&self, position: u64) -> Result<EventStream> {
        let after = i64::try_from(position).unwrap_or(i64::MAX);
        Ok(Box::pin(paged_log(self.pool.clone(), after)))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, taken_at, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id) DO UPDATE SET
                aggregate_type = EXCLUDED.aggregate_type,
                version = EXCLUDED.version,
                taken_at = EXCLUDED.taken_at,
                state = EXCLUDED.state
            WHERE snapshots.version < EXCLUDED.version
            "#,
        )
        .bind(snapshot.aggregate_id.as_uuid())
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.version.as_i64())
        .bind(snapshot.taken_at)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            "SELECT aggregate_id, aggregate_type, version, taken_at, state FROM snapshots WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Snapshot::from))
    }
}

/// Streams the log after `after` in `seq` order, page by page, so a long
/// replay does not hold one cursor open against concurrent appends.
fn paged_log(
    pool: PgPool,
    after: i64,
) -> impl futures_core::Stream<Item = Result<EventEnvelope>> + Send {
    const PAGE: i64 = 500;

    futures_util::stream::unfold(Some(after), move |after| {
        let pool = pool.clone();
        async move {
            let after = after?;
            let page: std::result::Result<Vec<EventRow>, sqlx::Error> = sqlx::query_as(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE seq > $1 ORDER BY seq LIMIT $2"
            ))
            .bind(after)
            .bind(PAGE)
            .fetch_all(&pool)
            .await;

            match page {
                Ok(rows) => {
                    let next = match rows.last() {
                        Some(row) if rows.len() as i64 == PAGE => Some(row.seq),
                        _ => None,
                    };
                    let events: Vec<Result<EventEnvelope>> =
                        rows.into_iter().map(|row| Ok(row.into())).collect();
                    Some((futures_util::stream::iter(events), next))
                }
                Err(e) => Some((
                    futures_util::stream::iter(vec![Err(EventStoreError::Database(e))]),
                    None,
                )),
            }
        }
    })
    .flatten()
}
