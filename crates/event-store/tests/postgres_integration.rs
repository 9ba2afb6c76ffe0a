//! PostgreSQL integration tests.
//!
//! A single container is shared by every test; `#[serial]` keeps the
//! per-test `TRUNCATE` from racing.
//!
//! ```bash
//! cargo test -p event-store --test postgres_integration
//! ```

use std::sync::Arc;

use event_store::{
    AggregateId, AppendOptions, EventEnvelope, EventStore, EventStoreError, EventStoreExt,
    PostgresEventStore, Snapshot, StreamAppend, Version,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_events_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresEventStore {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE events, snapshots")
        .execute(&pool)
        .await
        .unwrap();

    PostgresEventStore::new(pool)
}

fn event(aggregate_id: AggregateId, aggregate_type: &str, version: i64, event_type: &str) -> EventEnvelope {
    EventEnvelope::new(
        aggregate_id,
        aggregate_type,
        Version::new(version),
        event_type,
        serde_json::json!({"event": event_type}),
    )
}

#[tokio::test]
#[serial]
async fn append_and_retrieve_events() {
    let store = get_test_store().await;
    let id = AggregateId::new();

    let version = store
        .append(
            vec![
                event(id, "Order", 1, "OrderPlaced"),
                event(id, "Order", 2, "GatewayOrderAttached"),
            ],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();
    assert_eq!(version, Version::new(2));

    let events = store.get_events_for_aggregate(id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, "OrderPlaced");
    assert_eq!(events[1].version, Version::new(2));
}

#[tokio::test]
#[serial]
async fn stale_expected_version_conflicts() {
    let store = get_test_store().await;
    let id = AggregateId::new();
    store
        .append(vec![event(id, "Order", 1, "OrderPlaced")], AppendOptions::expect_new())
        .await
        .unwrap();

    let err = store
        .append(
            vec![event(id, "Order", 2, "StatusChanged")],
            AppendOptions::expect_version(Version::initial()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EventStoreError::ConcurrencyConflict { .. }));
}

#[tokio::test]
#[serial]
async fn unique_constraint_maps_to_conflict() {
    let store = get_test_store().await;
    let id = AggregateId::new();
    store
        .append(vec![event(id, "Order", 1, "OrderPlaced")], AppendOptions::new())
        .await
        .unwrap();

    let err = store
        .append(vec![event(id, "Order", 1, "OrderPlaced")], AppendOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
#[serial]
async fn multi_stream_append_rolls_back_on_conflict() {
    let store = get_test_store().await;
    let order = AggregateId::new();
    let promo = AggregateId::new();
    store
        .append(
            vec![event(promo, "PromoCode", 1, "PromoCodeCreated")],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let err = store
        .append_streams(vec![
            StreamAppend::new(
                vec![event(order, "Order", 1, "OrderPlaced")],
                AppendOptions::expect_new(),
            ),
            StreamAppend::new(
                vec![event(promo, "PromoCode", 1, "PromoCodeRedeemed")],
                AppendOptions::expect_new(),
            ),
        ])
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert!(!store.aggregate_exists(order).await.unwrap());
    assert_eq!(store.get_aggregate_version(promo).await.unwrap(), Some(Version::first()));
}

#[tokio::test]
#[serial]
async fn multi_stream_append_commits_every_stream() {
    let store = get_test_store().await;
    let order = AggregateId::new();
    let promo = AggregateId::new();
    store
        .append(
            vec![event(promo, "PromoCode", 1, "PromoCodeCreated")],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let versions = store
        .append_streams(vec![
            StreamAppend::new(
                vec![event(order, "Order", 1, "OrderPlaced")],
                AppendOptions::expect_new(),
            ),
            StreamAppend::new(
                vec![event(promo, "PromoCode", 2, "PromoCodeRedeemed")],
                AppendOptions::expect_version(Version::first()),
            ),
        ])
        .await
        .unwrap();

    assert_eq!(versions, vec![Version::first(), Version::new(2)]);
    assert!(store.aggregate_exists(order).await.unwrap());
}

#[tokio::test]
#[serial]
async fn concurrent_redemptions_of_one_stream_version_admit_one_writer() {
    let store = get_test_store().await;
    let promo = AggregateId::new();
    store
        .append(
            vec![event(promo, "PromoCode", 1, "PromoCodeCreated")],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let attempt = |store: PostgresEventStore| async move {
        store
            .append_streams(vec![
                StreamAppend::new(
                    vec![event(AggregateId::new(), "Order", 1, "OrderPlaced")],
                    AppendOptions::expect_new(),
                ),
                StreamAppend::new(
                    vec![event(promo, "PromoCode", 2, "PromoCodeRedeemed")],
                    AppendOptions::expect_version(Version::first()),
                ),
            ])
            .await
    };

    let (a, b) = tokio::join!(attempt(store.clone()), attempt(store.clone()));
    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert_eq!(store.get_aggregate_version(promo).await.unwrap(), Some(Version::new(2)));
}

#[tokio::test]
#[serial]
async fn stream_all_events_follows_insertion_order() {
    use futures_util::StreamExt;

    let store = get_test_store().await;
    let first = AggregateId::new();
    let second = AggregateId::new();
    store
        .append(vec![event(first, "Order", 1, "OrderPlaced")], AppendOptions::new())
        .await
        .unwrap();
    store
        .append(vec![event(second, "Order", 1, "OrderPlaced")], AppendOptions::new())
        .await
        .unwrap();

    let events: Vec<_> = store.stream_all_events().await.unwrap().collect().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].as_ref().unwrap().aggregate_id, first);
    assert_eq!(events[1].as_ref().unwrap().aggregate_id, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn tailing_reader_sees_every_concurrent_append_once() {
    use futures_util::StreamExt;
    use std::collections::HashSet;

    const WRITERS: usize = 8;
    const PER_WRITER: i64 = 25;

    let store = get_test_store().await;
    let writers: Vec<_> = (0..WRITERS)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let id = AggregateId::new();
                for version in 1..=PER_WRITER {
                    store
                        .append(
                            vec![event(id, "Order", version, "StatusChanged")],
                            AppendOptions::expect_version(Version::new(version - 1)),
                        )
                        .await
                        .unwrap();
                }
            })
        })
        .collect();

    let mut last = 0;
    let mut seen = HashSet::new();
    loop {
        let done = writers.iter().all(|w| w.is_finished());
        let mut events = store.stream_events_after(last).await.unwrap();
        while let Some(event) = events.next().await {
            let event = event.unwrap();
            assert!(event.position > last);
            last = event.position;
            assert!(seen.insert(event.event_id), "event delivered twice");
        }
        if done {
            break;
        }
        tokio::task::yield_now().await;
    }
    for writer in writers {
        writer.await.unwrap();
    }

    assert_eq!(seen.len(), WRITERS * PER_WRITER as usize);
}

#[tokio::test]
#[serial]
async fn reads_resume_after_a_position() {
    use futures_util::StreamExt;

    let store = get_test_store().await;
    let id = AggregateId::new();
    store
        .append(
            (1..=3).map(|v| event(id, "Order", v, "StatusChanged")).collect(),
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let all = store.get_events_for_aggregate(id).await.unwrap();
    assert!(all.windows(2).all(|w| w[0].position < w[1].position));

    let tail: Vec<_> = store
        .stream_events_after(all[0].position)
        .await
        .unwrap()
        .map(|e| e.unwrap().version)
        .collect()
        .await;
    assert_eq!(tail, vec![Version::new(2), Version::new(3)]);
}

#[tokio::test]
#[serial]
async fn load_aggregate_resumes_after_snapshot() {
    let store = get_test_store().await;
    let id = AggregateId::new();
    store
        .append(
            (1..=3).map(|v| event(id, "PromoCode", v, "PromoCodeRedeemed")).collect(),
            AppendOptions::new(),
        )
        .await
        .unwrap();

    store
        .save_snapshot(Snapshot::new(
            id,
            "PromoCode",
            Version::new(2),
            serde_json::json!({"uses_so_far": 2}),
        ))
        .await
        .unwrap();

    let (snapshot, events) = store.load_aggregate(id).await.unwrap();
    assert_eq!(snapshot.unwrap().version, Version::new(2));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].version, Version::new(3));
}

#[tokio::test]
#[serial]
async fn metadata_is_preserved() {
    let store = get_test_store().await;
    let id = AggregateId::new();

    let envelope = EventEnvelope::new(
        id,
        "Order",
        Version::first(),
        "StatusChanged",
        serde_json::json!({"to": "shipped"}),
    )
    .with_metadata("actor", serde_json::json!("admin"));
    store
        .append(vec![envelope], AppendOptions::new())
        .await
        .unwrap();

    let events = store.get_events_for_aggregate(id).await.unwrap();
    assert_eq!(events[0].metadata_str("actor"), Some("admin"));
}

#[tokio::test]
#[serial]
async fn replay_spans_several_pages() {
    use futures_util::StreamExt;

    let store = get_test_store().await;
    let busy = AggregateId::new();
    store
        .append(
            (1..=1_100).map(|v| event(busy, "PromoCode", v, "PromoCodeRedeemed")).collect(),
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let versions: Vec<i64> = store
        .stream_all_events()
        .await
        .unwrap()
        .map(|e| e.unwrap().version.as_i64())
        .collect()
        .await;
    assert_eq!(versions.len(), 1_100);
    assert!(versions.windows(2).all(|w| w[0] + 1 == w[1]));
}

#[tokio::test]
#[serial]
async fn older_snapshot_does_not_replace_newer() {
    let store = get_test_store().await;
    let id = AggregateId::new();

    for version in [50, 100, 50] {
        store
            .save_snapshot(Snapshot::new(
                id,
                "PromoCode",
                Version::new(version),
                serde_json::json!({"uses_so_far": version}),
            ))
            .await
            .unwrap();
    }

    let snapshot = store.get_snapshot(id).await.unwrap().unwrap();
    assert_eq!(snapshot.version, Version::new(100));
    assert_eq!(snapshot.state["uses_so_far"], 100);
}
