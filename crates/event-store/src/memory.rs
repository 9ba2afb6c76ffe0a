use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version,
    store::{EventStore, EventStream, StreamAppend, validate_streams},
};

/// In-memory event store.
///
/// A single write lock covers a whole batch, so multi-stream appends have the
/// same all-or-nothing behaviour as the PostgreSQL store.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<EventEnvelope>>>,
    snapshots: Arc<RwLock<HashMap<AggregateId, Snapshot>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    fn current_version(events: &[EventEnvelope], aggregate_id: AggregateId) -> Version {
        events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max()
            .unwrap_or(Version::initial())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_streams(&self, streams: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_streams(&streams)?;

        let mut store = self.events.write().await;

        // Check every stream before writing any of them.
        let mut versions = Vec::with_capacity(streams.len());
        for stream in &streams {
            let first = &stream.events[0];
            let current = Self::current_version(&store, first.aggregate_id);

            if let Some(expected) = stream.options.expected_version
                && current != expected
            {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: first.aggregate_id,
                    expected,
                    actual: current,
                });
            }

            // Unique (aggregate_id, version) constraint.
            if first.version <= current {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: first.aggregate_id,
                    expected: stream.options.expected_version.unwrap_or(current),
                    actual: current,
                });
            }

            versions.push(stream.events.last().map_or(current, |e| e.version));
        }

        for stream in streams {
            for mut event in stream.events {
                event.position = store.len() as u64 + 1;
                store.push(event);
            }
        }

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
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && e.version >= from_version)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn stream_events_after(&self, position: u64) -> Result<EventStream> {
        use futures_util::stream;

        // Event n sits at index n - 1.
        let events: Vec<_> = self
            .events
            .read()
            .await
            .iter()
            .skip(usize::try_from(position).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let store = self.events.read().await;
        Ok(store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max())
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        let newer = snapshots
            .get(&snapshot.aggregate_id)
            .is_none_or(|held| held.version < snapshot.version);
        if newer {
            snapshots.insert(snapshot.aggregate_id, snapshot);
        }
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        Ok(self.snapshots.read().await.get(&aggregate_id).cloned())
    }
}
