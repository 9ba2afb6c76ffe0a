use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version};

/// Options for appending events to a stream.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected version of the stream for optimistic concurrency control.
    /// If None, no version check is performed.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the stream to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the stream to not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }

    /// Expects `version`, treating the initial version as "must be new".
    pub fn after(version: Version) -> Self {
        if version == Version::initial() {
            Self::expect_new()
        } else {
            Self::expect_version(version)
        }
    }
}

/// One stream's share of a multi-stream append.
#[derive(Debug, Clone)]
pub struct StreamAppend {
    pub events: Vec<EventEnvelope>,
    pub options: AppendOptions,
}

impl StreamAppend {
    pub fn new(events: Vec<EventEnvelope>, options: AppendOptions) -> Self {
        Self { events, options }
    }

    /// Stream the batch targets. Only valid once the batch passed
    /// [`validate_streams`], which rejects empty streams.
    pub(crate) fn aggregate_id(&self) -> AggregateId {
        self.events[0].aggregate_id
    }
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Core trait for event store implementations.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to a single stream.
    ///
    /// Events are appended atomically. If `options.expected_version` is set,
    /// the operation fails with `ConcurrencyConflict` when the stream has moved.
    ///
    /// Returns the new version of the stream.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        let mut versions = self
            .append_streams(vec![StreamAppend::new(events, options)])
            .await?;
        versions
            .pop()
            .ok_or_else(|| EventStoreError::InvalidAppend("no stream appended".to_string()))
    }

    /// Appends to several streams as one unit: either every stream's events
    /// are stored or none are.
    ///
    /// Each stream's expected version is checked inside the same unit, so a
    /// conflict on any stream aborts the whole batch. Returns the new version
    /// of each stream in input order.
    async fn append_streams(&self, streams: Vec<StreamAppend>) -> Result<Vec<Version>>;

    /// Retrieves all events for a stream, oldest first.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Retrieves events for a stream starting from a specific version.
    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Streams the stored events whose global position is greater than
    /// `position`, in position order.
    ///
    /// Positions are handed out in commit order, so once an event is visible
    /// no event with a lower position can appear later. Readers may keep the
    /// last position they processed and resume from it.
    async fn stream_events_after(&self, position: u64) -> Result<EventStream>;

    /// Streams every stored event in position order.
    async fn stream_all_events(&self) -> Result<EventStream> {
        self.stream_events_after(0).await
    }

    /// Returns None if the stream doesn't exist.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Saves a snapshot, replacing any previous one for the aggregate.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>>;
}

/// Convenience methods layered over [`EventStore`].
#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }

    /// Loads an aggregate's events, starting after its snapshot if one exists.
    async fn load_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.get_snapshot(aggregate_id).await? {
            let events = self
                .get_events_for_aggregate_from_version(aggregate_id, snapshot.version.next())
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self.get_events_for_aggregate(aggregate_id).await?;
            Ok((None, events))
        }
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks a batch before it is written.
///
/// Every stream must be non-empty, single-aggregate and sequentially
/// versioned, and no aggregate may appear in two streams of the same batch.
pub(crate) fn validate_streams(streams: &[StreamAppend]) -> Result<()> {
    if streams.is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty batch".to_string(),
        ));
    }

    let mut seen = Vec::with_capacity(streams.len());
    for stream in streams {
        let first = stream.events.first().ok_or_else(|| {
            EventStoreError::InvalidAppend("cannot append empty event list".to_string())
        })?;

        if seen.contains(&first.aggregate_id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "aggregate {} appears twice in one batch",
                first.aggregate_id
            )));
        }
        seen.push(first.aggregate_id);

        let mut expected_version = first.version;
        for event in stream.events.iter().skip(1) {
            if event.aggregate_id != first.aggregate_id
                || event.aggregate_type != first.aggregate_type
            {
                return Err(EventStoreError::InvalidAppend(
                    "all events in a stream must share one aggregate".to_string(),
                ));
            }
            expected_version = expected_version.next();
            if event.version != expected_version {
                return Err(EventStoreError::InvalidAppend(format!(
                    "event versions must be sequential: expected {}, got {}",
                    expected_version, event.version
                )));
            }
        }
    }

    Ok(())
}
