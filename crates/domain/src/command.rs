//! Loading aggregates from their streams and persisting what commands decide.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, EventStoreExt, StreamAppend, Version};
use serde::de::DeserializeOwned;

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// Outcome of a command that went through the handler.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// State after the new events.
    pub aggregate: A,
    /// Events the command produced; empty when it was a no-op.
    pub events: Vec<A::Event>,
    pub new_version: Version,
}

/// Runs commands against one aggregate type.
///
/// A command is a closure from current state to new events. The handler
/// replays the stream (from a snapshot when there is one), calls the closure
/// and appends the events with the loaded version as the expectation, so two
/// writers racing on a stream cannot both succeed.
///
/// Writes touching several streams, such as an order that redeems a promo
/// code, [`stage`](Self::stage) each stream and commit them together through
/// [`EventStore::append_streams`].
pub struct CommandHandler<S: EventStore, A: Aggregate> {
    store: S,
    aggregate: PhantomData<fn() -> A>,
}

impl<S: EventStore + Clone, A: Aggregate> Clone for CommandHandler<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            aggregate: PhantomData,
        }
    }
}

impl<S: EventStore, A: Aggregate + DeserializeOwned> CommandHandler<S, A> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            aggregate: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current state of a stream. A stream with no events yields
    /// `A::default()`.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let (snapshot, envelopes) = self.store.load_aggregate(aggregate_id).await?;
        let mut aggregate = match snapshot {
            Some(snapshot) => snapshot.restore()?,
            None => A::default(),
        };

        for envelope in envelopes {
            aggregate.apply(serde_json::from_value(envelope.payload)?);
            aggregate.set_version(envelope.version);
        }
        Ok(aggregate)
    }

    /// Like [`load`](Self::load), but `None` for a stream never written.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        Ok(aggregate.id().is_some().then_some(aggregate))
    }

    /// Runs `command` once against the current state.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let aggregate = self.load(aggregate_id).await?;
        self.commit(aggregate_id, aggregate, command).await
    }

    /// Runs `command` against a stream that must exist, reloading and running
    /// it again when another writer appended first.
    ///
    /// `command` may run up to `max_attempts` times, so it must only decide
    /// events and never act on the outside world.
    pub async fn execute_existing<F>(
        &self,
        aggregate_id: AggregateId,
        max_attempts: u32,
        command: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut attempt = 1;
        loop {
            let Some(aggregate) = self.load_existing(aggregate_id).await? else {
                return Err(DomainError::AggregateNotFound {
                    aggregate_type: A::aggregate_type(),
                    aggregate_id: aggregate_id.to_string(),
                });
            };

            match self.commit(aggregate_id, aggregate, &command).await {
                Err(DomainError::EventStore(e)) if e.is_conflict() && attempt < max_attempts => {
                    metrics::counter!("command_conflict_retries_total", "aggregate" => A::aggregate_type())
                        .increment(1);
                    tracing::debug!(%aggregate_id, attempt, "stream moved underneath command, retrying");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    /// Prepares `events` for appending on top of `aggregate` without writing.
    pub fn stage(
        &self,
        aggregate_id: AggregateId,
        aggregate: &A,
        events: &[A::Event],
    ) -> Result<StreamAppend, DomainError> {
        let loaded = aggregate.version();
        let mut version = loaded;
        let envelopes = events
            .iter()
            .map(|event| {
                version = version.next();
                EventEnvelope::encode(
                    aggregate_id,
                    A::aggregate_type(),
                    version,
                    event.event_type(),
                    event,
                )
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        Ok(StreamAppend::new(envelopes, AppendOptions::after(loaded)))
    }

    async fn commit<F>(
        &self,
        aggregate_id: AggregateId,
        mut aggregate: A,
        command: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let events = command(&aggregate)?;
        if events.is_empty() {
            let new_version = aggregate.version();
            return Ok(CommandResult {
                aggregate,
                events,
                new_version,
            });
        }

        let staged = self.stage(aggregate_id, &aggregate, &events)?;
        let new_version = self.store.append(staged.events, staged.options).await?;

        aggregate.apply_events(events.iter().cloned());
        aggregate.set_version(new_version);
        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Stores a snapshot when `aggregate` sits on its snapshot interval.
    pub async fn snapshot_if_due(
        &self,
        aggregate_id: AggregateId,
        aggregate: &A,
    ) -> Result<(), DomainError> {
        if !aggregate.should_snapshot() {
            return Ok(());
        }
        let snapshot = event_store::Snapshot::capture(
            aggregate_id,
            A::aggregate_type(),
            aggregate.version(),
            aggregate,
        )?;
        self.store.save_snapshot(snapshot).await?;
        tracing::debug!(%aggregate_id, version = %aggregate.version(), "snapshot saved");
        Ok(())
    }
}
