//! Append-only event storage for the order and promo code streams.
//!
//! Two backends implement [`EventStore`]: [`InMemoryEventStore`] for tests and
//! local runs, and [`PostgresEventStore`] for production. Both support
//! appending to several streams in one atomic unit via
//! [`EventStore::append_streams`].

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream, StreamAppend};
