//! Traits shared by the order and promo code aggregates.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// A fact recorded on a stream, stored as JSON under its `event_type`.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Name written to the event log; must not change once events exist.
    fn event_type(&self) -> &'static str;
}

/// State rebuilt by folding a stream's events in version order.
///
/// Business rules live in methods that inspect the state and return new
/// events (or an error); `apply` only folds an already accepted event and
/// therefore cannot fail.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;
    type Error: std::error::Error + Send + Sync;

    /// Stream category, also used to route events to read models.
    fn aggregate_type() -> &'static str;

    /// `None` until the creating event has been applied.
    fn id(&self) -> Option<AggregateId>;

    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        events.into_iter().for_each(|event| self.apply(event));
    }
}

/// Aggregates with long streams, such as a popular promo code, whose state
/// is saved every `snapshot_interval` versions so loads skip the replay.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    fn snapshot_interval() -> usize {
        100
    }

    fn should_snapshot(&self) -> bool {
        let version = self.version().as_i64();
        version > 0 && (version as usize).is_multiple_of(Self::snapshot_interval())
    }
}
