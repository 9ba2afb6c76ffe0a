//! The projection trait and the checkpoint kept for each projection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_store::EventEnvelope;

use crate::Result;

/// How far the processor has fed one projection through the global stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checkpoint {
    /// Global position of the last event offered to the projection.
    pub position: u64,
    /// Events the projection applied; the others were for other aggregates.
    pub events_applied: u64,
    /// Timestamp of the last applied event.
    pub last_applied_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub(crate) fn applied(self, position: u64, at: DateTime<Utc>) -> Self {
        Self {
            position,
            events_applied: self.events_applied + 1,
            last_applied_at: Some(at),
        }
    }

    pub(crate) fn skipped(self, position: u64) -> Self {
        Self { position, ..self }
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at {}, applied {}", self.position, self.events_applied)
    }
}

/// Turns events into a query-side view.
///
/// The processor only calls [`apply`](Projection::apply) for events whose
/// aggregate type the projection [`handles`](Projection::handles), in global
/// order and at most once between resets.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether events of `aggregate_type` feed this view.
    fn handles(&self, aggregate_type: &str) -> bool;

    async fn apply(&self, event: &EventEnvelope) -> Result<()>;

    /// Clears the view before a rebuild.
    async fn reset(&self) -> Result<()>;
}
