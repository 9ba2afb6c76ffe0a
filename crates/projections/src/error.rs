//! Projection error types.

use event_store::EventStoreError;
use thiserror::Error;

/// Errors raised while feeding events to read models.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// The payload does not match the event type it claims to be.
    #[error("Unreadable event payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// A projection rejected an event. Catch-up stops at that event and
    /// resumes from it on the next run.
    #[error("{projection} failed on {event_type} at position {position}: {source}")]
    Apply {
        projection: &'static str,
        event_type: String,
        position: u64,
        source: Box<ProjectionError>,
    },
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
