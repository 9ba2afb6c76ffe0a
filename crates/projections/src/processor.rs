//! Feeds the global event stream to registered projections.

use event_store::EventStore;
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::error::{ProjectionError, Result};
use crate::projection::{Checkpoint, Projection};

/// Totals of one catch-up run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatchUpReport {
    /// Events read from the global stream.
    pub events_scanned: u64,
    /// Deliveries to projections, summed over projections.
    pub events_applied: u64,
}

/// Replays the global stream into projections.
///
/// Each projection's checkpoint holds the global position of the last event
/// it was offered. A catch-up reads only after the lowest checkpoint and
/// offers each projection the events past its own, so an event is applied at
/// most once between resets. Runs are serialized; a second caller waits for
/// the first to finish and then finds little left to do.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    checkpoints: Mutex<Vec<Checkpoint>>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            checkpoints: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
        self.checkpoints.get_mut().push(Checkpoint::default());
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Checkpoint of the projection registered under `name`.
    pub async fn checkpoint(&self, name: &str) -> Option<Checkpoint> {
        let checkpoints = self.checkpoints.lock().await;
        self.projections
            .iter()
            .position(|p| p.name() == name)
            .map(|i| checkpoints[i])
    }

    /// Delivers every event no projection has seen yet.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<CatchUpReport> {
        let mut checkpoints = self.checkpoints.lock().await;
        self.catch_up(&mut checkpoints).await
    }

    /// Clears every projection and replays the whole stream.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<CatchUpReport> {
        let mut checkpoints = self.checkpoints.lock().await;
        for (projection, checkpoint) in self.projections.iter().zip(checkpoints.iter_mut()) {
            projection.reset().await?;
            *checkpoint = Checkpoint::default();
        }
        tracing::info!(projections = self.projections.len(), "projections reset");
        self.catch_up(&mut checkpoints).await
    }

    async fn catch_up(&self, checkpoints: &mut [Checkpoint]) -> Result<CatchUpReport> {
        let from = checkpoints.iter().map(|c| c.position).min().unwrap_or(0);
        let mut stream = self.store.stream_events_after(from).await?;
        let mut report = CatchUpReport::default();

        while let Some(event) = stream.next().await {
            let event = event?;
            report.events_scanned += 1;
            let position = event.position;

            for (projection, checkpoint) in self.projections.iter().zip(checkpoints.iter_mut()) {
                if checkpoint.position >= position {
                    continue;
                }
                if !projection.handles(&event.aggregate_type) {
                    *checkpoint = checkpoint.skipped(position);
                    continue;
                }

                projection
                    .apply(&event)
                    .await
                    .map_err(|e| ProjectionError::Apply {
                        projection: projection.name(),
                        event_type: event.event_type.clone(),
                        position,
                        source: Box::new(e),
                    })?;
                *checkpoint = checkpoint.applied(position, event.timestamp);
                report.events_applied += 1;
                metrics::counter!(
                    "projection_events_processed_total",
                    "projection" => projection.name()
                )
                .increment(1);
            }
        }

        if report.events_applied > 0 {
            tracing::info!(
                scanned = report.events_scanned,
                applied = report.events_applied,
                "catch-up complete"
            );
        }
        Ok(report)
    }
}
