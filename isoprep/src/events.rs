use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::job::JobId;

/// Metadata envelope attached to every preparation event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMeta {
    pub version: u16,
    /// Identifies the `prepare()` call an event belongs to; nil outside of one.
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(run_id: Option<Uuid>) -> Self {
        Self {
            version: 1,
            run_id: run_id.unwrap_or_else(Uuid::nil),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreparationEvent {
    pub meta: EventMeta,
    pub payload: PreparationEventPayload,
}

impl PreparationEvent {
    pub fn new(run_id: Option<Uuid>, payload: PreparationEventPayload) -> Self {
        Self {
            meta: EventMeta::new(run_id),
            payload,
        }
    }
}

/// Lifecycle transitions of the orchestrator and its jobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PreparationEventPayload {
    /// A job was appended to the job list.
    JobCreated { job_id: JobId, name: String },
    /// A job was handed to the worker pool.
    Submitted { job_id: JobId, name: String },
    /// A job obtained a pool slot and began partitioning.
    Started { job_id: JobId, name: String },
    /// A job finished and its completion record was written.
    Completed { job_id: JobId, name: String },
    /// A job raised an error.
    Failed {
        job_id: JobId,
        name: String,
        error: String,
    },
    /// A job was interrupted by pool termination.
    Cancelled { job_id: JobId, name: String },
    /// Storages of a job were adopted without running it.
    ArtifactsAdopted { job_id: JobId },
    /// The worker pool was replaced.
    PoolResized { threads: usize },
    /// A `prepare()` call returned.
    PreparationFinished { succeeded: bool },
}

/// In-process broadcast bus for [`PreparationEvent`]s.
///
/// Publishing never blocks; events are dropped when nobody listens and slow
/// subscribers observe `RecvError::Lagged`.
#[derive(Clone)]
pub struct PreparationEventBus {
    sender: broadcast::Sender<PreparationEvent>,
    capacity: usize,
}

impl std::fmt::Debug for PreparationEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparationEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl Default for PreparationEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl PreparationEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: PreparationEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreparationEvent> {
        self.sender.subscribe()
    }
}
