use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::partition::{PartitionArtifacts, Partitioner};

/// Name given to jobs created by the orchestrator.
pub const DEFAULT_JOB_NAME: &str = "PreparePartition";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum JobState {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One partitioning run bound to a graph and an edge filter.
pub struct PreparationJob<P: Partitioner> {
    id: JobId,
    name: String,
    graph: Arc<P::Graph>,
    filter: Arc<P::Filter>,
    state: JobState,
    artifacts: Option<PartitionArtifacts<P>>,
}

impl<P: Partitioner> fmt::Debug for PreparationJob<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparationJob")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("has_artifacts", &self.artifacts.is_some())
            .finish()
    }
}

impl<P: Partitioner> PreparationJob<P> {
    pub fn new(name: impl Into<String>, graph: Arc<P::Graph>, filter: Arc<P::Filter>) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            graph,
            filter,
            state: JobState::Created,
            artifacts: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn graph(&self) -> Arc<P::Graph> {
        Arc::clone(&self.graph)
    }

    pub fn filter(&self) -> Arc<P::Filter> {
        Arc::clone(&self.filter)
    }

    /// Storages this job produced or was given out-of-band.
    pub fn artifacts(&self) -> Option<&PartitionArtifacts<P>> {
        self.artifacts.as_ref()
    }

    /// Back to `Created` after the run that owned it was abandoned.
    pub(crate) fn reset(&mut self) {
        self.state = JobState::Created;
    }

    pub(crate) fn mark_running(&mut self) {
        self.state = JobState::Running;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.state = JobState::Failed;
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.state = JobState::Cancelled;
    }

    pub(crate) fn complete(&mut self, artifacts: PartitionArtifacts<P>) {
        self.artifacts = Some(artifacts);
        self.state = JobState::Completed;
    }
}
