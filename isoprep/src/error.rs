use thiserror::Error;

/// Errors raised by the preparation orchestrator and its configuration surface.
#[derive(Debug, Error)]
pub enum PrepError {
    /// Configuration was rejected before any work was scheduled.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A submitted preparation job failed. The pool has been terminated.
    #[error("preparation job '{job}' failed: {source:#}")]
    PreparationFailure {
        /// Name of the earliest-submitted job that failed.
        job: String,
        /// The original cause reported by the job.
        #[source]
        source: anyhow::Error,
    },

    /// No node/cell storage pair is available.
    #[error("no preparation artifacts are available")]
    ArtifactUnavailable,

    /// The operation needs a preparation job but none has been created.
    #[error("no preparation job has been created")]
    NoPreparation,

    /// The worker pool no longer accepts submissions.
    #[error("worker pool is closed; reconfigure the preparation threads before preparing again")]
    PoolClosed,
}

impl PrepError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Whether the caller can fix this error by supplying different input.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::InvalidConfiguration(_))
    }
}

pub type PrepResult<T> = Result<T, PrepError>;
