/// Builder for constructing orchestrator instances.
pub mod builder;
/// Preparation orchestrator owning jobs, pool and artifact handoff.
pub mod orchestrator;
/// Bounded worker pool and shutdown signaling.
pub mod pool;

pub use builder::PreparationOrchestratorBuilder;
pub use orchestrator::{OrchestratorState, PreparationOrchestrator};
pub use pool::{CompletionToken, PoolState, ShutdownToken, TaskOutcome, WorkerPool};
