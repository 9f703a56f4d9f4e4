//! isoprep - preparation orchestrator for fast isochrones.
//!
//! Configures, schedules and supervises the graph partitioning runs that
//! speed up isochrone queries, then hands the resulting node and cell
//! storages to downstream consumers. The partitioning itself is supplied by
//! the caller through the [`Partitioner`] trait.
//!
//! # Core Concepts
//!
//! - **Profiles**: [`ProfileRegistry`] holds the normalized profile names and
//!   derives whether the feature is enabled.
//!
//! - **Jobs**: a [`PreparationJob`] binds one graph and one edge filter.
//!
//! - **Runtime**: [`PreparationOrchestrator`] runs jobs on a bounded
//!   [`WorkerPool`], waits for all of them and stops everything on the first
//!   failure.
//!
//! - **Handoff**: [`ArtifactHandoff`] exposes the storages of the last
//!   successful preparation.
//!
//! - **Events**: [`PreparationEventBus`] broadcasts lifecycle transitions.
//!
//! # Feature Flags
//!
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use isoprep::*;
//!
//! let mut orchestrator = PreparationOrchestratorBuilder::new()
//!     .with_partitioner(Arc::new(MyPartitioner))
//!     .with_profiles(["fastest"])
//!     .build()?;
//! orchestrator.create_job(Arc::new(graph), Arc::new(filter));
//! orchestrator.prepare(Arc::new(InMemoryProperties::new())).await?;
//! let storages = orchestrator.current_artifacts();
//! ```

/// Storage pairs and the handoff slots exposing them.
pub mod artifacts;

/// Configuration sources and the preparation settings read from them.
///
/// [`PreparationConfig::from_source`] translates external key/value settings
/// into typed values; [`PreparationConfig::apply`] derives the feature state.
pub mod config;

/// Error taxonomy of the crate.
pub mod error;

/// Preparation lifecycle events and the in-process [`PreparationEventBus`].
pub mod events;

/// Preparation job definitions: [`JobId`], [`JobState`], [`PreparationJob`].
pub mod job;

/// Prometheus metrics, compiled with the `metrics` feature.
pub mod metrics;

/// The [`Partitioner`] collaborator trait and its settings.
pub mod partition;

/// Profile names and feature switches.
pub mod profile;

/// Properties store receiving completion records.
pub mod properties;

/// Runtime orchestration: orchestrator, builder and worker pool.
pub mod runtime;

/// Tracing spans and metric recording helpers.
pub mod telemetry;

pub use artifacts::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use job::*;
pub use partition::*;
pub use profile::*;
pub use properties::*;
pub use runtime::{
    OrchestratorState, PoolState, PreparationOrchestrator, PreparationOrchestratorBuilder,
    ShutdownToken, WorkerPool,
};
