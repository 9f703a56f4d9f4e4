use serde::{Deserialize, Serialize};

use crate::artifacts::Artifacts;
use crate::config::PreparationConfig;

/// Settings forwarded untouched to every partitioning run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSettings {
    /// Maximum number of nodes per cell.
    pub max_cell_nodes: usize,
    /// Upper bound on threads the partitioner itself may use.
    pub max_thread_count: usize,
}

impl From<&PreparationConfig> for PartitionSettings {
    fn from(config: &PreparationConfig) -> Self {
        Self {
            max_cell_nodes: config.max_cell_nodes,
            max_thread_count: config.max_thread_count,
        }
    }
}

/// Computes the fast-isochrone partitioning of a routing graph.
///
/// The orchestrator treats every associated type as opaque: it only moves
/// graphs and filters into jobs and hands the produced storages downstream.
///
/// `partition` is synchronous and may block for minutes. Each call runs on
/// tokio's blocking thread pool, never on an async worker.
pub trait Partitioner: Send + Sync + 'static {
    /// Routing graph the partitioning is computed on.
    type Graph: Send + Sync + 'static;
    /// Edge filter restricting which edges take part.
    type Filter: Send + Sync + 'static;
    type NodeStorage: Send + Sync + 'static;
    type CellStorage: Send + Sync + 'static;

    /// Run one preparation to completion.
    fn partition(
        &self,
        graph: &Self::Graph,
        filter: &Self::Filter,
        settings: &PartitionSettings,
    ) -> anyhow::Result<Artifacts<Self::NodeStorage, Self::CellStorage>>;
}

/// Storage pair produced by a given partitioner.
pub type PartitionArtifacts<P> =
    Artifacts<<P as Partitioner>::NodeStorage, <P as Partitioner>::CellStorage>;
