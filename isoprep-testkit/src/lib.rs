//! Test doubles for isoprep: a scripted partitioner, stand-in graph and
//! storage types, and a properties store that rejects writes.

mod graph;
mod mock;
mod properties;

pub use graph::{TestCellStorage, TestFilter, TestGraph, TestNodeStorage};
pub use mock::{MockPartitioner, PartitionRecord};
pub use properties::FailingProperties;
