use isoprep::PartitionSettings;
use serde::{Deserialize, Serialize};

/// Stand-in routing graph. The variant decides how [`MockPartitioner`]
/// treats it; delays block the partitioning thread.
///
/// [`MockPartitioner`]: crate::MockPartitioner
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TestGraph {
    Simple { name: String },
    Slow { name: String, duration_ms: u64 },
    Failing { name: String, error: String },
    FailingAfter {
        name: String,
        delay_ms: u64,
        error: String,
    },
    Panicking { name: String },
}

impl TestGraph {
    pub fn simple(name: &str) -> Self {
        TestGraph::Simple { name: name.into() }
    }

    pub fn slow(name: &str, duration_ms: u64) -> Self {
        TestGraph::Slow {
            name: name.into(),
            duration_ms,
        }
    }

    pub fn failing(name: &str, error: &str) -> Self {
        TestGraph::Failing {
            name: name.into(),
            error: error.into(),
        }
    }

    pub fn failing_after(name: &str, delay_ms: u64, error: &str) -> Self {
        TestGraph::FailingAfter {
            name: name.into(),
            delay_ms,
            error: error.into(),
        }
    }

    pub fn panicking(name: &str) -> Self {
        TestGraph::Panicking { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            TestGraph::Simple { name }
            | TestGraph::Slow { name, .. }
            | TestGraph::Failing { name, .. }
            | TestGraph::FailingAfter { name, .. }
            | TestGraph::Panicking { name } => name,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFilter {
    pub name: String,
}

impl TestFilter {
    pub fn new(name: &str) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestNodeStorage {
    pub graph: String,
    pub filter: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCellStorage {
    pub graph: String,
    pub settings: PartitionSettings,
}
