use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use isoprep::*;
use parking_lot::Mutex;

use crate::{TestCellStorage, TestFilter, TestGraph, TestNodeStorage};

/// Partitioner whose behavior is scripted by the [`TestGraph`] variant.
#[derive(Clone, Default)]
pub struct MockPartitioner {
    runs: Arc<Mutex<Vec<PartitionRecord>>>,
    finished: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[derive(Clone, Debug)]
pub struct PartitionRecord {
    pub graph: String,
    pub filter: String,
    pub settings: PartitionSettings,
}

/// Decrements the active counter even when the run panics.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockPartitioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every run that was started, in start order.
    pub fn record(&self) -> Vec<PartitionRecord> {
        self.runs.lock().clone()
    }

    pub fn started(&self) -> usize {
        self.runs.lock().len()
    }

    /// Runs that returned, successfully or not.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Highest number of runs observed at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn assert_started_eq(&self, expected: usize) {
        assert_eq!(
            self.started(),
            expected,
            "Expected {} partitioning runs, got {}",
            expected,
            self.started()
        );
    }

    pub fn clear(&self) {
        self.runs.lock().clear();
        self.finished.store(0, Ordering::SeqCst);
        self.peak.store(0, Ordering::SeqCst);
    }
}

impl Partitioner for MockPartitioner {
    type Graph = TestGraph;
    type Filter = TestFilter;
    type NodeStorage = TestNodeStorage;
    type CellStorage = TestCellStorage;

    fn partition(
        &self,
        graph: &TestGraph,
        filter: &TestFilter,
        settings: &PartitionSettings,
    ) -> anyhow::Result<Artifacts<TestNodeStorage, TestCellStorage>> {
        self.runs.lock().push(PartitionRecord {
            graph: graph.name().to_string(),
            filter: filter.name.clone(),
            settings: settings.clone(),
        });
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _active = ActiveGuard(Arc::clone(&self.active));

        let result = match graph {
            TestGraph::Simple { .. } => Ok(()),
            TestGraph::Slow { duration_ms, .. } => {
                std::thread::sleep(Duration::from_millis(*duration_ms));
                Ok(())
            }
            TestGraph::Failing { error, .. } => Err(anyhow::anyhow!(error.clone())),
            TestGraph::FailingAfter {
                delay_ms, error, ..
            } => {
                std::thread::sleep(Duration::from_millis(*delay_ms));
                Err(anyhow::anyhow!(error.clone()))
            }
            TestGraph::Panicking { name } => panic!("partitioning {name} panicked"),
        };
        self.finished.fetch_add(1, Ordering::SeqCst);

        result.map(|()| {
            Artifacts::new(
                TestNodeStorage {
                    graph: graph.name().to_string(),
                    filter: filter.name.clone(),
                },
                TestCellStorage {
                    graph: graph.name().to_string(),
                    settings: settings.clone(),
                },
            )
        })
    }
}
