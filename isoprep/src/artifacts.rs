use std::fmt;
use std::sync::Arc;

/// A node storage / cell storage pair produced by one partitioning run.
///
/// Both halves are shared handles; cloning the pair never copies storage.
pub struct Artifacts<N, C> {
    pub node_storage: Arc<N>,
    pub cell_storage: Arc<C>,
}

impl<N, C> Artifacts<N, C> {
    pub fn new(node_storage: N, cell_storage: C) -> Self {
        Self {
            node_storage: Arc::new(node_storage),
            cell_storage: Arc::new(cell_storage),
        }
    }

    pub fn from_shared(node_storage: Arc<N>, cell_storage: Arc<C>) -> Self {
        Self {
            node_storage,
            cell_storage,
        }
    }
}

impl<N, C> Clone for Artifacts<N, C> {
    fn clone(&self) -> Self {
        Self {
            node_storage: Arc::clone(&self.node_storage),
            cell_storage: Arc::clone(&self.cell_storage),
        }
    }
}

impl<N, C> fmt::Debug for Artifacts<N, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifacts")
            .field("node_storage", &std::any::type_name::<N>())
            .field("cell_storage", &std::any::type_name::<C>())
            .finish()
    }
}

/// Slots holding the storages most recently handed to downstream consumers.
///
/// Whatever was set last wins; nothing is validated and no history is kept.
pub struct ArtifactHandoff<N, C> {
    node_storage: Option<Arc<N>>,
    cell_storage: Option<Arc<C>>,
}

impl<N, C> Default for ArtifactHandoff<N, C> {
    fn default() -> Self {
        Self {
            node_storage: None,
            cell_storage: None,
        }
    }
}

impl<N, C> fmt::Debug for ArtifactHandoff<N, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactHandoff")
            .field("node_storage_set", &self.node_storage.is_some())
            .field("cell_storage_set", &self.cell_storage.is_some())
            .finish()
    }
}

impl<N, C> ArtifactHandoff<N, C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, artifacts: Artifacts<N, C>) {
        self.node_storage = Some(artifacts.node_storage);
        self.cell_storage = Some(artifacts.cell_storage);
    }

    pub fn set_node_storage(&mut self, node_storage: Arc<N>) {
        self.node_storage = Some(node_storage);
    }

    pub fn set_cell_storage(&mut self, cell_storage: Arc<C>) {
        self.cell_storage = Some(cell_storage);
    }

    pub fn node_storage(&self) -> Option<Arc<N>> {
        self.node_storage.clone()
    }

    pub fn cell_storage(&self) -> Option<Arc<C>> {
        self.cell_storage.clone()
    }

    /// The stored pair, if both halves have been set.
    pub fn current(&self) -> Option<Artifacts<N, C>> {
        match (&self.node_storage, &self.cell_storage) {
            (Some(nodes), Some(cells)) => {
                Some(Artifacts::from_shared(Arc::clone(nodes), Arc::clone(cells)))
            }
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.node_storage.is_some() && self.cell_storage.is_some()
    }
}
