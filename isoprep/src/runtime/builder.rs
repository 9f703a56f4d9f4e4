use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use crate::config::{ConfigSource, PreparationConfig, ProfileSelection};
use crate::events::PreparationEventBus;
use crate::partition::Partitioner;

use super::orchestrator::PreparationOrchestrator;

/// Builder for constructing a [`PreparationOrchestrator`] with explicit
/// dependencies.
///
/// # Example
///
/// ```ignore
/// use isoprep::runtime::PreparationOrchestratorBuilder;
///
/// let orchestrator = PreparationOrchestratorBuilder::new()
///     .with_partitioner(partitioner)
///     .with_threads(2)
///     .with_profiles(["fastest"])
///     .build()?;
/// ```
pub struct PreparationOrchestratorBuilder<P: Partitioner> {
    config: PreparationConfig,
    partitioner: Option<Arc<P>>,
    events: Option<PreparationEventBus>,
}

impl<P: Partitioner> fmt::Debug for PreparationOrchestratorBuilder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("PreparationOrchestratorBuilder");
        debug.field("config", &self.config);
        debug.field("partitioner_set", &self.partitioner.is_some());
        debug.field("events_set", &self.events.is_some());

        if self.partitioner.is_some() {
            debug.field("partitioner_type", &type_name::<P>());
        }

        debug.finish()
    }
}

impl<P: Partitioner> Default for PreparationOrchestratorBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Partitioner> PreparationOrchestratorBuilder<P> {
    pub fn new() -> Self {
        Self {
            config: PreparationConfig::default(),
            partitioner: None,
            events: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: PreparationConfig) -> Self {
        self.config = config;
        self
    }

    /// Read the configuration from an external source.
    pub fn with_source(mut self, source: &dyn ConfigSource) -> anyhow::Result<Self> {
        self.config = PreparationConfig::from_source(source)?;
        Ok(self)
    }

    pub fn with_partitioner(mut self, partitioner: Arc<P>) -> Self {
        self.partitioner = Some(partitioner);
        self
    }

    pub fn with_events(mut self, events: PreparationEventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    pub fn with_max_cell_nodes(mut self, max_cell_nodes: usize) -> Self {
        self.config.max_cell_nodes = max_cell_nodes;
        self
    }

    pub fn with_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.profiles =
            ProfileSelection::Profiles(profiles.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_disabling_allowed(mut self, allowed: bool) -> Self {
        self.config.disabling_allowed = Some(allowed);
        self
    }

    /// Prefix of the completion record keys.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// # Errors
    ///
    /// Returns an error if the partitioner is missing or the configuration
    /// is invalid.
    pub fn build(self) -> anyhow::Result<PreparationOrchestrator<P>> {
        let partitioner = self
            .partitioner
            .ok_or_else(|| anyhow::anyhow!("partitioner dependency missing"))?;
        let events = self.events.unwrap_or_default();

        Ok(PreparationOrchestrator::with_event_bus(
            self.config,
            partitioner,
            events,
        )?)
    }
}
