use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::Instrument;
use uuid::Uuid;

use crate::artifacts::ArtifactHandoff;
use crate::config::{ConfigSource, PreparationConfig};
use crate::error::{PrepError, PrepResult};
use crate::events::{PreparationEvent, PreparationEventBus, PreparationEventPayload};
use crate::job::{JobId, JobState, PreparationJob, DEFAULT_JOB_NAME};
use crate::partition::{PartitionArtifacts, PartitionSettings, Partitioner};
use crate::profile::ProfileRegistry;
use crate::properties::{completion_key, format_timestamp, PropertiesStore};
use crate::telemetry;

use super::pool::{PoolState, TaskOutcome, WorkerPool};

type JobResult<P> = anyhow::Result<PartitionArtifacts<P>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OrchestratorState {
    Idle,
    Preparing,
    Completed,
    Failed,
}

/// Owns the preparation jobs, the worker pool that runs them and the
/// storages handed to downstream consumers.
///
/// Every mutating operation takes `&mut self`; share an orchestrator across
/// tasks behind a lock.
pub struct PreparationOrchestrator<P: Partitioner> {
    config: PreparationConfig,
    registry: ProfileRegistry,
    partitioner: Arc<P>,
    pool: WorkerPool,
    jobs: Vec<PreparationJob<P>>,
    handoff: ArtifactHandoff<P::NodeStorage, P::CellStorage>,
    events: PreparationEventBus,
    state: OrchestratorState,
}

impl<P: Partitioner> fmt::Debug for PreparationOrchestrator<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparationOrchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("partitioner_type", &type_name::<P>())
            .field("pool", &self.pool)
            .field("jobs", &self.jobs)
            .field("handoff", &self.handoff)
            .field("state", &self.state)
            .finish()
    }
}

impl<P: Partitioner> PreparationOrchestrator<P> {
    /// # Errors
    ///
    /// Returns [`PrepError::InvalidConfiguration`] when `config` is invalid.
    pub fn new(config: PreparationConfig, partitioner: Arc<P>) -> PrepResult<Self> {
        Self::with_event_bus(config, partitioner, PreparationEventBus::default())
    }

    pub fn with_event_bus(
        config: PreparationConfig,
        partitioner: Arc<P>,
        events: PreparationEventBus,
    ) -> PrepResult<Self> {
        config.validate()?;
        let mut registry = ProfileRegistry::new();
        config.apply(&mut registry)?;
        let pool = WorkerPool::new(config.threads)?;
        telemetry::set_pool_threads(pool.threads());

        Ok(Self {
            config,
            registry,
            partitioner,
            pool,
            jobs: Vec::new(),
            handoff: ArtifactHandoff::new(),
            events,
            state: OrchestratorState::Idle,
        })
    }

    /// Build an orchestrator from external key/value configuration.
    pub fn from_source(source: &dyn ConfigSource, partitioner: Arc<P>) -> PrepResult<Self> {
        Self::new(PreparationConfig::from_source(source)?, partitioner)
    }

    /// Re-read configuration and replace the worker pool.
    ///
    /// Must not be interleaved with a running [`prepare`](Self::prepare).
    pub fn init(&mut self, source: &dyn ConfigSource) -> PrepResult<()> {
        let config = PreparationConfig::from_source(source)?;
        config.apply(&mut self.registry)?;
        let threads = config.threads;
        self.config = config;
        self.set_preparation_threads(threads)
    }

    pub fn config(&self) -> &PreparationConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProfileRegistry {
        &mut self.registry
    }

    pub fn is_enabled(&self) -> bool {
        self.registry.is_enabled()
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn events(&self) -> &PreparationEventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreparationEvent> {
        self.events.subscribe()
    }

    pub fn preparation_threads(&self) -> usize {
        self.pool.threads()
    }

    pub fn pool_state(&self) -> PoolState {
        self.pool.state()
    }

    /// Replace the worker pool with one of `threads` slots.
    ///
    /// Any work still owned by the old pool is interrupted. Jobs left
    /// `Running` by an abandoned [`prepare`](Self::prepare) go back to
    /// `Created` and the orchestrator returns to `Idle`.
    pub fn set_preparation_threads(&mut self, threads: usize) -> PrepResult<()> {
        let pool = WorkerPool::new(threads)?;
        self.pool = pool;
        self.config.threads = threads;
        for job in self.jobs.iter_mut().filter(|job| job.state() == JobState::Running) {
            job.reset();
        }
        if self.state == OrchestratorState::Preparing {
            self.state = OrchestratorState::Idle;
        }
        telemetry::set_pool_threads(threads);
        tracing::debug!(threads, "preparation pool replaced");
        self.publish(None, PreparationEventPayload::PoolResized { threads });
        Ok(())
    }

    pub fn jobs(&self) -> &[PreparationJob<P>] {
        &self.jobs
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Create the preparation job for `graph` and `filter`.
    ///
    /// Does nothing when the feature is disabled or a job already exists.
    pub fn create_job(&mut self, graph: Arc<P::Graph>, filter: Arc<P::Filter>) -> Option<JobId> {
        if !self.is_enabled() {
            tracing::debug!("fast isochrone preparation disabled; no job created");
            return None;
        }
        if !self.jobs.is_empty() {
            return None;
        }
        Some(self.add_job(DEFAULT_JOB_NAME, graph, filter))
    }

    /// Append a job unconditionally.
    pub fn add_job(
        &mut self,
        name: impl Into<String>,
        graph: Arc<P::Graph>,
        filter: Arc<P::Filter>,
    ) -> JobId {
        let job = PreparationJob::new(name, graph, filter);
        let job_id = job.id();
        let name = job.name().to_string();
        self.jobs.push(job);
        tracing::debug!(job_id = %job_id, job_name = %name, "preparation job created");
        self.publish(None, PreparationEventPayload::JobCreated { job_id, name });
        job_id
    }

    /// Mark job `index` as completed out-of-band, e.g. with storages loaded
    /// from a previous run.
    pub fn attach_existing_artifacts(
        &mut self,
        index: usize,
        artifacts: PartitionArtifacts<P>,
    ) -> PrepResult<()> {
        let job = self.jobs.get_mut(index).ok_or(PrepError::NoPreparation)?;
        job.complete(artifacts);
        Ok(())
    }

    /// Hand out the storages of the first job without running it.
    ///
    /// # Errors
    ///
    /// [`PrepError::NoPreparation`] without a job and
    /// [`PrepError::ArtifactUnavailable`] when that job holds no storages.
    pub fn adopt_existing_artifacts(&mut self) -> PrepResult<()> {
        let job = self.jobs.first().ok_or(PrepError::NoPreparation)?;
        let artifacts = job
            .artifacts()
            .cloned()
            .ok_or(PrepError::ArtifactUnavailable)?;
        let job_id = job.id();

        self.handoff.set(artifacts);
        tracing::info!(job_id = %job_id, "adopted existing preparation artifacts");
        self.publish(None, PreparationEventPayload::ArtifactsAdopted { job_id });
        Ok(())
    }

    /// The storage pair most recently produced or adopted.
    pub fn current_artifacts(&self) -> Option<PartitionArtifacts<P>> {
        self.handoff.current()
    }

    pub fn node_storage(&self) -> Option<Arc<P::NodeStorage>> {
        self.handoff.node_storage()
    }

    pub fn cell_storage(&self) -> Option<Arc<P::CellStorage>> {
        self.handoff.cell_storage()
    }

    /// Run every `Created` job on the worker pool and wait for all of them.
    ///
    /// Jobs that already completed, failed or were cancelled are not run
    /// again. The pool is closed once all jobs are submitted, so a second call
    /// needs [`set_preparation_threads`](Self::set_preparation_threads) first.
    ///
    /// The first job that does not succeed ends the call: the pool is aborted
    /// without waiting for the other jobs and the failure of the
    /// earliest-submitted failing job among the tokens received so far is
    /// returned. No storages are handed out. A partitioner already running on
    /// a blocking thread finishes in the background and its result is
    /// discarded.
    ///
    /// Dropping the returned future leaves the orchestrator `Preparing` until
    /// the pool is replaced.
    pub async fn prepare(&mut self, properties: Arc<dyn PropertiesStore>) -> PrepResult<()> {
        if self.pool.state() != PoolState::Open {
            return Err(PrepError::PoolClosed);
        }
        let pending: Vec<usize> = self
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.state() == JobState::Created)
            .map(|(index, _)| index)
            .collect();
        if pending.is_empty() {
            tracing::debug!(jobs = self.jobs.len(), "no preparation jobs to run");
            return Ok(());
        }

        let run_id = Uuid::now_v7();
        let span = telemetry::prepare_span(run_id.to_string(), pending.len(), self.pool.threads());
        self.run(run_id, pending, properties).instrument(span).await
    }

    async fn run(
        &mut self,
        run_id: Uuid,
        pending: Vec<usize>,
        properties: Arc<dyn PropertiesStore>,
    ) -> PrepResult<()> {
        self.state = OrchestratorState::Preparing;
        let settings = PartitionSettings::from(&self.config);
        let (completions, mut tokens) = mpsc::unbounded_channel();

        for &index in &pending {
            let work = self.job_work(index, run_id, &settings, &properties);
            let job = &mut self.jobs[index];
            let (job_id, name) = (job.id(), job.name().to_string());
            job.mark_running();

            let submitted = telemetry::submit_span(&name, self.pool.threads()).in_scope(|| {
                self.events.publish(PreparationEvent::new(
                    Some(run_id),
                    PreparationEventPayload::Submitted {
                        job_id,
                        name: name.clone(),
                    },
                ));
                telemetry::record_job_submitted(&name);
                self.pool.submit(index, work, completions.clone())
            });

            if let Err(err) = submitted {
                self.pool.abort();
                self.state = OrchestratorState::Failed;
                return Err(err);
            }
        }
        drop(completions);
        self.pool.close();

        let mut outcomes: Vec<Option<TaskOutcome<JobResult<P>>>> =
            (0..self.jobs.len()).map(|_| None).collect();
        let mut received = 0;
        let mut failed = false;
        while received < pending.len() {
            let Some(token) = tokens.recv().await else {
                break;
            };
            received += 1;
            if !matches!(token.outcome, TaskOutcome::Finished(Ok(_))) {
                tracing::warn!(
                    job_name = %self.jobs[token.index].name(),
                    "preparation job did not succeed; aborting remaining jobs"
                );
                outcomes[token.index] = Some(token.outcome);
                failed = true;
                break;
            }
            outcomes[token.index] = Some(token.outcome);
        }

        if failed {
            self.pool.abort();
            while let Ok(token) = tokens.try_recv() {
                outcomes[token.index] = Some(token.outcome);
            }
        } else {
            self.pool.join().await;
        }

        let settled = pending
            .iter()
            .map(|&index| (index, outcomes[index].take()))
            .collect();
        self.settle(run_id, settled)
    }

    /// Build the unit of work for job `index`.
    fn job_work(
        &self,
        index: usize,
        run_id: Uuid,
        settings: &PartitionSettings,
        properties: &Arc<dyn PropertiesStore>,
    ) -> impl std::future::Future<Output = JobResult<P>> + Send + 'static {
        let job = &self.jobs[index];
        let job_id = job.id();
        let name = job.name().to_string();
        let graph = job.graph();
        let filter = job.filter();
        let key = completion_key(&self.config.namespace, &name);
        let partitioner = Arc::clone(&self.partitioner);
        let properties = Arc::clone(properties);
        let events = self.events.clone();
        let settings = settings.clone();

        let span_name = name.clone();
        telemetry::instrument_job(job_id.to_string(), span_name, async move {
            events.publish(PreparationEvent::new(
                Some(run_id),
                PreparationEventPayload::Started {
                    job_id,
                    name: name.clone(),
                },
            ));
            tracing::info!("preparation job started");
            let timing = telemetry::record_job_start(&name);

            let result = async move {
                let span = tracing::Span::current();
                let partitioned = tokio::task::spawn_blocking(move || {
                    span.in_scope(|| partitioner.partition(&graph, &filter, &settings))
                })
                .await;
                let artifacts = match partitioned {
                    Ok(result) => result?,
                    Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                    Err(err) => anyhow::bail!("partitioning task ended unexpectedly: {err}"),
                };
                properties.put(&key, format_timestamp(Utc::now()))?;
                Ok::<_, anyhow::Error>(artifacts)
            }
            .await;

            let status = if result.is_ok() {
                JobState::Completed
            } else {
                JobState::Failed
            };
            telemetry::record_job_end(timing, status.as_str());
            result
        })
    }

    /// Fold the completion tokens, in submission order, into job states and
    /// the final result. A missing token means the job was interrupted.
    fn settle(
        &mut self,
        run_id: Uuid,
        outcomes: Vec<(usize, Option<TaskOutcome<JobResult<P>>>)>,
    ) -> PrepResult<()> {
        let mut failure: Option<(String, anyhow::Error)> = None;
        let mut interrupted: Option<String> = None;
        let mut produced = Vec::new();

        for (index, outcome) in outcomes {
            let job = &mut self.jobs[index];
            let job_id = job.id();
            let name = job.name().to_string();

            let payload = match outcome {
                Some(TaskOutcome::Finished(Ok(artifacts))) => {
                    job.complete(artifacts.clone());
                    produced.push(artifacts);
                    PreparationEventPayload::Completed {
                        job_id,
                        name: name.clone(),
                    }
                }
                Some(TaskOutcome::Finished(Err(err))) => {
                    job.mark_failed();
                    let error = format!("{err:#}");
                    if failure.is_none() {
                        failure = Some((name.clone(), err));
                    }
                    PreparationEventPayload::Failed {
                        job_id,
                        name: name.clone(),
                        error,
                    }
                }
                Some(TaskOutcome::Panicked(message)) => {
                    job.mark_failed();
                    if failure.is_none() {
                        failure = Some((
                            name.clone(),
                            anyhow::anyhow!("preparation job panicked: {message}"),
                        ));
                    }
                    PreparationEventPayload::Failed {
                        job_id,
                        name: name.clone(),
                        error: message,
                    }
                }
                Some(TaskOutcome::Cancelled) | None => {
                    job.mark_cancelled();
                    interrupted.get_or_insert_with(|| name.clone());
                    PreparationEventPayload::Cancelled {
                        job_id,
                        name: name.clone(),
                    }
                }
            };

            telemetry::record_job_finished(&name, job.state().as_str());
            self.events
                .publish(PreparationEvent::new(Some(run_id), payload));
        }

        if failure.is_none() {
            if let Some(name) = interrupted {
                failure = Some((
                    name,
                    anyhow::anyhow!("preparation job was interrupted before completing"),
                ));
            }
        }

        if let Some((job, source)) = failure {
            self.state = OrchestratorState::Failed;
            tracing::error!(job_name = %job, error = %format!("{source:#}"), "fast isochrone preparation failed");
            self.publish(
                Some(run_id),
                PreparationEventPayload::PreparationFinished { succeeded: false },
            );
            return Err(PrepError::PreparationFailure { job, source });
        }

        for artifacts in produced {
            self.handoff.set(artifacts);
        }
        self.state = OrchestratorState::Completed;
        tracing::info!(jobs = self.jobs.len(), "fast isochrone preparation finished");
        self.publish(
            Some(run_id),
            PreparationEventPayload::PreparationFinished { succeeded: true },
        );
        Ok(())
    }

    fn publish(&self, run_id: Option<Uuid>, payload: PreparationEventPayload) {
        self.events.publish(PreparationEvent::new(run_id, payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::Artifacts;
    use crate::config::ProfileSelection;
    use crate::properties::{parse_timestamp, InMemoryProperties};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Partitions by echoing the graph name; graphs starting with "bad" fail
    /// and graphs starting with "slow" block for a while.
    #[derive(Default)]
    struct EchoPartitioner {
        runs: AtomicUsize,
    }

    impl EchoPartitioner {
        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    impl Partitioner for EchoPartitioner {
        type Graph = String;
        type Filter = ();
        type NodeStorage = String;
        type CellStorage = usize;

        fn partition(
            &self,
            graph: &String,
            _filter: &(),
            settings: &PartitionSettings,
        ) -> anyhow::Result<Artifacts<String, usize>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if graph.starts_with("bad") {
                anyhow::bail!("cannot partition {graph}");
            }
            if graph.starts_with("slow") {
                std::thread::sleep(Duration::from_millis(300));
            }
            Ok(Artifacts::new(format!("nodes:{graph}"), settings.max_cell_nodes))
        }
    }

    fn enabled_config() -> PreparationConfig {
        PreparationConfig {
            profiles: ProfileSelection::Profiles(vec!["fastest".into()]),
            ..PreparationConfig::default()
        }
    }

    fn orchestrator(config: PreparationConfig) -> PreparationOrchestrator<EchoPartitioner> {
        PreparationOrchestrator::new(config, Arc::new(EchoPartitioner::default())).unwrap()
    }

    #[test]
    fn create_job_requires_enabled_feature() {
        let mut orchestrator = orchestrator(PreparationConfig::default());
        assert!(!orchestrator.is_enabled());
        assert!(orchestrator
            .create_job(Arc::new("graph".into()), Arc::new(()))
            .is_none());
        assert_eq!(orchestrator.job_count(), 0);
    }

    #[test]
    fn create_job_only_once() {
        let mut orchestrator = orchestrator(enabled_config());
        let first = orchestrator.create_job(Arc::new("graph".into()), Arc::new(()));
        let second = orchestrator.create_job(Arc::new("other".into()), Arc::new(()));

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(orchestrator.job_count(), 1);
        assert_eq!(orchestrator.jobs()[0].name(), DEFAULT_JOB_NAME);
        assert_eq!(orchestrator.jobs()[0].state(), JobState::Created);
    }

    #[tokio::test]
    async fn prepare_hands_off_artifacts_and_records_completion() {
        let mut orchestrator = orchestrator(enabled_config());
        orchestrator.create_job(Arc::new("berlin".into()), Arc::new(()));
        let properties = Arc::new(InMemoryProperties::new());

        orchestrator.prepare(properties.clone()).await.unwrap();

        assert_eq!(orchestrator.state(), OrchestratorState::Completed);
        assert_eq!(orchestrator.pool_state(), PoolState::Closed);
        let artifacts = orchestrator.current_artifacts().unwrap();
        assert_eq!(artifacts.node_storage.as_str(), "nodes:berlin");
        assert_eq!(*artifacts.cell_storage, crate::config::DEFAULT_MAX_CELL_NODES);

        assert_eq!(properties.len(), 1);
        let stamp = properties
            .get("prepare.fastisochrone.date.PreparePartition")
            .unwrap();
        assert!(parse_timestamp(&stamp).is_some());
        assert_eq!(orchestrator.jobs()[0].state(), JobState::Completed);
    }

    #[tokio::test]
    async fn failed_prepare_exposes_nothing() {
        let mut orchestrator = orchestrator(enabled_config());
        orchestrator.create_job(Arc::new("bad-graph".into()), Arc::new(()));
        let properties = Arc::new(InMemoryProperties::new());

        let err = orchestrator.prepare(properties.clone()).await.unwrap_err();
        match err {
            PrepError::PreparationFailure { job, source } => {
                assert_eq!(job, DEFAULT_JOB_NAME);
                assert!(source.to_string().contains("bad-graph"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        assert_eq!(orchestrator.state(), OrchestratorState::Failed);
        assert_eq!(orchestrator.pool_state(), PoolState::Terminated);
        assert!(orchestrator.current_artifacts().is_none());
        assert!(properties.is_empty());
        assert_eq!(orchestrator.jobs()[0].state(), JobState::Failed);
    }

    #[tokio::test]
    async fn second_prepare_needs_new_pool() {
        let mut orchestrator = orchestrator(enabled_config());
        orchestrator.create_job(Arc::new("graph".into()), Arc::new(()));
        let properties: Arc<dyn PropertiesStore> = Arc::new(InMemoryProperties::new());

        orchestrator.prepare(Arc::clone(&properties)).await.unwrap();
        assert!(matches!(
            orchestrator.prepare(Arc::clone(&properties)).await,
            Err(PrepError::PoolClosed)
        ));

        orchestrator.set_preparation_threads(2).unwrap();
        assert_eq!(orchestrator.preparation_threads(), 2);
        orchestrator.prepare(properties).await.unwrap();
    }

    #[tokio::test]
    async fn completed_jobs_are_not_partitioned_again() {
        let partitioner = Arc::new(EchoPartitioner::default());
        let mut orchestrator =
            PreparationOrchestrator::new(enabled_config(), Arc::clone(&partitioner)).unwrap();
        orchestrator.create_job(Arc::new("berlin".into()), Arc::new(()));
        let properties: Arc<dyn PropertiesStore> = Arc::new(InMemoryProperties::new());

        orchestrator.prepare(Arc::clone(&properties)).await.unwrap();
        orchestrator.set_preparation_threads(1).unwrap();
        orchestrator.prepare(Arc::clone(&properties)).await.unwrap();
        assert_eq!(partitioner.runs(), 1);

        orchestrator.add_job("PrepareHamburg", Arc::new("hamburg".into()), Arc::new(()));
        orchestrator.set_preparation_threads(1).unwrap();
        orchestrator.prepare(properties).await.unwrap();

        assert_eq!(partitioner.runs(), 2);
        let artifacts = orchestrator.current_artifacts().unwrap();
        assert_eq!(artifacts.node_storage.as_str(), "nodes:hamburg");
    }

    #[tokio::test]
    async fn attached_jobs_are_not_partitioned() {
        let partitioner = Arc::new(EchoPartitioner::default());
        let mut orchestrator =
            PreparationOrchestrator::new(enabled_config(), Arc::clone(&partitioner)).unwrap();
        orchestrator.create_job(Arc::new("berlin".into()), Arc::new(()));
        orchestrator
            .attach_existing_artifacts(0, Artifacts::new("loaded".to_string(), 7))
            .unwrap();

        orchestrator
            .prepare(Arc::new(InMemoryProperties::new()))
            .await
            .unwrap();

        assert_eq!(partitioner.runs(), 0);
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn abandoned_prepare_is_reset_with_new_pool() {
        let mut orchestrator = orchestrator(enabled_config());
        orchestrator.create_job(Arc::new("slow-graph".into()), Arc::new(()));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            orchestrator.prepare(Arc::new(InMemoryProperties::new())),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(orchestrator.state(), OrchestratorState::Preparing);
        assert_eq!(orchestrator.jobs()[0].state(), JobState::Running);

        orchestrator.set_preparation_threads(1).unwrap();

        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert_eq!(orchestrator.jobs()[0].state(), JobState::Created);
        assert_eq!(orchestrator.pool_state(), PoolState::Open);
    }

    #[tokio::test]
    async fn prepare_without_jobs_is_a_no_op() {
        let mut orchestrator = orchestrator(PreparationConfig::default());
        orchestrator
            .prepare(Arc::new(InMemoryProperties::new()))
            .await
            .unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert_eq!(orchestrator.pool_state(), PoolState::Open);
    }

    #[test]
    fn adopt_existing_artifacts() {
        let mut orchestrator = orchestrator(enabled_config());
        assert!(matches!(
            orchestrator.adopt_existing_artifacts(),
            Err(PrepError::NoPreparation)
        ));

        orchestrator.create_job(Arc::new("graph".into()), Arc::new(()));
        assert!(matches!(
            orchestrator.adopt_existing_artifacts(),
            Err(PrepError::ArtifactUnavailable)
        ));

        orchestrator
            .attach_existing_artifacts(0, Artifacts::new("loaded".to_string(), 7))
            .unwrap();
        orchestrator.adopt_existing_artifacts().unwrap();

        assert_eq!(orchestrator.node_storage().as_deref().map(String::as_str), Some("loaded"));
        assert_eq!(orchestrator.cell_storage().as_deref(), Some(&7));
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[test]
    fn zero_threads_rejected() {
        let mut orchestrator = orchestrator(enabled_config());
        let err = orchestrator.set_preparation_threads(0).unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(orchestrator.preparation_threads(), 1);

        let config = PreparationConfig {
            threads: 0,
            ..PreparationConfig::default()
        };
        assert!(PreparationOrchestrator::new(config, Arc::new(EchoPartitioner::default())).is_err());
    }

    #[test]
    fn init_reads_source_and_replaces_pool() {
        use crate::config::{MapConfigSource, INIT_DISABLING_ALLOWED_KEY};

        let mut orchestrator = orchestrator(PreparationConfig::default());
        let source = MapConfigSource::new()
            .with("prepare.fastisochrone.threads", 3)
            .with("prepare.fastisochrone.weightings", "Fastest,Shortest")
            .with(INIT_DISABLING_ALLOWED_KEY, false);

        orchestrator.init(&source).unwrap();

        assert!(orchestrator.is_enabled());
        assert!(!orchestrator.registry().is_disabling_allowed());
        assert_eq!(orchestrator.preparation_threads(), 3);
        assert_eq!(orchestrator.config().max_thread_count, 3);
    }

    #[test]
    fn earliest_submitted_failure_is_reported() {
        let mut orchestrator = orchestrator(enabled_config());
        orchestrator.add_job("first", Arc::new("a".into()), Arc::new(()));
        orchestrator.add_job("second", Arc::new("b".into()), Arc::new(()));
        orchestrator.add_job("third", Arc::new("c".into()), Arc::new(()));

        let outcomes = vec![
            (0, Some(TaskOutcome::Cancelled)),
            (1, Some(TaskOutcome::Finished(Err(anyhow::anyhow!("second broke"))))),
            (2, Some(TaskOutcome::Finished(Err(anyhow::anyhow!("third broke"))))),
        ];
        let err = orchestrator.settle(Uuid::nil(), outcomes).unwrap_err();

        match err {
            PrepError::PreparationFailure { job, source } => {
                assert_eq!(job, "second");
                assert_eq!(source.to_string(), "second broke");
            }
            other => panic!("unexpected error {other:?}"),
        }
        let states: Vec<_> = orchestrator.jobs().iter().map(|job| job.state()).collect();
        assert_eq!(
            states,
            vec![JobState::Cancelled, JobState::Failed, JobState::Failed]
        );
    }

    #[test]
    fn interruption_alone_counts_as_failure() {
        let mut orchestrator = orchestrator(enabled_config());
        orchestrator.add_job("first", Arc::new("a".into()), Arc::new(()));
        orchestrator.add_job("second", Arc::new("b".into()), Arc::new(()));

        let outcomes = vec![
            (0, Some(TaskOutcome::Finished(Ok(Artifacts::new("a".to_string(), 1))))),
            (1, None),
        ];
        let err = orchestrator.settle(Uuid::nil(), outcomes).unwrap_err();

        assert!(matches!(err, PrepError::PreparationFailure { ref job, .. } if job == "second"));
        assert!(orchestrator.current_artifacts().is_none());
        assert_eq!(orchestrator.jobs()[0].state(), JobState::Completed);
    }

    #[test]
    fn builder_requires_partitioner() {
        let err = crate::runtime::PreparationOrchestratorBuilder::<EchoPartitioner>::new()
            .with_profiles(["fastest"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("partitioner dependency missing"));

        let orchestrator = crate::runtime::PreparationOrchestratorBuilder::new()
            .with_partitioner(Arc::new(EchoPartitioner::default()))
            .with_threads(4)
            .with_max_cell_nodes(100)
            .with_profiles(["Fastest"])
            .with_namespace("prepare.custom.")
            .build()
            .unwrap();
        assert_eq!(orchestrator.preparation_threads(), 4);
        assert_eq!(orchestrator.config().max_cell_nodes, 100);
        assert_eq!(orchestrator.config().namespace, "prepare.custom.");
        assert!(orchestrator.registry().contains("fastest"));
    }
}
