//! # Orchestration System Bootstrap
//!
//! Wires the whole engine together from injected collaborators: repository,
//! job store, target registry, and credential resolver come from the
//! embedding application; the dispatch queue, orchestrator, reaper, and
//! health monitor are constructed here and share one event publisher.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::action_runner::ActionRunner;
use super::branch_coordinator::BranchCoordinator;
use super::errors::{OrchestrationError, OrchestrationResult};
use super::orchestrator::Orchestrator;
use crate::config::FleetConfig;
use crate::connection::{ConnectionExecutor, ExecutorRegistry, LocalProcessExecutor};
use crate::credentials::CredentialResolver;
use crate::dispatch::{DispatchQueue, ScheduleEntry};
use crate::events::publisher::EventPublisher;
use crate::health::TargetHealthMonitor;
use crate::logging::init_structured_logging;
use crate::models::TargetRegistry;
use crate::reaper::StaleExecutionReaper;
use crate::repository::{JobStore, OrchestratorRepository};

/// Cadence of the health monitoring pass; individual targets are probed
/// only when their own due time arrives
const HEALTH_PASS_INTERVAL: Duration = Duration::from_secs(15);

/// Cadence of the recurring-job scheduler pass
const SCHEDULER_PASS_INTERVAL: Duration = Duration::from_secs(30);

pub struct OrchestrationSystem {
    config: FleetConfig,
    executors: Arc<ExecutorRegistry>,
    event_publisher: EventPublisher,
    queue: Arc<DispatchQueue>,
    orchestrator: Arc<Orchestrator>,
    reaper: Arc<StaleExecutionReaper>,
    health_monitor: Arc<TargetHealthMonitor>,
}

impl OrchestrationSystem {
    /// Assemble the engine from its collaborators
    ///
    /// The local-process executor is registered out of the box; remote
    /// protocol executors are added through
    /// [`OrchestrationSystem::register_executor`] before [`OrchestrationSystem::start`].
    pub fn bootstrap(
        config: FleetConfig,
        repository: Arc<dyn OrchestratorRepository>,
        job_store: Arc<dyn JobStore>,
        target_registry: Arc<dyn TargetRegistry>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> OrchestrationResult<Self> {
        config
            .validate()
            .map_err(|error| OrchestrationError::Validation(error.to_string()))?;
        init_structured_logging();

        let event_publisher = EventPublisher::default();
        let executors = Arc::new(ExecutorRegistry::new());
        executors.register(Arc::new(LocalProcessExecutor::new()));

        let queue = Arc::new(DispatchQueue::new(&config.dispatch));

        let runner = Arc::new(ActionRunner::new(
            repository.clone(),
            executors.clone(),
            credentials,
            config.execution.clone(),
            config.retry.clone(),
        ));
        let coordinator = Arc::new(BranchCoordinator::new(
            repository.clone(),
            event_publisher.clone(),
            runner,
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            config.execution.clone(),
            repository.clone(),
            job_store,
            target_registry.clone(),
            coordinator,
            queue.clone(),
            event_publisher.clone(),
        ));
        let reaper = Arc::new(StaleExecutionReaper::new(
            repository.clone(),
            event_publisher.clone(),
            config.reaper.clone(),
        ));
        let health_monitor = Arc::new(TargetHealthMonitor::new(
            repository,
            target_registry,
            executors.clone(),
            event_publisher.clone(),
            config.health.clone(),
        ));

        info!(
            workers = config.dispatch.worker_count,
            max_concurrent_targets = config.execution.max_concurrent_targets,
            "Orchestration system assembled"
        );

        Ok(Self {
            config,
            executors,
            event_publisher,
            queue,
            orchestrator,
            reaper,
            health_monitor,
        })
    }

    /// Register an additional protocol executor
    pub fn register_executor(&self, executor: Arc<dyn ConnectionExecutor>) {
        self.executors.register(executor);
    }

    /// Start the periodic maintenance schedule
    pub fn start(&self) {
        let reaper = self.reaper.clone();
        let health_monitor = self.health_monitor.clone();
        let orchestrator = self.orchestrator.clone();

        self.queue.register_schedule(vec![
            ScheduleEntry::new(
                "reaper.sweep",
                Duration::from_secs(self.config.reaper.sweep_interval_seconds),
                move || {
                    let reaper = reaper.clone();
                    async move {
                        if let Err(sweep_error) = reaper.sweep().await {
                            error!(error = %sweep_error, "Reaper sweep failed");
                        }
                    }
                },
            ),
            ScheduleEntry::new("health.run_due_probes", HEALTH_PASS_INTERVAL, move || {
                let health_monitor = health_monitor.clone();
                async move {
                    if let Err(probe_error) = health_monitor.run_due_probes().await {
                        error!(error = %probe_error, "Health monitoring pass failed");
                    }
                }
            }),
            ScheduleEntry::new(
                "scheduler.run_due_jobs",
                SCHEDULER_PASS_INTERVAL,
                move || {
                    let orchestrator = orchestrator.clone();
                    async move {
                        if let Err(scheduler_error) = orchestrator.run_due_scheduled_jobs().await {
                            error!(error = %scheduler_error, "Scheduler pass failed");
                        }
                    }
                },
            ),
        ]);

        info!("Orchestration schedule started");
    }

    /// Stop the schedule and drain in-flight work
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
        info!("Orchestration system stopped");
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }

    pub fn reaper(&self) -> Arc<StaleExecutionReaper> {
        self.reaper.clone()
    }

    pub fn health_monitor(&self) -> Arc<TargetHealthMonitor> {
        self.health_monitor.clone()
    }

    pub fn event_publisher(&self) -> &EventPublisher {
        &self.event_publisher
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }
}
