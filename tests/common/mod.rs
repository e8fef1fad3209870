#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use fleetops_core::config::FleetConfig;
use fleetops_core::credentials::StaticCredentialResolver;
use fleetops_core::models::{
    CommunicationMethod, Job, ProtocolKind, StaticTargetRegistry, Target, TargetEnvironment,
};
use fleetops_core::orchestration::{ExecutionDetail, OrchestrationSystem, Orchestrator};
use fleetops_core::repository::{InMemoryJobStore, InMemoryRepository};
use uuid::Uuid;

pub struct Harness {
    pub system: OrchestrationSystem,
    pub repository: Arc<InMemoryRepository>,
    pub job_store: Arc<InMemoryJobStore>,
    pub targets: Arc<StaticTargetRegistry>,
    pub credentials: Arc<StaticCredentialResolver>,
}

impl Harness {
    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.system.orchestrator()
    }
}

pub fn build_harness(config: FleetConfig) -> Harness {
    let repository = Arc::new(InMemoryRepository::new());
    let job_store = Arc::new(InMemoryJobStore::new());
    let targets = Arc::new(StaticTargetRegistry::new());
    let credentials = Arc::new(StaticCredentialResolver::new());
    credentials.insert("test-cred", "deploy", "secret");

    let system = OrchestrationSystem::bootstrap(
        config,
        repository.clone(),
        job_store.clone(),
        targets.clone(),
        credentials.clone(),
    )
    .expect("bootstrap");

    Harness {
        system,
        repository,
        job_store,
        targets,
        credentials,
    }
}

pub fn test_config() -> FleetConfig {
    let mut config = FleetConfig::default();
    // Keep backoff negligible so retry tests finish quickly
    config.retry.backoff_base = 0.001;
    config.retry.backoff_max_seconds = 1;
    config
}

pub fn ssh_target(name: &str) -> Target {
    Target::new(
        name,
        "10.0.0.1",
        TargetEnvironment::Test,
        vec![CommunicationMethod::new(ProtocolKind::Ssh, 22, "test-cred")],
    )
}

pub fn register_targets(harness: &Harness, count: usize) -> Vec<Uuid> {
    (0..count)
        .map(|index| {
            let target = ssh_target(&format!("node-{index:02}"));
            let target_id = target.target_id;
            harness.targets.register(target);
            target_id
        })
        .collect()
}

pub fn insert_job(harness: &Harness, job: Job) -> Uuid {
    let job_id = job.job_id;
    harness.job_store.insert(job);
    job_id
}

/// Poll until the execution reaches a terminal state
pub async fn wait_terminal(orchestrator: &Orchestrator, execution_id: Uuid) -> ExecutionDetail {
    for _ in 0..500 {
        let detail = orchestrator
            .get_execution_status(execution_id)
            .await
            .expect("execution status");
        if detail.execution.is_terminal()
            && detail.branches.iter().all(|branch| branch.branch.is_terminal())
        {
            return detail;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {execution_id} did not reach a terminal state");
}
