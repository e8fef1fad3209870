//! Shared orchestration value types

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ActionResult, ExecutionBranch, JobExecution};
use crate::state_machine::BranchState;

/// Shared cancellation signal for one execution
///
/// Coordinators check the flag at action boundaries only; an action that
/// has already started runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    requested: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Final word on one branch, reported back to the execution supervisor
#[derive(Debug, Clone)]
pub struct BranchOutcome {
    pub branch_id: Uuid,
    pub target_id: Uuid,
    pub state: BranchState,
    pub error: Option<String>,
}

impl BranchOutcome {
    pub fn is_successful(&self) -> bool {
        self.state.is_successful()
    }
}

/// One branch with its full attempt history
#[derive(Debug, Clone)]
pub struct BranchDetail {
    pub branch: ExecutionBranch,
    pub results: Vec<ActionResult>,
}

/// Full status view of one execution
#[derive(Debug, Clone)]
pub struct ExecutionDetail {
    pub execution: JobExecution,
    pub branches: Vec<BranchDetail>,
}
