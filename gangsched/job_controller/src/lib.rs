//! Job lifecycle controller: the phase state machine and the command
//! plumbing that feeds it externally requested actions.

pub mod command;
pub mod controller;
pub mod state;

pub use command::{Command, CommandQueue};
pub use controller::JobController;
pub use state::{state_of, JobActuator, PodRetainPhase, State};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use scheduler_shared_types::{JobId, NamespaceName};

/// Default bound on restart attempts before a job is failed.
pub const DEFAULT_MAX_RETRY: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPhase {
    Pending,
    Aborting,
    Aborted,
    Running,
    Restarting,
    Completing,
    Completed,
    Terminating,
    Terminated,
    Failed,
    Inqueue,
}

/// Externally requested actions, drained FIFO per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobAction {
    Sync,
    Restart,
    Abort,
    Complete,
    Terminate,
    Resume,
}

impl std::fmt::Display for JobAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobAction::Sync => "sync",
            JobAction::Restart => "restart",
            JobAction::Abort => "abort",
            JobAction::Complete => "complete",
            JobAction::Terminate => "terminate",
            JobAction::Resume => "resume",
        };
        write!(f, "{name}")
    }
}

/// Task counters and phase of one job, mutated by state handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub phase: JobPhase,
    pub pending: u32,
    pub running: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub terminating: u32,
    pub unknown: u32,
    pub retry_count: u32,
}

impl JobStatus {
    pub fn new() -> Self {
        Self {
            phase: JobPhase::Pending,
            pending: 0,
            running: 0,
            succeeded: 0,
            failed: 0,
            terminating: 0,
            unknown: 0,
            retry_count: 0,
        }
    }

    /// Pods that are not yet gone.
    pub fn alive(&self) -> u32 {
        self.pending + self.running + self.terminating
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Controller-side view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub namespace: NamespaceName,
    pub name: String,
    pub min_available: u32,
    pub total_tasks: u32,
    pub max_retry: u32,
    pub status: JobStatus,
}

impl Job {
    pub fn new(namespace: &str, name: &str, min_available: u32, total_tasks: u32) -> Self {
        Self {
            id: format!("{namespace}/{name}"),
            namespace: namespace.to_string(),
            name: name.to_string(),
            min_available,
            total_tasks,
            max_retry: DEFAULT_MAX_RETRY,
            status: JobStatus::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to kill pods of job {job}: {reason}")]
    KillFailed { job: JobId, reason: String },
    #[error("failed to sync job {job}: {reason}")]
    SyncFailed { job: JobId, reason: String },
}

pub type Result<T> = std::result::Result<T, ControllerError>;

/// Run one action against a job through its current phase handler.
///
/// Handlers are idempotent: re-running after a partial mutation converges
/// to the same phase. Errors abort the reconciliation; the caller retries
/// with backoff.
pub fn execute(job: &mut Job, action: JobAction, actuator: &dyn JobActuator) -> Result<()> {
    let handler = state_of(job.status.phase);
    handler.execute(job, action, actuator)
}
