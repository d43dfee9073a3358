//! Reconciler driving the state machine from the command backlog.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use scheduler_shared_types::JobId;

use crate::command::CommandQueue;
use crate::state::JobActuator;
use crate::{execute, Job, JobAction, Result};

/// Owns the controller-side jobs and their pending commands. Commands
/// drain FIFO per job; a failing handler leaves the command consumed and
/// surfaces the error for the caller's retry policy.
pub struct JobController<A: JobActuator> {
    jobs: BTreeMap<JobId, Job>,
    commands: CommandQueue,
    actuator: A,
}

impl<A: JobActuator> JobController<A> {
    pub fn new(actuator: A) -> Self {
        Self {
            jobs: BTreeMap::new(),
            commands: CommandQueue::new(),
            actuator,
        }
    }

    pub fn upsert_job(&mut self, job: Job) {
        self.jobs.insert(job.id.clone(), job);
    }

    /// Merge an observed cluster-side view of a job. Shape and task
    /// counters are refreshed from the observation; once a job is
    /// tracked, its phase and retry count stay controller-owned.
    pub fn observe(&mut self, observed: Job) {
        match self.jobs.get_mut(&observed.id) {
            Some(job) => {
                job.min_available = observed.min_available;
                job.total_tasks = observed.total_tasks;
                job.status.pending = observed.status.pending;
                job.status.running = observed.status.running;
                job.status.succeeded = observed.status.succeeded;
                job.status.failed = observed.status.failed;
                job.status.terminating = observed.status.terminating;
                job.status.unknown = observed.status.unknown;
            }
            None => {
                self.jobs.insert(observed.id.clone(), observed);
            }
        }
    }

    pub fn job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs.keys().cloned().collect()
    }

    pub fn commands_mut(&mut self) -> &mut CommandQueue {
        &mut self.commands
    }

    /// Apply one action to one job through its current phase handler.
    pub fn process(&mut self, job_id: &JobId, action: JobAction) -> Result<()> {
        let Some(job) = self.jobs.get_mut(job_id) else {
            warn!(job = %job_id, "action for unknown job dropped");
            return Ok(());
        };
        debug!(job = %job_id, ?action, phase = ?job.status.phase, "executing job action");
        execute(job, action, &self.actuator)
    }

    /// Drain every queued command, then sync each job once. Errors abort
    /// the affected job's drain only.
    pub fn reconcile(&mut self) -> Vec<(JobId, crate::ControllerError)> {
        let mut failures = Vec::new();

        for job_id in self.commands.pending_jobs() {
            while let Some(command) = self.commands.pop(&job_id) {
                if let Err(err) = self.process(&job_id, command.action) {
                    failures.push((job_id.clone(), err));
                    break;
                }
            }
        }

        let job_ids: Vec<JobId> = self.jobs.keys().cloned().collect();
        for job_id in job_ids {
            if let Err(err) = self.process(&job_id, JobAction::Sync) {
                failures.push((job_id, err));
            }
        }
        failures
    }
}
