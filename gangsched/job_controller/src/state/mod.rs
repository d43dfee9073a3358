//! One handler per job phase.
//!
//! Each handler maps an action onto a pair of effects: how alive pods are
//! treated (killed with a retention policy, or left alone) and how the
//! status is mutated once that is done. Pod-level work goes through the
//! injected [`JobActuator`]; handlers never touch pods directly.

mod aborted;
mod aborting;
mod completing;
mod finished;
mod inqueue;
mod pending;
mod restarting;
mod running;
mod terminating;

use crate::{Job, JobAction, JobPhase, JobStatus, Result};

/// What happens to pods that already reached a terminal pod phase when a
/// job's alive pods are killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodRetainPhase {
    /// Delete everything, terminal pods included.
    None,
    /// Keep succeeded and failed pods around.
    Soft,
    /// Keep every pod object.
    Hard,
}

/// Collaborator executing the pod-level side effects of a state handler.
/// The status mutator runs after the pod operations so it observes the
/// updated counters.
pub trait JobActuator {
    fn kill_job(
        &self,
        job: &mut Job,
        retain: PodRetainPhase,
        mutate: &dyn Fn(&mut JobStatus),
    ) -> Result<()>;

    fn sync_job(&self, job: &mut Job, mutate: &dyn Fn(&mut JobStatus)) -> Result<()>;
}

impl<T: JobActuator + ?Sized> JobActuator for Box<T> {
    fn kill_job(
        &self,
        job: &mut Job,
        retain: PodRetainPhase,
        mutate: &dyn Fn(&mut JobStatus),
    ) -> Result<()> {
        (**self).kill_job(job, retain, mutate)
    }

    fn sync_job(&self, job: &mut Job, mutate: &dyn Fn(&mut JobStatus)) -> Result<()> {
        (**self).sync_job(job, mutate)
    }
}

pub trait State {
    fn execute(&self, job: &mut Job, action: JobAction, actuator: &dyn JobActuator) -> Result<()>;
}

/// Phase to handler dispatch.
pub fn state_of(phase: JobPhase) -> Box<dyn State> {
    match phase {
        JobPhase::Pending => Box::new(pending::PendingState),
        JobPhase::Inqueue => Box::new(inqueue::InqueueState),
        JobPhase::Running => Box::new(running::RunningState),
        JobPhase::Restarting => Box::new(restarting::RestartingState),
        JobPhase::Completing => Box::new(completing::CompletingState),
        JobPhase::Aborting => Box::new(aborting::AbortingState),
        JobPhase::Aborted => Box::new(aborted::AbortedState),
        JobPhase::Terminating => Box::new(terminating::TerminatingState),
        JobPhase::Completed | JobPhase::Terminated | JobPhase::Failed => {
            Box::new(finished::FinishedState)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Actuator that applies the status mutator directly, optionally
    /// marking a number of alive pods as terminating first, the way a
    /// real kill pass would.
    pub struct FakeActuator {
        pub kill_moves_running_to_terminating: bool,
    }

    impl FakeActuator {
        pub fn new() -> Self {
            Self {
                kill_moves_running_to_terminating: true,
            }
        }

        pub fn passive() -> Self {
            Self {
                kill_moves_running_to_terminating: false,
            }
        }
    }

    impl JobActuator for FakeActuator {
        fn kill_job(
            &self,
            job: &mut Job,
            _retain: PodRetainPhase,
            mutate: &dyn Fn(&mut JobStatus),
        ) -> Result<()> {
            if self.kill_moves_running_to_terminating {
                let moving = job.status.running + job.status.pending;
                job.status.terminating += moving;
                job.status.running = 0;
                job.status.pending = 0;
            }
            mutate(&mut job.status);
            Ok(())
        }

        fn sync_job(&self, job: &mut Job, mutate: &dyn Fn(&mut JobStatus)) -> Result<()> {
            mutate(&mut job.status);
            Ok(())
        }
    }
}
