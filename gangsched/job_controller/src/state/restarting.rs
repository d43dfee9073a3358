use super::{JobActuator, PodRetainPhase, State};
use crate::{Job, JobAction, JobPhase, Result};

pub struct RestartingState;

impl State for RestartingState {
    fn execute(&self, job: &mut Job, _action: JobAction, actuator: &dyn JobActuator) -> Result<()> {
        let max_retry = job.max_retry;
        actuator.kill_job(job, PodRetainPhase::None, &move |status| {
            if status.retry_count >= max_retry {
                status.phase = JobPhase::Failed;
                return;
            }
            // Back to Pending once the old pods are gone.
            if status.terminating == 0 {
                status.phase = JobPhase::Pending;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::FakeActuator;
    use super::*;
    use crate::execute;

    #[test]
    fn returns_to_pending_after_pods_drain() {
        let mut job = Job::new("test", "j1", 1, 2);
        job.status.phase = JobPhase::Restarting;
        job.status.terminating = 2;

        execute(&mut job, JobAction::Sync, &FakeActuator::passive()).unwrap();
        assert_eq!(job.status.phase, JobPhase::Restarting);

        job.status.terminating = 0;
        execute(&mut job, JobAction::Sync, &FakeActuator::passive()).unwrap();
        assert_eq!(job.status.phase, JobPhase::Pending);
    }

    #[test]
    fn exhausted_retries_fail_the_job() {
        let mut job = Job::new("test", "j1", 1, 2);
        job.status.phase = JobPhase::Restarting;
        job.status.retry_count = job.max_retry;
        execute(&mut job, JobAction::Sync, &FakeActuator::passive()).unwrap();
        assert_eq!(job.status.phase, JobPhase::Failed);
    }
}
