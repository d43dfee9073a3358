use super::{JobActuator, PodRetainPhase, State};
use crate::{Job, JobAction, JobPhase, Result};

pub struct InqueueState;

impl State for InqueueState {
    fn execute(&self, job: &mut Job, action: JobAction, actuator: &dyn JobActuator) -> Result<()> {
        let min_available = job.min_available;
        match action {
            JobAction::Restart => actuator.kill_job(job, PodRetainPhase::None, &|status| {
                status.phase = JobPhase::Restarting;
                status.retry_count += 1;
            }),
            JobAction::Abort => actuator.kill_job(job, PodRetainPhase::Soft, &|status| {
                status.phase = JobPhase::Aborting;
            }),
            JobAction::Complete => actuator.kill_job(job, PodRetainPhase::Soft, &|status| {
                status.phase = JobPhase::Completing;
            }),
            JobAction::Terminate => actuator.kill_job(job, PodRetainPhase::Soft, &|status| {
                status.phase = JobPhase::Terminating;
            }),
            _ => actuator.sync_job(job, &move |status| {
                if min_available <= status.running + status.succeeded + status.failed {
                    status.phase = JobPhase::Running;
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::FakeActuator;
    use super::*;
    use crate::execute;

    fn inqueue_job(min_available: u32) -> Job {
        let mut job = Job::new("test", "j1", min_available, 4);
        job.status.phase = JobPhase::Inqueue;
        job
    }

    #[test]
    fn sync_promotes_once_gang_threshold_met() {
        let mut job = inqueue_job(2);
        job.status.running = 1;
        execute(&mut job, JobAction::Sync, &FakeActuator::passive()).unwrap();
        assert_eq!(job.status.phase, JobPhase::Inqueue);

        job.status.running = 2;
        execute(&mut job, JobAction::Sync, &FakeActuator::passive()).unwrap();
        assert_eq!(job.status.phase, JobPhase::Running);
    }

    #[test]
    fn finished_tasks_count_toward_the_threshold() {
        let mut job = inqueue_job(3);
        job.status.running = 1;
        job.status.succeeded = 1;
        job.status.failed = 1;
        execute(&mut job, JobAction::Sync, &FakeActuator::passive()).unwrap();
        assert_eq!(job.status.phase, JobPhase::Running);
    }

    #[test]
    fn lifecycle_actions_stage_their_phases() {
        for (action, expected) in [
            (JobAction::Restart, JobPhase::Restarting),
            (JobAction::Abort, JobPhase::Aborting),
            (JobAction::Complete, JobPhase::Completing),
            (JobAction::Terminate, JobPhase::Terminating),
        ] {
            let mut job = inqueue_job(1);
            execute(&mut job, action, &FakeActuator::new()).unwrap();
            assert_eq!(job.status.phase, expected, "action {action}");
        }
    }

    #[test]
    fn restart_increments_retry() {
        let mut job = inqueue_job(1);
        execute(&mut job, JobAction::Restart, &FakeActuator::new()).unwrap();
        assert_eq!(job.status.retry_count, 1);
    }
}
