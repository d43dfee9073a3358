use super::{JobActuator, PodRetainPhase, State};
use crate::{Job, JobAction, JobPhase, Result};

pub struct RunningState;

impl State for RunningState {
    fn execute(&self, job: &mut Job, action: JobAction, actuator: &dyn JobActuator) -> Result<()> {
        let total_tasks = job.total_tasks;
        match action {
            JobAction::Restart => actuator.kill_job(
                job,
                PodRetainPhase::Soft,
                &|status| {
                    let mut phase = JobPhase::Running;
                    if status.terminating != 0 {
                        phase = JobPhase::Restarting;
                        status.retry_count += 1;
                    }
                    status.phase = phase;
                },
            ),
            JobAction::Abort => actuator.kill_job(job, PodRetainPhase::Soft, &|status| {
                let mut phase = JobPhase::Running;
                if status.terminating != 0 {
                    phase = JobPhase::Aborting;
                }
                status.phase = phase;
            }),
            JobAction::Terminate => actuator.kill_job(job, PodRetainPhase::Soft, &|status| {
                let mut phase = JobPhase::Running;
                if status.terminating != 0 {
                    phase = JobPhase::Terminating;
                }
                status.phase = phase;
            }),
            JobAction::Complete => actuator.kill_job(job, PodRetainPhase::Soft, &|status| {
                let mut phase = JobPhase::Completed;
                if status.terminating != 0 {
                    phase = JobPhase::Completing;
                }
                status.phase = phase;
            }),
            _ => actuator.sync_job(job, &move |status| {
                let mut phase = JobPhase::Running;
                if status.succeeded + status.failed == total_tasks {
                    phase = JobPhase::Completed;
                }
                status.phase = phase;
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::FakeActuator;
    use super::*;
    use crate::execute;

    fn running_job(running: u32, succeeded: u32, failed: u32) -> Job {
        let mut job = Job::new("test", "j1", 3, running + succeeded + failed);
        job.status.phase = JobPhase::Running;
        job.status.running = running;
        job.status.succeeded = succeeded;
        job.status.failed = failed;
        job
    }

    #[test]
    fn complete_with_no_survivors_finishes_the_job() {
        // Kill pass leaves nothing terminating: straight to Completed.
        let mut job = running_job(0, 3, 0);
        execute(&mut job, JobAction::Complete, &FakeActuator::passive()).unwrap();
        assert_eq!(job.status.phase, JobPhase::Completed);
    }

    #[test]
    fn complete_with_terminating_pods_stages_completing() {
        let mut job = running_job(3, 0, 0);
        execute(&mut job, JobAction::Complete, &FakeActuator::new()).unwrap();
        assert_eq!(job.status.terminating, 3);
        assert_eq!(job.status.phase, JobPhase::Completing);
    }

    #[test]
    fn restart_bumps_retry_only_when_pods_die() {
        let mut job = running_job(2, 0, 0);
        execute(&mut job, JobAction::Restart, &FakeActuator::new()).unwrap();
        assert_eq!(job.status.phase, JobPhase::Restarting);
        assert_eq!(job.status.retry_count, 1);

        let mut quiet = running_job(0, 0, 0);
        execute(&mut quiet, JobAction::Restart, &FakeActuator::passive()).unwrap();
        assert_eq!(quiet.status.phase, JobPhase::Running);
        assert_eq!(quiet.status.retry_count, 0);
    }

    #[test]
    fn sync_completes_only_when_all_tasks_finished() {
        let mut done = running_job(0, 2, 1);
        execute(&mut done, JobAction::Sync, &FakeActuator::passive()).unwrap();
        assert_eq!(done.status.phase, JobPhase::Completed);

        let mut busy = running_job(1, 1, 1);
        execute(&mut busy, JobAction::Sync, &FakeActuator::passive()).unwrap();
        assert_eq!(busy.status.phase, JobPhase::Running);
    }

    #[test]
    fn sync_is_idempotent() {
        let mut job = running_job(0, 3, 0);
        execute(&mut job, JobAction::Sync, &FakeActuator::passive()).unwrap();
        let after_once = job.status.clone();
        let handler = super::super::state_of(job.status.phase);
        // Phase is now Completed; a second sync through that handler is
        // a no-op.
        handler
            .execute(&mut job, JobAction::Sync, &FakeActuator::passive())
            .unwrap();
        assert_eq!(job.status, after_once);
    }
}
