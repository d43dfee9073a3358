use super::{JobActuator, PodRetainPhase, State};
use crate::{Job, JobAction, JobPhase, Result};

pub struct TerminatingState;

impl State for TerminatingState {
    fn execute(&self, job: &mut Job, _action: JobAction, actuator: &dyn JobActuator) -> Result<()> {
        actuator.kill_job(job, PodRetainPhase::Soft, &|status| {
            // Any alive pods keep the job in Terminating.
            if status.terminating != 0 || status.pending != 0 || status.running != 0 {
                return;
            }
            status.phase = JobPhase::Terminated;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::FakeActuator;
    use super::*;
    use crate::execute;

    #[test]
    fn settles_to_terminated_once_quiet() {
        let mut job = Job::new("test", "j1", 1, 2);
        job.status.phase = JobPhase::Terminating;
        job.status.terminating = 2;

        execute(&mut job, JobAction::Terminate, &FakeActuator::passive()).unwrap();
        assert_eq!(job.status.phase, JobPhase::Terminating);

        job.status.terminating = 0;
        execute(&mut job, JobAction::Sync, &FakeActuator::passive()).unwrap();
        assert_eq!(job.status.phase, JobPhase::Terminated);
    }

    #[test]
    fn survivors_hold_the_terminating_phase() {
        let mut job = Job::new("test", "j1", 1, 2);
        job.status.phase = JobPhase::Terminating;
        job.status.running = 1;

        execute(&mut job, JobAction::Sync, &FakeActuator::passive()).unwrap();
        assert_eq!(job.status.phase, JobPhase::Terminating);
    }
}
