use super::{JobActuator, State};
use crate::{Job, JobAction, Result};

/// Completed, Terminated and Failed are terminal: every action is a no-op.
pub struct FinishedState;

impl State for FinishedState {
    fn execute(
        &self,
        _job: &mut Job,
        _action: JobAction,
        _actuator: &dyn JobActuator,
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::FakeActuator;
    use crate::{execute, Job, JobAction, JobPhase};

    #[test]
    fn terminal_phases_absorb_every_action() {
        for phase in [JobPhase::Completed, JobPhase::Terminated, JobPhase::Failed] {
            for action in [
                JobAction::Sync,
                JobAction::Restart,
                JobAction::Abort,
                JobAction::Terminate,
                JobAction::Resume,
            ] {
                let mut job = Job::new("test", "j1", 1, 2);
                job.status.phase = phase;
                execute(&mut job, action, &FakeActuator::new()).unwrap();
                assert_eq!(job.status.phase, phase);
            }
        }
    }
}
