use super::{JobActuator, State};
use crate::{Job, JobAction, JobPhase, Result};

pub struct AbortedState;

impl State for AbortedState {
    fn execute(&self, job: &mut Job, action: JobAction, actuator: &dyn JobActuator) -> Result<()> {
        match action {
            // Resume re-admits the job from the top of its lifecycle.
            JobAction::Resume => actuator.sync_job(job, &|status| {
                status.phase = JobPhase::Pending;
            }),
            _ => Ok(()),
        }
    }
}
