use super::{JobActuator, PodRetainPhase, State};
use crate::{Job, JobAction, JobPhase, Result};

pub struct AbortingState;

impl State for AbortingState {
    fn execute(&self, job: &mut Job, _action: JobAction, actuator: &dyn JobActuator) -> Result<()> {
        actuator.kill_job(job, PodRetainPhase::Soft, &|status| {
            // Any alive pods keep the job in Aborting.
            if status.terminating != 0 || status.pending != 0 || status.running != 0 {
                return;
            }
            status.phase = JobPhase::Aborted;
        })
    }
}
