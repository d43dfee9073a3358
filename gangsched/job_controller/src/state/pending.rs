use super::{JobActuator, PodRetainPhase, State};
use crate::{Job, JobAction, JobPhase, Result};

pub struct PendingState;

impl State for PendingState {
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
