//! Admission of gang-pending jobs into the scheduling backlog.

use scheduler_shared_types::PodGroupPhase;
use tracing::debug;

use super::{ordered_jobs, ordered_queues};
use crate::{Action, Session};

pub struct Enqueue;

impl Action for Enqueue {
    fn name(&self) -> &str {
        "enqueue"
    }

    fn execute(&self, ssn: &mut Session) {
        for queue_id in ordered_queues(ssn) {
            let job_ids = ordered_jobs(ssn, &queue_id, |job| {
                job.pod_group_phase() == Some(PodGroupPhase::Pending)
            });

            for job_id in job_ids {
                let permitted = {
                    let job = &ssn.state.snapshot.jobs[&job_id];
                    ssn.job_enqueueable(job)
                };
                if permitted {
                    ssn.set_job_phase(&job_id, PodGroupPhase::Inqueue);
                    debug!(job = %job_id, queue = %queue_id, "job admitted to queue");
                } else {
                    debug!(job = %job_id, queue = %queue_id, "job rejected by enqueue callbacks");
                }
            }
        }
    }
}
