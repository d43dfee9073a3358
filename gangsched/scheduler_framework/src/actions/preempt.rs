//! Room-making for starving jobs inside their own queue.

use scheduler_cache::{TaskInfo, TaskStatus};
use scheduler_shared_types::{JobId, Tolerance};
use tracing::debug;

use crate::{Action, Session};

pub struct Preempt;

impl Action for Preempt {
    fn name(&self) -> &str {
        "preempt"
    }

    fn execute(&self, ssn: &mut Session) {
        let starving: Vec<JobId> = ssn
            .state
            .snapshot
            .jobs
            .iter()
            .filter(|(_, job)| job.pod_group.is_some() && ssn.job_starving(job))
            .map(|(id, _)| id.clone())
            .collect();

        for job_id in starving {
            preempt_for_job(ssn, &job_id);
        }
    }
}

fn preempt_for_job(ssn: &mut Session, job_id: &JobId) {
    let pending: Vec<TaskInfo> = ssn.state.snapshot.jobs[job_id]
        .pending_tasks_ordered()
        .into_iter()
        .cloned()
        .collect();

    for preemptor in pending {
        let satisfied = {
            let job = &ssn.state.snapshot.jobs[job_id];
            ssn.job_pipelined(job)
        };
        if satisfied {
            break;
        }

        // Victim pool: running tasks of other jobs sharing the queue.
        let queue = ssn.state.snapshot.jobs[job_id].queue.clone();
        let victims = {
            let candidates: Vec<&TaskInfo> = ssn
                .state
                .snapshot
                .jobs
                .values()
                .filter(|job| job.uid != *job_id && job.queue == queue)
                .flat_map(|job| job.tasks_in_status(TaskStatus::Running))
                .collect();
            ssn.preemptable(&preemptor, &candidates)
        };

        if victims.is_empty() {
            debug!(task = %preemptor.uid, "no preemption victims available");
            continue;
        }

        for victim in &victims {
            if let Err(err) = ssn.evict(victim) {
                debug!(victim = %victim, %err, "failed to evict preemption victim");
            }
        }

        // Stage the preemptor onto the node where room is opening up.
        let target = ssn
            .state
            .snapshot
            .nodes
            .iter()
            .filter(|(_, node)| {
                ssn.predicate(&preemptor, node).is_ok()
                    && preemptor
                        .resreq
                        .less_equal_in_all_dims(&node.future_idle(), Tolerance::Infinity)
            })
            .map(|(name, _)| name.clone())
            .next();

        if let Some(node) = target {
            if let Err(err) = ssn.pipeline(&preemptor.uid, &node) {
                debug!(task = %preemptor.uid, node = %node, %err, "failed to pipeline preemptor");
            }
        }
    }
}
