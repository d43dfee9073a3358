//! Cross-queue eviction driven by fair-share overuse.

use scheduler_cache::{TaskInfo, TaskStatus};
use scheduler_shared_types::{PodGroupPhase, Resource, Tolerance};
use tracing::debug;

use super::{ordered_jobs, ordered_queues};
use crate::{Action, Session};

pub struct Reclaim;

impl Action for Reclaim {
    fn name(&self) -> &str {
        "reclaim"
    }

    fn execute(&self, ssn: &mut Session) {
        for queue_id in ordered_queues(ssn) {
            let overused = {
                let queue = &ssn.state.snapshot.queues[&queue_id];
                ssn.overused(queue)
            };
            if overused {
                continue;
            }

            let job_ids = ordered_jobs(ssn, &queue_id, |job| {
                job.pod_group.is_some()
                    && job.pod_group_phase() != Some(PodGroupPhase::Pending)
                    && job.count_in_status(TaskStatus::Pending) > 0
            });

            for job_id in job_ids {
                let reclaimers: Vec<TaskInfo> = ssn.state.snapshot.jobs[&job_id]
                    .pending_tasks_ordered()
                    .into_iter()
                    .cloned()
                    .collect();

                for reclaimer in reclaimers {
                    reclaim_for_task(ssn, &queue_id, &reclaimer);
                }
            }
        }
    }
}

fn reclaim_for_task(ssn: &mut Session, queue_id: &str, reclaimer: &TaskInfo) {
    let victims = {
        // Candidates: running tasks of overused, reclaimable queues.
        let snapshot = &ssn.state.snapshot;
        let candidates: Vec<&TaskInfo> = snapshot
            .jobs
            .values()
            .filter(|job| job.queue != *queue_id)
            .filter(|job| {
                snapshot
                    .queues
                    .get(&job.queue)
                    .map(|q| q.reclaimable && ssn.overused(q))
                    .unwrap_or(false)
            })
            .flat_map(|job| job.tasks_in_status(TaskStatus::Running))
            .collect();
        ssn.reclaimable(reclaimer, &candidates)
    };

    if victims.is_empty() {
        return;
    }

    // Evict only as much as the reclaimer actually needs.
    let mut reclaimed = Resource::empty();
    for victim in victims {
        if reclaimer
            .resreq
            .less_equal_in_all_dims(&reclaimed, Tolerance::Infinity)
        {
            break;
        }
        let resreq = match ssn.state.find_task(&victim) {
            Some(task) => task.resreq.clone(),
            None => continue,
        };
        match ssn.evict(&victim) {
            Ok(()) => {
                reclaimed.add(&resreq);
            }
            Err(err) => {
                debug!(victim = %victim, %err, "failed to evict reclaim victim");
            }
        }
    }
}
