//! Placement of pending tasks onto nodes.
//!
//! Queues are visited in session order, jobs within a queue in job order,
//! tasks in priority-then-creation order. Each task is filtered through
//! the predicates, candidate nodes are scored, and the best node (ties by
//! name) receives the task: a real allocation when idle capacity fits,
//! a pipelined placement when only releasing capacity would.

use scheduler_cache::TaskInfo;
use scheduler_shared_types::{NodeName, PodGroupPhase, Tolerance};
use tracing::debug;

use super::{ordered_jobs, ordered_queues};
use crate::{Action, Session};

pub struct Allocate;

impl Action for Allocate {
    fn name(&self) -> &str {
        "allocate"
    }

    fn execute(&self, ssn: &mut Session) {
        for queue_id in ordered_queues(ssn) {
            let job_ids = ordered_jobs(ssn, &queue_id, |job| {
                job.pod_group.is_some() && job.pod_group_phase() != Some(PodGroupPhase::Pending)
            });

            for job_id in job_ids {
                // Allocations shift shares, so re-check before each job.
                let overused = {
                    let queue = &ssn.state.snapshot.queues[&queue_id];
                    ssn.overused(queue)
                };
                if overused {
                    debug!(queue = %queue_id, "queue overused, skipping remaining jobs");
                    break;
                }

                let pending: Vec<TaskInfo> = ssn.state.snapshot.jobs[&job_id]
                    .pending_tasks_ordered()
                    .into_iter()
                    .cloned()
                    .collect();

                for task in pending {
                    allocate_task(ssn, &task);
                }
            }
        }
    }
}

fn allocate_task(ssn: &mut Session, task: &TaskInfo) {
    let mut failures: Vec<(NodeName, String)> = Vec::new();
    let mut best: Option<(f64, NodeName, bool)> = None;

    for (name, node) in &ssn.state.snapshot.nodes {
        if let Err(err) = ssn.predicate(task, node) {
            failures.push((name.clone(), err.to_string()));
            continue;
        }

        let fits_idle = task
            .resreq
            .less_equal_in_all_dims(&node.idle, Tolerance::Infinity);
        let fits_future = task
            .resreq
            .less_equal_in_all_dims(&node.future_idle(), Tolerance::Infinity);
        if !fits_idle && !fits_future {
            continue;
        }

        let score = ssn.node_order(task, node);
        let better = match &best {
            // Prefer real capacity over pipelining at equal score.
            Some((bs, bn, bi)) => {
                score > *bs
                    || (score == *bs && fits_idle && !bi)
                    || (score == *bs && fits_idle == *bi && name < bn)
            }
            None => true,
        };
        if better {
            best = Some((score, name.clone(), fits_idle));
        }
    }

    for (node, reason) in failures {
        ssn.record_predicate_failure(&task.uid, &node, reason);
    }

    match best {
        Some((_, node, true)) => {
            if let Err(err) = ssn.allocate(&task.uid, &node) {
                debug!(task = %task.uid, node = %node, %err, "allocation failed");
            }
        }
        Some((_, node, false)) => {
            let pipelineable = ssn
                .state
                .job_of_task(&task.uid)
                .map(|job| ssn.job_pipelined(job))
                .unwrap_or(false);
            if pipelineable {
                if let Err(err) = ssn.pipeline(&task.uid, &node) {
                    debug!(task = %task.uid, node = %node, %err, "pipelining failed");
                }
            }
        }
        None => {
            debug!(task = %task.uid, "no candidate node for task");
        }
    }
}
