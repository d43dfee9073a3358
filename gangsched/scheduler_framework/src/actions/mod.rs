//! The phase drivers of a scheduling cycle.
//!
//! Default order: enqueue admits gang-ready jobs, allocate places pending
//! tasks, preempt and reclaim make room when allocation starves, evict
//! clears unconditional victims.

pub mod allocate;
pub mod enqueue;
pub mod evict;
pub mod preempt;
pub mod reclaim;

pub use allocate::Allocate;
pub use enqueue::Enqueue;
pub use evict::Evict;
pub use preempt::Preempt;
pub use reclaim::Reclaim;

use scheduler_cache::JobInfo;
use scheduler_shared_types::{JobId, QueueId};

use crate::{Action, Session};

/// Resolve an action by its configured name.
pub fn action_by_name(name: &str) -> Option<Box<dyn Action + Send + Sync>> {
    match name {
        "enqueue" => Some(Box::new(Enqueue)),
        "allocate" => Some(Box::new(Allocate)),
        "preempt" => Some(Box::new(Preempt)),
        "reclaim" => Some(Box::new(Reclaim)),
        "evict" => Some(Box::new(Evict)),
        _ => None,
    }
}

/// Queue ids in session order, ties broken by id.
pub(crate) fn ordered_queues(ssn: &Session) -> Vec<QueueId> {
    let queues = &ssn.state.snapshot.queues;
    let mut ids: Vec<QueueId> = queues.keys().cloned().collect();
    ids.sort_by(|l, r| {
        ssn.queue_order(&queues[l], &queues[r])
            .then_with(|| l.cmp(r))
    });
    ids
}

/// Job ids of one queue in session order, filtered by `keep`.
pub(crate) fn ordered_jobs(
    ssn: &Session,
    queue: &QueueId,
    keep: impl Fn(&JobInfo) -> bool,
) -> Vec<JobId> {
    let jobs = &ssn.state.snapshot.jobs;
    let mut ids: Vec<JobId> = ssn
        .state
        .jobs_in_queue(queue)
        .into_iter()
        .filter(|id| keep(&jobs[id]))
        .collect();
    ids.sort_by(|l, r| ssn.job_order(&jobs[l], &jobs[r]));
    ids
}
