//! Weighted fair-share allocation across queues.
//!
//! On session open the plugin water-fills the cluster's total resource
//! over the queues by weight, capping each queue at its capability and at
//! its aggregate request. The resulting deserved share drives queue
//! ordering, overuse detection, reclaim victim selection and gang
//! admission against queue capability.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use scheduler_cache::{allocated_status, TaskStatus};
use scheduler_framework::{
    Arguments, Event, EventHandler, Plugin, Session, SessionState, Vote,
};
use scheduler_shared_types::{share, PodGroupPhase, QueueId, Resource, Tolerance};
use tracing::debug;

pub const PLUGIN_NAME: &str = "proportion";

#[derive(Debug, Default, Clone)]
struct QueueAttr {
    name: String,
    weight: u32,
    share: f64,

    deserved: Resource,
    allocated: Resource,
    request: Resource,
    /// Reserved by jobs admitted to the queue but not yet allocated.
    inqueue: Resource,
    capability: Option<Resource>,
}

impl QueueAttr {
    fn update_share(&mut self) {
        let mut dominant = 0.0;
        for name in self.deserved.resource_names() {
            let s = share(self.allocated.get(&name), self.deserved.get(&name));
            if s > dominant {
                dominant = s;
            }
        }
        self.share = dominant;
    }
}

#[derive(Debug, Default)]
struct ProportionState {
    total_resource: Resource,
    queue_attrs: BTreeMap<QueueId, QueueAttr>,
}

pub struct ProportionPlugin {
    state: Arc<Mutex<ProportionState>>,
}

impl ProportionPlugin {
    pub fn new(_arguments: Arguments) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProportionState::default())),
        }
    }
}

impl Plugin for ProportionPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn on_session_open(&mut self, ssn: &mut Session) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.total_resource = ssn.state.total_resource.clone();
            build_queue_attrs(&mut state, &ssn.state);
            water_fill(&mut state);
        }

        let state = self.state.clone();
        ssn.add_queue_order_fn(
            PLUGIN_NAME,
            Box::new(move |l, r| {
                let state = state.lock().unwrap_or_else(|e| e.into_inner());
                let ls = state.queue_attrs.get(&l.uid).map(|a| a.share).unwrap_or(0.0);
                let rs = state.queue_attrs.get(&r.uid).map(|a| a.share).unwrap_or(0.0);
                ls.partial_cmp(&rs).unwrap_or(std::cmp::Ordering::Equal)
            }),
        );

        let state = self.state.clone();
        ssn.add_reclaimable_fn(
            PLUGIN_NAME,
            Box::new(move |ssn_state, _reclaimer, reclaimees| {
                let state = state.lock().unwrap_or_else(|e| e.into_inner());
                let mut victims = Vec::new();
                let mut allocations: BTreeMap<QueueId, Resource> = BTreeMap::new();

                for reclaimee in reclaimees {
                    let Some(job) = ssn_state.job_of_task(&reclaimee.uid) else {
                        continue;
                    };
                    let Some(attr) = state.queue_attrs.get(&job.queue) else {
                        continue;
                    };
                    let allocated = allocations
                        .entry(job.queue.clone())
                        .or_insert_with(|| attr.allocated.clone());

                    if allocated.less_in_all_dims(&reclaimee.resreq, Tolerance::Zero) {
                        debug!(
                            task = %reclaimee.uid, queue = %job.queue,
                            "queue allocation below reclaimee request, skipping"
                        );
                        continue;
                    }
                    if !allocated.less_equal_in_all_dims(&attr.deserved, Tolerance::Zero) {
                        allocated.sub(&reclaimee.resreq);
                        victims.push(reclaimee.uid.clone());
                    }
                }
                (victims, Vote::Permit)
            }),
        );

        let state = self.state.clone();
        ssn.add_overused_fn(
            PLUGIN_NAME,
            Box::new(move |queue| {
                let state = state.lock().unwrap_or_else(|e| e.into_inner());
                let Some(attr) = state.queue_attrs.get(&queue.uid) else {
                    return false;
                };
                let overused = !attr
                    .allocated
                    .less_equal_in_all_dims(&attr.deserved, Tolerance::Zero);
                if overused {
                    debug!(
                        queue = %queue.name,
                        deserved = %attr.deserved,
                        allocated = %attr.allocated,
                        "queue is overused"
                    );
                }
                overused
            }),
        );

        let state = self.state.clone();
        ssn.add_job_enqueueable_fn(
            PLUGIN_NAME,
            Box::new(move |ssn_state, job| {
                let Some(queue) = ssn_state.snapshot.queues.get(&job.queue) else {
                    return Vote::Reject;
                };
                // Unbounded queues admit everything.
                let Some(capability) = queue.capability.clone() else {
                    return Vote::Permit;
                };
                let has_min_resources = job
                    .pod_group
                    .as_ref()
                    .map(|pg| pg.min_resources.is_some())
                    .unwrap_or(false);
                if !has_min_resources {
                    return Vote::Permit;
                }

                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                let Some(attr) = state.queue_attrs.get_mut(&job.queue) else {
                    return Vote::Reject;
                };
                let min_req = job.min_resources();
                let mut proposed = min_req.clone();
                proposed.add(&attr.allocated).add(&attr.inqueue);

                if proposed.less_equal_in_all_dims(&capability, Tolerance::Infinity) {
                    attr.inqueue.add(&min_req);
                    Vote::Permit
                } else {
                    Vote::Reject
                }
            }),
        );

        let allocate_state = self.state.clone();
        let deallocate_state = self.state.clone();
        ssn.add_event_handler(
            PLUGIN_NAME,
            EventHandler {
                allocate_fn: Some(Box::new(move |event: &Event| {
                    let mut state = allocate_state.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(attr) = state.queue_attrs.get_mut(&event.queue) {
                        attr.allocated.add(&event.task.resreq);
                        attr.update_share();
                    }
                })),
                deallocate_fn: Some(Box::new(move |event: &Event| {
                    let mut state = deallocate_state.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(attr) = state.queue_attrs.get_mut(&event.queue) {
                        attr.allocated.sub(&event.task.resreq);
                        attr.update_share();
                    }
                })),
            },
        );
    }

    fn on_session_close(&mut self, _ssn: &mut Session) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = ProportionState::default();
    }
}

/// Collect per-queue weight, capability, request, allocation and in-queue
/// reservation from the jobs in the snapshot.
fn build_queue_attrs(state: &mut ProportionState, ssn_state: &SessionState) {
    for job in ssn_state.snapshot.jobs.values() {
        if !state.queue_attrs.contains_key(&job.queue) {
            let Some(queue) = ssn_state.snapshot.queues.get(&job.queue) else {
                debug!(job = %job.uid, queue = %job.queue, "job references unknown queue");
                continue;
            };
            state.queue_attrs.insert(
                job.queue.clone(),
                QueueAttr {
                    name: queue.name.clone(),
                    weight: queue.weight,
                    capability: queue.capability.clone(),
                    ..QueueAttr::default()
                },
            );
        }

        let Some(attr) = state.queue_attrs.get_mut(&job.queue) else {
            continue;
        };
        for (status, bucket) in &job.task_status_index {
            for task_id in bucket {
                let Some(task) = job.tasks.get(task_id) else {
                    continue;
                };
                if allocated_status(*status) {
                    attr.allocated.add(&task.resreq);
                    attr.request.add(&task.resreq);
                } else if *status == TaskStatus::Pending {
                    attr.request.add(&task.resreq);
                }
            }
        }

        if job.pod_group_phase() == Some(PodGroupPhase::Inqueue) {
            attr.inqueue.add(&job.min_resources());
        }
    }
}

/// Iterated weighted water-filling of the total resource over the queues.
/// Converges when nothing remains, nothing moved, or every queue is met;
/// a round cap guards against floating-point stalls.
fn water_fill(state: &mut ProportionState) {
    let mut remaining = state.total_resource.clone();
    let mut met: BTreeSet<QueueId> = BTreeSet::new();
    let round_cap = state.queue_attrs.len() + 1;
    let mut rounds = 0;

    loop {
        let total_weight: u64 = state
            .queue_attrs
            .iter()
            .filter(|(id, _)| !met.contains(*id))
            .map(|(_, attr)| attr.weight as u64)
            .sum();
        if total_weight == 0 {
            break;
        }

        let old_remaining = remaining.clone();
        let mut increased = Resource::empty();
        let mut decreased = Resource::empty();

        for (queue_id, attr) in state.queue_attrs.iter_mut() {
            if met.contains(queue_id) {
                continue;
            }

            let old_deserved = attr.deserved.clone();
            let mut grant = remaining.clone();
            grant.multi(attr.weight as f64 / total_weight as f64);
            attr.deserved.add(&grant);

            let over_capability = attr.capability.clone().filter(|cap| {
                !attr.deserved.less_equal_in_all_dims(cap, Tolerance::Infinity)
            });

            if let Some(cap) = over_capability {
                attr.deserved = Resource::min(&attr.deserved, &cap);
                attr.deserved = Resource::min(&attr.deserved, &attr.request);
                met.insert(queue_id.clone());
                debug!(queue = %attr.name, "queue met by capability");
            } else if attr
                .request
                .less_equal_in_all_dims(&attr.deserved, Tolerance::Zero)
            {
                attr.deserved = Resource::min(&attr.deserved, &attr.request);
                met.insert(queue_id.clone());
                debug!(queue = %attr.name, "queue met by request");
            } else {
                attr.deserved.min_dimension_resource(&attr.request);
            }
            attr.update_share();

            let (inc, dec) = attr.deserved.diff(&old_deserved);
            increased.add(&inc);
            decreased.add(&dec);
        }

        remaining.sub(&increased).add(&decreased);
        if remaining.is_empty() || remaining == old_remaining {
            break;
        }
        rounds += 1;
        if rounds >= round_cap {
            debug!("deserved share computation stalled, using last result");
            break;
        }
    }
}
