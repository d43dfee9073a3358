//! In-memory projection of cluster state for the scheduling session.
//!
//! The cache consumes the typed ingest stream (pods, gang descriptors,
//! queues, quotas, nodes), keeps a consistent picture under a single
//! writer lock, and hands out deep [`Snapshot`]s that sessions can use
//! without further locking.

pub mod event_handlers;
pub mod job;
pub mod namespace;
pub mod node;
pub mod queue;
pub mod snapshot;
pub mod task;

pub use job::JobInfo;
pub use namespace::{NamespaceCollection, NamespaceInfo, DEFAULT_NAMESPACE_WEIGHT};
pub use node::NodeInfo;
pub use queue::QueueInfo;
pub use snapshot::Snapshot;
pub use task::{allocated_status, terminated_status, TaskInfo, TaskStatus};

use std::collections::{BTreeMap, VecDeque};
use std::sync::RwLock;

use scheduler_shared_types::{JobId, NamespaceName, NodeName, QueueId};
use tracing::info;

/// How many times a deleted job is revisited before cleanup gives up on
/// it draining.
const CLEANUP_MAX_ATTEMPTS: u32 = 5;
/// Upper bound on cleanup work per pass, so a burst of deletions cannot
/// stall event processing.
const CLEANUP_BATCH: usize = 16;

#[derive(Debug, Default)]
pub(crate) struct CacheState {
    pub jobs: BTreeMap<JobId, JobInfo>,
    pub nodes: BTreeMap<NodeName, NodeInfo>,
    pub queues: BTreeMap<QueueId, QueueInfo>,
    pub namespaces: BTreeMap<NamespaceName, NamespaceCollection>,
    /// Jobs whose gang descriptor is gone, awaiting garbage collection
    /// once their tasks drain. Each entry carries its retry count.
    pub deleted_jobs: VecDeque<(JobId, u32)>,
}

/// Single-writer, multi-reader cluster cache.
pub struct SchedulerCache {
    state: RwLock<CacheState>,
}

impl Default for SchedulerCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Deep-clone the current state into a read-only snapshot.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Snapshot {
            jobs: state.jobs.clone(),
            nodes: state.nodes.clone(),
            queues: state.queues.clone(),
            namespaces: state
                .namespaces
                .iter()
                .map(|(name, collection)| (name.clone(), collection.snapshot()))
                .collect(),
        }
    }

    /// Drain a bounded amount of the deferred-deletion queue. Jobs are
    /// collected once both their tasks and gang descriptor are gone;
    /// others are requeued until the retry budget runs out.
    pub fn process_cleanup(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        for _ in 0..CLEANUP_BATCH {
            let Some((job_id, attempts)) = state.deleted_jobs.pop_front() else {
                break;
            };
            let collectable = state
                .jobs
                .get(&job_id)
                .map(|job| job.tasks.is_empty() && job.pod_group.is_none())
                .unwrap_or(false);

            if collectable {
                state.jobs.remove(&job_id);
                info!(job = %job_id, "collected deleted job");
            } else if state.jobs.contains_key(&job_id) && attempts + 1 < CLEANUP_MAX_ATTEMPTS {
                state.deleted_jobs.push_back((job_id, attempts + 1));
            }
        }
    }

    pub(crate) fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{TimeZone, Utc};
    use scheduler_shared_types::{
        DisruptionBudget, Node, Pod, PodGroup, PodGroupPhase, PodPhase, Resource, ResourceQuota,
    };
    use std::collections::BTreeMap;

    use crate::task::{TaskInfo, TaskStatus};

    pub fn build_resource(milli_cpu: f64, memory: f64) -> Resource {
        Resource::new(milli_cpu, memory)
    }

    pub fn build_task(
        uid: &str,
        job: &str,
        status: TaskStatus,
        milli_cpu: f64,
        memory: f64,
    ) -> TaskInfo {
        TaskInfo {
            uid: uid.to_string(),
            job: job.to_string(),
            name: uid.to_string(),
            namespace: "test".to_string(),
            resreq: build_resource(milli_cpu, memory),
            node_name: String::new(),
            status,
            priority: 0,
            preemptible: false,
            creation_timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            failed_predicates: BTreeMap::new(),
        }
    }

    pub fn build_pod(namespace: &str, name: &str, node: &str, phase: PodPhase) -> Pod {
        Pod {
            uid: format!("{namespace}-{name}-uid"),
            namespace: namespace.to_string(),
            name: name.to_string(),
            node_name: node.to_string(),
            phase,
            annotations: BTreeMap::new(),
            controller: Some("j1".to_string()),
            priority: 0,
            preemptible: false,
            resource_request: build_resource(1000.0, 1024.0),
            deleting: false,
            creation_timestamp: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    pub fn build_node(name: &str, milli_cpu: f64, memory: f64) -> Node {
        Node {
            name: name.to_string(),
            capacity: build_resource(milli_cpu, memory),
            allocatable: build_resource(milli_cpu, memory),
            labels: BTreeMap::new(),
        }
    }

    pub fn build_pod_group(namespace: &str, name: &str, queue: &str, min_member: u32) -> PodGroup {
        PodGroup {
            namespace: namespace.to_string(),
            name: name.to_string(),
            queue: queue.to_string(),
            min_member,
            min_resources: None,
            min_quotas: None,
            phase: PodGroupPhase::Pending,
            priority: 0,
            preemptible: false,
            budget: DisruptionBudget::default(),
            creation_timestamp: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    pub fn build_quota(
        namespace: &str,
        name: &str,
        entries: &[(&str, f64, f64)],
    ) -> ResourceQuota {
        let mut hard = BTreeMap::new();
        let mut used = BTreeMap::new();
        for (dim, h, u) in entries {
            hard.insert(dim.to_string(), *h);
            used.insert(dim.to_string(), *u);
        }
        ResourceQuota {
            namespace: namespace.to_string(),
            name: name.to_string(),
            hard,
            used,
        }
    }
}
