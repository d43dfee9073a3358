//! Deep, read-only projection of the cache handed to a scheduling session.

use std::collections::BTreeMap;

use scheduler_shared_types::{JobId, NamespaceName, NodeName, QueueId, Resource};

use crate::job::JobInfo;
use crate::namespace::NamespaceInfo;
use crate::node::NodeInfo;
use crate::queue::QueueInfo;
use crate::task::TaskInfo;

/// Owned clone of the cache at one instant. BTreeMap keys make every
/// iteration order deterministic between cycles over identical state.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub jobs: BTreeMap<JobId, JobInfo>,
    pub nodes: BTreeMap<NodeName, NodeInfo>,
    pub queues: BTreeMap<QueueId, QueueInfo>,
    pub namespaces: BTreeMap<NamespaceName, NamespaceInfo>,
}

impl Snapshot {
    /// Total allocatable resource across all nodes.
    pub fn total_resource(&self) -> Resource {
        let mut total = Resource::empty();
        for node in self.nodes.values() {
            total.add(&node.allocatable);
        }
        total
    }

    /// Resolve the task bodies registered on a node through their jobs.
    pub fn tasks_on_node<'a>(&'a self, node: &'a NodeInfo) -> impl Iterator<Item = &'a TaskInfo> {
        node.tasks.iter().filter_map(|(task_id, job_id)| {
            self.jobs
                .get(job_id)
                .and_then(|job| job.tasks.get(task_id))
        })
    }

    pub fn revocable_nodes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes
            .values()
            .filter(|node| !node.revocable_zone.is_empty())
    }
}
