//! Node-level accounting: capacity, usage and the tasks placed on a host.

use std::collections::BTreeMap;

use scheduler_shared_types::{
    JobId, Node, NodeName, Resource, Result, SchedulerError, TaskId, REVOCABLE_ZONE_LABEL,
};

use crate::task::{allocated_status, TaskInfo, TaskStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub name: NodeName,

    pub capacity: Resource,
    pub allocatable: Resource,
    pub used: Resource,
    pub idle: Resource,
    /// Requests of tasks currently releasing their place on this node.
    pub releasing: Resource,

    /// Tasks registered on this host, mapped to their owning job. The task
    /// bodies live on the jobs; this is one side of the node <-> task
    /// relation.
    pub tasks: BTreeMap<TaskId, JobId>,

    /// Empty for non-revocable nodes.
    pub revocable_zone: String,
}

impl NodeInfo {
    pub fn new(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            capacity: node.capacity.clone(),
            allocatable: node.allocatable.clone(),
            used: Resource::empty(),
            idle: node.allocatable.clone(),
            releasing: Resource::empty(),
            tasks: BTreeMap::new(),
            revocable_zone: zone_of(node),
        }
    }

    /// Placeholder for a host referenced by a pod before its node object
    /// arrives.
    pub fn unresolved(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capacity: Resource::empty(),
            allocatable: Resource::empty(),
            used: Resource::empty(),
            idle: Resource::empty(),
            releasing: Resource::empty(),
            tasks: BTreeMap::new(),
            revocable_zone: String::new(),
        }
    }

    /// Refresh capacity and labels from an updated node object, keeping
    /// the registered tasks and recomputing idle from them.
    pub fn set_node(&mut self, node: &Node) {
        self.capacity = node.capacity.clone();
        self.allocatable = node.allocatable.clone();
        self.revocable_zone = zone_of(node);
        let mut idle = node.allocatable.clone();
        idle.sub(&self.used);
        self.idle = idle;
    }

    pub fn add_task(&mut self, task: &TaskInfo) -> Result<()> {
        if self.tasks.contains_key(&task.uid) {
            return Err(SchedulerError::TaskNotLocated {
                task: format!("{}/{}", task.namespace, task.name),
                node: self.name.clone(),
            });
        }

        match task.status {
            // Pipelined tasks reserve space that releasing tasks will
            // free; they hold no physical capacity yet.
            TaskStatus::Pipelined => {
                self.releasing.sub(&task.resreq);
            }
            status if allocated_status(status) => {
                // A resolved node must actually have room; unresolved
                // placeholders accept anything and reconcile later.
                if !self.allocatable.is_empty() {
                    self.idle.try_sub(&task.resreq).map_err(|_| {
                        SchedulerError::NodeOutOfCapacity {
                            node: self.name.clone(),
                            task: format!("{}/{}", task.namespace, task.name),
                        }
                    })?;
                }
                self.used.add(&task.resreq);
                if status == TaskStatus::Releasing {
                    self.releasing.add(&task.resreq);
                }
            }
            _ => {}
        }

        self.tasks.insert(task.uid.clone(), task.job.clone());
        Ok(())
    }

    pub fn remove_task(&mut self, task: &TaskInfo) -> Result<()> {
        if self.tasks.remove(&task.uid).is_none() {
            return Err(SchedulerError::TaskNotLocated {
                task: format!("{}/{}", task.namespace, task.name),
                node: self.name.clone(),
            });
        }

        match task.status {
            TaskStatus::Pipelined => {
                self.releasing.add(&task.resreq);
            }
            status if allocated_status(status) => {
                self.used.sub(&task.resreq);
                if !self.allocatable.is_empty() {
                    self.idle.add(&task.resreq);
                }
                if status == TaskStatus::Releasing {
                    self.releasing.sub(&task.resreq);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Idle capacity once releasing tasks have drained.
    pub fn future_idle(&self) -> Resource {
        let mut idle = self.idle.clone();
        idle.add(&self.releasing);
        idle
    }

    pub fn contains_task(&self, uid: &TaskId) -> bool {
        self.tasks.contains_key(uid)
    }
}

fn zone_of(node: &Node) -> String {
    node.labels
        .get(REVOCABLE_ZONE_LABEL)
        .cloned()
        .unwrap_or_default()
}
