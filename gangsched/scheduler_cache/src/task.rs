//! Task-level view of a pod inside the scheduler.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use scheduler_shared_types::{
    JobId, NamespaceName, NodeName, Pod, PodPhase, Resource, Result, SchedulerError, TaskId,
    GROUP_NAME_ANNOTATION,
};

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskStatus {
    Pending,
    Allocated,
    Pipelined,
    Binding,
    Bound,
    Running,
    Releasing,
    Succeeded,
    Failed,
    Unknown,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Statuses that consume node capacity.
pub fn allocated_status(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::Allocated
            | TaskStatus::Pipelined
            | TaskStatus::Binding
            | TaskStatus::Bound
            | TaskStatus::Running
            | TaskStatus::Releasing
    )
}

/// Statuses a task never leaves.
pub fn terminated_status(status: TaskStatus) -> bool {
    matches!(status, TaskStatus::Succeeded | TaskStatus::Failed)
}

/// Validation table for status updates. Terminal statuses are absorbing
/// and a Running task cannot fall back to Pending.
pub fn validate_status_update(from: TaskStatus, to: TaskStatus) -> Result<()> {
    let rejected = match (from, to) {
        (f, t) if f == t => false,
        (f, _) if terminated_status(f) => true,
        (TaskStatus::Running, TaskStatus::Pending) => true,
        _ => false,
    };
    if rejected {
        return Err(SchedulerError::InvalidStatusTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskInfo {
    pub uid: TaskId,
    pub job: JobId,

    pub name: String,
    pub namespace: NamespaceName,

    pub resreq: Resource,

    /// Empty until the task is placed.
    pub node_name: NodeName,
    pub status: TaskStatus,
    pub priority: i32,
    pub preemptible: bool,

    pub creation_timestamp: DateTime<Utc>,

    /// Per-node predicate failures, kept for diagnostics only.
    pub failed_predicates: BTreeMap<NodeName, String>,
}

impl TaskInfo {
    pub fn from_pod(pod: &Pod) -> Self {
        Self {
            uid: pod.uid.clone(),
            job: job_id_of(pod),
            name: pod.name.clone(),
            namespace: pod.namespace.clone(),
            resreq: pod.resource_request.clone(),
            node_name: pod.node_name.clone(),
            status: status_of(pod),
            priority: pod.priority,
            preemptible: pod.preemptible,
            creation_timestamp: pod.creation_timestamp,
            failed_predicates: BTreeMap::new(),
        }
    }

    /// Histogram of predicate failures across nodes, for event messages.
    pub fn failure_summary(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for reason in self.failed_predicates.values() {
            *counts.entry(reason.as_str()).or_insert(0) += 1;
        }
        counts
            .iter()
            .map(|(reason, count)| format!("{count} {reason}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for TaskInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Task ({}:{}/{}): job {}, status {}, pri {}, resreq {}",
            self.uid, self.namespace, self.name, self.job, self.status, self.priority, self.resreq
        )
    }
}

/// Owning job identity: group-name annotation first, controller owner
/// reference second, the pod itself as a last resort.
pub fn job_id_of(pod: &Pod) -> JobId {
    if let Some(group) = pod.annotations.get(GROUP_NAME_ANNOTATION) {
        if !group.is_empty() {
            return format!("{}/{}", pod.namespace, group);
        }
    }
    if let Some(controller) = &pod.controller {
        return format!("{}/{}", pod.namespace, controller);
    }
    format!("{}/{}", pod.namespace, pod.name)
}

fn status_of(pod: &Pod) -> TaskStatus {
    match pod.phase {
        PodPhase::Running => {
            if pod.deleting {
                TaskStatus::Releasing
            } else {
                TaskStatus::Running
            }
        }
        PodPhase::Pending => {
            if pod.deleting {
                TaskStatus::Releasing
            } else if pod.node_name.is_empty() {
                TaskStatus::Pending
            } else {
                TaskStatus::Bound
            }
        }
        PodPhase::Succeeded => TaskStatus::Succeeded,
        PodPhase::Failed => TaskStatus::Failed,
        PodPhase::Unknown => TaskStatus::Unknown,
    }
}
