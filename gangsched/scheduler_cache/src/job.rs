//! Gang-level view of a job: its tasks indexed by status plus the running
//! resource totals the invariants in the cache are built around.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use scheduler_shared_types::{
    DisruptionBudget, JobId, NamespaceName, PodGroup, PodGroupPhase, QueueId, Resource, Result,
    SchedulerError, TaskId,
};

use crate::task::{allocated_status, validate_status_update, TaskInfo, TaskStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct JobInfo {
    pub uid: JobId,

    pub name: String,
    pub namespace: NamespaceName,

    pub queue: QueueId,
    pub priority: i32,
    pub min_available: u32,
    pub preemptible: bool,

    /// Canonical task storage; the status index refers into it by id.
    pub tasks: BTreeMap<TaskId, TaskInfo>,
    pub task_status_index: BTreeMap<TaskStatus, BTreeSet<TaskId>>,

    /// Sum of requests of tasks in a capacity-consuming status.
    pub allocated: Resource,
    /// Sum of requests of every task.
    pub total_request: Resource,

    pub pod_group: Option<PodGroup>,
    pub creation_timestamp: DateTime<Utc>,
}

impl JobInfo {
    pub fn new(uid: JobId) -> Self {
        Self {
            uid,
            name: String::new(),
            namespace: String::new(),
            queue: String::new(),
            priority: 0,
            min_available: 0,
            preemptible: false,
            tasks: BTreeMap::new(),
            task_status_index: BTreeMap::new(),
            allocated: Resource::empty(),
            total_request: Resource::empty(),
            pod_group: None,
            creation_timestamp: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// Attach the gang descriptor, adopting its identity and gang bounds.
    pub fn set_pod_group(&mut self, pg: PodGroup) {
        self.name = pg.name.clone();
        self.namespace = pg.namespace.clone();
        self.min_available = pg.min_member;
        self.queue = if pg.queue.is_empty() {
            pg.namespace.clone()
        } else {
            pg.queue.clone()
        };
        self.priority = pg.priority;
        self.preemptible = pg.preemptible;
        self.creation_timestamp = pg.creation_timestamp;
        self.pod_group = Some(pg);
    }

    pub fn unset_pod_group(&mut self) {
        self.pod_group = None;
    }

    pub fn add_task(&mut self, task: TaskInfo) {
        self.total_request.add(&task.resreq);
        if allocated_status(task.status) {
            self.allocated.add(&task.resreq);
        }
        self.task_status_index
            .entry(task.status)
            .or_default()
            .insert(task.uid.clone());
        self.tasks.insert(task.uid.clone(), task);
    }

    pub fn delete_task(&mut self, uid: &TaskId) -> Result<TaskInfo> {
        let task = self
            .tasks
            .remove(uid)
            .ok_or_else(|| SchedulerError::TaskNotFound {
                task: uid.clone(),
                job: self.uid.clone(),
            })?;

        self.total_request.sub(&task.resreq);
        if allocated_status(task.status) {
            self.allocated.sub(&task.resreq);
        }
        if let Some(bucket) = self.task_status_index.get_mut(&task.status) {
            bucket.remove(uid);
            if bucket.is_empty() {
                self.task_status_index.remove(&task.status);
            }
        }
        Ok(task)
    }

    /// Move a task to a new status bucket, keeping the totals consistent.
    /// The transition is checked against the validation table first; on
    /// rejection nothing changes.
    pub fn update_task_status(&mut self, uid: &TaskId, status: TaskStatus) -> Result<()> {
        let current = self
            .tasks
            .get(uid)
            .ok_or_else(|| SchedulerError::TaskNotFound {
                task: uid.clone(),
                job: self.uid.clone(),
            })?
            .status;
        validate_status_update(current, status)?;

        let mut task = self.delete_task(uid)?;
        task.status = status;
        self.add_task(task);
        Ok(())
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn tasks_in_status(&self, status: TaskStatus) -> impl Iterator<Item = &TaskInfo> {
        self.task_status_index
            .get(&status)
            .into_iter()
            .flatten()
            .filter_map(|uid| self.tasks.get(uid))
    }

    pub fn count_in_status(&self, status: TaskStatus) -> usize {
        self.task_status_index
            .get(&status)
            .map(|bucket| bucket.len())
            .unwrap_or(0)
    }

    /// Tasks holding or about to hold a place on a node.
    pub fn ready_task_num(&self) -> usize {
        [
            TaskStatus::Bound,
            TaskStatus::Binding,
            TaskStatus::Running,
            TaskStatus::Allocated,
            TaskStatus::Succeeded,
        ]
        .iter()
        .map(|s| self.count_in_status(*s))
        .sum()
    }

    pub fn waiting_task_num(&self) -> usize {
        self.count_in_status(TaskStatus::Pipelined)
    }

    pub fn is_ready(&self) -> bool {
        self.ready_task_num() >= self.min_available as usize
    }

    pub fn is_pipelined(&self) -> bool {
        self.waiting_task_num() + self.ready_task_num() >= self.min_available as usize
    }

    /// Pending tasks ordered for allocation: priority descending, then
    /// creation time, then id for determinism.
    pub fn pending_tasks_ordered(&self) -> Vec<&TaskInfo> {
        let mut tasks: Vec<&TaskInfo> = self.tasks_in_status(TaskStatus::Pending).collect();
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.creation_timestamp.cmp(&b.creation_timestamp))
                .then_with(|| a.uid.cmp(&b.uid))
        });
        tasks
    }

    pub fn min_resources(&self) -> Resource {
        self.pod_group
            .as_ref()
            .and_then(|pg| pg.min_resources.clone())
            .unwrap_or_default()
    }

    pub fn budget(&self) -> DisruptionBudget {
        self.pod_group
            .as_ref()
            .map(|pg| pg.budget.clone())
            .unwrap_or_default()
    }

    pub fn pod_group_phase(&self) -> Option<PodGroupPhase> {
        self.pod_group.as_ref().map(|pg| pg.phase)
    }
}

impl std::fmt::Display for JobInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Job ({}): name {}, minAvailable {}, tasks {}",
            self.uid,
            self.name,
            self.min_available,
            self.tasks.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_pod_group, build_task};

    #[test]
    fn totals_track_task_membership() {
        let mut job = JobInfo::new("test/j1".to_string());
        job.add_task(build_task("t1", "test/j1", TaskStatus::Pending, 1000.0, 1024.0));
        job.add_task(build_task("t2", "test/j1", TaskStatus::Running, 500.0, 512.0));

        assert_eq!(job.total_request, Resource::new(1500.0, 1536.0));
        assert_eq!(job.allocated, Resource::new(500.0, 512.0));

        job.delete_task(&"t2".to_string()).unwrap();
        assert_eq!(job.total_request, Resource::new(1000.0, 1024.0));
        assert!(job.allocated.is_empty());
    }

    #[test]
    fn status_buckets_partition_tasks() {
        let mut job = JobInfo::new("test/j1".to_string());
        job.add_task(build_task("t1", "test/j1", TaskStatus::Pending, 100.0, 100.0));
        job.add_task(build_task("t2", "test/j1", TaskStatus::Running, 100.0, 100.0));
        job.add_task(build_task("t3", "test/j1", TaskStatus::Running, 100.0, 100.0));

        let indexed: usize = job
            .task_status_index
            .values()
            .map(|bucket| bucket.len())
            .sum();
        assert_eq!(indexed, job.task_count());

        job.update_task_status(&"t1".to_string(), TaskStatus::Allocated)
            .unwrap();
        assert_eq!(job.count_in_status(TaskStatus::Pending), 0);
        assert_eq!(job.count_in_status(TaskStatus::Allocated), 1);
        assert_eq!(job.allocated, Resource::new(300.0, 300.0));
    }

    #[test]
    fn invalid_transition_leaves_job_unchanged() {
        let mut job = JobInfo::new("test/j1".to_string());
        job.add_task(build_task("t1", "test/j1", TaskStatus::Running, 100.0, 100.0));

        let before = job.clone();
        let err = job
            .update_task_status(&"t1".to_string(), TaskStatus::Pending)
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidStatusTransition { .. }
        ));
        assert_eq!(job, before);
    }

    #[test]
    fn pod_group_adoption_sets_identity() {
        let mut job = JobInfo::new("test/j1".to_string());
        job.set_pod_group(build_pod_group("test", "j1", "q1", 2));

        assert_eq!(job.name, "j1");
        assert_eq!(job.queue, "q1");
        assert_eq!(job.min_available, 2);

        let mut defaulted = JobInfo::new("test/j2".to_string());
        defaulted.set_pod_group(build_pod_group("test", "j2", "", 1));
        assert_eq!(defaulted.queue, "test");
    }

    #[test]
    fn readiness_counts_waiting_and_ready() {
        let mut job = JobInfo::new("test/j1".to_string());
        job.set_pod_group(build_pod_group("test", "j1", "q1", 2));
        job.add_task(build_task("t1", "test/j1", TaskStatus::Running, 100.0, 100.0));
        assert!(!job.is_ready());
        assert!(!job.is_pipelined());

        job.add_task(build_task("t2", "test/j1", TaskStatus::Pipelined, 100.0, 100.0));
        assert!(!job.is_ready());
        assert!(job.is_pipelined());
    }
}
