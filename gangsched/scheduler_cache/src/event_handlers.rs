//! Mutation surface of the cache: one handler per ingest operation.
//!
//! Every handler takes the writer lock, applies the one event, and either
//! succeeds or leaves the cache untouched for that event.

use scheduler_shared_types::{
    ClusterEvent, Node, NodeName, Pod, PodGroup, QueueId, QueueSpec, Resource, ResourceQuota,
    Result, SchedulerError,
};
use tracing::{debug, warn};

use crate::job::JobInfo;
use crate::namespace::NamespaceCollection;
use crate::node::NodeInfo;
use crate::queue::QueueInfo;
use crate::task::{terminated_status, TaskInfo};
use crate::{CacheState, SchedulerCache};

impl SchedulerCache {
    /// Dispatch one ingest event to its typed handler.
    pub fn apply(&self, event: ClusterEvent) -> Result<()> {
        match event {
            ClusterEvent::NodeAdded(node) => self.add_node(&node),
            ClusterEvent::NodeUpdated(node) => self.update_node(&node),
            ClusterEvent::NodeRemoved(name) => self.delete_node(&name),
            ClusterEvent::PodAdded(pod) => self.add_pod(&pod),
            ClusterEvent::PodUpdated { old, new } => self.update_pod(&old, &new),
            ClusterEvent::PodRemoved(pod) => self.delete_pod(&pod),
            ClusterEvent::PodGroupAdded(pg) => self.add_pod_group(&pg),
            ClusterEvent::PodGroupUpdated(pg) => self.update_pod_group(&pg),
            ClusterEvent::PodGroupRemoved(pg) => self.delete_pod_group(&pg),
            ClusterEvent::QueueAdded(spec) => self.add_queue(&spec),
            ClusterEvent::QueueUpdated(spec) => self.update_queue(&spec),
            ClusterEvent::QueueRemoved(name) => self.delete_queue(&name),
            ClusterEvent::QuotaAdded(quota) => self.add_resource_quota(&quota),
            ClusterEvent::QuotaUpdated(quota) => self.update_resource_quota(&quota),
            ClusterEvent::QuotaRemoved(quota) => self.delete_resource_quota(&quota),
        }
    }

    pub fn add_pod(&self, pod: &Pod) -> Result<()> {
        let mut state = self.write_state();
        add_task(&mut state, TaskInfo::from_pod(pod))
    }

    pub fn update_pod(&self, old: &Pod, new: &Pod) -> Result<()> {
        let mut state = self.write_state();
        update_task(&mut state, &TaskInfo::from_pod(old), TaskInfo::from_pod(new))
    }

    pub fn delete_pod(&self, pod: &Pod) -> Result<()> {
        let mut state = self.write_state();
        delete_task(&mut state, &TaskInfo::from_pod(pod))
    }

    pub fn add_pod_group(&self, pg: &PodGroup) -> Result<()> {
        if pg.namespace.is_empty() || pg.name.is_empty() {
            warn!("ignoring pod group without namespace/name identity");
            return Ok(());
        }
        let mut state = self.write_state();
        state
            .jobs
            .entry(pg.job_id())
            .or_insert_with(|| JobInfo::new(pg.job_id()))
            .set_pod_group(pg.clone());
        Ok(())
    }

    pub fn update_pod_group(&self, pg: &PodGroup) -> Result<()> {
        self.add_pod_group(pg)
    }

    pub fn delete_pod_group(&self, pg: &PodGroup) -> Result<()> {
        if pg.namespace.is_empty() || pg.name.is_empty() {
            warn!("ignoring pod group without namespace/name identity");
            return Ok(());
        }
        let mut state = self.write_state();
        let job_id = pg.job_id();
        match state.jobs.get_mut(&job_id) {
            Some(job) => {
                job.unset_pod_group();
                state.deleted_jobs.push_back((job_id, 0));
            }
            None => warn!(job = %job_id, "delete for unknown pod group"),
        }
        Ok(())
    }

    pub fn add_queue(&self, spec: &QueueSpec) -> Result<()> {
        let mut state = self.write_state();
        state
            .queues
            .insert(spec.name.clone(), QueueInfo::from_spec(spec));
        Ok(())
    }

    pub fn update_queue(&self, spec: &QueueSpec) -> Result<()> {
        self.add_queue(spec)
    }

    /// Deleting a queue still referenced by jobs is permitted; those jobs
    /// simply stop being enqueueable.
    pub fn delete_queue(&self, name: &QueueId) -> Result<()> {
        let mut state = self.write_state();
        if state.queues.remove(name).is_none() {
            warn!(queue = %name, "delete for unknown queue");
        }
        Ok(())
    }

    pub fn add_resource_quota(&self, quota: &ResourceQuota) -> Result<()> {
        let mut state = self.write_state();
        state
            .namespaces
            .entry(quota.namespace.clone())
            .or_insert_with(|| NamespaceCollection::new(quota.namespace.clone()))
            .update(quota);
        Ok(())
    }

    pub fn update_resource_quota(&self, quota: &ResourceQuota) -> Result<()> {
        self.add_resource_quota(quota)
    }

    pub fn delete_resource_quota(&self, quota: &ResourceQuota) -> Result<()> {
        let mut state = self.write_state();
        if let Some(collection) = state.namespaces.get_mut(&quota.namespace) {
            collection.delete(quota);
            if collection.is_empty() {
                state.namespaces.remove(&quota.namespace);
            }
        }
        Ok(())
    }

    pub fn add_node(&self, node: &Node) -> Result<()> {
        let mut state = self.write_state();
        match state.nodes.get_mut(&node.name) {
            // A placeholder created by an early pod gets resolved in place.
            Some(existing) => existing.set_node(node),
            None => {
                state
                    .nodes
                    .insert(node.name.clone(), NodeInfo::new(node));
            }
        }
        Ok(())
    }

    pub fn update_node(&self, node: &Node) -> Result<()> {
        self.add_node(node)
    }

    pub fn delete_node(&self, name: &NodeName) -> Result<()> {
        let mut state = self.write_state();
        match state.nodes.remove(name) {
            Some(node) if !node.tasks.is_empty() => {
                warn!(node = %name, tasks = node.tasks.len(), "removed node still hosting tasks");
            }
            Some(_) => {}
            None => warn!(node = %name, "delete for unknown node"),
        }
        Ok(())
    }
}

fn add_task(state: &mut CacheState, task: TaskInfo) -> Result<()> {
    if let Some(job) = state.jobs.get(&task.job) {
        if job.tasks.contains_key(&task.uid) {
            debug!(task = %task.uid, job = %task.job, "pod already registered");
            return Ok(());
        }
    }

    if !task.node_name.is_empty() && !terminated_status(task.status) {
        let node = state
            .nodes
            .entry(task.node_name.clone())
            .or_insert_with(|| NodeInfo::unresolved(&task.node_name));
        node.add_task(&task)?;
    }

    state
        .jobs
        .entry(task.job.clone())
        .or_insert_with(|| JobInfo::new(task.job.clone()))
        .add_task(task);
    Ok(())
}

/// An update must find the old task registered on the host it claims;
/// otherwise the event is rejected as mislocated.
fn update_task(state: &mut CacheState, old: &TaskInfo, new: TaskInfo) -> Result<()> {
    if !old.node_name.is_empty() {
        let located = state
            .nodes
            .get(&old.node_name)
            .map(|node| node.contains_task(&old.uid))
            .unwrap_or(false);
        if !located {
            return Err(SchedulerError::TaskNotLocated {
                task: format!("{}/{}", old.namespace, old.name),
                node: old.node_name.clone(),
            });
        }
    }

    delete_task(state, old)?;
    add_task(state, new)
}

fn delete_task(state: &mut CacheState, task: &TaskInfo) -> Result<()> {
    let job = state
        .jobs
        .get_mut(&task.job)
        .ok_or_else(|| SchedulerError::TaskNotFound {
            task: task.uid.clone(),
            job: task.job.clone(),
        })?;
    // The job's stored copy carries the status the node accounting saw.
    let stored = job.delete_task(&task.uid)?;

    let job_empty = job.tasks.is_empty() && job.pod_group.is_none();
    if job_empty {
        state.jobs.remove(&task.job);
    }

    if !stored.node_name.is_empty() {
        if let Some(node) = state.nodes.get_mut(&stored.node_name) {
            if node.contains_task(&stored.uid) {
                node.remove_task(&stored)?;
            }
            let placeholder = node.allocatable == Resource::empty();
            if placeholder && node.tasks.is_empty() {
                state.nodes.remove(&stored.node_name);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_node, build_pod, build_pod_group, build_quota};
    use crate::TaskStatus;
    use scheduler_shared_types::PodPhase;

    fn cache_with_node() -> SchedulerCache {
        let cache = SchedulerCache::new();
        cache.add_node(&build_node("n1", 2000.0, 10240.0)).unwrap();
        cache
    }

    #[test]
    fn update_task_success_case() {
        let cache = cache_with_node();
        let old = build_pod("test", "p1", "n1", PodPhase::Running);
        cache.add_pod(&old).unwrap();

        let mut new = old.clone();
        new.resource_request = Resource::new(1000.0, 2048.0);
        cache.update_pod(&old, &new).unwrap();

        let snapshot = cache.snapshot();
        let job = &snapshot.jobs["test/j1"];
        assert_eq!(job.total_request, Resource::new(1000.0, 2048.0));
        assert_eq!(
            snapshot.nodes["n1"].used,
            Resource::new(1000.0, 2048.0)
        );
    }

    #[test]
    fn update_task_fails_when_not_located() {
        let cache = cache_with_node();
        // A succeeded pod is never registered on its host.
        let old = build_pod("test", "p1", "n1", PodPhase::Succeeded);
        cache.add_pod(&old).unwrap();

        let mut new = old.clone();
        new.phase = PodPhase::Running;
        let err = cache.update_pod(&old, &new).unwrap_err();
        assert!(matches!(err, SchedulerError::TaskNotLocated { .. }));
    }

    #[test]
    fn add_pod_is_idempotent() {
        let cache = cache_with_node();
        let pod = build_pod("test", "p1", "n1", PodPhase::Running);

        cache.add_pod(&pod).unwrap();
        cache.add_pod(&pod).unwrap();

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.jobs["test/j1"].task_count(), 1);
        assert_eq!(snapshot.nodes["n1"].used, Resource::new(1000.0, 1024.0));
    }

    #[test]
    fn add_then_delete_restores_prior_state() {
        let cache = cache_with_node();
        let before = cache.snapshot();

        let pod = build_pod("test", "p1", "n1", PodPhase::Running);
        cache.add_pod(&pod).unwrap();
        cache.delete_pod(&pod).unwrap();

        let after = cache.snapshot();
        assert_eq!(before.jobs.keys().collect::<Vec<_>>(), after.jobs.keys().collect::<Vec<_>>());
        assert_eq!(before.nodes["n1"].used, after.nodes["n1"].used);
        assert_eq!(before.nodes["n1"].idle, after.nodes["n1"].idle);
    }

    #[test]
    fn pod_group_attach_and_detach() {
        let cache = cache_with_node();
        cache
            .add_pod(&build_pod("test", "p1", "n1", PodPhase::Running))
            .unwrap();
        let pg = build_pod_group("test", "j1", "q1", 1);
        cache.add_pod_group(&pg).unwrap();

        assert!(cache.snapshot().jobs["test/j1"].pod_group.is_some());

        cache.delete_pod_group(&pg).unwrap();
        assert!(cache.snapshot().jobs["test/j1"].pod_group.is_none());
    }

    #[test]
    fn pod_group_without_identity_is_ignored() {
        let cache = SchedulerCache::new();
        let mut pg = build_pod_group("", "", "q1", 1);
        pg.namespace.clear();
        pg.name.clear();
        cache.add_pod_group(&pg).unwrap();
        assert!(cache.snapshot().jobs.is_empty());
    }

    #[test]
    fn deleted_job_is_collected_after_tasks_drain() {
        let cache = cache_with_node();
        let pod = build_pod("test", "p1", "n1", PodPhase::Running);
        cache.add_pod(&pod).unwrap();
        let pg = build_pod_group("test", "j1", "q1", 1);
        cache.add_pod_group(&pg).unwrap();
        cache.delete_pod_group(&pg).unwrap();

        // Still has a task: the first pass must keep the job around.
        cache.process_cleanup();
        assert!(cache.snapshot().jobs.contains_key("test/j1"));

        cache.delete_pod(&pod).unwrap();
        cache.process_cleanup();
        assert!(!cache.snapshot().jobs.contains_key("test/j1"));
    }

    #[test]
    fn queue_registry_add_update_delete() {
        let cache = SchedulerCache::new();
        let spec = scheduler_shared_types::QueueSpec {
            name: "q1".to_string(),
            weight: 1,
            capability: None,
            reclaimable: None,
        };
        cache.add_queue(&spec).unwrap();
        assert_eq!(cache.snapshot().queues["q1"].weight, 1);

        let mut updated = spec.clone();
        updated.weight = 4;
        cache.update_queue(&updated).unwrap();
        assert_eq!(cache.snapshot().queues["q1"].weight, 4);

        cache.delete_queue(&"q1".to_string()).unwrap();
        assert!(cache.snapshot().queues.is_empty());
    }

    #[test]
    fn quota_collection_tracks_namespace() {
        let cache = SchedulerCache::new();
        let quota = build_quota("test", "rq1", &[("cpu", 4000.0, 1000.0)]);
        cache.add_resource_quota(&quota).unwrap();
        assert_eq!(
            cache.snapshot().namespaces["test"].quota_free.milli_cpu,
            3000.0
        );

        cache.delete_resource_quota(&quota).unwrap();
        assert!(cache.snapshot().namespaces.is_empty());
    }

    #[test]
    fn running_to_pending_transition_is_rejected() {
        let cache = cache_with_node();
        cache
            .add_pod(&build_pod("test", "p1", "n1", PodPhase::Running))
            .unwrap();

        let snapshot_before = cache.snapshot();
        {
            let mut state = cache.write_state();
            let job = state.jobs.get_mut("test/j1").unwrap();
            let uid = "test-p1-uid".to_string();
            let err = job.update_task_status(&uid, TaskStatus::Pending).unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidStatusTransition { .. }));
        }
        let snapshot_after = cache.snapshot();
        assert_eq!(
            snapshot_before.jobs["test/j1"],
            snapshot_after.jobs["test/j1"]
        );
    }

    #[test]
    fn unknown_node_placeholder_resolves_later() {
        let cache = SchedulerCache::new();
        cache
            .add_pod(&build_pod("test", "p1", "n1", PodPhase::Running))
            .unwrap();

        // Placeholder: capacity unknown, task registered.
        let snapshot = cache.snapshot();
        assert!(snapshot.nodes["n1"].allocatable.is_empty());
        assert!(snapshot.nodes["n1"].contains_task(&"test-p1-uid".to_string()));

        cache.add_node(&build_node("n1", 2000.0, 10240.0)).unwrap();
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.nodes["n1"].idle, Resource::new(1000.0, 9216.0));
    }
}
