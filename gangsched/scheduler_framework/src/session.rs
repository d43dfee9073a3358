//! The per-cycle scheduling session.
//!
//! A session owns a mutable copy of the snapshot for the duration of one
//! cycle. Plugins register callbacks tagged with their name; the phase
//! actions consult the aggregated callbacks and commit decisions through
//! [`Session::allocate`], [`Session::pipeline`] and [`Session::evict`],
//! which keep the snapshot consistent, fire event handlers, and record
//! the intents the driver dispatches after close.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use scheduler_cache::{JobInfo, NodeInfo, QueueInfo, Snapshot, TaskInfo, TaskStatus};
use scheduler_shared_types::{
    JobId, NodeName, PodGroupPhase, Resource, Result, SchedulerError, TaskId, Tolerance,
};
use tracing::{debug, error};

use crate::{AdmissionEvent, BindingIntent, CycleOutcome, EvictionIntent, Plugin, Vote};

pub type QueueCompareFn = Box<dyn Fn(&QueueInfo, &QueueInfo) -> Ordering + Send>;
pub type JobCompareFn = Box<dyn Fn(&JobInfo, &JobInfo) -> Ordering + Send>;
pub type JobEnqueueableFn = Box<dyn Fn(&SessionState, &JobInfo) -> Vote + Send>;
pub type JobBoolFn = Box<dyn Fn(&JobInfo) -> bool + Send>;
pub type PredicateFn = Box<dyn Fn(&TaskInfo, &NodeInfo) -> Result<()> + Send>;
pub type NodeOrderFn = Box<dyn Fn(&TaskInfo, &NodeInfo) -> Result<f64> + Send>;
pub type ReclaimableFn =
    Box<dyn Fn(&SessionState, &TaskInfo, &[&TaskInfo]) -> (Vec<TaskId>, Vote) + Send>;
pub type PreemptableFn = Box<dyn Fn(&SessionState, &TaskInfo, &[&TaskInfo]) -> Vec<TaskId> + Send>;
pub type QueueBoolFn = Box<dyn Fn(&QueueInfo) -> bool + Send>;
pub type VictimTasksFn = Box<dyn Fn(&SessionState) -> Vec<TaskId> + Send>;

/// Fired on every allocation and eviction commit.
pub struct Event {
    pub task: TaskInfo,
    /// Queue owning the task's job.
    pub queue: String,
}

pub struct EventHandler {
    pub allocate_fn: Option<Box<dyn Fn(&Event) + Send>>,
    pub deallocate_fn: Option<Box<dyn Fn(&Event) + Send>>,
}

#[derive(Default)]
struct Registries {
    queue_order_fns: Vec<(String, QueueCompareFn)>,
    job_order_fns: Vec<(String, JobCompareFn)>,
    job_enqueueable_fns: Vec<(String, JobEnqueueableFn)>,
    job_pipelined_fns: Vec<(String, JobBoolFn)>,
    job_starving_fns: Vec<(String, JobBoolFn)>,
    predicate_fns: Vec<(String, PredicateFn)>,
    node_order_fns: Vec<(String, NodeOrderFn)>,
    reclaimable_fns: Vec<(String, ReclaimableFn)>,
    preemptable_fns: Vec<(String, PreemptableFn)>,
    overused_fns: Vec<(String, QueueBoolFn)>,
    victim_tasks_fns: Vec<(String, VictimTasksFn)>,
    event_handlers: Vec<(String, EventHandler)>,
}

impl Registries {
    fn unregister(&mut self, plugin: &str) {
        self.queue_order_fns.retain(|(name, _)| name != plugin);
        self.job_order_fns.retain(|(name, _)| name != plugin);
        self.job_enqueueable_fns.retain(|(name, _)| name != plugin);
        self.job_pipelined_fns.retain(|(name, _)| name != plugin);
        self.job_starving_fns.retain(|(name, _)| name != plugin);
        self.predicate_fns.retain(|(name, _)| name != plugin);
        self.node_order_fns.retain(|(name, _)| name != plugin);
        self.reclaimable_fns.retain(|(name, _)| name != plugin);
        self.preemptable_fns.retain(|(name, _)| name != plugin);
        self.overused_fns.retain(|(name, _)| name != plugin);
        self.victim_tasks_fns.retain(|(name, _)| name != plugin);
        self.event_handlers.retain(|(name, _)| name != plugin);
    }
}

/// The mutable snapshot view callbacks and actions operate on.
pub struct SessionState {
    pub snapshot: Snapshot,
    pub total_resource: Resource,
    /// Owning job of every task in the snapshot, fixed for the cycle.
    task_owner: BTreeMap<TaskId, JobId>,
    /// Events recorded by callbacks; interior mutability because admission
    /// callbacks only hold a shared view of the state.
    events: Mutex<Vec<AdmissionEvent>>,
}

impl SessionState {
    fn new(snapshot: Snapshot) -> Self {
        let total_resource = snapshot.total_resource();
        let mut task_owner = BTreeMap::new();
        for (job_id, job) in &snapshot.jobs {
            for task_id in job.tasks.keys() {
                task_owner.insert(task_id.clone(), job_id.clone());
            }
        }
        Self {
            snapshot,
            total_resource,
            task_owner,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn job_of_task(&self, task: &TaskId) -> Option<&JobInfo> {
        self.task_owner
            .get(task)
            .and_then(|job_id| self.snapshot.jobs.get(job_id))
    }

    pub fn find_task(&self, task: &TaskId) -> Option<&TaskInfo> {
        self.job_of_task(task).and_then(|job| job.tasks.get(task))
    }

    /// Jobs owned by a queue, as stable ids.
    pub fn jobs_in_queue(&self, queue: &str) -> Vec<JobId> {
        self.snapshot
            .jobs
            .iter()
            .filter(|(_, job)| job.queue == queue)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Record a user-visible event against a job's gang descriptor.
    pub fn record_event(&self, event: AdmissionEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

pub struct Session {
    pub state: SessionState,
    registries: Registries,
    plugins: Vec<Box<dyn Plugin>>,
    bindings: Vec<BindingIntent>,
    evictions: Vec<EvictionIntent>,
    contained_panics: u64,
}

impl Session {
    /// Open a session: run every plugin's open hook, containing panics by
    /// stripping the offender's callbacks for the cycle.
    pub fn open(snapshot: Snapshot, mut plugins: Vec<Box<dyn Plugin>>) -> Self {
        let mut ssn = Session {
            state: SessionState::new(snapshot),
            registries: Registries::default(),
            plugins: Vec::new(),
            bindings: Vec::new(),
            evictions: Vec::new(),
            contained_panics: 0,
        };

        for plugin in plugins.iter_mut() {
            let name = plugin.name().to_string();
            let outcome = catch_unwind(AssertUnwindSafe(|| plugin.on_session_open(&mut ssn)));
            if outcome.is_err() {
                error!(plugin = %name, "plugin open hook panicked; callbacks dropped for this cycle");
                ssn.registries.unregister(&name);
                ssn.contained_panics += 1;
            }
        }
        ssn.plugins = plugins;
        ssn
    }

    /// Close the session: run close hooks and hand back the cycle outcome.
    pub fn close(mut self) -> CycleOutcome {
        let mut plugins = std::mem::take(&mut self.plugins);
        for plugin in plugins.iter_mut() {
            let name = plugin.name().to_string();
            let outcome = catch_unwind(AssertUnwindSafe(|| plugin.on_session_close(&mut self)));
            if outcome.is_err() {
                error!(plugin = %name, "plugin close hook panicked");
                self.contained_panics += 1;
            }
        }

        CycleOutcome {
            bindings: self.bindings,
            evictions: self.evictions,
            events: self
                .state
                .events
                .into_inner()
                .unwrap_or_else(|e| e.into_inner()),
            contained_panics: self.contained_panics,
        }
    }

    // ----- registration surface -----

    pub fn add_queue_order_fn(&mut self, plugin: &str, f: QueueCompareFn) {
        self.registries.queue_order_fns.push((plugin.to_string(), f));
    }

    pub fn add_job_order_fn(&mut self, plugin: &str, f: JobCompareFn) {
        self.registries.job_order_fns.push((plugin.to_string(), f));
    }

    pub fn add_job_enqueueable_fn(&mut self, plugin: &str, f: JobEnqueueableFn) {
        self.registries
            .job_enqueueable_fns
            .push((plugin.to_string(), f));
    }

    pub fn add_job_pipelined_fn(&mut self, plugin: &str, f: JobBoolFn) {
        self.registries
            .job_pipelined_fns
            .push((plugin.to_string(), f));
    }

    pub fn add_job_starving_fn(&mut self, plugin: &str, f: JobBoolFn) {
        self.registries
            .job_starving_fns
            .push((plugin.to_string(), f));
    }

    pub fn add_predicate_fn(&mut self, plugin: &str, f: PredicateFn) {
        self.registries.predicate_fns.push((plugin.to_string(), f));
    }

    pub fn add_node_order_fn(&mut self, plugin: &str, f: NodeOrderFn) {
        self.registries.node_order_fns.push((plugin.to_string(), f));
    }

    pub fn add_reclaimable_fn(&mut self, plugin: &str, f: ReclaimableFn) {
        self.registries
            .reclaimable_fns
            .push((plugin.to_string(), f));
    }

    pub fn add_preemptable_fn(&mut self, plugin: &str, f: PreemptableFn) {
        self.registries
            .preemptable_fns
            .push((plugin.to_string(), f));
    }

    pub fn add_overused_fn(&mut self, plugin: &str, f: QueueBoolFn) {
        self.registries.overused_fns.push((plugin.to_string(), f));
    }

    pub fn add_victim_tasks_fn(&mut self, plugin: &str, f: VictimTasksFn) {
        self.registries
            .victim_tasks_fns
            .push((plugin.to_string(), f));
    }

    pub fn add_event_handler(&mut self, plugin: &str, handler: EventHandler) {
        self.registries
            .event_handlers
            .push((plugin.to_string(), handler));
    }

    // ----- aggregated evaluation -----

    /// Lexicographic chain over registered comparators.
    pub fn queue_order(&self, l: &QueueInfo, r: &QueueInfo) -> Ordering {
        for (_, f) in &self.registries.queue_order_fns {
            let ord = f(l, r);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Lexicographic chain, falling back to priority, creation time and id
    /// so job iteration is always fully ordered.
    pub fn job_order(&self, l: &JobInfo, r: &JobInfo) -> Ordering {
        for (_, f) in &self.registries.job_order_fns {
            let ord = f(l, r);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        r.priority
            .cmp(&l.priority)
            .then_with(|| l.creation_timestamp.cmp(&r.creation_timestamp))
            .then_with(|| l.uid.cmp(&r.uid))
    }

    /// First non-abstaining callback wins; no callbacks means permit.
    pub fn job_enqueueable(&self, job: &JobInfo) -> bool {
        for (_, f) in &self.registries.job_enqueueable_fns {
            match f(&self.state, job) {
                Vote::Permit => return true,
                Vote::Reject => return false,
                Vote::Abstain => continue,
            }
        }
        true
    }

    /// Logical AND across callbacks.
    pub fn job_pipelined(&self, job: &JobInfo) -> bool {
        self.registries
            .job_pipelined_fns
            .iter()
            .all(|(_, f)| f(job))
    }

    /// Logical OR across callbacks.
    pub fn job_starving(&self, job: &JobInfo) -> bool {
        self.registries
            .job_starving_fns
            .iter()
            .any(|(_, f)| f(job))
    }

    /// Every predicate must accept the candidate.
    pub fn predicate(&self, task: &TaskInfo, node: &NodeInfo) -> Result<()> {
        for (_, f) in &self.registries.predicate_fns {
            f(task, node)?;
        }
        Ok(())
    }

    /// Summed score; a scorer error degrades to zero for that scorer only.
    pub fn node_order(&self, task: &TaskInfo, node: &NodeInfo) -> f64 {
        let mut score = 0.0;
        for (plugin, f) in &self.registries.node_order_fns {
            match f(task, node) {
                Ok(s) => score += s,
                Err(err) => {
                    debug!(plugin = %plugin, node = %node.name, %err, "node order callback failed");
                }
            }
        }
        score
    }

    /// Union of victims across callbacks; any rejection short-circuits to
    /// no victims.
    pub fn reclaimable(&self, reclaimer: &TaskInfo, candidates: &[&TaskInfo]) -> Vec<TaskId> {
        let mut victims: Vec<TaskId> = Vec::new();
        let mut seen = BTreeSet::new();
        for (_, f) in &self.registries.reclaimable_fns {
            let (chosen, vote) = f(&self.state, reclaimer, candidates);
            if vote == Vote::Reject {
                return Vec::new();
            }
            for victim in chosen {
                if seen.insert(victim.clone()) {
                    victims.push(victim);
                }
            }
        }
        victims
    }

    /// Union of victims across callbacks.
    pub fn preemptable(&self, preemptor: &TaskInfo, candidates: &[&TaskInfo]) -> Vec<TaskId> {
        let mut victims: Vec<TaskId> = Vec::new();
        let mut seen = BTreeSet::new();
        for (_, f) in &self.registries.preemptable_fns {
            for victim in f(&self.state, preemptor, candidates) {
                if seen.insert(victim.clone()) {
                    victims.push(victim);
                }
            }
        }
        victims
    }

    /// Logical OR across callbacks.
    pub fn overused(&self, queue: &QueueInfo) -> bool {
        self.registries.overused_fns.iter().any(|(_, f)| f(queue))
    }

    /// Union of unconditional eviction candidates.
    pub fn victim_tasks(&self) -> Vec<TaskId> {
        let mut victims: Vec<TaskId> = Vec::new();
        let mut seen = BTreeSet::new();
        for (_, f) in &self.registries.victim_tasks_fns {
            for victim in f(&self.state) {
                if seen.insert(victim.clone()) {
                    victims.push(victim);
                }
            }
        }
        victims
    }

    // ----- commit operations -----

    /// Commit an allocation: the task becomes Allocated on the node, the
    /// allocate handlers fire, and a binding intent is recorded.
    pub fn allocate(&mut self, task: &TaskId, node: &NodeName) -> Result<()> {
        let updated = self.transition(task, Some(node), TaskStatus::Allocated)?;
        self.bindings.push(BindingIntent {
            task: updated.uid.clone(),
            job: updated.job.clone(),
            node: node.clone(),
        });
        let queue = self.queue_of(&updated.job);
        self.fire_allocate(&Event {
            task: updated,
            queue,
        });
        Ok(())
    }

    /// Stage a task onto a node whose releasing resources will fit it. No
    /// binding intent yet; the placement is realized in a later cycle.
    pub fn pipeline(&mut self, task: &TaskId, node: &NodeName) -> Result<()> {
        let updated = self.transition(task, Some(node), TaskStatus::Pipelined)?;
        let queue = self.queue_of(&updated.job);
        self.fire_allocate(&Event {
            task: updated,
            queue,
        });
        Ok(())
    }

    /// Commit an eviction: the task starts releasing its place, the
    /// deallocate handlers fire, and an eviction intent is recorded.
    pub fn evict(&mut self, task: &TaskId) -> Result<()> {
        let updated = self.transition(task, None, TaskStatus::Releasing)?;
        self.evictions.push(EvictionIntent {
            task: updated.uid.clone(),
            job: updated.job.clone(),
        });
        let queue = self.queue_of(&updated.job);
        self.fire_deallocate(&Event {
            task: updated,
            queue,
        });
        Ok(())
    }

    fn queue_of(&self, job: &JobId) -> String {
        self.state
            .snapshot
            .jobs
            .get(job)
            .map(|j| j.queue.clone())
            .unwrap_or_default()
    }

    /// Mark the gang descriptor phase of a job.
    pub fn set_job_phase(&mut self, job: &JobId, phase: PodGroupPhase) {
        if let Some(pg) = self
            .state
            .snapshot
            .jobs
            .get_mut(job)
            .and_then(|j| j.pod_group.as_mut())
        {
            pg.phase = phase;
        }
    }

    /// Keep a predicate failure on the task for diagnostics.
    pub fn record_predicate_failure(&mut self, task: &TaskId, node: &NodeName, reason: String) {
        let Some(job_id) = self.state.task_owner.get(task).cloned() else {
            return;
        };
        if let Some(stored) = self
            .state
            .snapshot
            .jobs
            .get_mut(&job_id)
            .and_then(|j| j.tasks.get_mut(task))
        {
            stored.failed_predicates.insert(node.clone(), reason);
        }
    }

    /// Move a task between status buckets and node accounting, returning
    /// the updated task. On any error the snapshot is left as it was.
    fn transition(
        &mut self,
        task: &TaskId,
        new_node: Option<&NodeName>,
        status: TaskStatus,
    ) -> Result<TaskInfo> {
        let job_id = self
            .state
            .task_owner
            .get(task)
            .cloned()
            .ok_or_else(|| SchedulerError::TaskNotFound {
                task: task.clone(),
                job: String::new(),
            })?;

        let snapshot = &mut self.state.snapshot;
        let stored = snapshot
            .jobs
            .get(&job_id)
            .and_then(|j| j.tasks.get(task))
            .cloned()
            .ok_or_else(|| SchedulerError::TaskNotFound {
                task: task.clone(),
                job: job_id.clone(),
            })?;

        scheduler_cache::task::validate_status_update(stored.status, status)?;

        let mut updated = stored.clone();
        updated.status = status;
        if let Some(node) = new_node {
            updated.node_name = node.clone();
        }

        // Capacity check up front so a failed placement never leaves the
        // job and node accounting out of step.
        if status == TaskStatus::Allocated {
            let node = snapshot
                .nodes
                .get(&updated.node_name)
                .ok_or_else(|| SchedulerError::NodeNotFound(updated.node_name.clone()))?;
            if !updated
                .resreq
                .less_equal_in_all_dims(&node.idle, Tolerance::Infinity)
            {
                return Err(SchedulerError::NodeOutOfCapacity {
                    node: updated.node_name.clone(),
                    task: updated.uid.clone(),
                });
            }
        }

        let was_registered = !stored.node_name.is_empty()
            && snapshot
                .nodes
                .get(&stored.node_name)
                .map(|n| n.contains_task(&stored.uid))
                .unwrap_or(false);
        if was_registered {
            if let Some(node) = snapshot.nodes.get_mut(&stored.node_name) {
                node.remove_task(&stored)?;
            }
        }

        if !updated.node_name.is_empty() {
            if let Some(node) = snapshot.nodes.get_mut(&updated.node_name) {
                if let Err(err) = node.add_task(&updated) {
                    // Roll the old registration back before surfacing.
                    if was_registered {
                        if let Some(old) = snapshot.nodes.get_mut(&stored.node_name) {
                            let _ = old.add_task(&stored);
                        }
                    }
                    return Err(err);
                }
            }
        }

        let job = snapshot
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| SchedulerError::TaskNotFound {
                task: task.clone(),
                job: job_id.clone(),
            })?;
        job.update_task_status(task, status)?;
        if let Some(node) = new_node {
            if let Some(t) = job.tasks.get_mut(task) {
                t.node_name = node.clone();
            }
        }

        Ok(job.tasks.get(task).cloned().unwrap_or(updated))
    }

    fn fire_allocate(&self, event: &Event) {
        for (_, handler) in &self.registries.event_handlers {
            if let Some(f) = &handler.allocate_fn {
                f(event);
            }
        }
    }

    fn fire_deallocate(&self, event: &Event) {
        for (_, handler) in &self.registries.event_handlers {
            if let Some(f) = &handler.deallocate_fn {
                f(event);
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("jobs", &self.state.snapshot.jobs.len())
            .field("nodes", &self.state.snapshot.nodes.len())
            .field("queues", &self.state.snapshot.queues.len())
            .field("bindings", &self.bindings.len())
            .field("evictions", &self.evictions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventKind;
    use chrono::{TimeZone, Utc};
    use scheduler_shared_types::Node;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    fn build_snapshot_with_pending_task() -> Snapshot {
        let mut snapshot = Snapshot::default();

        let node = Node {
            name: "n1".to_string(),
            capacity: Resource::new(2000.0, 4096.0),
            allocatable: Resource::new(2000.0, 4096.0),
            labels: BTreeMap::new(),
        };
        snapshot
            .nodes
            .insert("n1".to_string(), scheduler_cache::NodeInfo::new(&node));

        let mut job = JobInfo::new("test/j1".to_string());
        job.add_task(TaskInfo {
            uid: "t1".to_string(),
            job: "test/j1".to_string(),
            name: "t1".to_string(),
            namespace: "test".to_string(),
            resreq: Resource::new(500.0, 1024.0),
            node_name: String::new(),
            status: TaskStatus::Pending,
            priority: 0,
            preemptible: false,
            creation_timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            failed_predicates: BTreeMap::new(),
        });
        snapshot.jobs.insert("test/j1".to_string(), job);
        snapshot
    }

    struct PanickingPlugin;

    impl Plugin for PanickingPlugin {
        fn name(&self) -> &str {
            "panicking"
        }

        fn on_session_open(&mut self, ssn: &mut Session) {
            ssn.add_job_starving_fn("panicking", Box::new(|_| true));
            panic!("boom");
        }
    }

    struct CountingPlugin {
        allocations: Arc<AtomicUsize>,
    }

    impl Plugin for CountingPlugin {
        fn name(&self) -> &str {
            "counting"
        }

        fn on_session_open(&mut self, ssn: &mut Session) {
            let allocations = self.allocations.clone();
            ssn.add_event_handler(
                "counting",
                EventHandler {
                    allocate_fn: Some(Box::new(move |_| {
                        allocations.fetch_add(1, AtomicOrdering::SeqCst);
                    })),
                    deallocate_fn: None,
                },
            );
        }
    }

    #[test]
    fn allocation_commits_and_emits_intent() {
        let allocations = Arc::new(AtomicUsize::new(0));
        let mut ssn = Session::open(
            build_snapshot_with_pending_task(),
            vec![Box::new(CountingPlugin {
                allocations: allocations.clone(),
            })],
        );

        ssn.allocate(&"t1".to_string(), &"n1".to_string()).unwrap();

        let node = &ssn.state.snapshot.nodes["n1"];
        assert_eq!(node.used, Resource::new(500.0, 1024.0));
        let job = &ssn.state.snapshot.jobs["test/j1"];
        assert_eq!(job.count_in_status(TaskStatus::Allocated), 1);
        assert_eq!(allocations.load(AtomicOrdering::SeqCst), 1);

        let outcome = ssn.close();
        assert_eq!(outcome.bindings.len(), 1);
        assert_eq!(outcome.bindings[0].node, "n1");
    }

    #[test]
    fn allocation_rejects_oversized_task() {
        let mut snapshot = build_snapshot_with_pending_task();
        snapshot
            .jobs
            .get_mut("test/j1")
            .unwrap()
            .tasks
            .get_mut("t1")
            .unwrap()
            .resreq = Resource::new(9000.0, 1024.0);
        let mut ssn = Session::open(snapshot, vec![]);

        let err = ssn.allocate(&"t1".to_string(), &"n1".to_string()).unwrap_err();
        assert!(matches!(err, SchedulerError::NodeOutOfCapacity { .. }));
        assert_eq!(
            ssn.state.snapshot.jobs["test/j1"].count_in_status(TaskStatus::Pending),
            1
        );
    }

    #[test]
    fn eviction_emits_intent_and_frees_node() {
        let mut ssn = Session::open(build_snapshot_with_pending_task(), vec![]);
        ssn.allocate(&"t1".to_string(), &"n1".to_string()).unwrap();

        ssn.evict(&"t1".to_string()).unwrap();
        let node = &ssn.state.snapshot.nodes["n1"];
        assert_eq!(node.releasing, Resource::new(500.0, 1024.0));

        let outcome = ssn.close();
        assert_eq!(outcome.evictions.len(), 1);
    }

    #[test]
    fn open_hook_panic_is_contained() {
        let ssn = Session::open(
            build_snapshot_with_pending_task(),
            vec![Box::new(PanickingPlugin)],
        );

        // The starving callback registered before the panic must be gone.
        let job = &ssn.state.snapshot.jobs["test/j1"];
        assert!(!ssn.job_starving(job));

        let outcome = ssn.close();
        assert_eq!(outcome.contained_panics, 1);
    }

    #[test]
    fn recorded_events_survive_close() {
        let ssn = Session::open(build_snapshot_with_pending_task(), vec![]);
        ssn.state.record_event(AdmissionEvent {
            job: "test/j1".to_string(),
            kind: EventKind::PodGroupUnschedulable,
            message: "quota exceeded".to_string(),
        });

        let outcome = ssn.close();
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].job, "test/j1");
    }
}
