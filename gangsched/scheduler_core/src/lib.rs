//! Outer driver: owns the cache, runs scheduling cycles on a tick, and
//! dispatches the resulting intents downstream.

pub mod config;
pub mod tracing_setup;

pub use config::{ConfigError, PluginConfig, SchedulerConfig};
pub use tracing_setup::{init_tracing, TracingConfig};

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use job_controller::{
    Command, Job, JobActuator, JobController, JobPhase, JobStatus, PodRetainPhase,
};
use scheduler_cache::{JobInfo, SchedulerCache, TaskStatus};
use scheduler_framework::actions::action_by_name;
use scheduler_framework::{
    AdmissionEvent, BindingIntent, CycleOutcome, EvictionIntent, Session,
};
use scheduler_plugins::PluginRegistry;
use scheduler_shared_types::{ClusterEvent, JobId, PodGroupPhase, Result};

/// Downstream consumer of the cycle's decisions. Delivery is
/// at-least-once: consumers must treat duplicate intents as no-ops.
#[async_trait]
pub trait IntentSink: Send + Sync {
    async fn bind(&self, intent: &BindingIntent) -> Result<()>;

    async fn evict(&self, intent: &EvictionIntent) -> Result<()>;

    async fn record_event(&self, event: &AdmissionEvent) -> Result<()>;
}

/// Sink that only logs, for running without a cluster attached.
pub struct LoggingSink;

#[async_trait]
impl IntentSink for LoggingSink {
    async fn bind(&self, intent: &BindingIntent) -> Result<()> {
        info!(task = %intent.task, node = %intent.node, "binding intent");
        Ok(())
    }

    async fn evict(&self, intent: &EvictionIntent) -> Result<()> {
        info!(task = %intent.task, job = %intent.job, "eviction intent");
        Ok(())
    }

    async fn record_event(&self, event: &AdmissionEvent) -> Result<()> {
        info!(job = %event.job, kind = ?event.kind, message = %event.message, "admission event");
        Ok(())
    }
}

/// Actuator for running without a cluster attached: pod kills are only
/// staged on the counters (alive pods become terminating) and logged.
pub struct LoggingActuator;

impl JobActuator for LoggingActuator {
    fn kill_job(
        &self,
        job: &mut Job,
        retain: PodRetainPhase,
        mutate: &dyn Fn(&mut JobStatus),
    ) -> job_controller::Result<()> {
        let moving = job.status.running + job.status.pending;
        if moving != 0 {
            info!(job = %job.id, pods = moving, ?retain, "kill requested for alive pods");
            job.status.terminating += moving;
            job.status.running = 0;
            job.status.pending = 0;
        }
        mutate(&mut job.status);
        Ok(())
    }

    fn sync_job(
        &self,
        job: &mut Job,
        mutate: &dyn Fn(&mut JobStatus),
    ) -> job_controller::Result<()> {
        mutate(&mut job.status);
        Ok(())
    }
}

pub struct Scheduler {
    cache: Arc<SchedulerCache>,
    registry: PluginRegistry,
    config: SchedulerConfig,
    sink: Arc<dyn IntentSink>,
    controller: Mutex<JobController<Box<dyn JobActuator + Send>>>,
}

impl Scheduler {
    pub fn new(
        cache: Arc<SchedulerCache>,
        registry: PluginRegistry,
        config: SchedulerConfig,
        sink: Arc<dyn IntentSink>,
        actuator: Box<dyn JobActuator + Send>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate(&registry)?;
        Ok(Self {
            cache,
            registry,
            config,
            sink,
            controller: Mutex::new(JobController::new(actuator)),
        })
    }

    pub fn cache(&self) -> Arc<SchedulerCache> {
        self.cache.clone()
    }

    /// Current state-machine phase of a tracked job.
    pub fn job_phase(&self, job: &JobId) -> Option<JobPhase> {
        self.controller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .job(job)
            .map(|j| j.status.phase)
    }

    /// Queue an externally requested action; it drains FIFO per job on
    /// the next cycle.
    pub fn submit_command(&self, command: Command) {
        self.controller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .commands_mut()
            .push(command);
    }

    /// One synchronous scheduling cycle: snapshot, open, run the actions
    /// under the soft deadline, close.
    pub fn run_once(&self) -> CycleOutcome {
        let started = Instant::now();
        let deadline = self.config.cycle_deadline().unwrap_or(None);

        let mut plugins = Vec::new();
        for plugin_config in &self.config.plugins {
            match self
                .registry
                .build(&plugin_config.name, plugin_config.arguments())
            {
                Ok(plugin) => plugins.push(plugin),
                // Validated at construction; a miss here is a config race.
                Err(err) => warn!(plugin = %plugin_config.name, %err, "skipping plugin"),
            }
        }

        let snapshot = self.cache.snapshot();
        let mut ssn = Session::open(snapshot, plugins);

        for action_name in &self.config.actions {
            if let Some(deadline) = deadline {
                if started.elapsed() > deadline {
                    warn!(
                        action = %action_name,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "cycle deadline exceeded, dropping remaining phases"
                    );
                    break;
                }
            }
            let Some(action) = action_by_name(action_name) else {
                continue;
            };
            debug!(action = %action_name, "executing phase");
            action.execute(&mut ssn);
        }

        let outcome = ssn.close();
        info!(
            bindings = outcome.bindings.len(),
            evictions = outcome.evictions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scheduling cycle finished"
        );
        outcome
    }

    /// Push one cycle's intents and events to the sink.
    pub async fn dispatch(&self, outcome: &CycleOutcome) {
        for intent in &outcome.bindings {
            if let Err(err) = self.sink.bind(intent).await {
                error!(task = %intent.task, %err, "failed to dispatch binding intent");
            }
        }
        for intent in &outcome.evictions {
            if let Err(err) = self.sink.evict(intent).await {
                error!(task = %intent.task, %err, "failed to dispatch eviction intent");
            }
        }
        for event in &outcome.events {
            if let Err(err) = self.sink.record_event(event).await {
                error!(job = %event.job, %err, "failed to record admission event");
            }
        }
    }

    /// Run the state machine over every job the cycle touched, plus the
    /// jobs already tracked and any queued commands.
    fn transition_jobs(&self, outcome: &CycleOutcome) {
        let mut controller = self.controller.lock().unwrap_or_else(|e| e.into_inner());

        let mut affected: BTreeSet<JobId> = outcome
            .bindings
            .iter()
            .map(|intent| intent.job.clone())
            .collect();
        affected.extend(outcome.evictions.iter().map(|intent| intent.job.clone()));
        affected.extend(controller.job_ids());
        if affected.is_empty() {
            return;
        }

        let snapshot = self.cache.snapshot();
        for job_id in &affected {
            if let Some(job) = snapshot.jobs.get(job_id) {
                controller.observe(controller_view(job));
            }
        }

        for (job_id, err) in controller.reconcile() {
            warn!(job = %job_id, %err, "job state handler failed, retrying next cycle");
        }
    }

    /// A full cycle: schedule, dispatch intents, transition the affected
    /// jobs' state machines, then pump cache cleanup.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let outcome = self.run_once();
        self.dispatch(&outcome).await;
        self.transition_jobs(&outcome);
        self.cache.process_cleanup();
        outcome
    }

    /// Drive cycles forever: ingest events between ticks, schedule on the
    /// tick. Ends when the ingest channel closes.
    pub async fn run(&self, mut events: mpsc::Receiver<ClusterEvent>) {
        // Validated at construction; fall back rather than die mid-flight.
        let period = self
            .config
            .schedule_period()
            .unwrap_or(std::time::Duration::from_secs(1));
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(period_ms = period.as_millis() as u64, "scheduler loop starting");
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(err) = self.cache.apply(event) {
                                warn!(%err, "dropping ingest event");
                            }
                        }
                        None => {
                            info!("ingest channel closed, scheduler loop stopping");
                            return;
                        }
                    }
                }
                _ = tick.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }
}

/// Project a scheduler-side job into the controller's view: task status
/// buckets fold into pod counters, the gang descriptor phase seeds the
/// initial state-machine phase.
fn controller_view(job: &JobInfo) -> Job {
    let count = |status: TaskStatus| job.count_in_status(status) as u32;

    let mut view = Job::new(
        &job.namespace,
        &job.name,
        job.min_available,
        job.task_count() as u32,
    );
    view.id = job.uid.clone();
    view.status.pending = count(TaskStatus::Pending)
        + count(TaskStatus::Allocated)
        + count(TaskStatus::Pipelined)
        + count(TaskStatus::Binding)
        + count(TaskStatus::Bound);
    view.status.running = count(TaskStatus::Running);
    view.status.succeeded = count(TaskStatus::Succeeded);
    view.status.failed = count(TaskStatus::Failed);
    view.status.terminating = count(TaskStatus::Releasing);
    view.status.unknown = count(TaskStatus::Unknown);
    view.status.phase = match job.pod_group_phase() {
        Some(PodGroupPhase::Inqueue) => JobPhase::Inqueue,
        Some(PodGroupPhase::Running) => JobPhase::Running,
        _ => JobPhase::Pending,
    };
    view
}
