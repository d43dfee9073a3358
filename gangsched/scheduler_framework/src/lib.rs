//! Session and plugin host for the scheduling cycle.
//!
//! A [`Session`] is opened over a cache snapshot once per cycle. Plugins
//! register decision callbacks into it, the configured [`Action`]s drive
//! the phases (enqueue, allocate, preempt, reclaim, evict), and closing
//! the session yields the cycle's binding and eviction intents.

pub mod actions;
pub mod arguments;
pub mod session;

pub use arguments::Arguments;
pub use session::{Event, EventHandler, Session, SessionState};

use scheduler_shared_types::{JobId, NodeName, TaskId};
use serde::{Deserialize, Serialize};

/// Decision returned by admission-style callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Permit,
    Reject,
    Abstain,
}

/// A plugin contributes a set of callbacks to each session. Instances are
/// built fresh per cycle; anything they accumulate is session-scoped.
pub trait Plugin: Send {
    fn name(&self) -> &str;

    fn on_session_open(&mut self, ssn: &mut Session);

    fn on_session_close(&mut self, _ssn: &mut Session) {}
}

/// One phase of the scheduling cycle.
pub trait Action {
    fn name(&self) -> &str;

    fn execute(&self, ssn: &mut Session);
}

/// Intent to bind a task to a node. Delivery downstream is at-least-once;
/// duplicates must be treated as no-ops by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingIntent {
    pub task: TaskId,
    pub job: JobId,
    pub node: NodeName,
}

/// Intent to evict a task from its node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionIntent {
    pub task: TaskId,
    pub job: JobId,
}

/// Kinds of user-visible events a session can record against a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    PodGroupUnschedulable,
}

/// Structured event attached to the owning gang descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionEvent {
    pub job: JobId,
    pub kind: EventKind,
    pub message: String,
}

/// Everything a closed session hands back to the driver.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    pub bindings: Vec<BindingIntent>,
    pub evictions: Vec<EvictionIntent>,
    pub events: Vec<AdmissionEvent>,
    /// Plugin open-hook panics contained this cycle.
    pub contained_panics: u64,
}
