//! Command records carrying externally requested actions to jobs.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scheduler_shared_types::JobId;

use crate::JobAction;

/// Persisted record of one requested action. The record is owned by the
/// target object; consumers identify it by the generated-name prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub uid: Uuid,
    /// `<targetName>-<lowercase action>-`, completed by the object store.
    pub generate_name: String,
    /// Owner reference back to the target job.
    pub owner: JobId,
    pub action: JobAction,
}

impl Command {
    pub fn new(target_name: &str, owner: JobId, action: JobAction) -> Self {
        Self {
            uid: Uuid::new_v4(),
            generate_name: format!("{target_name}-{action}-"),
            owner,
            action,
        }
    }
}

/// FIFO command backlog, one lane per job.
#[derive(Debug, Default)]
pub struct CommandQueue {
    lanes: BTreeMap<JobId, VecDeque<Command>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.lanes
            .entry(command.owner.clone())
            .or_default()
            .push_back(command);
    }

    /// Next command for a job, in submission order.
    pub fn pop(&mut self, job: &JobId) -> Option<Command> {
        let lane = self.lanes.get_mut(job)?;
        let command = lane.pop_front();
        if lane.is_empty() {
            self.lanes.remove(job);
        }
        command
    }

    /// Jobs that currently have commands waiting.
    pub fn pending_jobs(&self) -> Vec<JobId> {
        self.lanes.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }
}
