use thiserror::Error;

pub mod objects;
pub mod resource;

pub use objects::{
    ClusterEvent, DisruptionBudget, Node, Pod, PodGroup, PodGroupPhase, PodPhase, QueueSpec,
    ResourceQuota,
};
pub use resource::{share, Resource, Tolerance};

/// Task identity, unique within the cluster (the pod uid).
pub type TaskId = String;
/// Job identity, `<namespace>/<name>` of the owning gang descriptor.
pub type JobId = String;
/// Queue identity.
pub type QueueId = String;
/// Node identity (host name).
pub type NodeName = String;
/// Namespace identity.
pub type NamespaceName = String;

/// Annotation carrying the gang group name on a pod.
pub const GROUP_NAME_ANNOTATION: &str = "gangsched.io/group-name";
/// Hard-quota entry overriding the namespace weight.
pub const NAMESPACE_WEIGHT_KEY: &str = "gangsched.io/namespace.weight";
/// Node label naming the revocable zone the node belongs to.
pub const REVOCABLE_ZONE_LABEL: &str = "gangsched.io/revocable-zone";

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to find task <{task}> on host <{node}>")]
    TaskNotLocated { task: String, node: String },

    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("failed to find task <{task}> in job <{job}>")]
    TaskNotFound { task: String, job: String },

    #[error("node <{0}> not found")]
    NodeNotFound(NodeName),

    #[error("queue <{0}> is unknown to this session")]
    QueueUnknown(QueueId),

    #[error("revocable zone <{zone}> is invalid: {reason}")]
    ZoneParse { zone: String, reason: String },

    #[error("resource quota insufficient: {0}")]
    QuotaExceeded(String),

    #[error("node <{node}> has insufficient idle resource for task <{task}>")]
    NodeOutOfCapacity { node: NodeName, task: String },

    #[error("resource subtraction underflow: {left} - {right}")]
    ResourceUnderflow { left: String, right: String },

    #[error("predicate rejected node <{node}>: {reason}")]
    PredicateFailed { node: NodeName, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
