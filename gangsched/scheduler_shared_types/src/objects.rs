//! Typed cluster objects consumed from the ingest stream.
//!
//! These are the wire-level shapes the watch-based collaborators hand to
//! the cache; the cache projects them into its own model. Unknown event
//! kinds never reach this layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::Resource;
use crate::{NamespaceName, NodeName, QueueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub uid: String,
    pub namespace: NamespaceName,
    pub name: String,
    /// Empty until the pod is placed.
    #[serde(default)]
    pub node_name: NodeName,
    pub phase: PodPhase,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Owner controller reference, the fallback job identity when the
    /// group-name annotation is absent.
    #[serde(default)]
    pub controller: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub preemptible: bool,
    pub resource_request: Resource,
    /// Set while the pod is being torn down.
    #[serde(default)]
    pub deleting: bool,
    pub creation_timestamp: DateTime<Utc>,
}

/// Gang descriptor phase as reported by its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodGroupPhase {
    Pending,
    Inqueue,
    Running,
    Unknown,
}

/// Per-job eviction bounds, integer or percent-of-tasks strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisruptionBudget {
    #[serde(default)]
    pub min_available: Option<String>,
    #[serde(default)]
    pub max_unavailable: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodGroup {
    pub namespace: NamespaceName,
    pub name: String,
    #[serde(default)]
    pub queue: QueueId,
    pub min_member: u32,
    #[serde(default)]
    pub min_resources: Option<Resource>,
    /// Namespace-quota footprint checked at admission, keyed by quota
    /// dimension name.
    #[serde(default)]
    pub min_quotas: Option<BTreeMap<String, f64>>,
    pub phase: PodGroupPhase,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub preemptible: bool,
    #[serde(default)]
    pub budget: DisruptionBudget,
    pub creation_timestamp: DateTime<Utc>,
}

impl PodGroup {
    /// `namespace/name`, the job identity this descriptor owns.
    pub fn job_id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSpec {
    pub name: QueueId,
    pub weight: u32,
    #[serde(default)]
    pub capability: Option<Resource>,
    #[serde(default)]
    pub reclaimable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub namespace: NamespaceName,
    pub name: String,
    /// Hard limits keyed by dimension name.
    #[serde(default)]
    pub hard: BTreeMap<String, f64>,
    /// Current usage keyed by dimension name.
    #[serde(default)]
    pub used: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: NodeName,
    pub capacity: Resource,
    pub allocatable: Resource,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// The ingest contract: every mutation the cache consumes. Events arrive
/// serialized from the watch collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClusterEvent {
    NodeAdded(Node),
    NodeUpdated(Node),
    NodeRemoved(NodeName),
    PodAdded(Pod),
    PodUpdated { old: Pod, new: Pod },
    PodRemoved(Pod),
    PodGroupAdded(PodGroup),
    PodGroupUpdated(PodGroup),
    PodGroupRemoved(PodGroup),
    QueueAdded(QueueSpec),
    QueueUpdated(QueueSpec),
    QueueRemoved(QueueId),
    QuotaAdded(ResourceQuota),
    QuotaUpdated(ResourceQuota),
    QuotaRemoved(ResourceQuota),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn pod_event_survives_the_wire() {
        let pod = Pod {
            uid: "p1-uid".to_string(),
            namespace: "test".to_string(),
            name: "p1".to_string(),
            node_name: String::new(),
            phase: PodPhase::Pending,
            annotations: BTreeMap::new(),
            controller: Some("j1".to_string()),
            priority: 5,
            preemptible: true,
            resource_request: Resource::new(1000.0, 2048.0).with_scalar("nvidia.com/gpu", 1.0),
            deleting: false,
            creation_timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };
        let event = ClusterEvent::PodAdded(pod);

        let wire = serde_json::to_string(&event).unwrap();
        let back: ClusterEvent = serde_json::from_str(&wire).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let wire = r#"{
            "name": "q1",
            "weight": 2
        }"#;
        let queue: QueueSpec = serde_json::from_str(wire).unwrap();
        assert_eq!(queue.weight, 2);
        assert!(queue.capability.is_none());
        assert!(queue.reclaimable.is_none());
    }
}
