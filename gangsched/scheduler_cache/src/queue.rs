use scheduler_shared_types::{QueueId, QueueSpec, Resource};

/// Scheduler-side projection of a queue object.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueInfo {
    pub uid: QueueId,
    pub name: String,
    pub weight: u32,
    /// Hard cap applied to the queue's deserved share and admissions.
    pub capability: Option<Resource>,
    /// When false, reclaim never takes victims from this queue.
    pub reclaimable: bool,
}

impl QueueInfo {
    pub fn from_spec(spec: &QueueSpec) -> Self {
        Self {
            uid: spec.name.clone(),
            name: spec.name.clone(),
            weight: spec.weight,
            capability: spec.capability.clone(),
            reclaimable: spec.reclaimable.unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclaimable_defaults_to_true() {
        let spec = QueueSpec {
            name: "q1".to_string(),
            weight: 3,
            capability: None,
            reclaimable: None,
        };
        let queue = QueueInfo::from_spec(&spec);
        assert!(queue.reclaimable);
        assert_eq!(queue.weight, 3);
    }
}
