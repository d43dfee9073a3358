//! Per-namespace quota bookkeeping.
//!
//! A namespace may hold several resource quotas. The collection tracks all
//! of them, derives the namespace weight from the highest
//! `gangsched.io/namespace.weight` hard entry, and folds the quotas into a
//! single free-resource vector (per dimension, the tightest `hard - used`).

use std::collections::BTreeMap;

use scheduler_shared_types::{NamespaceName, Resource, ResourceQuota, NAMESPACE_WEIGHT_KEY};

pub const DEFAULT_NAMESPACE_WEIGHT: i64 = 1;

/// Quota dimension names may carry this prefix on the wire.
const REQUESTS_PREFIX: &str = "requests.";

/// Read-only namespace view carried by a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceInfo {
    pub name: NamespaceName,
    /// Highest weight among the namespace's quotas.
    pub weight: i64,
    pub quotas: BTreeMap<String, ResourceQuota>,
    /// Tightest remaining headroom across all quotas.
    pub quota_free: Resource,
}

impl NamespaceInfo {
    pub fn weight(&self) -> i64 {
        if self.weight == 0 {
            DEFAULT_NAMESPACE_WEIGHT
        } else {
            self.weight
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceCollection {
    pub name: NamespaceName,
    /// Weight per quota name; the maximum wins. Peeking the maximum never
    /// fails: an empty map yields the default weight.
    quota_weight: BTreeMap<String, i64>,
    quotas: BTreeMap<String, ResourceQuota>,
    quota_free: Resource,
}

impl NamespaceCollection {
    pub fn new(name: impl Into<NamespaceName>) -> Self {
        Self {
            name: name.into(),
            quota_weight: BTreeMap::new(),
            quotas: BTreeMap::new(),
            quota_free: Resource::empty(),
        }
    }

    pub fn update(&mut self, quota: &ResourceQuota) {
        self.quota_weight
            .insert(quota.name.clone(), weight_of(quota));
        self.quotas.insert(quota.name.clone(), quota.clone());
        self.quota_free = fold_free(&self.quotas);
    }

    pub fn delete(&mut self, quota: &ResourceQuota) {
        self.quota_weight.remove(&quota.name);
        self.quotas.remove(&quota.name);
        self.quota_free = if self.quotas.is_empty() {
            Resource::empty()
        } else {
            fold_free(&self.quotas)
        };
    }

    pub fn is_empty(&self) -> bool {
        self.quotas.is_empty()
    }

    /// Clone into a heap-free snapshot view. The weight peek cannot fail;
    /// a namespace without quotas reports the default weight.
    pub fn snapshot(&self) -> NamespaceInfo {
        NamespaceInfo {
            name: self.name.clone(),
            weight: self
                .quota_weight
                .values()
                .copied()
                .max()
                .unwrap_or(DEFAULT_NAMESPACE_WEIGHT),
            quotas: self.quotas.clone(),
            quota_free: self.quota_free.clone(),
        }
    }
}

fn weight_of(quota: &ResourceQuota) -> i64 {
    quota
        .hard
        .get(NAMESPACE_WEIGHT_KEY)
        .map(|w| *w as i64)
        .unwrap_or(DEFAULT_NAMESPACE_WEIGHT)
}

/// Per dimension, the minimum of `hard - used` across every quota that
/// bounds the dimension.
fn fold_free(quotas: &BTreeMap<String, ResourceQuota>) -> Resource {
    let mut tightest: BTreeMap<&str, f64> = BTreeMap::new();

    for quota in quotas.values() {
        for (raw_name, hard) in &quota.hard {
            let name = raw_name
                .strip_prefix(REQUESTS_PREFIX)
                .unwrap_or(raw_name.as_str());
            if name == NAMESPACE_WEIGHT_KEY {
                continue;
            }
            let used = quota.used.get(raw_name).copied().unwrap_or(0.0);
            let remaining = hard - used;
            tightest
                .entry(name)
                .and_modify(|bound| *bound = bound.min(remaining))
                .or_insert(remaining);
        }
    }

    let mut free = Resource::empty();
    for (name, remaining) in tightest {
        match name {
            "cpu" => free.milli_cpu = remaining,
            "memory" => free.memory = remaining,
            scalar => {
                free.scalars.insert(scalar.to_string(), remaining);
            }
        }
    }
    free
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_quota;

    #[test]
    fn empty_collection_peeks_default_weight() {
        let collection = NamespaceCollection::new("test");
        assert_eq!(collection.snapshot().weight, DEFAULT_NAMESPACE_WEIGHT);
    }

    #[test]
    fn weight_takes_the_maximum_entry() {
        let mut collection = NamespaceCollection::new("test");

        let mut q1 = build_quota("test", "rq1", &[("cpu", 4000.0, 0.0)]);
        q1.hard.insert(NAMESPACE_WEIGHT_KEY.to_string(), 5.0);
        collection.update(&q1);
        collection.update(&build_quota("test", "rq2", &[("cpu", 2000.0, 0.0)]));

        assert_eq!(collection.snapshot().weight, 5);

        collection.delete(&q1);
        assert_eq!(collection.snapshot().weight, DEFAULT_NAMESPACE_WEIGHT);
    }

    #[test]
    fn free_resource_takes_tightest_bound() {
        let mut collection = NamespaceCollection::new("test");
        collection.update(&build_quota(
            "test",
            "rq1",
            &[("cpu", 4000.0, 1000.0), ("memory", 8192.0, 0.0)],
        ));
        collection.update(&build_quota("test", "rq2", &[("cpu", 2500.0, 0.0)]));

        let info = collection.snapshot();
        // rq2 bounds cpu tighter: 2500 remaining vs rq1's 3000.
        assert_eq!(info.quota_free.milli_cpu, 2500.0);
        assert_eq!(info.quota_free.memory, 8192.0);
    }

    #[test]
    fn requests_prefix_is_stripped() {
        let mut collection = NamespaceCollection::new("test");
        collection.update(&build_quota("test", "rq1", &[("requests.cpu", 1500.0, 500.0)]));
        assert_eq!(collection.snapshot().quota_free.milli_cpu, 1000.0);
    }
}
