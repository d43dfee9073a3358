//! Namespace resource-quota admission.
//!
//! Gang admission is rejected when the job's declared quota footprint
//! would push any resource quota in its namespace over a hard limit. The
//! rejection is recorded as a user-visible event naming the offending
//! dimensions with their requested/used/limit triples.

use std::collections::BTreeMap;

use scheduler_framework::{
    AdmissionEvent, Arguments, EventKind, Plugin, Session, Vote,
};
use tracing::debug;

pub const PLUGIN_NAME: &str = "resourcequota";

pub struct ResourceQuotaPlugin;

impl ResourceQuotaPlugin {
    pub fn new(_arguments: Arguments) -> Self {
        Self
    }
}

impl Plugin for ResourceQuotaPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn on_session_open(&mut self, ssn: &mut Session) {
        ssn.add_job_enqueueable_fn(
            PLUGIN_NAME,
            Box::new(|state, job| {
                let Some(requested) = job
                    .pod_group
                    .as_ref()
                    .and_then(|pg| pg.min_quotas.as_ref())
                else {
                    debug!(job = %job.uid, "no quota footprint declared, skipping quota check");
                    return Vote::Permit;
                };

                let Some(namespace) = state.snapshot.namespaces.get(&job.namespace) else {
                    return Vote::Permit;
                };

                for quota in namespace.quotas.values() {
                    let hard_names: Vec<&String> = quota.hard.keys().collect();
                    let requested_usage = mask(requested, &hard_names);
                    let new_usage = add(&quota.used, &requested_usage);
                    let requested_names: Vec<&String> = requested_usage.keys().collect();
                    let masked = mask(&new_usage, &requested_names);

                    let exceeded = exceeded_names(&masked, &quota.hard);
                    if !exceeded.is_empty() {
                        let message = quota_message(&exceeded, &requested_usage, quota);
                        debug!(job = %job.uid, quota = %quota.name, %message, "gang admission rejected");
                        state.record_event(AdmissionEvent {
                            job: job.uid.clone(),
                            kind: EventKind::PodGroupUnschedulable,
                            message,
                        });
                        return Vote::Reject;
                    }
                }
                Vote::Permit
            }),
        );
    }
}

/// Projection of `usage` onto the named dimensions.
fn mask(usage: &BTreeMap<String, f64>, names: &[&String]) -> BTreeMap<String, f64> {
    usage
        .iter()
        .filter(|(name, _)| names.contains(name))
        .map(|(name, value)| (name.clone(), *value))
        .collect()
}



fn add(left: &BTreeMap<String, f64>, right: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let mut sum = left.clone();
    for (name, value) in right {
        *sum.entry(name.clone()).or_insert(0.0) += value;
    }
    sum
}

/// Dimensions where usage breaks the hard limit.
fn exceeded_names(usage: &BTreeMap<String, f64>, hard: &BTreeMap<String, f64>) -> Vec<String> {
    usage
        .iter()
        .filter(|(name, value)| {
            hard.get(*name)
                .map(|limit| **value > *limit)
                .unwrap_or(false)
        })
        .map(|(name, _)| name.clone())
        .collect()
}

fn quota_message(
    exceeded: &[String],
    requested: &BTreeMap<String, f64>,
    quota: &scheduler_shared_types::ResourceQuota,
) -> String {
    let fmt = |source: &BTreeMap<String, f64>| {
        exceeded
            .iter()
            .map(|name| format!("{}={:.0}", name, source.get(name).copied().unwrap_or(0.0)))
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        "resource quota insufficient, requested: {}, used: {}, limited: {}",
        fmt(requested),
        fmt(&quota.used),
        fmt(&quota.hard),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn mask_projects_onto_named_dimensions() {
        let requested = usage(&[("cpu", 500.0), ("memory", 1024.0), ("pods", 3.0)]);
        let names: Vec<&String> = requested.keys().filter(|n| *n != "pods").collect();
        let masked = mask(&requested, &names);
        assert_eq!(masked.len(), 2);
        assert!(!masked.contains_key("pods"));
    }

    #[test]
    fn exceeded_reports_only_broken_dimensions() {
        let used = usage(&[("cpu", 3500.0), ("memory", 1024.0)]);
        let hard = usage(&[("cpu", 3000.0), ("memory", 8192.0)]);
        assert_eq!(exceeded_names(&used, &hard), vec!["cpu".to_string()]);
    }

    #[test]
    fn message_names_requested_used_and_limit() {
        let quota = scheduler_shared_types::ResourceQuota {
            namespace: "test".to_string(),
            name: "rq1".to_string(),
            hard: usage(&[("cpu", 3000.0)]),
            used: usage(&[("cpu", 2800.0)]),
        };
        let message = quota_message(
            &["cpu".to_string()],
            &usage(&[("cpu", 500.0)]),
            &quota,
        );
        assert_eq!(
            message,
            "resource quota insufficient, requested: cpu=500, used: cpu=2800, limited: cpu=3000"
        );
    }
}
