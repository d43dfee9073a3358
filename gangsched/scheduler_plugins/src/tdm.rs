//! Time-division multiplexing of revocable nodes.
//!
//! Nodes carrying a revocable-zone label may host preemptible work only
//! while the zone's daily time window is open. When a window closes, the
//! plugin nominates the preemptible tasks still running there for
//! eviction, rate-limited by the evict period and bounded per job by the
//! disruption budget.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Days, NaiveDateTime, NaiveTime};
use scheduler_cache::{JobInfo, TaskStatus};
use scheduler_framework::{Arguments, Plugin, Session, SessionState};
use scheduler_shared_types::{JobId, Result, SchedulerError, TaskId};
use tracing::{debug, warn};

pub const PLUGIN_NAME: &str = "tdm";

const REVOCABLE_ZONE_ARG_PREFIX: &str = "tdm.revocable-zone.";
const EVICT_PERIOD_ARG: &str = "tdm.evict.period";
const DEFAULT_EVICT_PERIOD: Duration = Duration::from_secs(60);
const DEFAULT_POD_EVICT_NUM: usize = 1;

/// Highest score a node-order callback may award.
pub const MAX_NODE_SCORE: f64 = 100.0;

/// Wall-clock source, injectable for tests.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// State that must survive across sessions: the victim-scan rate limiter.
pub type LastEvictAt = Arc<Mutex<Option<NaiveDateTime>>>;

pub struct TdmPlugin {
    /// Zone name to raw `HH:MM-HH:MM` window.
    revocable_zones: BTreeMap<String, String>,
    evict_period: Duration,
    last_evict_at: LastEvictAt,
    clock: Clock,
}

impl TdmPlugin {
    pub fn new(arguments: Arguments, last_evict_at: LastEvictAt, clock: Clock) -> Self {
        arguments.warn_unknown(
            PLUGIN_NAME,
            &[EVICT_PERIOD_ARG],
            &[REVOCABLE_ZONE_ARG_PREFIX],
        );

        let mut revocable_zones = BTreeMap::new();
        for (zone, window) in arguments.prefixed(REVOCABLE_ZONE_ARG_PREFIX) {
            // A malformed window disables the zone, nothing else.
            if let Err(err) = parse_window(window) {
                warn!(zone, window, %err, "disabling revocable zone");
                continue;
            }
            revocable_zones.insert(zone.to_string(), window.to_string());
        }

        let evict_period = arguments
            .get_duration(EVICT_PERIOD_ARG)
            .unwrap_or(DEFAULT_EVICT_PERIOD);

        Self {
            revocable_zones,
            evict_period,
            last_evict_at,
            clock,
        }
    }

    /// Error when the zone is unknown or its window is closed right now.
    fn available_revocable_zone(&self, zone: &str) -> Result<()> {
        let raw = self
            .revocable_zones
            .get(zone)
            .ok_or_else(|| SchedulerError::ZoneParse {
                zone: zone.to_string(),
                reason: "zone not configured".to_string(),
            })?;
        let (start, end) = parse_window(raw).map_err(|reason| SchedulerError::ZoneParse {
            zone: zone.to_string(),
            reason,
        })?;

        let now = (self.clock)();
        let window_start = now.date().and_time(start);
        let window_end = if start >= end {
            // start >= end wraps the window into the next day.
            now.date()
                .checked_add_days(Days::new(1))
                .map(|d| d.and_time(end))
                .unwrap_or(window_start)
        } else {
            now.date().and_time(end)
        };

        if now < window_start || now > window_end {
            return Err(SchedulerError::ZoneParse {
                zone: zone.to_string(),
                reason: format!("current time beyond revocable zone window {raw}"),
            });
        }
        Ok(())
    }

    /// Preemptible running tasks on the zone's nodes, grouped by job.
    fn revocable_node_preemptible_tasks(
        &self,
        zone: &str,
        state: &SessionState,
    ) -> BTreeMap<JobId, Vec<TaskId>> {
        let mut tasks: BTreeMap<JobId, Vec<TaskId>> = BTreeMap::new();
        for node in state.snapshot.revocable_nodes() {
            if node.revocable_zone != zone {
                continue;
            }
            for task in state.snapshot.tasks_on_node(node) {
                if task.preemptible && task.status == TaskStatus::Running {
                    tasks.entry(task.job.clone()).or_default().push(task.uid.clone());
                }
            }
        }
        tasks
    }
}

impl Plugin for TdmPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn on_session_open(&mut self, ssn: &mut Session) {
        let plugin = Arc::new(TdmPlugin {
            revocable_zones: self.revocable_zones.clone(),
            evict_period: self.evict_period,
            last_evict_at: self.last_evict_at.clone(),
            clock: self.clock.clone(),
        });

        let p = plugin.clone();
        ssn.add_predicate_fn(
            PLUGIN_NAME,
            Box::new(move |task, node| {
                if node.revocable_zone.is_empty() {
                    return Ok(());
                }
                p.available_revocable_zone(&node.revocable_zone)
                    .map_err(|err| SchedulerError::PredicateFailed {
                        node: node.name.clone(),
                        reason: err.to_string(),
                    })?;
                if !task.preemptible {
                    return Err(SchedulerError::PredicateFailed {
                        node: node.name.clone(),
                        reason: format!(
                            "task {}/{} is not preemptible, revocable node refused",
                            task.namespace, task.name
                        ),
                    });
                }
                Ok(())
            }),
        );

        let p = plugin.clone();
        ssn.add_node_order_fn(
            PLUGIN_NAME,
            Box::new(move |task, node| {
                if node.revocable_zone.is_empty() {
                    return Ok(0.0);
                }
                p.available_revocable_zone(&node.revocable_zone)?;
                if !task.preemptible {
                    return Ok(0.0);
                }
                Ok(MAX_NODE_SCORE)
            }),
        );

        ssn.add_preemptable_fn(
            PLUGIN_NAME,
            Box::new(move |state, preemptor, preemptees| {
                // Preemptible work never preempts on this plugin's behalf.
                if preemptor.preemptible {
                    return Vec::new();
                }

                let mut by_job: BTreeMap<JobId, Vec<TaskId>> = BTreeMap::new();
                for task in preemptees {
                    if !task.preemptible || task.status != TaskStatus::Running {
                        continue;
                    }
                    // Victims come from non-revocable nodes only.
                    let on_revocable = state
                        .snapshot
                        .nodes
                        .get(&task.node_name)
                        .map(|n| !n.revocable_zone.is_empty())
                        .unwrap_or(true);
                    if on_revocable {
                        continue;
                    }
                    by_job.entry(task.job.clone()).or_default().push(task.uid.clone());
                }

                let mut victims = Vec::new();
                for (job_id, candidates) in by_job {
                    if let Some(job) = state.snapshot.jobs.get(&job_id) {
                        let bound = max_pod_evict_num(job);
                        victims.extend(candidates.into_iter().take(bound));
                    }
                }
                victims
            }),
        );

        let p = plugin.clone();
        ssn.add_victim_tasks_fn(
            PLUGIN_NAME,
            Box::new(move |state| {
                let now = (p.clock)();
                {
                    let last = p.last_evict_at.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(last) = *last {
                        let next_allowed = last
                            + chrono::Duration::from_std(p.evict_period)
                                .unwrap_or_else(|_| chrono::Duration::seconds(60));
                        if now < next_allowed {
                            debug!("victim scan rate limited until {next_allowed}");
                            return Vec::new();
                        }
                    }
                }

                let mut victims = Vec::new();
                for zone in p.revocable_zones.keys() {
                    if p.available_revocable_zone(zone).is_ok() {
                        continue;
                    }
                    // Zone is closed: drain its preemptible residents.
                    for (job_id, tasks) in p.revocable_node_preemptible_tasks(zone, state) {
                        if let Some(job) = state.snapshot.jobs.get(&job_id) {
                            let bound = max_pod_evict_num(job);
                            victims.extend(tasks.into_iter().take(bound));
                        }
                    }
                }

                *p.last_evict_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
                debug!(count = victims.len(), "revocable zone victim scan");
                victims
            }),
        );

        ssn.add_job_order_fn(
            PLUGIN_NAME,
            Box::new(|l, r| {
                if l.preemptible == r.preemptible {
                    return std::cmp::Ordering::Equal;
                }
                if !l.preemptible {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                }
            }),
        );

        ssn.add_job_pipelined_fn(
            PLUGIN_NAME,
            Box::new(|job| {
                job.waiting_task_num() + job.ready_task_num() >= job.min_available as usize
            }),
        );

        ssn.add_job_starving_fn(
            PLUGIN_NAME,
            Box::new(|job| {
                // Elastic preemptible jobs are never starving here.
                if job.preemptible {
                    return false;
                }
                job.count_in_status(TaskStatus::Pending) > 0
            }),
        );
    }
}

/// Per-job cap on one eviction batch, from the disruption budget.
fn max_pod_evict_num(job: &JobInfo) -> usize {
    let running = job.count_in_status(TaskStatus::Running);
    let total = job.task_count();
    let budget = job.budget();

    if let Some(max_unavailable) = &budget.max_unavailable {
        return parse_int_or_percent(max_unavailable, total).unwrap_or(DEFAULT_POD_EVICT_NUM);
    }
    if let Some(min_available) = &budget.min_available {
        if let Some(min_available) = parse_int_or_percent(min_available, total) {
            if running >= min_available {
                return running - min_available;
            }
        }
    }
    DEFAULT_POD_EVICT_NUM
}

/// `"3"` or `"25%"`; percentages round up against the task total.
fn parse_int_or_percent(value: &str, total: usize) -> Option<usize> {
    let value = value.trim();
    if let Some(percent) = value.strip_suffix('%') {
        let percent: f64 = percent.trim().parse().ok()?;
        return Some((percent * total as f64 / 100.0).ceil() as usize);
    }
    value.parse().ok()
}

/// `HH:MM-HH:MM` into its two bounds.
fn parse_window(raw: &str) -> std::result::Result<(NaiveTime, NaiveTime), String> {
    let mut parts = raw.trim().splitn(2, '-');
    let (Some(start), Some(end)) = (parts.next(), parts.next()) else {
        return Err(format!("revocable zone window {raw} format error"));
    };
    let start = NaiveTime::parse_from_str(start, "%H:%M")
        .map_err(|e| format!("bad window start {start}: {e}"))?;
    let end = NaiveTime::parse_from_str(end, "%H:%M")
        .map_err(|e| format!("bad window end {end}: {e}"))?;
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixed_clock(h: u32, m: u32) -> Clock {
        let at = NaiveDate::from_ymd_opt(2024, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap();
        Arc::new(move || at)
    }

    fn plugin_with_zone(window: &str, clock: Clock) -> TdmPlugin {
        let args: Arguments = [
            (
                format!("{REVOCABLE_ZONE_ARG_PREFIX}rz1"),
                window.to_string(),
            ),
            (EVICT_PERIOD_ARG.to_string(), "1m".to_string()),
        ]
        .into_iter()
        .collect();
        TdmPlugin::new(args, Arc::new(Mutex::new(None)), clock)
    }

    #[test]
    fn window_parse_rejects_garbage() {
        assert!(parse_window("10:00-12:00").is_ok());
        assert!(parse_window("10:00").is_err());
        assert!(parse_window("25:00-12:00").is_err());
    }

    #[test]
    fn malformed_zone_is_disabled_not_fatal() {
        let args: Arguments = [(
            format!("{REVOCABLE_ZONE_ARG_PREFIX}bad"),
            "nonsense".to_string(),
        )]
        .into_iter()
        .collect();
        let plugin = TdmPlugin::new(args, Arc::new(Mutex::new(None)), fixed_clock(11, 0));
        assert!(plugin.revocable_zones.is_empty());
    }

    #[test]
    fn zone_activity_follows_the_window() {
        let plugin = plugin_with_zone("10:00-12:00", fixed_clock(11, 0));
        assert!(plugin.available_revocable_zone("rz1").is_ok());

        let plugin = plugin_with_zone("10:00-12:00", fixed_clock(13, 0));
        assert!(plugin.available_revocable_zone("rz1").is_err());

        // Inclusive bounds.
        let plugin = plugin_with_zone("10:00-12:00", fixed_clock(12, 0));
        assert!(plugin.available_revocable_zone("rz1").is_ok());
    }

    #[test]
    fn start_after_end_wraps_to_next_day() {
        let plugin = plugin_with_zone("22:00-06:00", fixed_clock(23, 30));
        assert!(plugin.available_revocable_zone("rz1").is_ok());

        let plugin = plugin_with_zone("22:00-06:00", fixed_clock(12, 0));
        assert!(plugin.available_revocable_zone("rz1").is_err());
    }

    #[test]
    fn equal_bounds_span_the_full_next_day() {
        let plugin = plugin_with_zone("10:00-10:00", fixed_clock(10, 0));
        assert!(plugin.available_revocable_zone("rz1").is_ok());

        let plugin = plugin_with_zone("10:00-10:00", fixed_clock(23, 59));
        assert!(plugin.available_revocable_zone("rz1").is_ok());

        let plugin = plugin_with_zone("10:00-10:00", fixed_clock(9, 0));
        assert!(plugin.available_revocable_zone("rz1").is_err());
    }

    #[test]
    fn unknown_zone_is_unavailable() {
        let plugin = plugin_with_zone("10:00-12:00", fixed_clock(11, 0));
        assert!(plugin.available_revocable_zone("rz9").is_err());
    }

    #[test]
    fn int_or_percent_parsing() {
        assert_eq!(parse_int_or_percent("3", 10), Some(3));
        assert_eq!(parse_int_or_percent("25%", 10), Some(3)); // ceil(2.5)
        assert_eq!(parse_int_or_percent("50%", 4), Some(2));
        assert_eq!(parse_int_or_percent("x", 4), None);
    }
}
