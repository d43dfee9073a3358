//! Unconditional eviction of plugin-nominated victims.

use tracing::{debug, info};

use crate::{Action, Session};

pub struct Evict;

impl Action for Evict {
    fn name(&self) -> &str {
        "evict"
    }

    fn execute(&self, ssn: &mut Session) {
        let victims = ssn.victim_tasks();
        if victims.is_empty() {
            return;
        }

        info!(count = victims.len(), "evicting victim tasks");
        for victim in victims {
            if let Err(err) = ssn.evict(&victim) {
                debug!(victim = %victim, %err, "failed to evict victim task");
            }
        }
    }
}
