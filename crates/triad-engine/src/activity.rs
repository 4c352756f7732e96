use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error};

use triad_store::RunStore;

/// Inactivity after which a run counts as dormant.
pub const DORMANT_THRESHOLD_SECS: i64 = 300;

/// Decides whether a new run starts in dormant mode.
///
/// Dormant iff a previous session exists and more than the threshold has
/// elapsed since it. The first run ever is never dormant.
#[derive(Clone, Copy, Debug)]
pub struct ActivityGate {
    threshold: TimeDelta,
}

impl Default for ActivityGate {
    fn default() -> Self {
        Self {
            threshold: TimeDelta::seconds(DORMANT_THRESHOLD_SECS),
        }
    }
}

impl ActivityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dormant(&self, last_activity: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_activity {
            Some(last) => now.signed_duration_since(last) > self.threshold,
            None => false,
        }
    }

    /// Read the last activity time from the store and evaluate it.
    /// A failed read counts as "no prior activity".
    pub fn evaluate(&self, store: &dyn RunStore, now: DateTime<Utc>) -> bool {
        let last = match store.last_activity_time() {
            Ok(last) => last,
            Err(e) => {
                error!(error = %e, "failed to read last activity time");
                None
            }
        };
        let dormant = self.is_dormant(last, now);
        debug!(?last, dormant, "activity gate evaluated");
        dormant
    }
}
