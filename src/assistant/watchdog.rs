//! Listener liveness check
//!
//! The wake word listener refreshes a heartbeat for every frame it hands to
//! the keyword spotter. If the heartbeat stops while the listener is meant
//! to be running, the pipeline has stalled and is restarted.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// How often liveness is checked
pub const CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Heartbeat age that counts as a stall
pub const STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Heartbeat is recent
    Healthy,
    /// The listener is not supposed to be running; nothing to check
    NotListening,
    /// No heartbeat for `silent_for`
    Stalled { silent_for: Duration },
}

#[derive(Debug, Clone, Copy)]
pub struct HealthWatchdog {
    interval: Duration,
    timeout: Duration,
}

impl Default for HealthWatchdog {
    fn default() -> Self {
        Self::new(CHECK_INTERVAL, STALL_TIMEOUT)
    }
}

impl HealthWatchdog {
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ticker for the engine loop; the first tick fires after one interval
    #[must_use]
    pub fn ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Classify the listener given its last heartbeat
    #[must_use]
    pub fn check(&self, listening: bool, last_activity: Instant, now: Instant) -> Health {
        if !listening {
            return Health::NotListening;
        }
        let silent_for = now.saturating_duration_since(last_activity);
        if silent_for > self.timeout {
            Health::Stalled { silent_for }
        } else {
            Health::Healthy
        }
    }
}
