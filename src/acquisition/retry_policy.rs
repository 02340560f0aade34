//! Polling policy for restore requests.
//!
//! Implements a growing wait window with configurable parameters.

use std::time::Duration;

use crate::config::RestoreSettings;

/// Policy deciding how long to wait before polling restores and when to give up.
#[derive(Debug, Clone)]
pub struct RestorePolicy {
    /// Maximum number of polls before a restore is abandoned.
    pub max_polls: u32,
    /// Default wait window used when the catalogue gives no estimate.
    pub wait_window: Duration,
    /// Multiplier applied to the window after each unsuccessful poll round.
    pub backoff_multiplier: f64,
    /// Upper bound for any single wait.
    pub max_wait: Duration,
}

impl RestorePolicy {
    /// Create a new RestorePolicy from configuration settings.
    pub fn new(settings: &RestoreSettings) -> Self {
        Self {
            max_polls: settings.max_polls,
            wait_window: Duration::from_secs(settings.time_lag_minutes * 60),
            backoff_multiplier: settings.backoff_multiplier,
            max_wait: Duration::from_secs(settings.max_wait_minutes * 60),
        }
    }

    /// Wait window for the given poll round.
    ///
    /// Uses `wait_window * multiplier^poll_round`, capped at `max_wait`.
    pub fn window_for(&self, poll_round: u32) -> Duration {
        let secs = self.wait_window.as_secs_f64() * self.backoff_multiplier.powi(poll_round as i32);
        let capped = secs.min(self.max_wait.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }

    /// Clamp a wait derived from catalogue estimates into the allowed range.
    pub fn clamp(&self, wait: Duration) -> Duration {
        wait.min(self.max_wait)
    }

    /// Check whether a restore that has been polled `polls` times may be polled again.
    pub fn should_poll_again(&self, polls: u32) -> bool {
        polls < self.max_polls
    }
}

impl Default for RestorePolicy {
    fn default() -> Self {
        Self {
            max_polls: 3,
            wait_window: Duration::from_secs(60 * 60),
            backoff_multiplier: 1.5,
            max_wait: Duration::from_secs(6 * 60 * 60),
        }
    }
}
