use std::time::Duration;

use crate::config::RestartPolicy;

impl RestartPolicy {
    /// Delay before restart number `restart` (1-based): `initial * 2^(restart-1)`, capped.
    pub fn backoff_for(&self, restart: u32) -> Duration {
        let exponent = restart.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RestartDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp,
}

/// Counts restarts inside the tracking window.
#[derive(Debug)]
pub(crate) struct RestartTracker {
    policy: RestartPolicy,
    restarts: u32,
}

impl RestartTracker {
    pub(crate) fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            restarts: 0,
        }
    }

    pub(crate) fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Record the end of a run that lasted `ran_for` and decide what happens next.
    pub(crate) fn on_exit(&mut self, ran_for: Duration) -> RestartDecision {
        if ran_for >= self.policy.tracking_window {
            self.restarts = 0;
        }
        if self.restarts >= self.policy.max_restarts {
            return RestartDecision::GiveUp;
        }
        self.restarts += 1;
        RestartDecision::Retry {
            attempt: self.restarts,
            delay: self.policy.backoff_for(self.restarts),
        }
    }
}
