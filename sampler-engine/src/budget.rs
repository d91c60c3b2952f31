use sampler_core::{Clock, ConfigError};
use std::time::{Duration, Instant};

/// Wall-clock allowance for a whole run, measured against a [`Clock`].
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    started: Instant,
    limit: Duration,
}

impl TimeBudget {
    pub fn start<C: Clock + ?Sized>(clock: &C, limit: Duration) -> Self {
        Self {
            started: clock.now(),
            limit,
        }
    }

    /// Rejects negative, non-finite and unrepresentable lengths.
    pub fn from_minutes(minutes: f64) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(minutes * 60.0).map_err(|_| ConfigError::InvalidValue {
            field: "time-budget".to_string(),
            value: minutes.to_string(),
        })
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn elapsed<C: Clock + ?Sized>(&self, clock: &C) -> Duration {
        clock.now().saturating_duration_since(self.started)
    }

    pub fn remaining<C: Clock + ?Sized>(&self, clock: &C) -> Duration {
        self.limit.saturating_sub(self.elapsed(clock))
    }

    pub fn is_exhausted<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        self.remaining(clock).is_zero()
    }
}
