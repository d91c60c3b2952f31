use sampler_core::{CoreError, ErrorExt, RedditApiError};
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Retries allowed for a single request before it is abandoned
    pub max_retries: u32,
    /// Delay after the first throttling or transient failure
    pub base_delay: Duration,
    /// Ceiling for any single wait
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// What the fetch loop does after a failed request.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureAction {
    /// Wait and retry the same request, honouring the server's hint if any
    Backoff { hint: Option<Duration> },
    /// Credentials were rejected
    Reauthenticate,
    /// Skip this request and move on
    Abandon,
}

pub fn failure_action(error: &CoreError) -> FailureAction {
    match error {
        _ if error.is_authentication() => FailureAction::Reauthenticate,
        _ if error.is_retryable() => FailureAction::Backoff {
            hint: error.retry_after(),
        },
        // Reddit occasionally answers a loaded search with an HTML error page
        CoreError::RedditApi(RedditApiError::InvalidResponse { .. }) => {
            FailureAction::Backoff { hint: None }
        }
        _ => FailureAction::Abandon,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &BackoffConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as f64;
    let max_ms = config.max_delay.as_millis() as u64;

    let exponential_ms = if attempt == 0 {
        base_ms as u64
    } else {
        let multiplier = config.backoff_multiplier.powi(attempt as i32);
        ((base_ms * multiplier) as u64).min(max_ms)
    };

    let jitter_range = (exponential_ms as f64 * config.jitter_factor.clamp(0.0, 1.0)) as u64;
    let jitter = if jitter_range == 0 {
        0
    } else {
        fastrand::u64(0..=jitter_range)
    };

    Duration::from_millis((exponential_ms + jitter).min(max_ms))
}

/// Escalating wait shared by consecutive failures; reset by a success.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    consecutive: u32,
    last: Option<Duration>,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            consecutive: 0,
            last: None,
        }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Delay for the next retry. A server hint longer than the computed delay
    /// wins, and every wait grows from the previous one (hinted or not) until
    /// the ceiling.
    pub fn next_delay(&mut self, hint: Option<Duration>) -> Duration {
        let computed = calculate_delay(self.consecutive, &self.config);
        self.consecutive = self.consecutive.saturating_add(1);

        let escalated = self.last.map_or(Duration::ZERO, |last| self.grow(last));
        let delay = computed
            .max(escalated)
            .max(hint.unwrap_or_default())
            .min(self.config.max_delay);
        self.last = Some(delay);
        delay
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.last = None;
    }

    fn grow(&self, last: Duration) -> Duration {
        let multiplier = self.config.backoff_multiplier.max(1.0);
        Duration::try_from_secs_f64(last.as_secs_f64() * multiplier).unwrap_or(self.config.max_delay)
    }
}
