use tracing::info;

/// Counters for one sampling run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub requests: u64,
    pub pages: u64,
    pub posts_accepted: u64,
    pub comments_accepted: u64,
    pub throttled: u64,
    pub transient_failures: u64,
    pub abandoned_requests: u64,
    pub reauthentications: u64,
}

impl FetchStats {
    pub fn items_accepted(&self) -> u64 {
        self.posts_accepted + self.comments_accepted
    }

    pub fn failure_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            (self.throttled + self.transient_failures) as f64 / self.requests as f64
        }
    }

    pub fn log_summary(&self) {
        info!(
            requests = self.requests,
            pages = self.pages,
            posts = self.posts_accepted,
            comments = self.comments_accepted,
            items = self.items_accepted(),
            throttled = self.throttled,
            transient_failures = self.transient_failures,
            failure_rate = %format!("{:.1}%", self.failure_rate() * 100.0),
            abandoned = self.abandoned_requests,
            reauthentications = self.reauthentications,
            "Sampling finished"
        );
    }
}
