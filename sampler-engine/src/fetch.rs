use crate::backoff::{failure_action, Backoff, BackoffConfig, FailureAction};
use crate::budget::TimeBudget;
use crate::stats::FetchStats;
use sampler_core::{
    Clock, Community, CoreError, ErrorExt, ItemKind, Probe, RawItem, SearchApi, SearchPage,
    TimeWindow,
};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_PAGE_PAUSE: Duration = Duration::from_millis(1500);

/// Pacing for requests issued by a [`FetchLoop`].
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Pause before each request after the first one
    pub page_pause: Duration,
    pub backoff: BackoffConfig,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            page_pause: DEFAULT_PAGE_PAUSE,
            backoff: BackoffConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Fetching,
    Backoff,
    Exhausted,
    Done,
}

/// Why a probe (or comment fetch) stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchEnd {
    CursorExhausted,
    EmptyPage,
    CapReached,
    /// An item older than the window's lower bound was seen
    LeftWindow,
    /// The request kept failing or was refused outright
    Abandoned,
    BudgetExhausted,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub items: Vec<RawItem>,
    pub pages: u32,
    pub end: FetchEnd,
}

impl FetchOutcome {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            pages: 0,
            end: FetchEnd::CursorExhausted,
        }
    }

    fn finish(mut self, end: FetchEnd) -> Self {
        self.end = end;
        self
    }
}

enum Request<'r> {
    Search {
        community: &'r str,
        query: &'r str,
        after: Option<&'r str>,
    },
    Comments {
        community: &'r str,
        post_id: &'r str,
        limit: usize,
    },
}

impl fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Search {
                community,
                query,
                after,
            } => write!(
                f,
                "search r/{} q={:?} after={}",
                community,
                query,
                after.unwrap_or("-")
            ),
            Request::Comments {
                community, post_id, ..
            } => write!(f, "comments r/{} post={}", community, post_id),
        }
    }
}

enum RequestOutcome {
    Completed(SearchPage),
    Abandoned,
    Exhausted,
}

/// Sequential, budget-aware requester with polite pauses and backoff.
///
/// One loop serves a whole run: the time budget, backoff escalation, the
/// single re-authentication allowance and the [`FetchStats`] are shared by
/// every probe and comment fetch issued through it.
pub struct FetchLoop<'a, A: SearchApi + ?Sized, C: Clock + ?Sized> {
    api: &'a mut A,
    clock: &'a C,
    budget: TimeBudget,
    policy: FetchPolicy,
    backoff: Backoff,
    state: FetchState,
    stats: FetchStats,
    issued_any: bool,
    reauthenticated: bool,
}

impl<'a, A: SearchApi + ?Sized, C: Clock + ?Sized> FetchLoop<'a, A, C> {
    pub fn new(api: &'a mut A, clock: &'a C, budget: TimeBudget, policy: FetchPolicy) -> Self {
        let backoff = Backoff::new(policy.backoff.clone());
        Self {
            api,
            clock,
            budget,
            policy,
            backoff,
            state: FetchState::Idle,
            stats: FetchStats::default(),
            issued_any: false,
            reauthenticated: false,
        }
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    pub fn stats(&self) -> &FetchStats {
        &self.stats
    }

    pub fn into_stats(self) -> FetchStats {
        self.stats
    }

    pub fn is_exhausted(&self) -> bool {
        self.budget.is_exhausted(self.clock)
    }

    pub fn elapsed(&self) -> Duration {
        self.budget.elapsed(self.clock)
    }

    /// Pages through the search results for `probe`, newest first, keeping
    /// posts inside `window` until `cap` posts are collected.
    pub async fn fetch_probe(
        &mut self,
        community: &Community,
        probe: &Probe,
        window: &TimeWindow,
        cap: usize,
    ) -> Result<FetchOutcome, CoreError> {
        let mut outcome = FetchOutcome::new();
        if cap == 0 {
            return Ok(outcome.finish(FetchEnd::CapReached));
        }

        self.transition(FetchState::Idle);
        let mut cursor: Option<String> = None;
        loop {
            let request = Request::Search {
                community: community.as_str(),
                query: probe.as_str(),
                after: cursor.as_deref(),
            };
            let page = match self.send(request).await? {
                RequestOutcome::Completed(page) => page,
                RequestOutcome::Abandoned => return Ok(self.done(outcome, FetchEnd::Abandoned)),
                RequestOutcome::Exhausted => return Ok(outcome.finish(FetchEnd::BudgetExhausted)),
            };
            outcome.pages += 1;

            // Undated children are dropped upstream, so a page can be empty yet
            // still point further
            if page.is_empty() && page.next_cursor.is_none() {
                return Ok(self.done(outcome, FetchEnd::EmptyPage));
            }

            for item in page.items {
                if window.is_after(item.created_at) {
                    continue;
                }
                if window.is_before(item.created_at) {
                    return Ok(self.done(outcome, FetchEnd::LeftWindow));
                }
                outcome.items.push(item);
                self.stats.posts_accepted += 1;
                if outcome.items.len() >= cap {
                    return Ok(self.done(outcome, FetchEnd::CapReached));
                }
            }

            match page.next_cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => return Ok(self.done(outcome, FetchEnd::CursorExhausted)),
            }
        }
    }

    /// Top-level comments of one post that fall inside `window`.
    pub async fn fetch_comments(
        &mut self,
        community: &Community,
        post_id: &str,
        limit: usize,
        window: &TimeWindow,
    ) -> Result<FetchOutcome, CoreError> {
        let outcome = FetchOutcome::new();
        if limit == 0 {
            return Ok(outcome.finish(FetchEnd::CapReached));
        }

        self.transition(FetchState::Idle);
        let request = Request::Comments {
            community: community.as_str(),
            post_id,
            limit,
        };
        let page = match self.send(request).await? {
            RequestOutcome::Completed(page) => page,
            RequestOutcome::Abandoned => return Ok(self.done(outcome, FetchEnd::Abandoned)),
            RequestOutcome::Exhausted => return Ok(outcome.finish(FetchEnd::BudgetExhausted)),
        };

        let mut outcome = outcome;
        outcome.pages = 1;
        outcome.items = page
            .items
            .into_iter()
            .filter(|item| item.kind == ItemKind::Comment && window.contains(item.created_at))
            .take(limit)
            .collect();
        self.stats.comments_accepted += outcome.items.len() as u64;

        let end = if outcome.items.len() >= limit {
            FetchEnd::CapReached
        } else {
            FetchEnd::CursorExhausted
        };
        Ok(self.done(outcome, end))
    }

    async fn send(&mut self, request: Request<'_>) -> Result<RequestOutcome, CoreError> {
        let mut retries = 0u32;
        let mut pause_first = self.issued_any;

        loop {
            if self.budget.is_exhausted(self.clock) {
                self.transition(FetchState::Exhausted);
                return Ok(RequestOutcome::Exhausted);
            }

            if pause_first {
                let pause = self.policy.page_pause.min(self.budget.remaining(self.clock));
                self.clock.sleep(pause).await;
                pause_first = false;
                if self.budget.is_exhausted(self.clock) {
                    self.transition(FetchState::Exhausted);
                    return Ok(RequestOutcome::Exhausted);
                }
            }

            self.transition(FetchState::Fetching);
            self.issued_any = true;
            self.stats.requests += 1;
            debug!(request = %request, attempt = retries + 1, "Sending request");

            let result = match &request {
                Request::Search {
                    community,
                    query,
                    after,
                } => self.api.search(community, query, *after).await,
                Request::Comments {
                    community,
                    post_id,
                    limit,
                } => self
                    .api
                    .comments(community, post_id, *limit)
                    .await
                    .map(|items| SearchPage {
                        items,
                        next_cursor: None,
                    }),
            };

            let mut error = match result {
                Ok(page) => {
                    self.backoff.reset();
                    self.stats.pages += 1;
                    return Ok(RequestOutcome::Completed(page));
                }
                Err(error) => error,
            };

            let mut action = failure_action(&error);
            if action == FailureAction::Reauthenticate {
                if self.reauthenticated {
                    error.log_error();
                    return Err(error);
                }
                warn!(request = %request, "Credentials rejected; re-authenticating once");
                self.reauthenticated = true;
                self.stats.reauthentications += 1;
                match self.api.reauthenticate().await {
                    Ok(()) => continue,
                    // A busy token endpoint is waited out; the retried request fetches a token
                    Err(auth_error) if auth_error.is_retryable() => {
                        action = failure_action(&auth_error);
                        error = auth_error;
                    }
                    Err(auth_error) => {
                        auth_error.log_error();
                        return Err(auth_error);
                    }
                }
            }

            match action {
                FailureAction::Reauthenticate => {
                    error.log_error();
                    return Err(error);
                }
                FailureAction::Backoff { hint } => {
                    if error.is_throttling() {
                        self.stats.throttled += 1;
                    } else {
                        self.stats.transient_failures += 1;
                    }

                    if retries >= self.policy.backoff.max_retries {
                        warn!(
                            request = %request,
                            retries,
                            error = %error,
                            "Giving up on request after repeated failures"
                        );
                        self.stats.abandoned_requests += 1;
                        return Ok(RequestOutcome::Abandoned);
                    }
                    retries += 1;

                    let delay = self.backoff.next_delay(hint);
                    let remaining = self.budget.remaining(self.clock);
                    self.transition(FetchState::Backoff);
                    debug!(
                        request = %request,
                        delay_ms = delay.as_millis() as u64,
                        throttled = error.is_throttling(),
                        "Backing off"
                    );
                    self.clock.sleep(delay.min(remaining)).await;
                }
                FailureAction::Abandon => {
                    warn!(request = %request, error = %error, "Abandoning request");
                    self.stats.abandoned_requests += 1;
                    return Ok(RequestOutcome::Abandoned);
                }
            }
        }
    }

    fn done(&mut self, outcome: FetchOutcome, end: FetchEnd) -> FetchOutcome {
        self.transition(FetchState::Done);
        outcome.finish(end)
    }

    fn transition(&mut self, next: FetchState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Fetch state");
            self.state = next;
        }
    }
}
