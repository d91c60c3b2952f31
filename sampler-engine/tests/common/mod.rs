#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sampler_core::{Clock, CoreError, ItemKind, RawItem, RedditApiError, SearchApi, SearchPage};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Virtual clock: `sleep` advances time instantly and is recorded.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        self.sleeps.lock().unwrap().push(duration);
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Page(SearchPage),
    Throttle(Option<u64>),
    ServerError,
    Unauthorized,
    Forbidden,
}

impl Scripted {
    fn into_result(self, resource: &str) -> Result<SearchPage, CoreError> {
        match self {
            Scripted::Page(page) => Ok(page),
            Scripted::Throttle(retry_after) => {
                Err(RedditApiError::RateLimitExceeded { retry_after }.into())
            }
            Scripted::ServerError => Err(RedditApiError::ServerError { status_code: 503 }.into()),
            Scripted::Unauthorized => Err(RedditApiError::InvalidToken.into()),
            Scripted::Forbidden => Err(RedditApiError::Forbidden {
                resource: resource.to_string(),
            }
            .into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Search {
        community: String,
        query: String,
        after: Option<String>,
    },
    Comments {
        community: String,
        post_id: String,
    },
    Reauthenticate,
}

/// In-memory search backend answering from per-request scripts. Unscripted
/// requests get an empty page.
#[derive(Default)]
pub struct ScriptedApi {
    searches: HashMap<(String, String), VecDeque<Scripted>>,
    comments: HashMap<String, VecDeque<Scripted>>,
    reauth: VecDeque<Scripted>,
    pub calls: Vec<Call>,
    pub reauth_fails: bool,
    latency: Option<(Arc<ManualClock>, Duration)>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_search(mut self, community: &str, query: &str, script: Vec<Scripted>) -> Self {
        self.searches
            .entry((community.to_string(), query.to_string()))
            .or_default()
            .extend(script);
        self
    }

    pub fn on_comments(mut self, post_id: &str, script: Vec<Scripted>) -> Self {
        self.comments
            .entry(post_id.to_string())
            .or_default()
            .extend(script);
        self
    }

    /// Outcomes for successive re-authentications; `Page` means success.
    pub fn on_reauthenticate(mut self, script: Vec<Scripted>) -> Self {
        self.reauth.extend(script);
        self
    }

    /// Every request advances `clock` by `per_request`.
    pub fn with_latency(mut self, clock: Arc<ManualClock>, per_request: Duration) -> Self {
        self.latency = Some((clock, per_request));
        self
    }

    pub fn request_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| !matches!(call, Call::Reauthenticate))
            .count()
    }

    pub fn reauth_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::Reauthenticate))
            .count()
    }

    fn tick(&self) {
        if let Some((clock, per_request)) = &self.latency {
            clock.advance(*per_request);
        }
    }
}

#[async_trait]
impl SearchApi for ScriptedApi {
    async fn search(
        &mut self,
        community: &str,
        query: &str,
        after: Option<&str>,
    ) -> Result<SearchPage, CoreError> {
        self.tick();
        self.calls.push(Call::Search {
            community: community.to_string(),
            query: query.to_string(),
            after: after.map(str::to_string),
        });
        self.searches
            .get_mut(&(community.to_string(), query.to_string()))
            .and_then(VecDeque::pop_front)
            .unwrap_or(Scripted::Page(SearchPage::default()))
            .into_result(&format!("/r/{community}/search"))
    }

    async fn comments(
        &mut self,
        community: &str,
        post_id: &str,
        _limit: usize,
    ) -> Result<Vec<RawItem>, CoreError> {
        self.tick();
        self.calls.push(Call::Comments {
            community: community.to_string(),
            post_id: post_id.to_string(),
        });
        self.comments
            .get_mut(post_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Scripted::Page(SearchPage::default()))
            .into_result(&format!("/comments/{post_id}"))
            .map(|page| page.items)
    }

    async fn reauthenticate(&mut self) -> Result<(), CoreError> {
        self.calls.push(Call::Reauthenticate);
        if let Some(scripted) = self.reauth.pop_front() {
            return scripted.into_result("/api/v1/access_token").map(|_| ());
        }
        if self.reauth_fails {
            Err(RedditApiError::AuthenticationFailed {
                reason: "invalid_grant".to_string(),
            }
            .into())
        } else {
            Ok(())
        }
    }
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, day, hour, 0, 0).unwrap()
}

pub fn post(id: &str, created_at: DateTime<Utc>, text: &str) -> RawItem {
    RawItem {
        id: id.to_string(),
        kind: ItemKind::Post,
        text: text.to_string(),
        created_at,
        community: "Veterans".to_string(),
    }
}

pub fn comment(id: &str, created_at: DateTime<Utc>, text: &str) -> RawItem {
    RawItem {
        kind: ItemKind::Comment,
        ..post(id, created_at, text)
    }
}

pub fn page(items: Vec<RawItem>, next_cursor: Option<&str>) -> Scripted {
    Scripted::Page(SearchPage {
        items,
        next_cursor: next_cursor.map(str::to_string),
    })
}
