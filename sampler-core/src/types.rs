use crate::error::{ConfigError, CoreError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fmt;

pub const DEFAULT_COMMUNITIES: &[&str] = &["VeteransBenefits", "Veterans", "VAClaims"];

pub const DEFAULT_PROBES: &[&str] = &[
    "va",
    "benefits",
    "disability",
    "claim",
    "appeal",
    "denied",
    "rating",
    "compensation",
    "form",
    "cfr",
    "service connected",
    "evidence",
    "nexus",
    "pact act",
    "dbq",
    "board appeal",
    "supplemental",
    "pending",
    "effective date",
];

/// A broad search term used to sample a community.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Probe(String);

impl Probe {
    pub fn new(term: impl Into<String>) -> Self {
        Self(term.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn defaults() -> Vec<Probe> {
        DEFAULT_PROBES.iter().map(|p| Probe::new(*p)).collect()
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Probe {
    fn from(term: &str) -> Self {
        Probe::new(term)
    }
}

/// A subreddit name, without the `r/` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Community(String);

impl Community {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim().trim_start_matches("r/").to_string();
        Self(trimmed)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn defaults() -> Vec<Community> {
        DEFAULT_COMMUNITIES.iter().map(|c| Community::new(*c)).collect()
    }
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Community {
    fn from(name: &str) -> Self {
        Community::new(name)
    }
}

/// Inclusive UTC creation-time bounds for sampled items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    earliest: Option<DateTime<Utc>>,
    latest: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(
        earliest: Option<DateTime<Utc>>,
        latest: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        if let Some(earliest) = earliest {
            if earliest >= latest {
                return Err(CoreError::invalid_input(format!(
                    "earliest ({}) must be before latest ({})",
                    earliest.format("%Y-%m-%dT%H:%M:%SZ"),
                    latest.format("%Y-%m-%dT%H:%M:%SZ")
                )));
            }
        }
        Ok(Self { earliest, latest })
    }

    /// Window ending now with no lower bound.
    pub fn until_now() -> Self {
        Self {
            earliest: None,
            latest: Utc::now(),
        }
    }

    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.earliest
    }

    pub fn latest(&self) -> DateTime<Utc> {
        self.latest
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        !self.is_after(at) && !self.is_before(at)
    }

    /// Newer than the upper bound.
    pub fn is_after(&self, at: DateTime<Utc>) -> bool {
        at > self.latest
    }

    /// Older than the lower bound.
    pub fn is_before(&self, at: DateTime<Utc>) -> bool {
        self.earliest.is_some_and(|earliest| at < earliest)
    }
}

/// Parses `YYYY-MM-DDTHH:MM:SS` (taken as UTC), RFC 3339, or a bare date.
pub fn parse_utc_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, ConfigError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Post,
    Comment,
}

/// A fetched post or comment. Consumed by the normalizer right away.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub id: String,
    pub kind: ItemKind,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub community: String,
}

/// One page of search results plus the cursor for the next one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub items: Vec<RawItem>,
    pub next_cursor: Option<String>,
}

impl SearchPage {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
