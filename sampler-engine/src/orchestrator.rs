use crate::budget::TimeBudget;
use crate::counter::NgramCounter;
use crate::fetch::{FetchEnd, FetchLoop, FetchPolicy};
use crate::normalize::Normalizer;
use crate::stats::FetchStats;
use sampler_core::{Clock, Community, ConfigError, CoreError, Probe, SearchApi, TimeWindow};
use std::collections::HashSet;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_TIME_BUDGET_MINUTES: f64 = 40.0;
pub const DEFAULT_MAX_PER_PROBE: usize = 80;
pub const DEFAULT_MAX_COMMENTS_PER_POST: usize = 25;

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub communities: Vec<Community>,
    pub probes: Vec<Probe>,
    pub window: TimeWindow,
    pub time_budget: Duration,
    pub max_per_probe: usize,
    pub include_comments: bool,
    pub max_comments_per_post: usize,
    pub fetch: FetchPolicy,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            communities: Community::defaults(),
            probes: Probe::defaults(),
            window: TimeWindow::until_now(),
            time_budget: Duration::from_secs(DEFAULT_TIME_BUDGET_MINUTES as u64 * 60),
            max_per_probe: DEFAULT_MAX_PER_PROBE,
            include_comments: false,
            max_comments_per_post: DEFAULT_MAX_COMMENTS_PER_POST,
            fetch: FetchPolicy::default(),
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.communities.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "at least one subreddit is required".to_string(),
            });
        }
        if self.probes.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "at least one probe is required".to_string(),
            });
        }
        if let Some(community) = self.communities.iter().find(|c| !is_valid_community(c)) {
            return Err(ConfigError::InvalidValue {
                field: "subs".to_string(),
                value: community.to_string(),
            });
        }
        if let Some(probe) = self.probes.iter().find(|p| p.as_str().trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "probes".to_string(),
                value: probe.to_string(),
            });
        }
        if self.max_per_probe == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max-per-probe".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Communities in configured order with repeats removed.
    pub fn unique_communities(&self) -> Vec<Community> {
        let mut seen = HashSet::new();
        self.communities
            .iter()
            .filter(|c| seen.insert(c.as_str().to_lowercase()))
            .cloned()
            .collect()
    }
}

fn is_valid_community(community: &Community) -> bool {
    let name = community.as_str();
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Accumulated tables and bookkeeping from one run.
#[derive(Debug)]
pub struct SampleRun {
    pub counter: NgramCounter,
    pub stats: FetchStats,
    pub budget_exhausted: bool,
    pub elapsed: Duration,
}

/// Walks every (community, probe) pair and feeds what it fetches into the counter.
pub struct Sampler {
    config: SamplerConfig,
    normalizer: Normalizer,
}

impl Sampler {
    pub fn new(config: SamplerConfig, normalizer: Normalizer) -> Self {
        Self { config, normalizer }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Samples until every pair is done or the time budget runs out. Partial
    /// tables are returned on budget exhaustion; only authentication failures
    /// end the run with an error.
    pub async fn run<A, C>(&self, api: &mut A, clock: &C) -> Result<SampleRun, CoreError>
    where
        A: SearchApi + ?Sized,
        C: Clock + ?Sized,
    {
        self.config.validate()?;

        let config = &self.config;
        let communities = config.unique_communities();
        let budget = TimeBudget::start(clock, config.time_budget);
        let mut fetch = FetchLoop::new(api, clock, budget, config.fetch.clone());
        let mut counter = NgramCounter::new();
        let mut budget_exhausted = false;

        info!(
            communities = communities.len(),
            probes = config.probes.len(),
            budget_secs = config.time_budget.as_secs(),
            include_comments = config.include_comments,
            "Starting sample"
        );

        'communities: for community in &communities {
            info!(community = %community, "Sampling community");

            for probe in &config.probes {
                if fetch.is_exhausted() {
                    budget_exhausted = true;
                    break 'communities;
                }

                let outcome = fetch
                    .fetch_probe(community, probe, &config.window, config.max_per_probe)
                    .await?;
                info!(
                    community = %community,
                    probe = %probe,
                    posts = outcome.items.len(),
                    pages = outcome.pages,
                    end = ?outcome.end,
                    "Probe finished"
                );

                for post in &outcome.items {
                    counter.observe(&self.normalizer.normalize(&post.text), community.as_str());
                }

                if outcome.end == FetchEnd::BudgetExhausted {
                    budget_exhausted = true;
                    break 'communities;
                }

                if config.include_comments {
                    for post in &outcome.items {
                        let comments = fetch
                            .fetch_comments(
                                community,
                                &post.id,
                                config.max_comments_per_post,
                                &config.window,
                            )
                            .await?;
                        for comment in &comments.items {
                            counter.observe(
                                &self.normalizer.normalize(&comment.text),
                                community.as_str(),
                            );
                        }
                        if comments.end == FetchEnd::BudgetExhausted {
                            budget_exhausted = true;
                            break 'communities;
                        }
                    }
                }
            }

            info!(
                community = %community,
                unigrams = counter.unigram_total(community.as_str()),
                bigrams = counter.bigram_total(community.as_str()),
                "Community finished"
            );
        }

        if budget_exhausted {
            info!("Time budget reached; keeping what was collected");
        }

        let elapsed = fetch.elapsed();
        let stats = fetch.into_stats();
        stats.log_summary();

        Ok(SampleRun {
            counter,
            stats,
            budget_exhausted,
            elapsed,
        })
    }
}
