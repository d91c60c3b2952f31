use chrono::{DateTime, Utc};
use clap::Parser;
use sampler_core::{parse_utc_timestamp, Community, ConfigError, CoreError, Probe, TimeWindow};
use sampler_engine::{
    BackoffConfig, FetchPolicy, Normalizer, SamplerConfig, TimeBudget, DEFAULT_MAX_COMMENTS_PER_POST,
    DEFAULT_MAX_PER_PROBE, DEFAULT_TIME_BUDGET_MINUTES, DEFAULT_TOP_N,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "methodical-sampler")]
#[command(version)]
#[command(about = "Probe-based unigram/bigram sampler for Reddit communities")]
pub struct Cli {
    /// Target subreddits (default: VeteransBenefits Veterans VAClaims)
    #[arg(long, num_args = 1.., value_name = "SUB")]
    pub subs: Vec<String>,

    /// Probe queries for stratified sampling (default: a fixed list of 19 terms)
    #[arg(long, num_args = 1.., value_name = "PROBE")]
    pub probes: Vec<String>,

    /// Earliest creation time, UTC (YYYY-MM-DDTHH:MM:SS or RFC 3339)
    #[arg(long, value_name = "ISO", value_parser = parse_earliest)]
    pub earliest: Option<DateTime<Utc>>,

    /// Latest creation time, UTC (default: now)
    #[arg(long, value_name = "ISO", value_parser = parse_latest)]
    pub latest: Option<DateTime<Utc>>,

    /// Wall clock minutes to run
    #[arg(long, value_name = "MIN", default_value_t = DEFAULT_TIME_BUDGET_MINUTES)]
    pub time_budget: f64,

    /// Max posts per probe
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_PER_PROBE)]
    pub max_per_probe: usize,

    /// Also sample top-level comments (more requests, more 429s)
    #[arg(long)]
    pub include_comments: bool,

    /// Comment cap per post when sampling comments
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_COMMENTS_PER_POST)]
    pub max_comments_per_post: usize,

    /// Keyword list (.csv with a "keyword" column, or one keyword per line)
    #[arg(long, value_name = "PATH")]
    pub keyword_library: Option<PathBuf>,

    /// Rows per subreddit in each report
    #[arg(long, value_name = "N", default_value_t = DEFAULT_TOP_N)]
    pub top_n: usize,

    /// Seconds to pause between requests
    #[arg(long, value_name = "SECS", default_value_t = 1.5)]
    pub page_pause: f64,

    /// Retries per request on throttling or transient failures
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub max_retries: u32,

    /// Extra stopwords dropped from counts
    #[arg(long = "stopword", num_args = 1.., value_name = "WORD")]
    pub stopwords: Vec<String>,

    /// Directory for the CSV reports
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Load .env from the working directory before reading credentials
    #[arg(long)]
    pub dotenv: bool,

    /// Run preflight checks and exit
    #[arg(long)]
    pub doctor: bool,

    /// Print progress to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_earliest(value: &str) -> Result<DateTime<Utc>, ConfigError> {
    parse_utc_timestamp("earliest", value)
}

fn parse_latest(value: &str) -> Result<DateTime<Utc>, ConfigError> {
    parse_utc_timestamp("latest", value)
}

impl Cli {
    pub fn communities(&self) -> Vec<Community> {
        if self.subs.is_empty() {
            Community::defaults()
        } else {
            self.subs.iter().map(|s| Community::new(s.as_str())).collect()
        }
    }

    pub fn probes(&self) -> Vec<Probe> {
        if self.probes.is_empty() {
            Probe::defaults()
        } else {
            self.probes.iter().map(|p| Probe::new(p.trim())).collect()
        }
    }

    pub fn window(&self) -> Result<TimeWindow, CoreError> {
        TimeWindow::new(self.earliest, self.latest.unwrap_or_else(Utc::now))
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new().with_stopwords(&self.stopwords)
    }

    pub fn sampler_config(&self) -> Result<SamplerConfig, CoreError> {
        let time_budget = TimeBudget::from_minutes(self.time_budget)?;
        let page_pause =
            Duration::try_from_secs_f64(self.page_pause).map_err(|_| ConfigError::InvalidValue {
                field: "page-pause".to_string(),
                value: self.page_pause.to_string(),
            })?;

        let config = SamplerConfig {
            communities: self.communities(),
            probes: self.probes(),
            window: self.window()?,
            time_budget,
            max_per_probe: self.max_per_probe,
            include_comments: self.include_comments,
            max_comments_per_post: self.max_comments_per_post,
            fetch: FetchPolicy {
                page_pause,
                backoff: BackoffConfig {
                    max_retries: self.max_retries,
                    ..BackoffConfig::default()
                },
            },
        };
        config.validate()?;
        Ok(config)
    }
}
