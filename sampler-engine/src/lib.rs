//! Sampling engine: text normalization, n-gram counting, the rate-limited
//! fetch loop and CSV reporting.

pub mod backoff;
pub mod budget;
pub mod counter;
pub mod fetch;
pub mod keywords;
pub mod normalize;
pub mod orchestrator;
pub mod report;
pub mod stats;

pub use backoff::{calculate_delay, failure_action, Backoff, BackoffConfig, FailureAction};
pub use budget::TimeBudget;
pub use counter::{Bigram, FrequencyTable, NgramCounter};
pub use fetch::{FetchEnd, FetchLoop, FetchOutcome, FetchPolicy, FetchState, DEFAULT_PAGE_PAUSE};
pub use keywords::{Keyword, KeywordLibrary};
pub use normalize::{Normalizer, DEFAULT_MIN_TOKEN_LEN, STOPWORDS};
pub use orchestrator::{
    SampleRun, Sampler, SamplerConfig, DEFAULT_MAX_COMMENTS_PER_POST, DEFAULT_MAX_PER_PROBE,
    DEFAULT_TIME_BUDGET_MINUTES,
};
pub use report::{
    keyword_count, BigramRow, OverlapRow, Report, ReportBuilder, UnigramRow, BIGRAM_REPORT,
    DEFAULT_TOP_N, OVERLAP_REPORT, UNIGRAM_REPORT,
};
pub use stats::FetchStats;
