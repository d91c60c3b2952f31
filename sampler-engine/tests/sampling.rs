mod common;

use common::{at, comment, page, post, Call, ManualClock, Scripted, ScriptedApi};
use sampler_core::{Community, ErrorExt, Probe, TimeWindow};
use sampler_engine::{
    BackoffConfig, FetchEnd, FetchLoop, FetchPolicy, KeywordLibrary, Normalizer, ReportBuilder,
    SampleRun, Sampler, SamplerConfig, TimeBudget, BIGRAM_REPORT, OVERLAP_REPORT, UNIGRAM_REPORT,
};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn window() -> TimeWindow {
    TimeWindow::new(Some(at(30, 0)), at(31, 19)).unwrap()
}

fn config(communities: &[&str], probes: &[&str]) -> SamplerConfig {
    SamplerConfig {
        communities: communities.iter().map(|c| Community::new(*c)).collect(),
        probes: probes.iter().map(|p| Probe::new(*p)).collect(),
        window: window(),
        time_budget: Duration::from_secs(600),
        ..Default::default()
    }
}

fn veterans_claim_api() -> ScriptedApi {
    ScriptedApi::new().on_search(
        "Veterans",
        "claim",
        vec![
            page(
                vec![
                    post("p1", at(31, 10), "Claim denied after C&P exam"),
                    post("p2", at(31, 9), "How long did your claim take?"),
                ],
                Some("t3_p2"),
            ),
            page(
                vec![post("p3", at(30, 20), "Supplemental claim for a claim increase")],
                None,
            ),
        ],
    )
}

async fn run(config: SamplerConfig, api: &mut ScriptedApi, clock: &ManualClock) -> SampleRun {
    let sampler = Sampler::new(config, Normalizer::new());
    assert_ok!(sampler.run(api, clock).await)
}

#[tokio::test]
async fn zero_budget_makes_no_requests_and_writes_header_only_csvs() {
    let clock = ManualClock::new();
    let mut api = veterans_claim_api();
    let config = SamplerConfig {
        time_budget: Duration::ZERO,
        ..config(&["Veterans", "VAClaims"], &["claim", "rating"])
    };
    let communities = config.communities.clone();

    let result = run(config, &mut api, &clock).await;
    assert_eq!(api.request_count(), 0);
    assert_eq!(result.stats.requests, 0);
    assert!(result.budget_exhausted);

    let dir = tempfile::tempdir().unwrap();
    let report = ReportBuilder::new(&communities).build(&result.counter);
    let written = assert_ok!(report.write_to_dir(dir.path()));
    assert_eq!(written.len(), 2);

    assert_eq!(
        fs::read_to_string(dir.path().join(UNIGRAM_REPORT)).unwrap(),
        "subreddit,word,count\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join(BIGRAM_REPORT)).unwrap(),
        "subreddit,phrase,count\n"
    );
    assert!(!dir.path().join(OVERLAP_REPORT).exists());
}

#[tokio::test]
async fn two_page_probe_produces_expected_counts() {
    let clock = ManualClock::new();
    let mut api = veterans_claim_api();
    let config = config(&["Veterans"], &["claim"]);
    let communities = config.communities.clone();

    let result = run(config, &mut api, &clock).await;
    assert_eq!(result.counter.unigram_count("Veterans", "claim"), 4);
    assert_eq!(result.counter.bigram_count("Veterans", "claim", "denied"), 1);
    assert_eq!(result.stats.posts_accepted, 3);
    assert_eq!(result.stats.pages, 2);
    assert!(!result.budget_exhausted);

    assert_eq!(
        api.calls,
        vec![
            Call::Search {
                community: "Veterans".to_string(),
                query: "claim".to_string(),
                after: None,
            },
            Call::Search {
                community: "Veterans".to_string(),
                query: "claim".to_string(),
                after: Some("t3_p2".to_string()),
            },
        ]
    );
    // One polite pause between the two pages
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(1500)]);

    let report = ReportBuilder::new(&communities).build(&result.counter);
    let csv = String::from_utf8(report.unigram_csv().unwrap()).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("subreddit,word,count"));
    assert_eq!(lines.next(), Some("Veterans,claim,4"));
}

#[tokio::test]
async fn overlap_reports_absent_keyword_as_zero() {
    let clock = ManualClock::new();
    let mut api = veterans_claim_api();
    let config = config(&["Veterans"], &["claim"]);
    let communities = config.communities.clone();
    let result = run(config, &mut api, &clock).await;

    let library = KeywordLibrary::from_entries(["claim", "nexus", "claim denied"], &Normalizer::new());
    let report = ReportBuilder::new(&communities)
        .keyword_library(Some(&library))
        .build(&result.counter);
    let csv = String::from_utf8(report.overlap_csv().unwrap().unwrap()).unwrap();
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines[0], "subreddit,keyword,count");
    assert_eq!(lines[1], "Veterans,claim,4");
    assert_eq!(lines[2], "Veterans,nexus,0");
    assert_eq!(lines[3], "Veterans,claim denied,1");
    // Emergent terms follow the library rows and never repeat a keyword
    assert!(lines[4..].iter().all(|l| !l.starts_with("Veterans,claim,")));
    assert!(lines[4..].contains(&"Veterans,supplemental,1"));
}

#[tokio::test]
async fn accepted_items_always_fall_inside_window() {
    let clock = ManualClock::new();
    let mut api = ScriptedApi::new().on_search(
        "Veterans",
        "rating",
        vec![
            page(
                vec![
                    post("future", at(31, 23), "rating future"),
                    post("edge-latest", at(31, 19), "rating edge"),
                    post("mid", at(31, 5), "rating mid"),
                ],
                Some("t3_mid"),
            ),
            page(
                vec![
                    post("edge-earliest", at(30, 0), "rating earliest"),
                    post("old", at(29, 23), "rating old"),
                    post("unreached", at(30, 12), "rating unreached"),
                ],
                Some("t3_old"),
            ),
        ],
    );
    let window = window();
    let budget = TimeBudget::start(&clock, Duration::from_secs(600));
    let mut fetch = FetchLoop::new(&mut api, &clock, budget, FetchPolicy::default());

    let outcome = assert_ok!(
        fetch
            .fetch_probe(&Community::new("Veterans"), &Probe::new("rating"), &window, 80)
            .await
    );
    assert_eq!(outcome.end, FetchEnd::LeftWindow);
    assert!(outcome.items.iter().all(|item| window.contains(item.created_at)));
    let ids: Vec<&str> = outcome.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["edge-latest", "mid", "edge-earliest"]);
}

#[tokio::test]
async fn consecutive_throttles_escalate_then_hold_at_cap() {
    let clock = ManualClock::new();
    let mut api = ScriptedApi::new().on_search(
        "Veterans",
        "claim",
        vec![
            Scripted::Throttle(None),
            Scripted::Throttle(None),
            Scripted::Throttle(None),
            Scripted::Throttle(None),
            Scripted::Throttle(None),
            page(vec![post("p1", at(31, 10), "claim")], None),
        ],
    );
    let config = SamplerConfig {
        fetch: FetchPolicy {
            page_pause: Duration::from_millis(1500),
            backoff: BackoffConfig {
                max_retries: 6,
                base_delay: Duration::from_secs(20),
                max_delay: Duration::from_secs(60),
                ..BackoffConfig::default()
            },
        },
        ..config(&["Veterans"], &["claim"])
    };

    let result = run(config, &mut api, &clock).await;
    assert_eq!(result.stats.throttled, 5);
    assert_eq!(result.counter.unigram_count("Veterans", "claim"), 1);

    let sleeps = clock.sleeps();
    assert_eq!(sleeps.len(), 5);
    assert!(sleeps[0] < sleeps[1] && sleeps[1] < sleeps[2]);
    assert_eq!(sleeps[2..], [Duration::from_secs(60); 3]);
}

#[tokio::test]
async fn retry_after_hint_extends_the_wait() {
    let clock = ManualClock::new();
    let mut api = ScriptedApi::new().on_search(
        "Veterans",
        "claim",
        vec![Scripted::Throttle(Some(30)), page(vec![], None)],
    );
    run(config(&["Veterans"], &["claim"]), &mut api, &clock).await;
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(30)]);
}

#[tokio::test]
async fn transient_failures_abandon_request_after_max_retries() {
    let clock = ManualClock::new();
    let mut api = ScriptedApi::new()
        .on_search("Veterans", "claim", vec![Scripted::ServerError; 5])
        .on_search(
            "Veterans",
            "rating",
            vec![page(vec![post("p1", at(31, 10), "rating decision")], None)],
        );

    let result = run(config(&["Veterans"], &["claim", "rating"]), &mut api, &clock).await;
    assert_eq!(result.stats.transient_failures, 5);
    assert_eq!(result.stats.abandoned_requests, 1);
    assert_eq!(api.request_count(), 6);
    assert_eq!(result.counter.unigram_count("Veterans", "rating"), 1);
}

#[tokio::test]
async fn forbidden_community_is_skipped() {
    let clock = ManualClock::new();
    let mut api = ScriptedApi::new()
        .on_search("private", "claim", vec![Scripted::Forbidden])
        .on_search(
            "Veterans",
            "claim",
            vec![page(vec![post("p1", at(31, 10), "claim")], None)],
        );

    let result = run(config(&["private", "Veterans"], &["claim"]), &mut api, &clock).await;
    assert_eq!(result.stats.abandoned_requests, 1);
    assert_eq!(result.counter.unigram_count("Veterans", "claim"), 1);
    assert!(clock.sleeps().iter().all(|d| *d == Duration::from_millis(1500)));
}

#[tokio::test]
async fn single_reauthentication_then_fatal() {
    let clock = ManualClock::new();
    let mut api = ScriptedApi::new()
        .on_search(
            "Veterans",
            "claim",
            vec![
                Scripted::Unauthorized,
                page(vec![post("p1", at(31, 10), "claim")], None),
            ],
        )
        .on_search("Veterans", "rating", vec![Scripted::Unauthorized]);

    let sampler = Sampler::new(config(&["Veterans"], &["claim", "rating"]), Normalizer::new());
    let err = assert_err!(sampler.run(&mut api, &clock).await);
    assert!(err.is_authentication());
    assert_eq!(err.exit_code(), 1);
    assert_eq!(api.reauth_count(), 1);
    assert_eq!(api.request_count(), 3);
}

#[tokio::test]
async fn failed_reauthentication_aborts_run() {
    let clock = ManualClock::new();
    let mut api = ScriptedApi::new().on_search("Veterans", "claim", vec![Scripted::Unauthorized]);
    api.reauth_fails = true;

    let sampler = Sampler::new(config(&["Veterans"], &["claim", "rating"]), Normalizer::new());
    let err = assert_err!(sampler.run(&mut api, &clock).await);
    assert!(err.is_authentication());
    assert_eq!(api.request_count(), 1);
}

#[tokio::test]
async fn throttled_reauthentication_backs_off_and_continues() {
    let clock = ManualClock::new();
    let mut api = ScriptedApi::new()
        .on_search(
            "Veterans",
            "claim",
            vec![
                Scripted::Unauthorized,
                page(vec![post("p1", at(31, 10), "claim")], None),
            ],
        )
        .on_reauthenticate(vec![Scripted::Throttle(Some(5))]);

    let result = run(config(&["Veterans"], &["claim"]), &mut api, &clock).await;
    assert_eq!(result.stats.reauthentications, 1);
    assert_eq!(result.stats.throttled, 1);
    assert_eq!(result.counter.unigram_count("Veterans", "claim"), 1);
    assert_eq!(api.reauth_count(), 1);
    assert_eq!(api.request_count(), 2);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
}

#[tokio::test]
async fn unavailable_token_endpoint_on_reauthentication_is_retried() {
    let clock = ManualClock::new();
    let mut api = ScriptedApi::new()
        .on_search(
            "Veterans",
            "claim",
            vec![
                Scripted::Unauthorized,
                page(vec![post("p1", at(31, 10), "claim")], None),
            ],
        )
        .on_reauthenticate(vec![Scripted::ServerError]);

    let result = run(config(&["Veterans"], &["claim"]), &mut api, &clock).await;
    assert_eq!(result.stats.transient_failures, 1);
    assert_eq!(result.counter.unigram_count("Veterans", "claim"), 1);
}

#[tokio::test]
async fn budget_runs_out_mid_run_and_keeps_partial_tables() {
    let clock = Arc::new(ManualClock::new());
    let mut api = ScriptedApi::new()
        .with_latency(clock.clone(), Duration::from_secs(4))
        .on_search(
            "Veterans",
            "claim",
            vec![page(vec![post("p1", at(31, 10), "claim")], None)],
        )
        .on_search(
            "Veterans",
            "rating",
            vec![page(vec![post("p2", at(31, 9), "rating")], None)],
        )
        .on_search(
            "Veterans",
            "nexus",
            vec![page(vec![post("p3", at(31, 8), "nexus")], None)],
        );
    let config = SamplerConfig {
        time_budget: Duration::from_secs(10),
        ..config(&["Veterans", "VAClaims"], &["claim", "rating", "nexus"])
    };

    let result = run(config, &mut api, &clock).await;
    assert!(result.budget_exhausted);
    assert_eq!(api.request_count(), 2);
    assert_eq!(result.counter.unigram_count("Veterans", "claim"), 1);
    assert_eq!(result.counter.unigram_count("Veterans", "rating"), 1);
    assert_eq!(result.counter.unigram_count("Veterans", "nexus"), 0);
    assert!(clock.elapsed() <= Duration::from_secs(10));
}

#[tokio::test]
async fn comments_are_counted_under_the_same_community() {
    let clock = ManualClock::new();
    let mut api = ScriptedApi::new()
        .on_search(
            "Veterans",
            "claim",
            vec![page(vec![post("p1", at(31, 10), "claim")], None)],
        )
        .on_comments(
            "p1",
            vec![page(
                vec![
                    comment("c1", at(31, 11), "nexus letter helped"),
                    comment("c2", at(31, 23), "nexus posted later"),
                ],
                None,
            )],
        );
    let config = SamplerConfig {
        include_comments: true,
        ..config(&["Veterans"], &["claim"])
    };

    let result = run(config, &mut api, &clock).await;
    assert_eq!(result.counter.unigram_count("Veterans", "nexus"), 1);
    assert_eq!(result.counter.unigram_count("Veterans", "helped"), 1);
    assert_eq!(result.counter.unigram_count("Veterans", "later"), 0);
    assert_eq!(result.stats.comments_accepted, 1);
    assert!(api.calls.contains(&Call::Comments {
        community: "Veterans".to_string(),
        post_id: "p1".to_string(),
    }));
}

#[tokio::test]
async fn report_output_is_idempotent() {
    let clock = ManualClock::new();
    let mut api = veterans_claim_api();
    let config = config(&["Veterans"], &["claim"]);
    let communities = config.communities.clone();
    let result = run(config, &mut api, &clock).await;

    let library = KeywordLibrary::from_entries(["nexus", "claim"], &Normalizer::new());
    let builder = ReportBuilder::new(&communities).keyword_library(Some(&library));
    let first = builder.build(&result.counter);
    let second = builder.build(&result.counter);
    assert_eq!(first, second);

    let dir = tempfile::tempdir().unwrap();
    first.write_to_dir(dir.path()).unwrap();
    let before: Vec<Vec<u8>> = [UNIGRAM_REPORT, BIGRAM_REPORT, OVERLAP_REPORT]
        .iter()
        .map(|name| fs::read(dir.path().join(name)).unwrap())
        .collect();

    second.write_to_dir(dir.path()).unwrap();
    let after: Vec<Vec<u8>> = [UNIGRAM_REPORT, BIGRAM_REPORT, OVERLAP_REPORT]
        .iter()
        .map(|name| fs::read(dir.path().join(name)).unwrap())
        .collect();
    assert_eq!(before, after);
}
