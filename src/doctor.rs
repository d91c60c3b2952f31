use crate::cli::Cli;
use reddit_client::{GrantType, RedditClient, RedditCredentials};
use sampler_core::ErrorExt;
use sampler_engine::KeywordLibrary;
use std::fmt;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: &'static str,
    pub outcome: Result<String, String>,
}

impl Check {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            outcome: Ok(detail.into()),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            outcome: Err(detail.into()),
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok(detail) => write!(f, "[ OK ] {}: {}", self.name, detail),
            Err(detail) => write!(f, "[FAIL] {}: {}", self.name, detail),
        }
    }
}

/// Checks that need no network: run settings, keyword library, output directory.
pub fn offline_checks(cli: &Cli) -> Vec<Check> {
    let mut checks = Vec::new();

    checks.push(match cli.sampler_config() {
        Ok(config) => Check::pass(
            "settings",
            format!(
                "{} subreddits x {} probes, window ending {}",
                config.communities.len(),
                config.probes.len(),
                config.window.latest().format("%Y-%m-%dT%H:%M:%SZ")
            ),
        ),
        Err(e) => Check::fail("settings", e.user_friendly_message()),
    });

    if let Some(path) = &cli.keyword_library {
        checks.push(
            match KeywordLibrary::load(path, &cli.normalizer()) {
                Ok(library) if library.is_empty() => {
                    Check::fail("keyword library", format!("{} has no keywords", path.display()))
                }
                Ok(library) => Check::pass(
                    "keyword library",
                    format!("{} keywords from {}", library.len(), path.display()),
                ),
                Err(e) => Check::fail("keyword library", e.user_friendly_message()),
            },
        );
    }

    checks.push(output_dir_check(&cli.output_dir));
    checks
}

fn output_dir_check(dir: &Path) -> Check {
    match dir.metadata() {
        Ok(meta) if !meta.is_dir() => {
            Check::fail("output directory", format!("{} is not a directory", dir.display()))
        }
        Ok(meta) if meta.permissions().readonly() => {
            Check::fail("output directory", format!("{} is read-only", dir.display()))
        }
        Ok(_) => Check::pass("output directory", dir.display().to_string()),
        Err(_) => Check::pass(
            "output directory",
            format!("{} will be created", dir.display()),
        ),
    }
}

/// Credentials present and accepted by Reddit.
pub async fn credential_checks() -> Vec<Check> {
    let credentials = match RedditCredentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            return vec![Check::fail(
                "credentials",
                format!("{} (set them in the environment or use --dotenv)", e.user_friendly_message()),
            )]
        }
    };

    let grant = match credentials.grant() {
        GrantType::Password => "password grant",
        GrantType::ClientCredentials => "client credentials (read-only)",
    };
    let mut checks = vec![Check::pass(
        "credentials",
        format!("client id found, {}", grant),
    )];

    let mut client = match RedditClient::new(credentials) {
        Ok(client) => client,
        Err(e) => {
            checks.push(Check::fail("authentication", e.user_friendly_message()));
            return checks;
        }
    };

    checks.push(match client.authenticate().await {
        Ok(()) => Check::pass("authentication", "Reddit API reachable, token issued"),
        Err(e) => {
            debug!(error = %e, "Preflight authentication failed");
            Check::fail("authentication", e.user_friendly_message())
        }
    });
    checks
}

/// Runs every check, prints a report to stdout and says whether all passed.
pub async fn run(cli: &Cli, dotenv_loaded: Option<bool>) -> bool {
    println!("=== Preflight: methodical sampler ===");
    match dotenv_loaded {
        Some(true) => println!("Loaded .env"),
        Some(false) => println!("No .env found; using the process environment"),
        None => {}
    }

    let mut checks = offline_checks(cli);
    checks.extend(credential_checks().await);
    for check in &checks {
        println!("{check}");
    }

    let passed = checks.iter().all(Check::passed);
    if passed {
        println!("All essential checks passed.");
    }
    passed
}
