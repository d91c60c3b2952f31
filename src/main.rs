mod cli;
mod doctor;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use reddit_client::{RedditClient, RedditCredentials};
use sampler_core::{CoreError, ErrorExt, SystemClock, EXIT_RUNTIME_FAILURE};
use sampler_engine::{KeywordLibrary, ReportBuilder, Sampler};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERBOSE_FILTER: &str =
    "info,methodical_sampler=debug,sampler_engine=debug,reddit_client=debug";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let dotenv_loaded = cli.dotenv.then(|| dotenvy::dotenv().is_ok());
    init_tracing(cli.verbose);
    if dotenv_loaded == Some(false) {
        warn!("--dotenv given but no .env file was found");
    }

    if cli.doctor {
        return if doctor::run(&cli, dotenv_loaded).await {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(EXIT_RUNTIME_FAILURE)
        };
    }

    match run(&cli).await {
        Ok(written) => {
            let names: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
            println!("Wrote: {}", names.join(", "));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            match e.downcast_ref::<CoreError>() {
                Some(core) => {
                    eprintln!("{}", core.user_friendly_message());
                    ExitCode::from(core.exit_code())
                }
                None => ExitCode::from(EXIT_RUNTIME_FAILURE),
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { VERBOSE_FILTER } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

async fn run(cli: &Cli) -> Result<Vec<PathBuf>> {
    // Everything the user supplied is validated before touching the network
    let config = cli.sampler_config()?;
    let normalizer = cli.normalizer();
    let library = cli
        .keyword_library
        .as_deref()
        .map(|path| KeywordLibrary::load(path, &normalizer))
        .transpose()?;
    let credentials = RedditCredentials::from_env().map_err(CoreError::from)?;

    let mut client = RedditClient::new(credentials)?;
    match client.authenticate().await {
        Ok(()) => info!("Authenticated with Reddit"),
        // The first search asks for a token again under the fetch loop's backoff
        Err(e) if e.is_retryable() => warn!(error = %e, "Token endpoint busy; retrying later"),
        Err(e) => return Err(e).context("Could not authenticate with Reddit"),
    }

    let communities = config.unique_communities();
    let sampler = Sampler::new(config, normalizer);
    let sample = sampler
        .run(&mut client, &SystemClock)
        .await
        .context("Sampling stopped")?;
    if sample.budget_exhausted {
        info!(
            elapsed_secs = sample.elapsed.as_secs(),
            "Time budget exhausted; reporting partial data"
        );
    }

    let report = ReportBuilder::new(&communities)
        .top_n(cli.top_n)
        .keyword_library(library.as_ref())
        .build(&sample.counter);
    let written = report
        .write_to_dir(&cli.output_dir)
        .with_context(|| format!("Could not write reports to {}", cli.output_dir.display()))?;
    Ok(written)
}
