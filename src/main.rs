//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest polite extractor.

use clap::Parser;
use std::path::PathBuf;
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::crawler::Harvester;
use sumi_harvest::report::{page_json, print_summary, HarvestSummary};
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: A polite structured-data extractor
///
/// Sumi-Harvest runs each URL through a staged extraction pipeline
/// (robots.txt check, fetch, optional rendering, extraction, merge) while
/// pacing requests per domain and honoring server backoff signals.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version)]
#[command(about = "A polite structured-data extractor", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// URLs to harvest
    #[arg(value_name = "URL", required_unless_present = "dry_run")]
    urls: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the pipeline without fetching anything
    #[arg(long)]
    dry_run: bool,

    /// Print one JSON object per page instead of the summary
    #[arg(long, conflicts_with = "dry_run")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config).map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(config, &cli.urls)
    } else {
        handle_harvest(config, &cli.urls, cli.json).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the pipeline
fn handle_dry_run(config: Config, urls: &[String]) -> anyhow::Result<()> {
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Crawler:");
    println!("  Respect robots.txt: {}", config.crawler.respect_robots_txt);
    println!("  Timeout per page: {}s", config.crawler.timeout_per_page);
    println!("  Max concurrent pages: {}", config.crawler.max_concurrent_pages);
    println!("  Fetch attempts: {}", config.crawler.fetch_attempts);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nRate Limiting:");
    println!(
        "  Default delay: {}s (max {}s, {})",
        config.rate_limit.default_delay,
        config.rate_limit.max_delay,
        if config.rate_limit.per_domain { "per domain" } else { "shared" }
    );
    for (pattern, delay) in &config.rate_limit.domains {
        println!("  - {}: {}s", pattern, delay);
    }
    if config.backoff.enabled {
        println!(
            "  Backoff: {}s x{} (max {}s)",
            config.backoff.base_delay, config.backoff.multiplier, config.backoff.max_delay
        );
    } else {
        println!("  Backoff: disabled");
    }
    if config.retry_after.enabled {
        println!("  Retry-After: honored up to {}s", config.retry_after.max_allowed_delay);
    } else {
        println!("  Retry-After: ignored");
    }

    println!("\nPipeline:");
    println!(
        "  Max retries: {} ({:?})",
        config.pipeline.max_retries, config.pipeline.retry_policy
    );
    println!(
        "  Strategies: {}",
        config.schema.extraction_strategies.join(", ")
    );

    let harvester = Harvester::from_config(config)?;
    println!("  Stages: {}", harvester.pipeline().stage_names().join(" -> "));

    let problems = harvester.pipeline().validate_dependencies();
    if problems.is_empty() {
        println!("\n✓ Configuration is valid");
    } else {
        for problem in &problems {
            println!("\n✗ {}", problem);
        }
    }
    println!("✓ Would harvest {} URLs", urls.len());

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, urls: &[String], json: bool) -> anyhow::Result<()> {
    let harvester = Harvester::from_config(config)?;
    let contexts = harvester.harvest(urls).await;

    if json {
        for context in &contexts {
            println!("{}", serde_json::to_string(&page_json(context))?);
        }
        return Ok(());
    }

    let mut summary = HarvestSummary::from_contexts(&contexts);
    if let Some(politeness) = harvester.politeness() {
        summary = summary.with_domain_stats(politeness.rate_limiter().all_stats());
    }
    print_summary(&summary);

    if summary.failed > 0 {
        tracing::warn!("{} of {} pages failed", summary.failed, summary.total_pages);
    }
    Ok(())
}
