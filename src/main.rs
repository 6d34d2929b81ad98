//! Ripple-Crawl main entry point
//!
//! This is the command-line interface for the Ripple-Crawl crawl engine.

use anyhow::{bail, Context as _};
use async_trait::async_trait;
use clap::Parser;
use ripple_crawl::config::{load_config_with_hash, validate, Config};
use ripple_crawl::crawler::{
    CrawlListener, CrawlStep, Crawler, HtmlDocumentProcessor, PipelineStep, PropertyBag,
};
use ripple_crawl::output::print_statistics;
use ripple_crawl::storage::{RunStatus, SqliteStorage, Storage};
use ripple_crawl::url::parse_crawlable;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Ripple-Crawl: a crawl-orchestration engine
///
/// Ripple-Crawl starts from a seed address, follows every admitted link
/// once, and runs each downloaded page through its processing pipeline.
#[derive(Parser, Debug)]
#[command(name = "ripple-crawl")]
#[command(version)]
#[command(about = "A concurrent, resumable web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, ignoring previous state
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Override the seed address from the configuration
    #[arg(long, value_name = "URL")]
    seed: Option<String>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
        validate(&config).context("invalid --seed")?;
    }

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config, &config_hash, cli.fresh).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ripple_crawl=info,warn"),
            1 => EnvFilter::new("ripple_crawl=debug,info"),
            2 => EnvFilter::new("ripple_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Ripple-Crawl Dry Run ===\n");

    println!("Seed: {}", config.seed.as_deref().unwrap_or("(none)"));

    println!("\nCrawler Configuration:");
    println!(
        "  Max concurrent downloads: {}",
        config.crawler.max_concurrent_downloads
    );
    println!("  Max depth: {}", limit(config.crawler.max_depth));
    println!("  Max visited: {}", limit(config.crawler.max_visited));
    println!(
        "  Max crawl time: {}",
        limit(config.crawler.max_crawl_time_secs.map(|s| format!("{}s", s)))
    );
    println!(
        "  Max download errors: {}",
        limit(config.crawler.max_download_errors)
    );
    println!("  Adhere to robots.txt: {}", config.crawler.adhere_to_robots);
    for domain in &config.crawler.internal_domains {
        println!("  Internal domain: {}", domain);
    }

    println!("\nDownload:");
    println!("  User agent: {}", config.download.user_agent);
    println!("  Connect timeout: {:?}", config.download.connect_timeout());
    println!("  Read timeout: {:?}", config.download.read_timeout());
    println!(
        "  Retries: {} (wait {:?})",
        config.download.retry_count,
        config.download.retry_wait()
    );
    println!(
        "  Max content size: {}",
        limit(config.download.max_content_size)
    );

    println!("\nURLs:");
    println!("  Sensitivity: {:?}", config.urls.sensitivity);
    println!("  Include patterns: {}", config.urls.include.len());
    println!("  Exclude patterns: {}", config.urls.exclude.len());

    match &config.storage {
        Some(storage) => println!("\nStorage: {}", storage.database_path.display()),
        None => println!("\nStorage: in memory (not resumable)"),
    }

    println!("\n✓ Configuration is valid");
}

fn limit<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "unlimited".to_string(), |v| v.to_string())
}

/// Logs every processed page
struct PageLogger;

#[async_trait]
impl PipelineStep for PageLogger {
    fn name(&self) -> &str {
        "page-logger"
    }

    async fn process(&self, _crawler: &Crawler, context: &mut PropertyBag) -> anyhow::Result<()> {
        tracing::info!(
            "{} {} (depth {}){}",
            context.status.as_u16(),
            context.step.url,
            context.step.depth,
            context
                .title
                .as_deref()
                .map(|t| format!(" \"{}\"", t))
                .unwrap_or_default()
        );
        Ok(())
    }
}

/// Reports download progress at trace level
struct ProgressLogger;

impl CrawlListener for ProgressLogger {
    fn download_progress(&self, step: &CrawlStep, bytes: u64) {
        tracing::trace!("{}: {} bytes", step.url, bytes);
    }

    fn cancelled(&self) {
        tracing::info!("Crawl cancelled");
    }
}

/// Opens the database and decides whether the previous run is resumed
fn open_run(
    storage: &SqliteStorage,
    config_hash: &str,
    fresh: bool,
) -> anyhow::Result<i64> {
    let resumable = match storage.get_latest_run()? {
        Some(run) if fresh => {
            tracing::info!("Starting fresh crawl (ignoring run {})", run.id);
            None
        }
        Some(run) if run.resumable_with(config_hash) => Some(run.id),
        Some(run) if run.status.is_unfinished() => {
            tracing::warn!(
                "Configuration changed since run {}, starting fresh",
                run.id
            );
            None
        }
        _ => None,
    };

    match resumable {
        Some(run_id) => {
            tracing::info!("Resuming interrupted run {}", run_id);
            storage.update_run_status(run_id, RunStatus::Running)?;
            Ok(run_id)
        }
        None => {
            storage.clear_crawl_state()?;
            Ok(storage.create_run(config_hash)?)
        }
    }
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    let Some(seed) = config.seed.as_deref() else {
        bail!("no seed address: set `seed` in the configuration or pass --seed");
    };
    let seed = parse_crawlable(seed)?;

    let storage = match &config.storage {
        Some(settings) => {
            let storage = SqliteStorage::new(&settings.database_path).with_context(|| {
                format!("failed to open {}", settings.database_path.display())
            })?;
            let run_id = open_run(&storage, config_hash, fresh)?;
            Some((storage, run_id))
        }
        None => None,
    };

    let mut builder = Crawler::builder(seed)
        .config(config)
        .step(HtmlDocumentProcessor::new())
        .step(PageLogger)
        .listener(Arc::new(ProgressLogger));
    if let Some((storage, _)) = &storage {
        builder = builder.queue(storage.queue()).history(storage.history());
    }
    let crawler = builder.build()?;

    let interrupt = crawler.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing in-flight pages");
            if let Err(e) = interrupt.cancel() {
                tracing::warn!("Could not cancel crawl: {}", e);
            }
        }
    });

    let result = crawler.run().await;

    if let Some((storage, run_id)) = &storage {
        match &result {
            Ok(stats) => {
                let status = storage.finish_run(*run_id, stats)?;
                if status == RunStatus::Interrupted && stats.pending > 0 {
                    tracing::info!("{} steps left queued for the next run", stats.pending);
                }
            }
            Err(_) => storage.update_run_status(*run_id, RunStatus::Failed)?,
        }
    }

    let stats = result?;
    print_statistics(&stats);

    Ok(())
}
