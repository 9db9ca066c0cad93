//! Quote-Harvest main entry point
//!
//! This is the command-line interface for the Quote-Harvest listing crawler.

use anyhow::Context;
use clap::Parser;
use quote_harvest::config::{default_config_with_hash, load_config_with_hash, Config};
use quote_harvest::crawler::{harvest, page_url, purge_expired, CrawlMode, Harvester};
use quote_harvest::output::{
    load_statistics, print_crawl_report, print_history, print_listings, print_quotes,
    print_statistics,
};
use quote_harvest::quote::FieldMap;
use quote_harvest::storage::{QuoteStore, SharedSink, SqliteStorage, HISTORY_LIMIT};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Rows shown by --search
const SEARCH_LIMIT: usize = 50;

/// Quote-Harvest: a paginated market-quote harvester
///
/// Quote-Harvest crawls every page of a market listing endpoint with
/// bounded concurrency, normalizes each quote row and stores it in SQLite.
/// Without a mode flag it runs one full crawl.
#[derive(Parser, Debug)]
#[command(name = "quote-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A paginated market-quote harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Crawl a single page instead of the whole listing
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..), group = "mode")]
    page: Option<u32>,

    /// Crawl the whole listing repeatedly at the configured interval
    #[arg(long, group = "mode")]
    watch: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, group = "mode")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, group = "mode")]
    stats: bool,

    /// Show stored history for a stock code and exit
    #[arg(long, value_name = "CODE", group = "mode")]
    history: Option<String>,

    /// List every stored code and exit
    #[arg(long, group = "mode")]
    codes: bool,

    /// Show the N biggest movers from the latest captures and exit
    #[arg(long, value_name = "N", group = "mode")]
    top: Option<usize>,

    /// Search latest captures by code or name and exit
    #[arg(long, value_name = "KEYWORD", group = "mode")]
    search: Option<String>,

    /// Delete quotes older than the retention window and exit
    #[arg(long, group = "mode")]
    purge: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let (config, config_hash) = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        }
        None => {
            tracing::info!("No configuration file given, using built-in defaults");
            default_config_with_hash()?
        }
    };
    tracing::debug!("Configuration hash: {}", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        let storage = open_storage(&config)?;
        print_statistics(&load_statistics(&storage)?);
    } else if let Some(code) = &cli.history {
        let storage = open_storage(&config)?;
        print_history(code, &storage.find_by_code(code, HISTORY_LIMIT)?);
    } else if cli.codes {
        let storage = open_storage(&config)?;
        print_listings(&storage.find_all_codes()?);
    } else if let Some(limit) = cli.top {
        let storage = open_storage(&config)?;
        print_quotes(&storage.find_latest(limit, 0)?);
    } else if let Some(keyword) = &cli.search {
        let storage = open_storage(&config)?;
        print_quotes(&storage.search_latest(keyword, SEARCH_LIMIT, 0)?);
    } else if cli.purge {
        let mut storage = open_storage(&config)?;
        let removed = purge_expired(&mut storage, config.storage.retention_days)?;
        println!("Removed {} expired quotes", removed);
    } else {
        let shutdown = shutdown_on_ctrl_c();
        if cli.watch {
            handle_watch(&config, &config_hash, shutdown).await?;
        } else {
            let mode = match cli.page {
                Some(page) => CrawlMode::SinglePage(page),
                None => CrawlMode::AllPages,
            };
            let report = harvest(&config, &config_hash, mode, shutdown)
                .await
                .context("Crawl failed")?;
            if !cli.quiet {
                print_crawl_report(&report);
            }
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("quote_harvest=info,warn"),
            1 => EnvFilter::new("quote_harvest=debug,info"),
            2 => EnvFilter::new("quote_harvest=trace,debug"),
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

/// Returns a token that is cancelled on the first Ctrl-C
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after in-flight work");
            trigger.cancel();
        }
    });
    token
}

fn open_storage(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.storage.database_path);
    SqliteStorage::new(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Quote-Harvest Dry Run ===\n");

    println!("Endpoint:");
    println!("  First page: {}", page_url(&config.endpoint.url_template, 1));
    println!("  Page size: {}", config.endpoint.page_size);
    println!("  User agent: {}", config.endpoint.user_agent);

    println!("\nCrawler:");
    println!(
        "  Max concurrent fetches: {}",
        config.crawler.max_concurrent_fetches
    );
    println!(
        "  Attempts per page: {} (backoff {}ms x attempt)",
        config.crawler.max_attempts, config.crawler.retry_backoff_ms
    );
    println!("  Overall timeout: {}s", config.crawler.overall_timeout_secs);
    println!("  Page ceiling: {}", config.crawler.max_pages);
    println!("  Watch interval: {} min", config.crawler.watch_interval_mins);

    println!("\nHTTP:");
    println!(
        "  Timeouts: connect {}s, response {}s, pool acquire {}s",
        config.http.connect_timeout_secs,
        config.http.response_timeout_secs,
        config.http.pool_acquire_timeout_secs
    );
    println!(
        "  Connections: {} in use at most, {} kept idle per host",
        config.http.max_connections, config.http.max_idle_per_host
    );

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Retention: {} days", config.storage.retention_days);
    println!("  Purge after crawl: {}", config.storage.purge_after_crawl);

    println!("\nField Mapping:");
    for (field, code) in FieldMap::with_overrides(&config.fields)?.iter() {
        println!("  {:<16} {}", field.key(), code);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --watch mode: full crawls at a fixed interval until interrupted
async fn handle_watch(
    config: &Config,
    config_hash: &str,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let storage = Arc::new(Mutex::new(open_storage(config)?));
    let sink: SharedSink = storage.clone();
    let harvester = Harvester::new(config, sink)?
        .with_config_hash(config_hash)
        .with_shutdown(shutdown.clone());

    let interval = config.crawler.watch_interval();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!("Watching listing every {:?}", interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match harvester.crawl_all_pages().await {
            Ok(report) => tracing::info!(
                "Watch crawl finished: {} quotes saved, status {}",
                report.persisted.saved,
                report.status().to_db_string()
            ),
            Err(e) => tracing::error!("Watch crawl failed: {}", e),
        }

        if config.storage.purge_after_crawl {
            let mut storage = storage.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Err(e) = purge_expired(&mut *storage, config.storage.retention_days) {
                tracing::error!("Purge failed: {}", e);
            }
        }
    }

    tracing::info!("Watch stopped");
    Ok(())
}
