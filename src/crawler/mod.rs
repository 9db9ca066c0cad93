//! Crawler module for paginated listing harvests
//!
//! This module contains the core crawling logic, including:
//! - Page count planning from the first response
//! - HTTP fetching with bounded retries
//! - Payload extraction and row normalization
//! - Bounded-concurrency fan-out and aggregation
//! - Batch persistence of the aggregate

mod admission;
mod coordinator;
mod extractor;
mod fetcher;
mod persister;
mod planner;
mod retry;

pub use admission::AdmissionGate;
pub use coordinator::{CrawlMode, CrawlReport, CrawlSettings, Harvester};
pub use extractor::{extract_payload, listing_rows, parse_page, PageResult};
pub use fetcher::{
    build_http_client, encode_query_pipes, fetch_with_retry, page_url, FetchError,
    HttpPageFetcher, PageSource,
};
pub use persister::{persist_batch, PersistSummary};
pub use planner::{pages_for_total, plan_pages, CrawlPlan};
pub use retry::{retry_with_backoff, RetryError, RetryPolicy, Retryable};

use crate::config::Config;
use crate::storage::{open_storage, QuoteStore, SharedSink};
use crate::HarvestError;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Runs one crawl against the configured database
///
/// This is the main entry point for a one-off harvest. It will:
/// 1. Open (or create) the SQLite database
/// 2. Build the HTTP harvester
/// 3. Crawl in the requested mode
/// 4. Purge expired quotes when `purge-after-crawl` is set
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `config_hash` - Recorded in the run ledger
/// * `mode` - Single page or all pages
/// * `shutdown` - Cancelling it interrupts the crawl
///
/// # Example
///
/// ```no_run
/// use quote_harvest::config::load_config_with_hash;
/// use quote_harvest::crawler::{harvest, CrawlMode};
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("harvest.toml"))?;
/// let report = harvest(&config, &hash, CrawlMode::AllPages, CancellationToken::new()).await?;
/// println!("Saved {} quotes", report.persisted.saved);
/// # Ok(())
/// # }
/// ```
pub async fn harvest(
    config: &Config,
    config_hash: &str,
    mode: CrawlMode,
    shutdown: CancellationToken,
) -> Result<CrawlReport, HarvestError> {
    let storage = Arc::new(Mutex::new(open_storage(Path::new(
        &config.storage.database_path,
    ))?));
    let sink: SharedSink = storage.clone();

    let harvester = Harvester::new(config, sink)?
        .with_config_hash(config_hash)
        .with_shutdown(shutdown);

    let report = harvester.crawl(mode).await?;

    if config.storage.purge_after_crawl {
        let mut storage = storage.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        purge_expired(&mut *storage, config.storage.retention_days)?;
    }

    Ok(report)
}

/// Deletes quotes older than the retention window
pub fn purge_expired(store: &mut dyn QuoteStore, retention_days: u32) -> Result<usize, HarvestError> {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(retention_days));
    let removed = store.purge_older_than(cutoff)?;
    tracing::info!(
        "Purged {} quotes captured before {} ({} day retention)",
        removed,
        cutoff.format("%Y-%m-%d %H:%M:%S"),
        retention_days
    );
    Ok(removed)
}
