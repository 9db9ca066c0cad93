//! Statistics generation from the quote database
//!
//! This module provides functionality for extracting and displaying
//! store-wide statistics from the storage layer.

use crate::storage::{QuoteStore, RunRecord};
use crate::HarvestError;
use chrono::{DateTime, Utc};

/// Number of ledger entries shown with the statistics
pub const RECENT_RUNS_SHOWN: usize = 5;

/// Store-wide statistics summary
#[derive(Debug, Clone)]
pub struct StoreStatistics {
    /// Total number of stored quote rows
    pub total_quotes: u64,

    /// Number of distinct stock codes
    pub distinct_codes: u64,

    /// Newest capture time, if anything is stored
    pub latest_capture: Option<DateTime<Utc>>,

    /// Most recent crawl runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(StoreStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn QuoteStore) -> Result<StoreStatistics, HarvestError> {
    Ok(StoreStatistics {
        total_quotes: storage.count_quotes()?,
        distinct_codes: storage.count_codes()?,
        latest_capture: storage.latest_trade_time()?,
        recent_runs: storage.recent_runs(RECENT_RUNS_SHOWN)?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Quote Store Statistics ===\n");

    println!("Overview:");
    println!("  Stored quotes: {}", stats.total_quotes);
    println!("  Distinct codes: {}", stats.distinct_codes);
    match stats.latest_capture {
        Some(time) => println!("  Latest capture: {}", time.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  Latest capture: never"),
    }
    if stats.distinct_codes > 0 {
        println!(
            "  Captures per code: {:.1}",
            stats.total_quotes as f64 / stats.distinct_codes as f64
        );
    }
    println!();

    if stats.recent_runs.is_empty() {
        println!("No crawl runs recorded");
        return;
    }

    println!("Recent Runs:");
    for run in &stats.recent_runs {
        let totals = &run.totals;
        println!(
            "  #{} {} [{}] {} - {} pages ({} failed), {} saved, {} dropped, {} failed",
            run.id,
            run.started_at,
            run.mode,
            run.status.to_db_string(),
            totals.pages_planned,
            totals.pages_failed,
            totals.records_saved,
            totals.records_dropped,
            totals.records_failed
        );
    }
}
