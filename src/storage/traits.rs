//! Storage traits and error types
//!
//! The crawl pipeline only needs [`QuoteSink`]; the read-side queries used
//! for reporting live on [`QuoteStore`].

use crate::quote::{Listing, Quote, StoredQuote};
use crate::storage::{RunRecord, RunStatus, RunTotals};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid stored value in column {column}: {message}")]
    InvalidValue { column: String, message: String },

    #[error("Rejected record {code:?}: {reason}")]
    Rejected { code: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Write side used by the crawl pipeline
///
/// Each insert is atomic on its own; there is no cross-record transaction.
pub trait QuoteSink {
    /// Inserts one quote and returns its row id
    fn insert_quote(&mut self, quote: &Quote) -> StorageResult<i64>;

    /// Records the start of a crawl run
    ///
    /// Sinks without a run ledger return `None`.
    fn create_run(&mut self, config_hash: &str, mode: &str) -> StorageResult<Option<i64>> {
        let _ = (config_hash, mode);
        Ok(None)
    }

    /// Records the outcome of a crawl run
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        let _ = (run_id, status, totals);
        Ok(())
    }
}

/// Read side consumed by reporting and maintenance
pub trait QuoteStore: QuoteSink {
    // ===== Quote Queries =====

    /// Gets the most recent quotes for a code, newest first
    fn find_by_code(&self, code: &str, limit: usize) -> StorageResult<Vec<StoredQuote>>;

    /// Gets distinct code/name/market entries ordered by code
    fn find_all_codes(&self) -> StorageResult<Vec<Listing>>;

    /// Gets the latest quote of each code, highest change percent first
    fn find_latest(&self, limit: usize, offset: usize) -> StorageResult<Vec<StoredQuote>>;

    /// Like [`QuoteStore::find_latest`], restricted to codes or names containing `keyword`
    fn search_latest(
        &self,
        keyword: &str,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<StoredQuote>>;

    // ===== Statistics =====

    /// Counts stored quote rows
    fn count_quotes(&self) -> StorageResult<u64>;

    /// Counts distinct stock codes
    fn count_codes(&self) -> StorageResult<u64>;

    /// Gets the newest capture time
    fn latest_trade_time(&self) -> StorageResult<Option<DateTime<Utc>>>;

    // ===== Retention =====

    /// Deletes quotes captured before `cutoff`, returning the number removed
    fn purge_older_than(&mut self, cutoff: DateTime<Utc>) -> StorageResult<usize>;

    // ===== Run Ledger =====

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Gets the most recent runs, newest first
    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;
}
