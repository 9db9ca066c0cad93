//! Storage module for persisting quotes
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Per-record quote inserts
//! - History, listing and top-mover queries
//! - Retention purges
//! - The crawl run ledger

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{QuoteSink, QuoteStore, StorageError, StorageResult};

use crate::HarvestError;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Storage handle shared between the crawl orchestrator and its caller
pub type SharedSink = Arc<Mutex<dyn QuoteSink + Send>>;

/// Default number of rows returned by history queries
pub const HISTORY_LIMIT: usize = 100;

/// Maximum number of entries returned by a listing query
pub const LISTING_LIMIT: usize = 1000;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub mode: String,
    pub status: RunStatus,
    pub totals: RunTotals,
}

/// Counters recorded for a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub pages_planned: u32,
    pub pages_failed: u32,
    pub records_parsed: u64,
    pub records_dropped: u64,
    pub records_saved: u64,
    pub records_failed: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    /// Every planned page contributed
    Completed,
    /// Some pages failed or were abandoned
    Partial,
    /// Cancelled from outside
    Interrupted,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}
