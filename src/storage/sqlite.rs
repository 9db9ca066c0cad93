//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::quote::{Listing, Quote, StoredQuote};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{QuoteSink, QuoteStore, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, RunTotals, LISTING_LIMIT};
use crate::HarvestError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

const QUOTE_COLUMNS: &str = "id, stock_code, stock_name, current_price, change_amount, \
     change_percent, open_price, high_price, low_price, volume, turnover, market_type, trade_time";

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, mode, status, \
     pages_planned, pages_failed, records_parsed, records_dropped, records_saved, records_failed";

/// Latest row per code, joined back to the full row
const LATEST_PER_CODE: &str = "
    FROM quotes q
    INNER JOIN (
        SELECT stock_code, MAX(trade_time) AS max_time FROM quotes GROUP BY stock_code
    ) latest
    ON q.stock_code = latest.stock_code AND q.trade_time = latest.max_time";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn query_quotes(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<StoredQuote>> {
        let mut stmt = self.conn.prepare(sql)?;
        let quotes = stmt
            .query_map(params, quote_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(quotes)
    }
}

impl QuoteSink for SqliteStorage {
    fn insert_quote(&mut self, quote: &Quote) -> StorageResult<i64> {
        if !quote.is_valid() {
            return Err(StorageError::Rejected {
                code: quote.code.clone(),
                reason: "missing code or name".to_string(),
            });
        }

        self.conn.execute(
            "INSERT INTO quotes (stock_code, stock_name, current_price, change_amount,
             change_percent, open_price, high_price, low_price, volume, turnover,
             market_type, trade_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                quote.code,
                quote.name,
                decimal_text(quote.current_price),
                decimal_text(quote.change_amount),
                decimal_text(quote.change_percent),
                decimal_text(quote.open_price),
                decimal_text(quote.high_price),
                decimal_text(quote.low_price),
                quote.volume,
                quote.turnover_or_zero().to_string(),
                quote.market,
                format_time(&quote.trade_time),
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn create_run(&mut self, config_hash: &str, mode: &str) -> StorageResult<Option<i64>> {
        self.conn.execute(
            "INSERT INTO crawl_runs (started_at, config_hash, mode, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                format_time(&Utc::now()),
                config_hash,
                mode,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(Some(self.conn.last_insert_rowid()))
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE crawl_runs SET status = ?1, finished_at = ?2, pages_planned = ?3,
             pages_failed = ?4, records_parsed = ?5, records_dropped = ?6,
             records_saved = ?7, records_failed = ?8
             WHERE id = ?9",
            params![
                status.to_db_string(),
                format_time(&Utc::now()),
                totals.pages_planned,
                totals.pages_failed,
                totals.records_parsed as i64,
                totals.records_dropped as i64,
                totals.records_saved as i64,
                totals.records_failed as i64,
                run_id
            ],
        )?;
        Ok(())
    }
}

impl QuoteStore for SqliteStorage {
    // ===== Quote Queries =====

    fn find_by_code(&self, code: &str, limit: usize) -> StorageResult<Vec<StoredQuote>> {
        self.query_quotes(
            &format!(
                "SELECT {} FROM quotes WHERE stock_code = ?1 ORDER BY trade_time DESC, id DESC LIMIT ?2",
                QUOTE_COLUMNS
            ),
            params![code, limit as i64],
        )
    }

    fn find_all_codes(&self) -> StorageResult<Vec<Listing>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT stock_code, stock_name, market_type FROM quotes
             ORDER BY stock_code LIMIT ?1",
        )?;

        let listings = stmt
            .query_map(params![LISTING_LIMIT as i64], |row| {
                Ok(Listing {
                    code: row.get(0)?,
                    name: row.get(1)?,
                    market: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(listings)
    }

    fn find_latest(&self, limit: usize, offset: usize) -> StorageResult<Vec<StoredQuote>> {
        self.query_quotes(
            &format!(
                "SELECT {} {} ORDER BY CAST(q.change_percent AS REAL) DESC, q.stock_code
                 LIMIT ?1 OFFSET ?2",
                prefixed_quote_columns(),
                LATEST_PER_CODE
            ),
            params![limit as i64, offset as i64],
        )
    }

    fn search_latest(
        &self,
        keyword: &str,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<StoredQuote>> {
        self.query_quotes(
            &format!(
                "SELECT {} {}
                 WHERE q.stock_code LIKE '%' || ?1 || '%' OR q.stock_name LIKE '%' || ?1 || '%'
                 ORDER BY CAST(q.change_percent AS REAL) DESC, q.stock_code
                 LIMIT ?2 OFFSET ?3",
                prefixed_quote_columns(),
                LATEST_PER_CODE
            ),
            params![keyword, limit as i64, offset as i64],
        )
    }

    // ===== Statistics =====

    fn count_quotes(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM quotes", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_codes(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(DISTINCT stock_code) FROM quotes", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    fn latest_trade_time(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let latest: Option<String> =
            self.conn
                .query_row("SELECT MAX(trade_time) FROM quotes", [], |row| row.get(0))?;

        latest
            .map(|text| {
                parse_time(&text).map_err(|e| StorageError::InvalidValue {
                    column: "trade_time".to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    // ===== Retention =====

    fn purge_older_than(&mut self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM quotes WHERE trade_time < ?1",
            params![format_time(&cutoff)],
        )?;
        Ok(deleted)
    }

    // ===== Run Ledger =====

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM crawl_runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawl_runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;

        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }
}

fn prefixed_quote_columns() -> String {
    QUOTE_COLUMNS
        .split(',')
        .map(|column| format!("q.{}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

/// Fixed-width RFC 3339 so that text comparison orders by time
fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|t| t.with_timezone(&Utc))
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        Decimal::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn quote_from_row(row: &Row<'_>) -> rusqlite::Result<StoredQuote> {
    let trade_time: String = row.get(12)?;
    let trade_time = parse_time(&trade_time)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(12, Type::Text, Box::new(e)))?;

    Ok(StoredQuote {
        id: row.get(0)?,
        quote: Quote {
            code: row.get(1)?,
            name: row.get(2)?,
            current_price: decimal_column(row, 3)?,
            change_amount: decimal_column(row, 4)?,
            change_percent: decimal_column(row, 5)?,
            open_price: decimal_column(row, 6)?,
            high_price: decimal_column(row, 7)?,
            low_price: decimal_column(row, 8)?,
            volume: row.get(9)?,
            turnover: decimal_column(row, 10)?,
            market: row.get(11)?,
            trade_time,
        },
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        mode: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Running),
        totals: RunTotals {
            pages_planned: row.get(6)?,
            pages_failed: row.get(7)?,
            records_parsed: row.get::<_, i64>(8)? as u64,
            records_dropped: row.get::<_, i64>(9)? as u64,
            records_saved: row.get::<_, i64>(10)? as u64,
            records_failed: row.get::<_, i64>(11)? as u64,
        },
    })
}
