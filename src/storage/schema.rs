//! Database schema definitions
//!
//! Decimal columns hold canonical decimal text so no precision is lost to
//! floating point; times are RFC 3339 UTC with a fixed width, so text order
//! is time order.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    mode TEXT NOT NULL,
    status TEXT NOT NULL,
    pages_planned INTEGER NOT NULL DEFAULT 0,
    pages_failed INTEGER NOT NULL DEFAULT 0,
    records_parsed INTEGER NOT NULL DEFAULT 0,
    records_dropped INTEGER NOT NULL DEFAULT 0,
    records_saved INTEGER NOT NULL DEFAULT 0,
    records_failed INTEGER NOT NULL DEFAULT 0
);

-- One row per captured quote
CREATE TABLE IF NOT EXISTS quotes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stock_code TEXT NOT NULL CHECK (stock_code <> ''),
    stock_name TEXT NOT NULL CHECK (stock_name <> ''),
    current_price TEXT,
    change_amount TEXT,
    change_percent TEXT,
    open_price TEXT,
    high_price TEXT,
    low_price TEXT,
    volume INTEGER NOT NULL DEFAULT 0,
    turnover TEXT NOT NULL DEFAULT '0',
    market_type INTEGER NOT NULL DEFAULT 0,
    trade_time TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_quotes_code_time ON quotes(stock_code, trade_time);
CREATE INDEX IF NOT EXISTS idx_quotes_trade_time ON quotes(trade_time);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
