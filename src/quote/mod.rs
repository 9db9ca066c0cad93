//! Quote domain model
//!
//! This module defines the normalized quote record and the pieces that turn
//! raw listing rows into quotes:
//! - `FieldMap`: upstream field codes for each quote field
//! - `RecordNormalizer`: sentinel handling, unit and scale conversion, validity gate

mod fields;
mod normalize;

pub use fields::{FieldMap, QuoteField};
pub use normalize::{
    normalize_change_percent, parse_decimal, RecordNormalizer, CHANGE_PERCENT_SCALE,
    SENTINEL, UNIT_MULTIPLIER,
};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// One normalized market quote for one stock code at one capture time
///
/// Price-like fields are `None` when the upstream had no data for them,
/// which is distinct from a value of zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub code: String,
    pub name: String,
    pub current_price: Option<Decimal>,
    pub change_amount: Option<Decimal>,
    /// Percentage with six fractional digits, clamped to the storable range
    pub change_percent: Option<Decimal>,
    pub open_price: Option<Decimal>,
    pub high_price: Option<Decimal>,
    pub low_price: Option<Decimal>,
    /// Base units; zero when unknown
    pub volume: i64,
    /// Base units; only defaulted to zero when written to storage
    pub turnover: Option<Decimal>,
    pub market: i32,
    /// Capture time, not exchange time
    pub trade_time: DateTime<Utc>,
}

impl Quote {
    /// A quote is valid only when both code and name are present
    pub fn is_valid(&self) -> bool {
        !self.code.is_empty() && !self.name.is_empty()
    }

    /// Turnover as written to storage
    pub fn turnover_or_zero(&self) -> Decimal {
        self.turnover.unwrap_or(Decimal::ZERO)
    }
}

/// A quote read back from storage with its row id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredQuote {
    pub id: i64,
    pub quote: Quote,
}

/// Distinct code/name/market entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub code: String,
    pub name: String,
    pub market: i32,
}
