//! Raw row normalization
//!
//! Turns one JSON row of the listing into a [`Quote`]. Nothing here returns
//! an error: a field that cannot be read degrades to unset (or zero for the
//! integer fields) with a warning, and a row without code or name is rejected.

use crate::quote::{FieldMap, Quote, QuoteField};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::str::FromStr;

/// Upstream marker for "no data"
pub const SENTINEL: &str = "-";

/// Change percent arrives as an integer scaled by this factor
pub const CHANGE_PERCENT_SCALE: i64 = 10_000;

/// Volume and turnover arrive in units of ten thousand
pub const UNIT_MULTIPLIER: i64 = 10_000;

const PERCENT_DIGITS: u32 = 6;

/// Largest storable change percent magnitude (999999.999999)
fn percent_bound() -> Decimal {
    Decimal::new(999_999_999_999, PERCENT_DIGITS)
}

/// Maps raw listing rows to quotes using a [`FieldMap`]
#[derive(Debug, Clone, Default)]
pub struct RecordNormalizer {
    fields: FieldMap,
}

impl RecordNormalizer {
    pub fn new(fields: FieldMap) -> Self {
        Self { fields }
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.fields
    }

    /// Normalizes a row, returning `None` when it fails the validity gate
    ///
    /// The result depends only on `row` and `captured_at`.
    pub fn normalize(&self, row: &Value, captured_at: DateTime<Utc>) -> Option<Quote> {
        let volume = self
            .decimal(row, QuoteField::Volume)
            .and_then(|v| self.to_base_units(v, QuoteField::Volume))
            .map(|v| match v.trunc().to_i64() {
                Some(units) => units,
                None => {
                    tracing::warn!("Volume {} does not fit in a count, using 0", v);
                    0
                }
            })
            .unwrap_or(0);

        let turnover = self
            .decimal(row, QuoteField::Turnover)
            .and_then(|v| self.to_base_units(v, QuoteField::Turnover));

        let market = i32::try_from(self.integer(row, QuoteField::Market)).unwrap_or_else(|_| {
            tracing::warn!(
                "Market code in field {} is out of range, using 0",
                self.fields.code(QuoteField::Market)
            );
            0
        });

        let quote = Quote {
            code: self.text(row, QuoteField::Code),
            name: self.text(row, QuoteField::Name),
            current_price: self.decimal(row, QuoteField::CurrentPrice),
            change_amount: self.decimal(row, QuoteField::ChangeAmount),
            change_percent: self.change_percent(row),
            open_price: self.decimal(row, QuoteField::Open),
            high_price: self.decimal(row, QuoteField::High),
            low_price: self.decimal(row, QuoteField::Low),
            volume,
            turnover,
            market,
            trade_time: captured_at,
        };

        if quote.is_valid() {
            Some(quote)
        } else {
            tracing::trace!("Dropping row without code or name: {}", row);
            None
        }
    }

    /// Text field; the sentinel and absence both map to an empty string
    fn text(&self, row: &Value, field: QuoteField) -> String {
        match self.raw(row, field) {
            Some(text) if text != SENTINEL => text,
            _ => String::new(),
        }
    }

    /// Integer field; the sentinel, absence and parse failures map to 0
    fn integer(&self, row: &Value, field: QuoteField) -> i64 {
        let Some(text) = self.present(row, field) else {
            return 0;
        };

        if let Ok(value) = text.parse::<i64>() {
            return value;
        }

        match parse_decimal(&text).and_then(|d| d.trunc().to_i64()) {
            Some(value) => value,
            None => {
                tracing::warn!(
                    "Failed to parse field {} value '{}' as integer",
                    self.fields.code(field),
                    text
                );
                0
            }
        }
    }

    /// Decimal field; unset when absent, the sentinel, or unparseable
    fn decimal(&self, row: &Value, field: QuoteField) -> Option<Decimal> {
        let text = self.present(row, field)?;
        let value = parse_decimal(&text);
        if value.is_none() {
            tracing::warn!(
                "Failed to parse field {} value '{}' as decimal",
                self.fields.code(field),
                text
            );
        }
        value
    }

    fn change_percent(&self, row: &Value) -> Option<Decimal> {
        let text = self.present(row, QuoteField::ChangePercent)?;
        let value = normalize_change_percent(&text);
        if value.is_none() {
            tracing::warn!(
                "Failed to parse field {} value '{}' as change percent",
                self.fields.code(QuoteField::ChangePercent),
                text
            );
        }
        value
    }

    fn to_base_units(&self, value: Decimal, field: QuoteField) -> Option<Decimal> {
        let converted = value.checked_mul(Decimal::from(UNIT_MULTIPLIER));
        if converted.is_none() {
            tracing::warn!(
                "Field {} value {} overflows after unit conversion",
                self.fields.code(field),
                value
            );
        }
        converted
    }

    /// Raw text unless absent, empty, or the sentinel
    fn present(&self, row: &Value, field: QuoteField) -> Option<String> {
        self.raw(row, field)
            .filter(|text| !text.is_empty() && text != SENTINEL)
    }

    fn raw(&self, row: &Value, field: QuoteField) -> Option<String> {
        let code = self.fields.code(field);
        match row.get(code)? {
            Value::Null => None,
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => {
                tracing::warn!("Field {} holds a non-scalar value: {}", code, other);
                None
            }
        }
    }
}

/// Parses plain or scientific decimal notation
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Converts a ten-thousandths-scaled change percent to a percentage
///
/// Divides by 10,000, rounds half away from zero to six digits and saturates
/// at +/-999999.999999. Inputs too large for a decimal saturate as well.
pub fn normalize_change_percent(text: &str) -> Option<Decimal> {
    let bound = percent_bound();

    let percent = match parse_decimal(text) {
        Some(raw) => raw
            .checked_div(Decimal::from(CHANGE_PERCENT_SCALE))?
            .round_dp_with_strategy(PERCENT_DIGITS, RoundingStrategy::MidpointAwayFromZero)
            .clamp(-bound, bound),
        None => {
            let raw = text.parse::<f64>().ok().filter(|v| v.is_finite())?;
            if raw.is_sign_negative() {
                -bound
            } else {
                bound
            }
        }
    };

    let mut percent = percent;
    percent.rescale(PERCENT_DIGITS);
    Some(percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn captured() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    fn full_row() -> Value {
        json!({
            "f12": "600519",
            "f13": 1,
            "f14": "Kweichow Moutai",
            "f2": 1688.5,
            "f3": 7445,
            "f4": 12.3,
            "f5": "150",
            "f6": 2.5,
            "f15": 1700,
            "f16": 1680,
            "f17": 1675.25
        })
    }

    #[test]
    fn test_normalize_full_row() {
        let normalizer = RecordNormalizer::default();
        let quote = normalizer.normalize(&full_row(), captured()).unwrap();

        assert_eq!(quote.code, "600519");
        assert_eq!(quote.name, "Kweichow Moutai");
        assert_eq!(quote.market, 1);
        assert_eq!(quote.current_price, Some(Decimal::new(16885, 1)));
        assert_eq!(quote.change_amount, Some(Decimal::new(123, 1)));
        assert_eq!(quote.change_percent, Some(Decimal::new(744500, 6)));
        assert_eq!(quote.high_price, Some(Decimal::from(1700)));
        assert_eq!(quote.open_price, Some(Decimal::from(1680)));
        assert_eq!(quote.low_price, Some(Decimal::new(167525, 2)));
        assert_eq!(quote.volume, 1_500_000);
        assert_eq!(quote.turnover, Some(Decimal::from(25_000)));
        assert_eq!(quote.trade_time, captured());
    }

    #[test]
    fn test_change_percent_scaling() {
        let value = normalize_change_percent("7445").unwrap();
        assert_eq!(value, Decimal::new(744500, 6));
        assert_eq!(value.to_string(), "0.744500");

        assert_eq!(
            normalize_change_percent("-250").unwrap(),
            Decimal::new(-25, 3)
        );
    }

    #[test]
    fn test_change_percent_rounds_half_up() {
        // 0.0000005 sits exactly on the midpoint of the sixth digit
        assert_eq!(
            normalize_change_percent("0.005").unwrap(),
            Decimal::new(1, 6)
        );
        assert_eq!(
            normalize_change_percent("-0.005").unwrap(),
            Decimal::new(-1, 6)
        );
        assert_eq!(normalize_change_percent("0.004").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_change_percent_saturates() {
        let bound = Decimal::new(999_999_999_999, 6);

        assert_eq!(normalize_change_percent("12000000000000").unwrap(), bound);
        assert_eq!(normalize_change_percent("-12000000000000").unwrap(), -bound);
        // Exactly at the bound stays put
        assert_eq!(normalize_change_percent("9999999999.99").unwrap(), bound);
        // Beyond decimal range still saturates instead of failing
        assert_eq!(normalize_change_percent("1e40").unwrap(), bound);
        assert_eq!(normalize_change_percent("-1e40").unwrap(), -bound);
        // 12000000 / 10000 is 1200, comfortably inside the range
        assert_eq!(
            normalize_change_percent("12000000").unwrap(),
            Decimal::from(1200)
        );
    }

    #[test]
    fn test_change_percent_rejects_garbage() {
        assert_eq!(normalize_change_percent("abc"), None);
    }

    #[test]
    fn test_sentinel_mapping() {
        let normalizer = RecordNormalizer::default();
        let row = json!({
            "f12": "000001",
            "f13": "-",
            "f14": "Ping An Bank",
            "f2": "-",
            "f3": "-",
            "f4": "-",
            "f5": "-",
            "f6": "-",
            "f15": "-",
            "f16": "-",
            "f17": "-"
        });

        let quote = normalizer.normalize(&row, captured()).unwrap();
        assert_eq!(quote.market, 0);
        assert_eq!(quote.current_price, None);
        assert_eq!(quote.change_percent, None);
        assert_eq!(quote.high_price, None);
        assert_eq!(quote.volume, 0);
        assert_eq!(quote.turnover, None);
    }

    #[test]
    fn test_zero_is_not_unset() {
        let normalizer = RecordNormalizer::default();
        let row = json!({"f12": "000001", "f14": "Ping An Bank", "f2": 0, "f6": "0"});

        let quote = normalizer.normalize(&row, captured()).unwrap();
        assert_eq!(quote.current_price, Some(Decimal::ZERO));
        assert_eq!(quote.turnover, Some(Decimal::ZERO));
        assert_eq!(quote.open_price, None);
    }

    #[test]
    fn test_unparseable_fields_degrade() {
        let normalizer = RecordNormalizer::default();
        let row = json!({
            "f12": "000002",
            "f13": "sh",
            "f14": "Vanke",
            "f2": "n/a",
            "f5": "lots",
            "f15": [1, 2]
        });

        let quote = normalizer.normalize(&row, captured()).unwrap();
        assert_eq!(quote.market, 0);
        assert_eq!(quote.current_price, None);
        assert_eq!(quote.volume, 0);
        assert_eq!(quote.high_price, None);
    }

    #[test]
    fn test_validity_gate() {
        let normalizer = RecordNormalizer::default();

        let no_code = json!({"f12": "-", "f14": "Delisted Co"});
        assert!(normalizer.normalize(&no_code, captured()).is_none());

        let no_name = json!({"f12": "000003", "f14": ""});
        assert!(normalizer.normalize(&no_name, captured()).is_none());

        let missing_both = json!({"f2": 10});
        assert!(normalizer.normalize(&missing_both, captured()).is_none());
    }

    #[test]
    fn test_volume_and_turnover_units() {
        let normalizer = RecordNormalizer::default();
        let row = json!({"f12": "000004", "f14": "Guohua", "f5": "150", "f6": "150"});

        let quote = normalizer.normalize(&row, captured()).unwrap();
        assert_eq!(quote.volume, 1_500_000);
        assert_eq!(quote.turnover, Some(Decimal::from(1_500_000)));
    }

    #[test]
    fn test_normalization_is_repeatable() {
        let normalizer = RecordNormalizer::default();
        let row = full_row();

        let first = normalizer.normalize(&row, captured());
        let second = normalizer.normalize(&row, captured());
        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_field_map() {
        let mut overrides = std::collections::BTreeMap::new();
        overrides.insert("name".to_string(), "f58".to_string());
        let normalizer =
            RecordNormalizer::new(FieldMap::with_overrides(&overrides).unwrap());

        let row = json!({"f12": "000005", "f14": "ignored", "f58": "Century Star"});
        let quote = normalizer.normalize(&row, captured()).unwrap();
        assert_eq!(quote.name, "Century Star");
    }

    #[test]
    fn test_parse_decimal_notations() {
        assert_eq!(parse_decimal("12.5"), Some(Decimal::new(125, 1)));
        assert_eq!(parse_decimal("1e3"), Some(Decimal::from(1000)));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("-"), None);
    }
}
