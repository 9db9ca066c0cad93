//! Upstream field-code mapping
//!
//! The listing endpoint names its columns with opaque codes (`f12`, `f14`,
//! ...). All lookups go through a single [`FieldMap`] so that a change in the
//! upstream schema is caught once, when the configuration is validated,
//! instead of surfacing as silently empty columns.

use crate::config::PAGE_PLACEHOLDER;
use crate::ConfigError;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A domain field of a [`crate::Quote`] that is read from the upstream row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuoteField {
    Code,
    Market,
    Name,
    CurrentPrice,
    ChangeAmount,
    ChangePercent,
    High,
    Open,
    Low,
    Volume,
    Turnover,
}

impl QuoteField {
    /// Every mapped field, in table order
    pub const ALL: [QuoteField; 11] = [
        Self::Code,
        Self::Market,
        Self::Name,
        Self::CurrentPrice,
        Self::ChangeAmount,
        Self::ChangePercent,
        Self::High,
        Self::Open,
        Self::Low,
        Self::Volume,
        Self::Turnover,
    ];

    /// Key used for this field in the `[fields]` config table
    pub fn key(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Market => "market",
            Self::Name => "name",
            Self::CurrentPrice => "current-price",
            Self::ChangeAmount => "change-amount",
            Self::ChangePercent => "change-percent",
            Self::High => "high",
            Self::Open => "open",
            Self::Low => "low",
            Self::Volume => "volume",
            Self::Turnover => "turnover",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|field| field.key() == key)
    }

    /// Upstream code carried by the stock listing endpoint
    pub fn default_code(&self) -> &'static str {
        match self {
            Self::Code => "f12",
            Self::Market => "f13",
            Self::Name => "f14",
            Self::CurrentPrice => "f2",
            Self::ChangeAmount => "f4",
            Self::ChangePercent => "f3",
            Self::High => "f15",
            Self::Open => "f16",
            Self::Low => "f17",
            Self::Volume => "f5",
            Self::Turnover => "f6",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for QuoteField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Mapping from domain fields to upstream field codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    codes: Vec<String>,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            codes: QuoteField::ALL
                .iter()
                .map(|field| field.default_code().to_string())
                .collect(),
        }
    }
}

impl FieldMap {
    /// Builds a map from the defaults with the given `[fields]` overrides applied
    ///
    /// Unknown keys, empty codes and two fields sharing one code are rejected.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut map = Self::default();

        for (key, code) in overrides {
            let field = QuoteField::from_key(key).ok_or_else(|| {
                ConfigError::FieldMapping(format!("Unknown quote field '{}'", key))
            })?;

            let code = code.trim();
            if code.is_empty() {
                return Err(ConfigError::FieldMapping(format!(
                    "Field '{}' has an empty upstream code",
                    key
                )));
            }

            map.codes[field.index()] = code.to_string();
        }

        let mut seen = HashSet::new();
        for (field, code) in map.iter() {
            if !seen.insert(code) {
                return Err(ConfigError::FieldMapping(format!(
                    "Upstream code '{}' is mapped more than once (at '{}')",
                    code, field
                )));
            }
        }

        Ok(map)
    }

    /// Returns the upstream code for a field
    pub fn code(&self, field: QuoteField) -> &str {
        &self.codes[field.index()]
    }

    /// Iterates over `(field, code)` pairs in table order
    pub fn iter(&self) -> impl Iterator<Item = (QuoteField, &str)> {
        QuoteField::ALL
            .iter()
            .map(move |field| (*field, self.code(*field)))
    }

    /// Checks that every mapped code is requested by the URL template
    ///
    /// Templates without a `fields` query parameter are accepted as-is, since
    /// the endpoint then decides which columns it returns.
    pub fn verify_template(&self, url_template: &str) -> Result<(), ConfigError> {
        let Some(requested) = requested_fields(url_template) else {
            return Ok(());
        };

        let missing: Vec<String> = self
            .iter()
            .filter(|(_, code)| !requested.iter().any(|r| r == code))
            .map(|(field, code)| format!("{} ({})", field, code))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::FieldMapping(format!(
                "URL template does not request mapped fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Extracts the comma-separated `fields` parameter from a URL template
fn requested_fields(url_template: &str) -> Option<Vec<String>> {
    let url = url::Url::parse(&url_template.replace(PAGE_PLACEHOLDER, "1")).ok()?;
    let (_, value) = url.query_pairs().find(|(key, _)| key == "fields")?;

    Some(
        value
            .split(',')
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_codes() {
        let map = FieldMap::default();
        assert_eq!(map.code(QuoteField::Code), "f12");
        assert_eq!(map.code(QuoteField::Name), "f14");
        assert_eq!(map.code(QuoteField::ChangePercent), "f3");
        assert_eq!(map.code(QuoteField::Turnover), "f6");
        assert_eq!(map.iter().count(), 11);
    }

    #[test]
    fn test_key_roundtrip() {
        for field in QuoteField::ALL {
            assert_eq!(QuoteField::from_key(field.key()), Some(field));
        }
        assert_eq!(QuoteField::from_key("ticker"), None);
    }

    #[test]
    fn test_override_replaces_code() {
        let mut overrides = BTreeMap::new();
        overrides.insert("name".to_string(), "f58".to_string());

        let map = FieldMap::with_overrides(&overrides).unwrap();
        assert_eq!(map.code(QuoteField::Name), "f58");
        assert_eq!(map.code(QuoteField::Code), "f12");
    }

    #[test]
    fn test_override_rejects_duplicate_code() {
        let mut overrides = BTreeMap::new();
        overrides.insert("name".to_string(), "f12".to_string());

        let result = FieldMap::with_overrides(&overrides);
        assert!(matches!(result, Err(ConfigError::FieldMapping(_))));
    }

    #[test]
    fn test_override_rejects_empty_code() {
        let mut overrides = BTreeMap::new();
        overrides.insert("open".to_string(), "  ".to_string());

        assert!(FieldMap::with_overrides(&overrides).is_err());
    }

    #[test]
    fn test_verify_template_accepts_full_field_list() {
        let template = "https://quotes.example.com/list?fields=f12,f13,f14,f2,f3,f4,f5,f6,f15,f16,f17&pn={page}";
        assert!(FieldMap::default().verify_template(template).is_ok());
    }

    #[test]
    fn test_verify_template_reports_missing_fields() {
        let template = "https://quotes.example.com/list?fields=f12,f14&pn={page}";
        let err = FieldMap::default().verify_template(template).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("market (f13)"));
        assert!(message.contains("turnover (f6)"));
        assert!(!message.contains("(f12)"));
    }

    #[test]
    fn test_verify_template_without_fields_param() {
        let template = "https://quotes.example.com/list?pn={page}";
        assert!(FieldMap::default().verify_template(template).is_ok());
    }
}
