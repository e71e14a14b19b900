//! Canonical value types and their normalization rules.
//!
//! Platforms report money as decimal strings with varying precision and stock
//! either as a number or as an "unlimited / not tracked" marker. Everything is
//! normalized into the types here before it enters the engine, so equality and
//! hashing are well-defined on both sides.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monetary amount in minor units (e.g. cents) with an ISO 4217 currency.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units. Two decimal places are assumed throughout.
    minor: i64,
    /// Uppercase three-letter currency code.
    currency: String,
}

impl Money {
    /// Creates a money value from minor units.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidCurrency`] if the currency code is not
    /// three ASCII letters.
    pub fn from_minor(minor: i64, currency: impl AsRef<str>) -> ModelResult<Self> {
        let code = currency.as_ref().trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ModelError::InvalidCurrency(code.to_string()));
        }
        Ok(Self {
            minor,
            currency: code.to_ascii_uppercase(),
        })
    }

    /// Parses a decimal string such as `"219"`, `"219.0"` or `"219.00"`.
    ///
    /// Precision beyond two decimal places is rejected rather than rounded;
    /// pricing mistakes should be loud.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidAmount`] for malformed input and
    /// [`ModelError::InvalidCurrency`] for a bad currency code.
    pub fn parse(decimal: &str, currency: impl AsRef<str>) -> ModelResult<Self> {
        let text = decimal.trim();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(ModelError::InvalidAmount(text.to_string()));
        }
        if !frac.chars().all(|c| c.is_ascii_digit()) || frac.len() > 2 {
            // Allow trailing zeros beyond two places ("219.000") but nothing else.
            let (head, tail) = frac.split_at(frac.len().min(2));
            if !head.chars().all(|c| c.is_ascii_digit()) || tail.chars().any(|c| c != '0') {
                return Err(ModelError::InvalidAmount(text.to_string()));
            }
        }

        let whole: i64 = whole
            .parse()
            .map_err(|_| ModelError::InvalidAmount(text.to_string()))?;
        let frac_two = {
            let mut f = frac.chars().take(2).collect::<String>();
            while f.len() < 2 {
                f.push('0');
            }
            f.parse::<i64>()
                .map_err(|_| ModelError::InvalidAmount(text.to_string()))?
        };

        let minor = whole * 100 + frac_two;
        Self::from_minor(if negative { -minor } else { minor }, currency)
    }

    /// Returns the amount in minor units.
    #[must_use]
    pub fn minor(&self) -> i64 {
        self.minor
    }

    /// Returns the currency code.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Formats the amount as a two-decimal string without the currency.
    #[must_use]
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.minor < 0 { "-" } else { "" };
        let abs = self.minor.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal_string(), self.currency)
    }
}

/// A stock level as reported by a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockLevel {
    /// Stock is not tracked; the platform will sell any quantity.
    Unlimited,
    /// A concrete number of units on hand.
    Units(u64),
}

impl StockLevel {
    /// Returns the lower of two stock levels.
    ///
    /// `Unlimited` compares higher than any concrete quantity, so the
    /// conservative choice between a number and "unlimited" is the number.
    #[must_use]
    pub fn min(self, other: StockLevel) -> StockLevel {
        match (self, other) {
            (StockLevel::Unlimited, b) => b,
            (a, StockLevel::Unlimited) => a,
            (StockLevel::Units(a), StockLevel::Units(b)) => StockLevel::Units(a.min(b)),
        }
    }

    /// Returns the concrete unit count, if tracked.
    #[must_use]
    pub fn units(&self) -> Option<u64> {
        match self {
            StockLevel::Unlimited => None,
            StockLevel::Units(n) => Some(*n),
        }
    }
}

impl fmt::Display for StockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockLevel::Unlimited => f.write_str("unlimited"),
            StockLevel::Units(n) => write!(f, "{n}"),
        }
    }
}

/// Normalizes free text: CRLF to LF, surrounding whitespace stripped.
#[must_use]
pub(crate) fn normalize_text(raw: &str) -> String {
    raw.replace("\r\n", "\n").trim().to_string()
}

/// Normalizes a tag list: each tag trimmed, empties dropped, the result
/// sorted and deduplicated so platform ordering differences never register
/// as changes.
#[must_use]
pub(crate) fn normalize_tags(raw: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = raw
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}
