//! Amount type for handling signed monetary values with optional currency symbols.
//!
//! This module provides the `Amount` type which wraps `Decimal` and handles parsing values that may
//! or may not include a leading currency symbol and thousands separators.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// Currency symbols that may prefix an amount, e.g. `-€12.50`.
const SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

/// Represents how an amount was (or should be) formatted.
///
/// # Examples
///  - `AmountFormat{ symbol: Some('€'), commas: true }` -> `-€60,000.00`
///  - `AmountFormat{ symbol: None, commas: true }` -> `-60,000.00`
///  - `AmountFormat{ symbol: None, commas: false }` -> `-60000.00`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AmountFormat {
    /// The currency symbol present in the formatting, if any.
    symbol: Option<char>,
    /// Whether commas are present as thousands separators in the formatting.
    commas: bool,
}

impl AmountFormat {
    pub const fn new(symbol: Option<char>, commas: bool) -> Self {
        Self { symbol, commas }
    }
}

impl Default for AmountFormat {
    fn default() -> Self {
        DEFAULT_FORMAT
    }
}

/// The default format has no symbol and no commas: e.g. `-60000.00`.
const DEFAULT_FORMAT: AmountFormat = AmountFormat {
    symbol: None,
    commas: false,
};

/// Represents a signed monetary amount.
///
/// Formatting is considered significant for the purposes of equality, so for numeric comparisons,
/// you should access the `Decimal` value and use that.
///
/// # Examples
///
/// ```
/// # use bilancial::model::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("-5000.00").unwrap();
/// let b = Amount::from_str("-€5,000.00").unwrap();
/// assert_ne!(a, b);
/// assert_eq!(b.to_string(), "-€5,000.00");
/// assert_eq!(a.value(), b.value());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount {
    /// The parsed numerical value.
    value: Decimal,
    /// The way the numerical value was parsed from, or should be written to, a `String`.
    format: AmountFormat,
}

impl Amount {
    /// Creates a new Amount from a Decimal value with default `String` formatting.
    pub const fn new(value: Decimal) -> Self {
        Self {
            value,
            format: DEFAULT_FORMAT,
        }
    }

    /// Creates a new Amount from a Decimal value with the specified formatting.
    pub const fn new_with_format(value: Decimal, format: AmountFormat) -> Self {
        Self { value, format }
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn format(&self) -> AmountFormat {
        self.format
    }

    pub fn is_zero(&self) -> bool {
        self.value().is_zero()
    }

    /// Returns true if the amount is negative. Zero is neither positive nor negative.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.value().is_sign_negative()
    }
}

/// An error that can occur when parsing strings into `Decimal` values.
pub struct AmountError(rust_decimal::Error);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Amount::default());
        }

        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (symbol, digits) = match unsigned.chars().next() {
            Some(c) if SYMBOLS.contains(&c) => (Some(c), &unsigned[c.len_utf8()..]),
            _ => (None, unsigned),
        };

        let without_commas = digits.replace(',', "");
        let commas = without_commas.len() < digits.len();

        let mut value = Decimal::from_str(&without_commas).map_err(AmountError)?;
        if negative {
            value.set_sign_negative(true);
        }
        Ok(Amount {
            value,
            format: AmountFormat { symbol, commas },
        })
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        let num = self.value().abs().round_dp(2);
        let symbol = self.format.symbol.map(String::from).unwrap_or_default();

        if self.format.commas {
            write!(
                f,
                "{sign}{symbol}{}",
                format_num::format_num!(",.2", num.to_f64().unwrap_or_default())
            )
        } else {
            write!(f, "{sign}{symbol}{:.2}", num)
        }
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_plain() {
        let amount = Amount::from_str("50.00").unwrap();
        assert_eq!(amount.value(), dec("50.00"));
        assert_eq!(amount.to_string(), "50.00");
    }

    #[test]
    fn test_parse_negative_with_symbol() {
        let amount = Amount::from_str("-€50.00").unwrap();
        assert_eq!(amount.value(), dec("-50.00"));
        assert_eq!(amount.to_string(), "-€50.00");
    }

    #[test]
    fn test_parse_explicit_plus() {
        let amount = Amount::from_str("+12.5").unwrap();
        assert_eq!(amount.value(), dec("12.5"));
        assert_eq!(amount.to_string(), "12.50");
    }

    #[test]
    fn test_parse_empty_string_is_zero() {
        let amount = Amount::from_str("   ").unwrap();
        assert!(amount.is_zero());
        assert!(!amount.is_negative());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(Amount::from_str("twelve").is_err());
        assert!(Amount::from_str("$").is_err());
    }

    #[test]
    fn test_commas_are_retained() {
        let s = "1,234,567.89";
        let amount = Amount::from_str(s).unwrap();
        assert_eq!(amount.value(), dec("1234567.89"));
        assert_eq!(amount.to_string(), s);
    }

    #[test]
    fn test_explicit_format() {
        let format = AmountFormat::new(Some('€'), true);
        let amount = Amount::new_with_format(dec("-60000"), format);
        assert_eq!(amount.format(), format);
        assert_eq!(amount.to_string(), "-€60,000.00");
        assert_eq!(Amount::new(dec("-60000")).format(), AmountFormat::default());
    }

    #[test]
    fn test_display_rounds_to_cents() {
        let amount = Amount::new(dec("3.14159"));
        assert_eq!(amount.to_string(), "3.14");
    }

    #[test]
    fn test_negative_zero_displays_without_sign() {
        let amount = Amount::from_str("-0.00").unwrap();
        assert_eq!(amount.to_string(), "0.00");
    }

    #[test]
    fn test_serde() {
        let amount: Amount = serde_json::from_str("\"-£1,000.00\"").unwrap();
        assert_eq!(amount.value(), dec("-1000.00"));
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"-£1,000.00\"");
    }
}
