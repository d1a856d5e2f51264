//! Amount type for handling the money values exchanged with the backend.
//!
//! The backend is loose about how it sends numbers: a JSON number, a numeric string, or the
//! literal string `"null"` when a sum covers no rows. `Amount` wraps `Decimal` and accepts all of
//! these.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// The literal the backend uses for "no data".
pub const NULL_LITERAL: &str = "null";

/// Represents a money value.
///
/// Equality is numeric, so `100` and `100.00` are the same amount.
///
/// ```
/// # use balance_sheet::model::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("100").unwrap();
/// let b = Amount::from_str("100.00").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(b.to_string(), "100.00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is greater than zero.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Reads an amount out of a JSON value. Numbers and numeric strings are accepted, `"null"`
    /// reads as zero. JSON `null` and other types are errors.
    pub fn from_json(value: &Value) -> Result<Self, AmountError> {
        match value {
            Value::Number(n) => Amount::from_str(&n.to_string()),
            Value::String(s) => Amount::from_str(s),
            other => Err(AmountError::NotANumber(other.to_string())),
        }
    }

    /// Formats the amount with thousands separators, e.g. `1,234.50`.
    pub fn grouped(&self) -> String {
        format_num::format_num!(",.2", self.0.to_f64().unwrap_or_default())
    }
}

/// An error that can occur when parsing strings into `Amount` values.
pub enum AmountError {
    Decimal(rust_decimal::Error),
    NotANumber(String),
}

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Decimal(e) => Debug::fmt(e, f),
            AmountError::NotANumber(s) => write!(f, "NotANumber({s:?})"),
        }
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Decimal(e) => Display::fmt(e, f),
            AmountError::NotANumber(s) => write!(f, "'{s}' is not a number"),
        }
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AmountError::Decimal(e) => Some(e),
            AmountError::NotANumber(_) => None,
        }
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        // An untouched form field and the backend's "no rows" marker both mean zero
        if trimmed.is_empty() || trimmed == NULL_LITERAL {
            return Ok(Amount::ZERO);
        }

        // Decimal::from_str rejects exponents, which serde_json can emit for large floats
        let value = match Decimal::from_str(trimmed) {
            Ok(value) => value,
            Err(e) => Decimal::from_scientific(trimmed).map_err(|_| AmountError::Decimal(e))?,
        };
        Ok(Amount(value))
    }
}

impl Display for Amount {
    /// At least two decimal places, and every place the value carries, so printing never rounds.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.scale() < 2 {
            write!(f, "{:.2}", self.0)
        } else {
            Display::fmt(&self.0, f)
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
        let value = Value::deserialize(deserializer)?;
        Amount::from_json(&value).map_err(serde::de::Error::custom)
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
