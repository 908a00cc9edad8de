//! Boundary numeric input
//!
//! Engine arithmetic is finite decimal, but callers may hand in unbounded
//! trade sizes ("swap until the limit price"), an "as much as possible"
//! fixed-token amount, or an undefined value. `Quantity` carries those cases
//! to the entry point, which decides what each one means.

use crate::error::{EngineError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Value(Decimal),
    PosInf,
    NegInf,
    NaN,
}

impl Quantity {
    /// Reject NaN, keep everything else
    pub fn defined(self, field: &'static str) -> Result<Quantity> {
        match self {
            Quantity::NaN => Err(EngineError::NotANumber { field }),
            other => Ok(other),
        }
    }

    /// Require a finite value
    pub fn finite(self, field: &'static str) -> Result<Decimal> {
        match self {
            Quantity::Value(value) => Ok(value),
            Quantity::NaN => Err(EngineError::NotANumber { field }),
            Quantity::PosInf | Quantity::NegInf => Err(EngineError::Unbounded { field }),
        }
    }

    pub fn is_positive(&self) -> bool {
        match self {
            Quantity::Value(value) => value.is_sign_positive() && !value.is_zero(),
            Quantity::PosInf => true,
            Quantity::NegInf | Quantity::NaN => false,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Quantity::Value(value) if value.is_zero())
    }

    /// Magnitude, `None` when unbounded
    pub fn magnitude(&self) -> Option<Decimal> {
        match self {
            Quantity::Value(value) => Some(value.abs()),
            _ => None,
        }
    }
}

impl From<Decimal> for Quantity {
    fn from(value: Decimal) -> Self {
        Quantity::Value(value)
    }
}

impl FromStr for Quantity {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nan" => Ok(Quantity::NaN),
            "inf" | "+inf" | "infinity" | "+infinity" => Ok(Quantity::PosInf),
            "-inf" | "-infinity" => Ok(Quantity::NegInf),
            other => Decimal::from_str(other).map(Quantity::Value),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Value(value) => write!(f, "{}", value),
            Quantity::PosInf => write!(f, "inf"),
            Quantity::NegInf => write!(f, "-inf"),
            Quantity::NaN => write!(f, "NaN"),
        }
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Quantity::from_str(&raw).map_err(serde::de::Error::custom)
    }
}
