use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "CNY";

/// Number of minor units (cents, fen) in one major unit.
const MINOR_UNITS: i64 = 100;

//--------------------------------------        Money        ---------------------------------------------------------
/// A monetary amount, held as an integer number of minor units so that sums and products are exact.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {value} is too large to convert to Money")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        #[allow(clippy::cast_sign_loss)]
        let units = MINOR_UNITS as u64;
        write!(f, "{sign}{}.{:02}", abs / units, abs % units)
    }
}

/// Parses decimal strings such as `"12"`, `"12.5"` or `"12.50"`, the format payment gateways use for amounts.
impl FromStr for Money {
    type Err = MoneyConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (major, minor) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };
        if major.is_empty() || minor.len() > 2 || !major.chars().all(|c| c.is_ascii_digit()) {
            return Err(MoneyConversionError(format!("'{s}' is not a valid amount")));
        }
        if !minor.chars().all(|c| c.is_ascii_digit()) {
            return Err(MoneyConversionError(format!("'{s}' is not a valid amount")));
        }
        let major = major.parse::<i64>().map_err(|e| MoneyConversionError(format!("'{s}': {e}")))?;
        let minor = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().map_err(|e| MoneyConversionError(format!("'{s}': {e}")))? * 10,
            _ => minor.parse::<i64>().map_err(|e| MoneyConversionError(format!("'{s}': {e}")))?,
        };
        let value = major
            .checked_mul(MINOR_UNITS)
            .and_then(|v| v.checked_add(minor))
            .ok_or_else(|| MoneyConversionError(format!("'{s}' is too large")))?;
        Ok(Self(if negative { -value } else { value }))
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major(units: i64) -> Self {
        Self(units * MINOR_UNITS)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}
