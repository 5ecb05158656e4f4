use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "BRL";

//--------------------------------------        Money        ---------------------------------------------------------
/// A monetary amount in hundredths of the store currency (cents of BRL by default).
///
/// All financial arithmetic in the settlement engine is integer arithmetic on this type. Percentages are expressed in
/// basis points (1 bp = 0.01%) so that fee calculations never touch floating point.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
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
            Err(MoneyConversionError(format!("{value} is too large")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", cents / 100, cents % 100)
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    /// Parses decimal strings such as `"110.00"`, `"0.5"` or `"-3"`, to cent precision.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (sign, digits) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        let whole = if whole.is_empty() { 0 } else { whole.parse::<i64>().map_err(|e| MoneyConversionError(format!("{s}: {e}")))? };
        let frac = match frac.len() {
            0 => 0,
            1 => 10 * frac.parse::<i64>().map_err(|e| MoneyConversionError(format!("{s}: {e}")))?,
            2 => frac.parse::<i64>().map_err(|e| MoneyConversionError(format!("{s}: {e}")))?,
            _ => return Err(MoneyConversionError(format!("{s}: more than 2 decimal places"))),
        };
        Ok(Self(sign * (whole * 100 + frac)))
    }
}

impl Money {
    pub const MAX: Money = Money(i64::MAX);
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Whole currency units, e.g. `Money::from_units(110)` is 110.00.
    pub const fn from_units(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Applies a percentage given in basis points, rounding half-up.
    ///
    /// `Money::from_units(10).percentage_bps(199)` is 0.20 (1.99% of 10.00, rounded).
    pub fn percentage_bps(&self, bps: i64) -> Self {
        let numer = self.0 * bps;
        Self((numer + 5_000 * numer.signum()) / 10_000)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_and_parse_round_trip() {
        for s in ["110.00", "0.50", "-3.99", "0.00"] {
            let m = s.parse::<Money>().unwrap();
            assert_eq!(m.to_string(), s);
        }
        assert_eq!("10".parse::<Money>().unwrap(), Money::from_units(10));
        assert_eq!("0.5".parse::<Money>().unwrap(), Money::from_cents(50));
        assert!("1.005".parse::<Money>().is_err());
    }

    #[test]
    fn percentage_in_basis_points() {
        // 1.99% of 10.00 = 0.199, rounds to 0.20
        assert_eq!(Money::from_units(10).percentage_bps(199), Money::from_cents(20));
        // 2% of 110.00 = 2.20 exactly
        assert_eq!(Money::from_units(110).percentage_bps(200), Money::from_cents(220));
        assert_eq!(Money::from_units(-10).percentage_bps(199), Money::from_cents(-20));
    }

    #[test]
    fn arithmetic() {
        let subtotal = Money::from_units(100);
        let shipping = Money::from_units(10);
        let discount = Money::ZERO;
        assert_eq!(subtotal + shipping - discount, Money::from_units(110));
        let total: Money = [subtotal, shipping].into_iter().sum();
        assert_eq!(total, Money::from_units(110));
    }
}
