// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Exact fixed-point currency amounts.
//!
//! Every balance and amount in the ledger is a [`Money`]: a base-10 decimal
//! pinned to two fractional digits (minor currency units). Arithmetic is
//! exact, so repeated credits of fractional amounts never drift.
//!
//! # Example
//!
//! ```
//! use tip_ledger::Money;
//!
//! let a: Money = "0.10".parse().unwrap();
//! let mut total = Money::ZERO;
//! for _ in 0..10 {
//!     total += a;
//! }
//! assert_eq!(total, Money::new(100));
//! assert_eq!(total.to_string(), "1.00");
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

/// Currency amount with a fixed scale of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    /// Number of fractional digits carried by every amount.
    pub const SCALE: u32 = 2;

    pub const ZERO: Money = Money(Decimal::from_parts(0, 0, 0, false, Self::SCALE));

    /// Builds an amount from minor units (`Money::new(1050)` is `10.50`).
    pub fn new(minor_units: i64) -> Self {
        Self(Decimal::new(minor_units, Self::SCALE))
    }

    /// Normalizes an arbitrary decimal to two fractional digits, rounding
    /// half away from zero.
    pub fn from_decimal(value: Decimal) -> Self {
        let mut rounded =
            value.round_dp_with_strategy(Self::SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(Self::SCALE);
        Self(rounded)
    }

    /// Whole currency units (`Money::from_units(20)` is `20.00`).
    pub fn from_units(units: i64) -> Self {
        Self::from_decimal(Decimal::from(units))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Applies a rate (e.g. `0.05` for five percent) and rounds the product
    /// back to two digits.
    pub fn apply_rate(&self, rate: Decimal) -> Self {
        Self::from_decimal(self.0 * rate)
    }

    /// Addition that returns `None` instead of overflowing.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0
            .checked_add(rhs.0)
            .filter(|sum| sum.scale() == Self::SCALE)
            .map(Money)
    }

    /// Subtraction that refuses to produce a negative result.
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        let result = self - rhs;
        (!result.is_negative()).then_some(result)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::from_decimal(value)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    /// Rejects values too large to carry two fractional digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let money = Decimal::from_str(s.trim()).map(Money::from_decimal)?;
        if money.0.scale() != Self::SCALE {
            return Err(rust_decimal::Error::ExceedsMaximumPossibleValue);
        }
        Ok(money)
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

struct MoneyVisitor;

impl Visitor<'_> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal amount as a string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        Ok(Money::from_decimal(Decimal::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        Ok(Money::from_decimal(Decimal::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        // JSON numbers arrive as f64; go through their shortest decimal text
        // so `19.99` stays `19.99`.
        self.visit_str(&v.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalizes_to_two_digits() {
        assert_eq!(Money::from_decimal(dec!(10)).to_string(), "10.00");
        assert_eq!(Money::from_decimal(dec!(10.005)).to_string(), "10.01");
        assert_eq!(Money::from_decimal(dec!(10.004)).to_string(), "10.00");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn repeated_fractional_additions_do_not_drift() {
        let cent = Money::new(1);
        let total: Money = std::iter::repeat_n(cent, 10_000).sum();
        assert_eq!(total, Money::from_units(100));
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(Money::new(999) < Money::from_units(10));
        assert!(Money::ZERO <= Money::new(0));
        assert_eq!(Money::from_units(5), Money::new(500));
    }

    #[test]
    fn apply_rate_rounds_half_away_from_zero() {
        assert_eq!(Money::from_units(1000).apply_rate(dec!(0.05)), Money::from_units(50));
        // 10.10 * 0.05 = 0.505
        assert_eq!(Money::new(1010).apply_rate(dec!(0.05)), Money::new(51));
    }

    #[test]
    fn checked_sub_refuses_negative_results() {
        assert_eq!(
            Money::from_units(100).checked_sub(Money::from_units(60)),
            Some(Money::from_units(40))
        );
        assert_eq!(Money::from_units(10).checked_sub(Money::from_units(11)), None);
    }

    #[test]
    fn serializes_as_string_and_accepts_numbers() {
        let json = serde_json::to_string(&Money::new(4300)).unwrap();
        assert_eq!(json, "\"43.00\"");

        let from_str: Money = serde_json::from_str("\"19.99\"").unwrap();
        let from_float: Money = serde_json::from_str("19.99").unwrap();
        let from_int: Money = serde_json::from_str("20").unwrap();
        assert_eq!(from_str, Money::new(1999));
        assert_eq!(from_float, Money::new(1999));
        assert_eq!(from_int, Money::from_units(20));
    }

    #[test]
    fn checked_add_refuses_overflow() {
        let near_max = Money::from_decimal(Decimal::from_i128_with_scale(
            70_000_000_000_000_000_000_000_000_000,
            2,
        ));
        assert_eq!(
            Money::from_units(1).checked_add(Money::new(50)),
            Some(Money::new(150))
        );
        assert_eq!(near_max.checked_add(near_max), None);
    }

    #[test]
    fn amounts_that_cannot_keep_two_digits_do_not_parse() {
        assert!("79228162514264337593543950335".parse::<Money>().is_err());
        assert!(serde_json::from_str::<Money>("\"79228162514264337593543950335\"").is_err());
        assert_eq!("50000".parse::<Money>().unwrap().to_string(), "50000.00");
    }

    #[test]
    fn rejects_garbage() {
        assert!("ten".parse::<Money>().is_err());
        assert!(serde_json::from_str::<Money>("true").is_err());
    }
}
