//! Fixed-point money with two fractional digits.
//!
//! Amounts entering the ledger are rounded half-up (away from zero) to the
//! minimum currency unit. Stored values are kept as they were written so that
//! balances computed over older rows see exactly what was persisted.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const SCALE: u32 = 2;
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Rounds `value` to the ledger precision, half-up.
    pub fn normalize(value: Decimal) -> Self {
        let mut rounded = value.round_dp_with_strategy(Self::SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(Self::SCALE);
        Money(rounded)
    }

    /// Like [`Money::normalize`], but refuses values that cannot be held with
    /// two fractional digits or whose magnitude exceeds [`Money::max_amount`].
    pub fn checked_normalize(value: Decimal) -> Option<Self> {
        let money = Self::normalize(value);
        (money.0.scale() == Self::SCALE && money.abs() <= Self::max_amount()).then_some(money)
    }

    /// Wraps a value without rounding it.
    pub fn from_raw(value: Decimal) -> Self {
        Money(value)
    }

    pub fn min_unit() -> Self {
        Money(Decimal::new(1, Self::SCALE))
    }

    /// Largest amount a single expense or settlement may carry. Keeps every
    /// group total far inside the range of `Decimal`.
    pub fn max_amount() -> Self {
        Money(Decimal::new(100_000_000_000_000, Self::SCALE))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn normalized(self) -> Self {
        Self::normalize(self.0)
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

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Splits the amount into `parts` shares that differ by at most one
    /// minimum unit and sum to the (normalized) amount exactly.
    ///
    /// Every share starts at `floor(amount / parts)`; the leftover units go one
    /// at a time to the leading shares, so the order of the returned vector is
    /// the order in which the remainder was handed out.
    pub fn split_even(self, parts: usize) -> Vec<Money> {
        if parts == 0 {
            return Vec::new();
        }
        // Values too large for two digits keep a coarser scale; splitting in
        // units of that scale still reconciles exactly.
        let amount = self.normalized().0;
        let units = amount.mantissa();
        let scale = amount.scale();
        let parts_i = parts as i128;
        let base = units.div_euclid(parts_i);
        let remainder = units.rem_euclid(parts_i);

        (0..parts_i)
            .map(|index| {
                let share = if index < remainder { base + 1 } else { base };
                Money(Decimal::from_i128_with_scale(share, scale))
            })
            .collect()
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money::normalize(value)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Money::normalize)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalize_rounds_half_up() {
        assert_eq!(Money::normalize(dec!(10.235)).amount(), dec!(10.24));
        assert_eq!(Money::normalize(dec!(10.234)).amount(), dec!(10.23));
        assert_eq!(Money::normalize(dec!(-10.235)).amount(), dec!(-10.24));
        assert_eq!(Money::normalize(dec!(7)).to_string(), "7.00");
    }

    #[test]
    fn split_ten_dollars_three_ways() {
        let shares = Money::normalize(dec!(10.00)).split_even(3);
        let amounts: Vec<_> = shares.iter().map(Money::amount).collect();
        assert_eq!(amounts, vec![dec!(3.34), dec!(3.33), dec!(3.33)]);
    }

    #[test]
    fn split_ten_oh_one_three_ways() {
        let total = Money::normalize(dec!(10.01));
        let shares = total.split_even(3);
        assert_eq!(shares.iter().sum::<Money>(), total);

        let max = shares.iter().max().copied().unwrap_or_default();
        let min = shares.iter().min().copied().unwrap_or_default();
        assert_eq!(max - min, Money::min_unit());
    }

    #[test]
    fn split_smaller_than_member_count() {
        let shares = Money::normalize(dec!(0.01)).split_even(3);
        assert_eq!(shares, vec![Money::min_unit(), Money::ZERO, Money::ZERO]);
    }

    #[test]
    fn split_always_reconciles() {
        let amounts = [dec!(0.01), dec!(1), dec!(10.00), dec!(99.99), dec!(1234.57), dec!(100000.03)];
        for amount in amounts {
            let total = Money::normalize(amount);
            for parts in 1..=64 {
                let shares = total.split_even(parts);
                assert_eq!(shares.len(), parts);
                assert_eq!(shares.iter().sum::<Money>(), total, "{} split {} ways", total, parts);
            }
        }
    }

    #[test]
    fn split_into_nothing_is_empty() {
        assert!(Money::normalize(dec!(5)).split_even(0).is_empty());
    }

    #[test]
    fn huge_values_are_refused_at_ledger_precision() {
        let huge = dec!(1000000000000000000000000000);
        assert_eq!(Money::checked_normalize(huge), None);
        assert_eq!(Money::checked_normalize(dec!(1000000000000.01)), None);
        assert_eq!(Money::checked_normalize(-dec!(1000000000000.01)), None);
        assert_eq!(
            Money::checked_normalize(dec!(1000000000000)),
            Some(Money::max_amount())
        );
        assert_eq!(Money::checked_normalize(dec!(0.125)).unwrap().amount(), dec!(0.13));
    }

    #[test]
    fn split_of_coarse_value_still_reconciles() {
        let total = Money::normalize(dec!(1000000000000000000000000001));
        let shares = total.split_even(2);
        assert_eq!(shares.iter().sum::<Money>(), total);
    }

    #[test]
    fn checked_arithmetic_reports_overflow() {
        let max = Money::from_raw(Decimal::MAX);
        assert_eq!(max.checked_add(Money::min_unit()), None);
        assert_eq!((-max).checked_sub(Money::min_unit()), None);
        assert_eq!(
            Money::min_unit().checked_add(Money::min_unit()),
            Some(Money::normalize(dec!(0.02)))
        );
    }

    #[test]
    fn parses_and_displays() {
        let money: Money = " 12.5 ".parse().unwrap();
        assert_eq!(money.to_string(), "12.50");
        assert!("twelve".parse::<Money>().is_err());
    }
}
