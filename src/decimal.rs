use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};
use std::str::FromStr;

/// Money type with 8 decimal places of internal precision.
///
/// Allocation math runs at full precision; totals are only normalized to
/// report scale (2 places) when aggregates are read back, never when they
/// are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// create from decimal
    pub fn from_decimal(d: Decimal) -> Self {
        Money(d.round_dp(8))
    }

    /// create from string with exact parsing
    pub fn from_str_exact(s: &str) -> Result<Self, rust_decimal::Error> {
        Ok(Money(Decimal::from_str(s)?.round_dp(8)))
    }

    /// create from integer amount (dollars, euros, etc)
    pub fn from_major(amount: i64) -> Self {
        Money(Decimal::from(amount))
    }

    /// create from minor amount (cents)
    pub fn from_minor(amount: i64, scale: u32) -> Self {
        let d = Decimal::from(amount) / Decimal::from(10_u64.pow(scale));
        Money(d.round_dp(8))
    }

    /// get underlying decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// round to specified decimal places
    pub fn round_dp(&self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }

    /// check if zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// check if positive
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// absolute value
    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// split evenly across a number of months, plain division
    ///
    /// No remainder redistribution: 10.00 over 3 months gives
    /// 3.33333333 per month and the rounding difference is accepted.
    pub fn split_across(&self, months: u32) -> Self {
        Money((self.0 / Decimal::from(months.max(1))).round_dp(8))
    }

    /// convert through an exchange rate
    pub fn convert(&self, rate: Rate) -> Self {
        Money((self.0 * rate.as_decimal()).round_dp(8))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::from_str_exact(s)
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money::from_decimal(d)
    }
}

impl From<i32> for Money {
    fn from(i: i32) -> Self {
        Money::from_major(i as i64)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money((self.0 + other.0).round_dp(8))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Money) {
        self.0 = (self.0 + other.0).round_dp(8);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        Money((self.0 - other.0).round_dp(8))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Money) {
        self.0 = (self.0 - other.0).round_dp(8);
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, other: Decimal) -> Money {
        Money((self.0 * other).round_dp(8))
    }
}

impl Div<Decimal> for Money {
    type Output = Money;

    fn div(self, other: Decimal) -> Money {
        Money((self.0 / other).round_dp(8))
    }
}

/// hub-relative exchange rate
///
/// Always positive; a missing rate is handled by the converter's fallback
/// policy, never represented as a zero or negative `Rate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rate(Decimal);

impl Rate {
    pub const ONE: Rate = Rate(Decimal::ONE);

    /// create from decimal (e.g., 0.92 for USD→EUR)
    pub fn from_decimal(d: Decimal) -> Self {
        Rate(d)
    }

    /// get as decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// reciprocal rate, used for the hub-inbound leg
    pub fn invert(&self) -> Rate {
        Rate(Decimal::ONE / self.0)
    }

    /// chain two legs of a hub-routed conversion
    pub fn chain(&self, other: Rate) -> Rate {
        Rate(self.0 * other.0)
    }

    /// check the rate is usable (strictly positive)
    pub fn is_valid(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::ONE
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Decimal> for Rate {
    fn from(d: Decimal) -> Self {
        Rate::from_decimal(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_precision() {
        let m = Money::from_str_exact("100.123456789").unwrap();
        assert_eq!(m.to_string(), "100.12345679"); // rounded to 8 places
    }

    #[test]
    fn test_split_plain_division() {
        let m = Money::from_str_exact("10.00").unwrap();
        let per_month = m.split_across(3);
        assert_eq!(per_month.to_string(), "3.33333333");
        // rounding difference only disappears at report scale
        let total = per_month + per_month + per_month;
        assert_eq!(total.round_dp(2).to_string(), "10.00");
    }

    #[test]
    fn test_split_exact() {
        let m = Money::from_major(30);
        assert_eq!(m.split_across(3), Money::from_major(10));
        assert_eq!(Money::from_major(120).split_across(12), Money::from_major(10));
    }

    #[test]
    fn test_rate_inversion() {
        let usd_to_eur = Rate::from_decimal(dec!(0.8));
        let eur_to_usd = usd_to_eur.invert();
        assert_eq!(eur_to_usd.as_decimal(), dec!(1.25));
    }

    #[test]
    fn test_rate_chain() {
        // EUR → hub → GBP
        let hub_from_eur = Rate::from_decimal(dec!(0.92)).invert();
        let hub_to_gbp = Rate::from_decimal(dec!(0.79));
        let eur_to_gbp = hub_from_eur.chain(hub_to_gbp);
        let amount = Money::from_major(100).convert(eur_to_gbp);
        assert_eq!(amount.round_dp(2).to_string(), "85.87");
    }

    #[test]
    fn test_report_rounding() {
        let m = Money::from_str_exact("9.995").unwrap();
        assert_eq!(m.round_dp(2).to_string(), "10.00");
    }
}
