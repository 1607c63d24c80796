//! Money types with exact minor-unit arithmetic
//!
//! Amounts are carried as `rust_decimal::Decimal` at the edges (serialization,
//! display) and converted to integer minor units (cents, yen, ...) whenever a
//! calculation must be exact to the currency's smallest unit.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CHF,
    INR,
    AUD,
    CAD,
    SGD,
    HKD,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Number of minor units in one major unit (100 for USD, 1 for JPY)
    pub fn minor_unit_factor(&self) -> i64 {
        10_i64.pow(self.decimal_places())
    }

    /// Returns the currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::JPY => "¥",
            Currency::CHF => "CHF",
            Currency::INR => "₹",
            Currency::AUD => "A$",
            Currency::CAD => "C$",
            Currency::SGD => "S$",
            Currency::HKD => "HK$",
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CHF => "CHF",
            Currency::INR => "INR",
            Currency::AUD => "AUD",
            Currency::CAD => "CAD",
            Currency::SGD => "SGD",
            Currency::HKD => "HKD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: cannot operate on {0} and {1}")]
    CurrencyMismatch(String, String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount {amount} is finer than the minor unit of {currency}")]
    SubMinorPrecision { amount: Decimal, currency: Currency },

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount with associated currency
///
/// Equality is numeric: `10.0 USD == 10.00 USD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Creates Money from an integer amount in minor units (e.g., cents)
    pub fn from_minor(minor_units: i64, currency: Currency) -> Self {
        Self {
            amount: Decimal::new(minor_units, currency.decimal_places()),
            currency,
        }
    }

    /// Creates a zero amount in the specified currency
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns the currency
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Converts to an exact count of minor units
    ///
    /// # Errors
    ///
    /// - `SubMinorPrecision` if the amount carries digits below the minor unit
    /// - `Overflow` if the value does not fit in an `i64`
    pub fn to_minor(&self) -> Result<i64, MoneyError> {
        let scaled = self
            .amount
            .checked_mul(Decimal::from(self.currency.minor_unit_factor()))
            .ok_or(MoneyError::Overflow)?;
        if !scaled.fract().is_zero() {
            return Err(MoneyError::SubMinorPrecision {
                amount: self.amount,
                currency: self.currency,
            });
        }
        scaled.trunc().to_i64().ok_or(MoneyError::Overflow)
    }

    /// Checked addition; errors on currency mismatch or overflow
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency))
    }

    /// Checked subtraction; errors on currency mismatch or overflow
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency))
    }

    /// Sums an iterator of amounts, all of which must be in `currency`
    pub fn sum<'a, I>(currency: Currency, amounts: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = &'a Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(currency), |acc, m| acc.checked_add(m))
    }

    /// Allocates the money into n equal parts, handling remainders
    ///
    /// The arithmetic is done in integer minor units. `base = floor(total / n)`
    /// and the remainder is handed out one minor unit at a time to the first
    /// allocations, so the parts always sum to the original exactly.
    pub fn allocate(&self, n: u32) -> Result<Vec<Money>, MoneyError> {
        if n == 0 {
            return Err(MoneyError::InvalidAmount(
                "Cannot allocate to zero parts".to_string(),
            ));
        }

        let total_minor = self.to_minor()?;
        let parts = i64::from(n);
        let base_amount = total_minor.div_euclid(parts);
        let remainder = total_minor.rem_euclid(parts);

        let allocations = (0..parts)
            .map(|i| {
                let minor = if i < remainder {
                    base_amount + 1
                } else {
                    base_amount
                };
                Money::from_minor(minor, self.currency)
            })
            .collect();

        Ok(allocations)
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.currency.decimal_places();
        write!(
            f,
            "{} {:.dp$}",
            self.currency.symbol(),
            self.amount,
            dp = dp as usize
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_creation() {
        let m = Money::new(dec!(100.50), Currency::USD);
        assert_eq!(m.amount(), dec!(100.50));
        assert_eq!(m.currency(), Currency::USD);
    }

    #[test]
    fn test_money_from_minor() {
        let m = Money::from_minor(10050, Currency::USD);
        assert_eq!(m.amount(), dec!(100.50));

        let yen = Money::from_minor(1200, Currency::JPY);
        assert_eq!(yen.amount(), dec!(1200));
    }

    #[test]
    fn test_to_minor() {
        assert_eq!(Money::new(dec!(10.00), Currency::USD).to_minor(), Ok(1000));
        assert_eq!(Money::new(dec!(10), Currency::USD).to_minor(), Ok(1000));
        assert_eq!(Money::new(dec!(1200), Currency::JPY).to_minor(), Ok(1200));
    }

    #[test]
    fn test_to_minor_rejects_fractional_cents() {
        let result = Money::new(dec!(10.005), Currency::USD).to_minor();
        assert!(matches!(result, Err(MoneyError::SubMinorPrecision { .. })));

        let result = Money::new(dec!(10.5), Currency::JPY).to_minor();
        assert!(matches!(result, Err(MoneyError::SubMinorPrecision { .. })));
    }

    #[test]
    fn test_to_minor_overflow_is_an_error() {
        assert_eq!(
            Money::new(Decimal::MAX, Currency::USD).to_minor(),
            Err(MoneyError::Overflow)
        );
        // Fits in a Decimal after scaling but not in an i64
        assert_eq!(
            Money::new(dec!(100000000000000000000), Currency::JPY).to_minor(),
            Err(MoneyError::Overflow)
        );
    }

    #[test]
    fn test_checked_arithmetic_overflow() {
        let max = Money::new(Decimal::MAX, Currency::EUR);
        let one = Money::new(dec!(1), Currency::EUR);
        assert_eq!(max.checked_add(&one), Err(MoneyError::Overflow));

        let min = Money::new(Decimal::MIN, Currency::EUR);
        assert_eq!(min.checked_sub(&one), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_currency_mismatch() {
        let usd = Money::new(dec!(100.00), Currency::USD);
        let eur = Money::new(dec!(100.00), Currency::EUR);

        let result = usd.checked_add(&eur);
        assert!(matches!(result, Err(MoneyError::CurrencyMismatch(_, _))));
    }

    #[test]
    fn test_numeric_equality_ignores_scale() {
        assert_eq!(
            Money::new(dec!(10.0), Currency::USD),
            Money::new(dec!(10.00), Currency::USD)
        );
    }

    #[test]
    fn test_money_allocation_ten_dollars_three_ways() {
        let m = Money::new(dec!(10.00), Currency::USD);
        let parts = m.allocate(3).unwrap();

        let amounts: Vec<_> = parts.iter().map(|p| p.amount()).collect();
        assert_eq!(amounts, vec![dec!(3.34), dec!(3.33), dec!(3.33)]);
        assert_eq!(Money::sum(Currency::USD, &parts).unwrap(), m);
    }

    #[test]
    fn test_allocate_zero_parts() {
        let m = Money::new(dec!(10.00), Currency::USD);
        assert!(matches!(m.allocate(0), Err(MoneyError::InvalidAmount(_))));
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::new(dec!(3.5), Currency::USD).to_string(), "$ 3.50");
        assert_eq!(Money::from_minor(700, Currency::JPY).to_string(), "¥ 700");
    }
}
