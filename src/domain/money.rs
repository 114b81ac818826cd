use crate::error::{ChargeError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A monetary value in minor currency units (e.g. cents).
///
/// All charge arithmetic happens on this type. Subtraction floors at zero and
/// every operation that can grow the value is checked.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(pub u64);

impl Money {
    pub const ZERO: Self = Self(0);

    pub fn new(minor_units: u64) -> Self {
        Self(minor_units)
    }

    pub fn minor_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self> {
        self.0.checked_add(rhs.0).map(Self).ok_or_else(overflow)
    }

    pub fn checked_mul(self, quantity: u32) -> Result<Self> {
        self.0
            .checked_mul(u64::from(quantity))
            .map(Self)
            .ok_or_else(overflow)
    }

    /// Subtracts `rhs`, flooring at zero.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Returns `self * numerator / denominator`, rounded half-up.
    pub fn prorate(self, numerator: Money, denominator: Money) -> Result<Self> {
        if denominator.is_zero() {
            return Ok(Self::ZERO);
        }
        let scaled = Decimal::from(self.0)
            .checked_mul(Decimal::from(numerator.0))
            .ok_or_else(overflow)?
            .checked_div(Decimal::from(denominator.0))
            .ok_or_else(overflow)?;
        round_half_up(scaled)
    }

    fn as_decimal(self) -> Decimal {
        Decimal::from(self.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Money {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

fn overflow() -> ChargeError {
    ChargeError::ValidationError("Amount exceeds the representable range".to_string())
}

/// Rounds a non-negative decimal to whole minor units, half-up.
fn round_half_up(value: Decimal) -> Result<Money> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .map(Money)
        .ok_or_else(overflow)
}

/// A non-negative percentage rate, e.g. `10` for ten percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

    pub fn new(value: Decimal) -> Result<Self> {
        if value < Decimal::ZERO {
            return Err(ChargeError::ValidationError(format!(
                "Percentage must not be negative, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// The rate applied to `amount`: `round(amount * rate / 100)`.
    pub fn of(&self, amount: Money) -> Result<Money> {
        let portion = amount
            .as_decimal()
            .checked_mul(self.0)
            .ok_or_else(overflow)?
            / Self::HUNDRED;
        round_half_up(portion)
    }

    /// The tax already embedded in a `gross` amount at this rate:
    /// `gross - round(gross * 100 / (100 + rate))`.
    pub fn embedded_in(&self, gross: Money) -> Result<Money> {
        let net = gross
            .as_decimal()
            .checked_mul(Self::HUNDRED)
            .ok_or_else(overflow)?
            .checked_div(Self::HUNDRED + self.0)
            .ok_or_else(overflow)?;
        Ok(gross.saturating_sub(round_half_up(net)?))
    }
}

impl TryFrom<Decimal> for Percentage {
    type Error = ChargeError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Percentage> for Decimal {
    fn from(rate: Percentage) -> Self {
        rate.0
    }
}

/// ISO-4217 style currency code, three upper-case ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim().to_ascii_uppercase();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(ChargeError::ValidationError(format!(
                "Invalid currency code '{}'",
                code
            )))
        }
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self("USD".to_string())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = ChargeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = ChargeError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}
