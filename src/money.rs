//! Currency-tagged decimal amounts.
//!
//! All aggregation arithmetic keeps full `rust_decimal` precision; rounding
//! happens exactly once, at output time, via [`Money::rounded`] with
//! round-half-up. Mixing currencies in one operation is an error, never a
//! silent coercion.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};

/// Output scale for money figures.
const MONEY_SCALE: u32 = 2;

/// A three-letter uppercase currency code (ISO 4217 style).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> CoreResult<Self> {
        let code = code.trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::Validation(format!(
                "invalid currency code '{code}'"
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value).map_err(|e| e.to_string())
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount in a single currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    fn require_same_currency(&self, other: &Money) -> CoreResult<()> {
        if self.currency != other.currency {
            return Err(CoreError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        Ok(())
    }

    pub fn add(&self, other: &Money) -> CoreResult<Money> {
        self.require_same_currency(other)?;
        Ok(Money::new(self.amount + other.amount, self.currency.clone()))
    }

    pub fn sub(&self, other: &Money) -> CoreResult<Money> {
        self.require_same_currency(other)?;
        Ok(Money::new(self.amount - other.amount, self.currency.clone()))
    }

    /// Multiply by a quantity (line items).
    pub fn times(&self, quantity: u32) -> Money {
        Money::new(self.amount * Decimal::from(quantity), self.currency.clone())
    }

    /// `rate` percent of this amount, full precision retained.
    pub fn percent(&self, rate: Decimal) -> Money {
        Money::new(
            self.amount * rate / Decimal::ONE_HUNDRED,
            self.currency.clone(),
        )
    }

    /// Round to the output scale, half-up. Call once, on the final figure.
    pub fn rounded(&self) -> Money {
        Money::new(
            self.amount
                .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero),
            self.currency.clone(),
        )
    }

    /// Totals never go below zero.
    pub fn clamp_non_negative(&self) -> Money {
        if self.amount.is_sign_negative() {
            Money::zero(self.currency.clone())
        } else {
            self.clone()
        }
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for Money {
    /// `"25.00 EUR"` — no locale conversion; that is a presentation concern.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.rounded().amount, self.currency)
    }
}
