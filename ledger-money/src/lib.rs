#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Exact decimal money tagged by currency.
//!
//! [`Money`] wraps a [`Decimal`] with an internal scale of 4 fractional
//! digits and a [`CurrencyId`] tag. Arithmetic between mismatched
//! currencies is a programmer error ([`MoneyError::CurrencyMismatch`]);
//! bounds violations are [`MoneyError::Overflow`]. Internal algebra never
//! rounds - only [`Money::round_presentation`] rounds, using banker's
//! rounding at 2 digits.

use derive_more::Display;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Internal fixed-point scale: 4 fractional digits.
pub const INTERNAL_SCALE: u32 = 4;

/// Digits used for user-visible presentation.
pub const PRESENTATION_SCALE: u32 = 2;

/// Stable integer identifier for a [`Currency`], assigned by the snapshot store.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[display("CurrencyId({_0})")]
pub struct CurrencyId(pub u32);

impl CurrencyId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum MoneyError {
    #[error("currency mismatch: lhs={lhs} rhs={rhs}")]
    CurrencyMismatch { lhs: CurrencyId, rhs: CurrencyId },

    #[error("money arithmetic overflowed representable bounds")]
    Overflow,
}

/// An exact decimal amount tagged with the [`CurrencyId`] it is denominated in.
///
/// Equality and ordering are total, but comparing or combining two [`Money`]
/// values of different currencies is always an error - there is no implicit
/// conversion anywhere in this type.
#[derive(Debug, Copy, Clone, Deserialize, Serialize)]
pub struct Money {
    amount: Decimal,
    currency: CurrencyId,
}

impl Money {
    /// Constructs a [`Money`] value, rescaling `amount` to [`INTERNAL_SCALE`].
    pub fn new(amount: Decimal, currency: CurrencyId) -> Self {
        Self {
            amount: amount.round_dp(INTERNAL_SCALE),
            currency,
        }
    }

    pub fn zero(currency: CurrencyId) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    pub fn currency(&self) -> CurrencyId {
        self.currency
    }

    pub fn raw(&self) -> Decimal {
        self.amount
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_sign_negative(&self) -> bool {
        self.amount.is_sign_negative()
    }

    fn require_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch {
                lhs: self.currency,
                rhs: other.currency,
            })
        }
    }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        self.amount
            .checked_add(other.amount)
            .map(|amount| Money {
                amount,
                currency: self.currency,
            })
            .ok_or(MoneyError::Overflow)
    }

    pub fn sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        self.amount
            .checked_sub(other.amount)
            .map(|amount| Money {
                amount,
                currency: self.currency,
            })
            .ok_or(MoneyError::Overflow)
    }

    pub fn neg(&self) -> Money {
        Money {
            amount: -self.amount,
            currency: self.currency,
        }
    }

    /// Multiplies by a dimensionless scalar (e.g. a quantity or a ratio).
    ///
    /// Unlike [`Money::add`]/[`Money::sub`] this never rounds the result to
    /// [`INTERNAL_SCALE`] - callers combining many scaled amounts should only
    /// round once, at presentation time.
    pub fn mul_scalar(&self, scalar: Decimal) -> Result<Money, MoneyError> {
        self.amount
            .checked_mul(scalar)
            .map(|amount| Money {
                amount,
                currency: self.currency,
            })
            .ok_or(MoneyError::Overflow)
    }

    /// Rounds to [`PRESENTATION_SCALE`] digits using banker's rounding
    /// (round-half-to-even). Never used internally - only for display.
    pub fn round_presentation(&self) -> Decimal {
        self.amount
            .round_dp_with_strategy(PRESENTATION_SCALE, RoundingStrategy::MidpointNearestEven)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.currency == other.currency && self.amount == other.amount
    }
}

impl Eq for Money {}

impl PartialOrd for Money {
    /// Returns `None` when currencies differ - there is no total order
    /// across currencies.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        (self.currency == other.currency).then(|| self.amount.cmp(&other.amount))
    }
}
