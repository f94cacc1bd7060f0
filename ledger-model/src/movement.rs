//! The tagged-variant [`Movement`] model (spec.md §4.2, §9).
//!
//! A `Movement` carries exactly one payload variant - never the
//! optional-bundle-of-every-field shape some import formats use - so that a
//! consumer matching exhaustively on [`MovementKind`] can never observe a
//! state that mixes fields from two kinds.

use crate::ids::{BrokerAccountId, CurrencyId, MovementId, TickerId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum MovementError {
    #[error("movement quantity must be > 0, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("movement monetary field must be >= 0, got {0}")]
    NegativeMonetaryField(Decimal),

    #[error("option expiration {expiration} is before trade date {trade_date}")]
    ExpirationBeforeTradeDate {
        expiration: NaiveDate,
        trade_date: NaiveDate,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum BrokerMovementKind {
    Deposit,
    Withdrawal,
    Fee,
    Interest,
    BalanceAdjustment,
    Conversion,
    AcatIn,
    AcatOut,
}

/// Present only when `kind == Conversion`: the currency debited and the
/// amount of it that was converted away.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConversionSource {
    pub from_currency: CurrencyId,
    pub amount_changed: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BrokerMovement {
    pub kind: BrokerMovementKind,
    pub amount: Decimal,
    pub currency: CurrencyId,
    pub commissions: Decimal,
    pub fees: Decimal,
    pub conversion: Option<ConversionSource>,
    pub ticker: Option<TickerId>,
}

impl BrokerMovement {
    fn validate(&self) -> Result<(), MovementError> {
        for field in [self.amount, self.commissions, self.fees] {
            if field.is_sign_negative() {
                return Err(MovementError::NegativeMonetaryField(field));
            }
        }
        if let Some(conversion) = &self.conversion {
            if conversion.amount_changed.is_sign_negative() {
                return Err(MovementError::NegativeMonetaryField(
                    conversion.amount_changed,
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Trade {
    pub ticker: TickerId,
    pub currency: CurrencyId,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price_per_share: Decimal,
    pub commissions: Decimal,
    pub fees: Decimal,
}

impl Trade {
    fn validate(&self) -> Result<(), MovementError> {
        if self.quantity <= Decimal::ZERO {
            return Err(MovementError::NonPositiveQuantity(self.quantity));
        }
        for field in [self.price_per_share, self.commissions, self.fees] {
            if field.is_sign_negative() {
                return Err(MovementError::NegativeMonetaryField(field));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum OptionCode {
    BuyToOpen,
    SellToOpen,
    BuyToClose,
    SellToClose,
    Expired,
    Assigned,
}

impl OptionCode {
    /// Whether this code opens a new leg (as opposed to consuming or
    /// clearing existing ones).
    pub fn is_open(&self) -> bool {
        matches!(self, Self::BuyToOpen | Self::SellToOpen)
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Self::BuyToClose | Self::SellToClose)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Assigned)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum OptionType {
    Call,
    Put,
}

/// Identity under which option open legs are FIFO-matched: independent of
/// trade direction (spec.md §3, §4.3).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct ContractKey {
    pub ticker: TickerId,
    pub option_type: OptionType,
    pub strike: Decimal,
    pub expiration: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OptionTrade {
    pub ticker: TickerId,
    pub currency: CurrencyId,
    pub code: OptionCode,
    pub option_type: OptionType,
    pub strike: Decimal,
    pub expiration: NaiveDate,
    /// Number of contracts. Zero is valid only for `Expired`/`Assigned`
    /// movements recorded purely to clear a key (quantity is then inferred
    /// by the matcher from the open queue).
    pub quantity: Decimal,
    pub premium_per_share: Decimal,
    pub multiplier: Decimal,
    pub commissions: Decimal,
    pub fees: Decimal,
    pub notes: Option<String>,
}

impl OptionTrade {
    pub fn contract_key(&self) -> ContractKey {
        ContractKey {
            ticker: self.ticker,
            option_type: self.option_type,
            strike: self.strike,
            expiration: self.expiration,
        }
    }

    /// The gross premium flow for this movement, before commissions/fees:
    /// `quantity * premium_per_share * multiplier`, signed so that selling
    /// premium (SellToOpen/SellToClose) is a credit and buying premium is a
    /// debit. `Expired`/`Assigned` carry no premium flow of their own - the
    /// matcher realizes the *existing* open legs' premium instead.
    pub fn gross_premium(&self) -> Decimal {
        let magnitude = self.quantity * self.premium_per_share * self.multiplier;
        match self.code {
            OptionCode::SellToOpen | OptionCode::SellToClose => magnitude,
            OptionCode::BuyToOpen | OptionCode::BuyToClose => -magnitude,
            OptionCode::Expired | OptionCode::Assigned => Decimal::ZERO,
        }
    }

    /// Gross premium net of commissions and fees - the quantity the spec
    /// calls `netPremium` (spec.md §4.3, §4.4).
    pub fn net_premium(&self) -> Decimal {
        self.gross_premium() - self.commissions - self.fees
    }

    fn validate(&self, trade_date: NaiveDate) -> Result<(), MovementError> {
        if self.code.is_open() || self.code.is_close() {
            if self.quantity <= Decimal::ZERO {
                return Err(MovementError::NonPositiveQuantity(self.quantity));
            }
        } else if self.quantity.is_sign_negative() {
            return Err(MovementError::NonPositiveQuantity(self.quantity));
        }
        for field in [
            self.strike,
            self.premium_per_share,
            self.multiplier,
            self.commissions,
            self.fees,
        ] {
            if field.is_sign_negative() {
                return Err(MovementError::NegativeMonetaryField(field));
            }
        }
        if self.expiration < trade_date {
            return Err(MovementError::ExpirationBeforeTradeDate {
                expiration: self.expiration,
                trade_date,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Dividend {
    pub ticker: TickerId,
    pub currency: CurrencyId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DividendTax {
    pub ticker: TickerId,
    pub currency: CurrencyId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DividendDate {
    pub ticker: TickerId,
    pub ex_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum MovementKind {
    Broker(BrokerMovement),
    Trade(Trade),
    OptionTrade(OptionTrade),
    Dividend(Dividend),
    DividendTax(DividendTax),
    DividendDate(DividendDate),
}

/// A single persisted event in an account's ledger - the atomic input to
/// projection (spec.md §3).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Movement {
    pub id: MovementId,
    pub broker_account_id: BrokerAccountId,
    pub timestamp: NaiveDate,
    pub kind: MovementKind,
}

impl Movement {
    pub fn validate(&self) -> Result<(), MovementError> {
        match &self.kind {
            MovementKind::Broker(m) => m.validate(),
            MovementKind::Trade(m) => m.validate(),
            MovementKind::OptionTrade(m) => m.validate(self.timestamp),
            MovementKind::Dividend(m) => {
                if m.amount.is_sign_negative() {
                    Err(MovementError::NegativeMonetaryField(m.amount))
                } else {
                    Ok(())
                }
            }
            MovementKind::DividendTax(m) => {
                if m.amount.is_sign_negative() {
                    Err(MovementError::NegativeMonetaryField(m.amount))
                } else {
                    Ok(())
                }
            }
            MovementKind::DividendDate(_) => Ok(()),
        }
    }

    pub fn ticker(&self) -> Option<TickerId> {
        match &self.kind {
            MovementKind::Broker(m) => m.ticker,
            MovementKind::Trade(m) => Some(m.ticker),
            MovementKind::OptionTrade(m) => Some(m.ticker),
            MovementKind::Dividend(m) => Some(m.ticker),
            MovementKind::DividendTax(m) => Some(m.ticker),
            MovementKind::DividendDate(m) => Some(m.ticker),
        }
    }

    pub fn currency(&self) -> Option<CurrencyId> {
        match &self.kind {
            MovementKind::Broker(m) => Some(m.currency),
            MovementKind::Trade(m) => Some(m.currency),
            MovementKind::OptionTrade(m) => Some(m.currency),
            MovementKind::Dividend(m) => Some(m.currency),
            MovementKind::DividendTax(m) => Some(m.currency),
            MovementKind::DividendDate(_) => None,
        }
    }

    pub fn account(&self) -> BrokerAccountId {
        self.broker_account_id
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp
    }

    /// Total count of distinct persisted movement rows this represents - always 1.
    /// Exists so callers summing `MovementCounter` contributions don't need
    /// to special-case the variant (spec.md §3 invariant 1).
    pub fn counts_as(&self) -> u64 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn currency() -> CurrencyId {
        CurrencyId(1)
    }

    fn ticker() -> TickerId {
        TickerId(1)
    }

    #[test]
    fn trade_rejects_non_positive_quantity() {
        let trade = Trade {
            ticker: ticker(),
            currency: currency(),
            side: TradeSide::Buy,
            quantity: dec!(0),
            price_per_share: dec!(1),
            commissions: dec!(0),
            fees: dec!(0),
        };
        assert!(matches!(
            trade.validate(),
            Err(MovementError::NonPositiveQuantity(_))
        ));
    }

    #[test]
    fn option_trade_rejects_expiration_before_trade_date() {
        let trade_date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let option = OptionTrade {
            ticker: ticker(),
            currency: currency(),
            code: OptionCode::SellToOpen,
            option_type: OptionType::Put,
            strike: dec!(8.0),
            expiration: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            quantity: dec!(1),
            premium_per_share: dec!(0.1386),
            multiplier: dec!(100),
            commissions: dec!(0),
            fees: dec!(0),
            notes: None,
        };
        assert!(matches!(
            option.validate(trade_date),
            Err(MovementError::ExpirationBeforeTradeDate { .. })
        ));
    }

    #[test]
    fn net_premium_sell_to_open_is_credit() {
        // S1 scenario: SellToOpen 1 contract @ 0.1386/share, multiplier 100 => 13.86
        let option = OptionTrade {
            ticker: ticker(),
            currency: currency(),
            code: OptionCode::SellToOpen,
            option_type: OptionType::Put,
            strike: dec!(8.0),
            expiration: NaiveDate::from_ymd_opt(2024, 6, 7).unwrap(),
            quantity: dec!(1),
            premium_per_share: dec!(0.1386),
            multiplier: dec!(100),
            commissions: dec!(0),
            fees: dec!(0),
            notes: None,
        };
        assert_eq!(option.net_premium(), dec!(13.86));
    }
}
