//! The Option Pair Matcher (C3, spec.md §4.3).
//!
//! Maintains, per [`ContractKey`], a FIFO queue of open option legs and pairs
//! closing/terminal movements against them, splitting each movement's
//! `netPremium` into a realized and an unrealized contribution. This is the
//! only component that understands option-specific economics; everything
//! downstream consumes its output as plain [`Money`].
//!
//! One [`OptionBook`] is owned by a single (ticker, currency) projector; it
//! is not shared across tickers or currencies.

use ledger_model::{ContractKey, OptionCode, OptionTrade};
use ledger_money::{CurrencyId, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

use crate::config::PairingMode;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum MatchError {
    #[error("{contract_key:?}: negative close quantity {quantity}")]
    NegativeQuantity {
        contract_key: ContractKey,
        quantity: Decimal,
    },

    #[error("option premium arithmetic overflowed: {0}")]
    Overflow(#[from] ledger_money::MoneyError),
}

/// Which side originally opened a leg.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum LegDirection {
    /// Opened by `BuyToOpen` - a long option position.
    Long,
    /// Opened by `SellToOpen` - a short (written) option position.
    Short,
}

/// One unconsumed (or partially consumed) open leg in a [`ContractKey`] queue.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OpenLeg {
    pub direction: LegDirection,
    pub contracts_remaining: Decimal,
    /// Net premium attributable to `contracts_remaining`, proportional to it
    /// (spec.md §4.3).
    pub net_premium_remaining: Money,
}

impl OpenLeg {
    /// Splits off the premium proportional to `contracts`, leaving the rest
    /// on this leg.
    fn take(&mut self, contracts: Decimal) -> Result<Money, ledger_money::MoneyError> {
        let fraction = contracts / self.contracts_remaining;
        let taken = self.net_premium_remaining.mul_scalar(fraction)?;
        self.contracts_remaining -= contracts;
        self.net_premium_remaining = self.net_premium_remaining.sub(&taken)?;
        Ok(taken)
    }
}

/// The outcome of applying one [`OptionTrade`] movement to the book.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub contract_key: ContractKey,
    pub contracts_opened: Decimal,
    pub contracts_closed: Decimal,
    /// Realized P&L recognised by this movement alone.
    pub realized: Money,
}

/// The direction a code would open, were it an opening code - used both to
/// classify `BuyToOpen`/`SellToOpen` and, for closes, to decide which
/// direction a flip residual opens as.
fn own_direction(code: OptionCode) -> LegDirection {
    match code {
        OptionCode::BuyToOpen | OptionCode::BuyToClose => LegDirection::Long,
        OptionCode::SellToOpen | OptionCode::SellToClose => LegDirection::Short,
        OptionCode::Expired | OptionCode::Assigned => {
            unreachable!("terminal codes never call own_direction")
        }
    }
}

/// The leg direction a closing code consumes: `BuyToClose` closes a `Short`
/// leg (the position it wrote), `SellToClose` closes a `Long` leg
/// (spec.md §4.3: "consume open legs of the opposite direction").
fn target_direction(code: OptionCode) -> LegDirection {
    match own_direction(code) {
        LegDirection::Long => LegDirection::Short,
        LegDirection::Short => LegDirection::Long,
    }
}

/// Per-[`ContractKey`] FIFO books of open option legs for one
/// (ticker, currency) pair.
///
/// Rebuilt by replaying a ticker/currency's option movements in chronological
/// order; the recomputation manager persists it alongside the public
/// [`ledger_model::TickerCurrencySnapshot`] so a later targeted recompute can
/// resume from a prior date instead of replaying full history.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OptionBook {
    queues: HashMap<ContractKey, VecDeque<OpenLeg>>,
}

impl OptionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_contracts(&self, key: &ContractKey) -> Decimal {
        self.queues
            .get(key)
            .map(|q| q.iter().map(|leg| leg.contracts_remaining).sum())
            .unwrap_or(Decimal::ZERO)
    }

    pub fn has_open(&self, key: &ContractKey) -> bool {
        self.queues.get(key).is_some_and(|q| !q.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(|q| q.is_empty())
    }

    /// Total open contracts across every key in this book.
    pub fn total_open_contracts(&self) -> Decimal {
        self.queues
            .values()
            .flatten()
            .map(|leg| leg.contracts_remaining)
            .sum()
    }

    /// Sum of `netPremiumRemaining` over every open leg of every key in this
    /// book - the `unrealizedCurrent` the TickerCurrency Projector re-reads
    /// on each fold step (spec.md §4.4, "re-read from C3 state, not
    /// accumulated").
    pub fn total_open_premium(&self, currency: CurrencyId) -> Result<Money, ledger_money::MoneyError> {
        let mut total = Money::zero(currency);
        for leg in self.queues.values().flatten() {
            total = total.add(&leg.net_premium_remaining)?;
        }
        Ok(total)
    }

    /// Applies one [`OptionTrade`] movement, mutating the book and returning
    /// the realized delta it alone contributes.
    pub fn apply(
        &mut self,
        trade: &OptionTrade,
        pairing_mode: PairingMode,
    ) -> Result<MatchOutcome, MatchError> {
        let key = trade.contract_key();

        if trade.code.is_open() {
            let leg = OpenLeg {
                direction: own_direction(trade.code),
                contracts_remaining: trade.quantity,
                net_premium_remaining: Money::new(trade.net_premium(), trade.currency),
            };
            self.queues.entry(key.clone()).or_default().push_back(leg);
            return Ok(MatchOutcome {
                contract_key: key,
                contracts_opened: trade.quantity,
                contracts_closed: Decimal::ZERO,
                realized: Money::zero(trade.currency),
            });
        }

        if trade.code.is_terminal() {
            return self.apply_terminal(trade, &key);
        }

        self.apply_close(trade, &key, pairing_mode)
    }

    /// `Expired`/`Assigned`: clears the key's entire remaining queue
    /// regardless of direction; every stored leg premium becomes fully
    /// realized with its stored sign preserved (spec.md §4.3: "short expired
    /// = profit to seller; long expired = loss to buyer").
    fn apply_terminal(
        &mut self,
        trade: &OptionTrade,
        key: &ContractKey,
    ) -> Result<MatchOutcome, MatchError> {
        let queue = self.queues.entry(key.clone()).or_default();
        let mut realized = Money::zero(trade.currency);
        let mut contracts_closed = Decimal::ZERO;
        for leg in queue.drain(..) {
            realized = realized.add(&leg.net_premium_remaining)?;
            contracts_closed += leg.contracts_remaining;
        }
        Ok(MatchOutcome {
            contract_key: key.clone(),
            contracts_opened: Decimal::ZERO,
            contracts_closed,
            realized,
        })
    }

    fn apply_close(
        &mut self,
        trade: &OptionTrade,
        key: &ContractKey,
        pairing_mode: PairingMode,
    ) -> Result<MatchOutcome, MatchError> {
        if trade.quantity.is_sign_negative() {
            return Err(MatchError::NegativeQuantity {
                contract_key: key.clone(),
                quantity: trade.quantity,
            });
        }

        let close_net_premium = Money::new(trade.net_premium(), trade.currency);
        let requested = trade.quantity;
        let mut remaining = requested;
        let mut matched = Decimal::ZERO;
        let mut realized = Money::zero(trade.currency);

        let target = target_direction(trade.code);
        let queue = self.queues.entry(key.clone()).or_default();

        // Drain legs this close is entitled to consume - under Matched
        // pairing only legs of the opposite direction; under MovementSide,
        // any leg FIFO, "independent of matching" (spec.md §9).
        while !remaining.is_zero() {
            let eligible = match pairing_mode {
                PairingMode::Matched => queue.front().is_some_and(|leg| leg.direction == target),
                PairingMode::MovementSide => queue.front().is_some(),
            };
            if !eligible {
                break;
            }
            let leg = queue.front_mut().expect("checked Some above");
            let take = remaining.min(leg.contracts_remaining);
            let open_portion = leg.take(take)?;
            if leg.contracts_remaining.is_zero() {
                queue.pop_front();
            }

            match pairing_mode {
                // Matched: realized is the paired open+close premium for the
                // contracts actually consumed (spec.md §4.3).
                PairingMode::Matched => {
                    let close_portion = close_net_premium.mul_scalar(take / requested)?;
                    realized = realized.add(&open_portion)?.add(&close_portion)?;
                }
                // MovementSide: the open leg's stored premium is simply
                // dropped from the book; realized is assigned below from the
                // close's own premium, independent of what was drained
                // (spec.md §9 compatibility convention).
                PairingMode::MovementSide => {}
            }

            matched += take;
            remaining -= take;
        }

        if pairing_mode == PairingMode::MovementSide {
            // The close's own premium is realized in full, regardless of how
            // much of the book it actually drained.
            realized = close_net_premium;
        } else if !remaining.is_zero() {
            // Matched pairing: a flip - the surplus becomes a new open leg
            // in the close's own direction (spec.md §4.3, permissive mode).
            let residual_premium = close_net_premium.mul_scalar(remaining / requested)?;
            queue.push_back(OpenLeg {
                direction: own_direction(trade.code),
                contracts_remaining: remaining,
                net_premium_remaining: residual_premium,
            });
        }

        Ok(MatchOutcome {
            contract_key: key.clone(),
            contracts_opened: if pairing_mode == PairingMode::Matched {
                requested - matched
            } else {
                Decimal::ZERO
            },
            contracts_closed: matched,
            realized,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_model::{CurrencyId as ModelCurrencyId, OptionType, TickerId};
    use rust_decimal_macros::dec;

    fn ticker() -> TickerId {
        TickerId(1)
    }

    fn usd() -> ModelCurrencyId {
        ModelCurrencyId(1)
    }

    fn contract_key() -> ContractKey {
        ContractKey {
            ticker: ticker(),
            option_type: OptionType::Put,
            strike: dec!(8.0),
            expiration: chrono::NaiveDate::from_ymd_opt(2024, 6, 7).unwrap(),
        }
    }

    fn sell_to_open() -> OptionTrade {
        OptionTrade {
            ticker: ticker(),
            currency: usd(),
            code: OptionCode::SellToOpen,
            option_type: OptionType::Put,
            strike: dec!(8.0),
            expiration: chrono::NaiveDate::from_ymd_opt(2024, 6, 7).unwrap(),
            quantity: dec!(1),
            premium_per_share: dec!(0.1386),
            multiplier: dec!(100),
            commissions: dec!(0),
            fees: dec!(0),
            notes: None,
        }
    }

    // S1: put sold then expired worthless - full premium is realized gain.
    #[test]
    fn sell_to_open_then_expired_realizes_full_premium() {
        let mut book = OptionBook::new();
        let open = sell_to_open();
        let outcome = book.apply(&open, PairingMode::Matched).unwrap();
        assert_eq!(outcome.contracts_opened, dec!(1));
        assert!(book.has_open(&contract_key()));
        assert_eq!(
            book.total_open_premium(usd()).unwrap().raw(),
            dec!(13.86)
        );

        let expired = OptionTrade {
            code: OptionCode::Expired,
            quantity: Decimal::ZERO,
            premium_per_share: Decimal::ZERO,
            ..sell_to_open()
        };
        let outcome = book.apply(&expired, PairingMode::Matched).unwrap();
        assert_eq!(outcome.realized.raw(), dec!(13.86));
        assert!(!book.has_open(&contract_key()));
        assert!(book.total_open_premium(usd()).unwrap().is_zero());
    }

    // S2: buy-to-open then sell-to-close with profit.
    #[test]
    fn buy_to_open_then_sell_to_close_realizes_profit() {
        let mut book = OptionBook::new();
        let open = OptionTrade {
            code: OptionCode::BuyToOpen,
            quantity: dec!(1),
            premium_per_share: dec!(5.54),
            multiplier: dec!(100),
            commissions: dec!(1.00),
            fees: dec!(0.12),
            ..sell_to_open()
        };
        let outcome = book.apply(&open, PairingMode::Matched).unwrap();
        assert_eq!(outcome.contracts_opened, dec!(1));
        assert_eq!(
            book.total_open_premium(usd()).unwrap().raw(),
            dec!(-555.12)
        );

        let close = OptionTrade {
            code: OptionCode::SellToClose,
            quantity: dec!(1),
            premium_per_share: dec!(7.45),
            multiplier: dec!(100),
            ..sell_to_open()
        };
        let outcome = book.apply(&close, PairingMode::Matched).unwrap();
        assert_eq!(outcome.realized.raw(), dec!(189.76));
    }

    // S4: two SellToOpen at $20 then $30, one BuyToClose at -$15; realized
    // from the first-opened leg only: 20 + (-15) = 5; remaining leg keeps $30.
    #[test]
    fn multi_contract_fifo_matches_oldest_leg_first() {
        let mut book = OptionBook::new();
        let first_open = OptionTrade {
            code: OptionCode::SellToOpen,
            quantity: dec!(1),
            premium_per_share: dec!(0.20),
            multiplier: dec!(100),
            ..sell_to_open()
        };
        book.apply(&first_open, PairingMode::Matched).unwrap();

        let second_open = OptionTrade {
            code: OptionCode::SellToOpen,
            quantity: dec!(1),
            premium_per_share: dec!(0.30),
            multiplier: dec!(100),
            ..sell_to_open()
        };
        book.apply(&second_open, PairingMode::Matched).unwrap();
        assert_eq!(book.open_contracts(&contract_key()), dec!(2));

        let close = OptionTrade {
            code: OptionCode::BuyToClose,
            quantity: dec!(1),
            premium_per_share: dec!(0.15),
            multiplier: dec!(100),
            ..sell_to_open()
        };
        let outcome = book.apply(&close, PairingMode::Matched).unwrap();
        assert_eq!(outcome.realized.raw(), dec!(5.00));
        assert_eq!(book.open_contracts(&contract_key()), dec!(1));
        assert_eq!(
            book.total_open_premium(usd()).unwrap().raw(),
            dec!(30.00)
        );
    }

    #[test]
    fn close_exceeding_open_legs_flips_to_new_leg() {
        let mut book = OptionBook::new();
        let open = OptionTrade {
            code: OptionCode::SellToOpen,
            quantity: dec!(1),
            premium_per_share: dec!(0.10),
            multiplier: dec!(100),
            ..sell_to_open()
        };
        book.apply(&open, PairingMode::Matched).unwrap();

        let close = OptionTrade {
            code: OptionCode::BuyToClose,
            quantity: dec!(3),
            premium_per_share: dec!(0.05),
            multiplier: dec!(100),
            ..sell_to_open()
        };
        let outcome = book.apply(&close, PairingMode::Matched).unwrap();
        assert_eq!(outcome.contracts_closed, dec!(1));
        assert_eq!(outcome.contracts_opened, dec!(2));
        // 2 residual contracts now open Long (bought without a short to close).
        assert_eq!(book.open_contracts(&contract_key()), dec!(2));
    }

    #[test]
    fn movement_side_realizes_close_premium_directly() {
        let mut book = OptionBook::new();
        let open = OptionTrade {
            code: OptionCode::SellToOpen,
            quantity: dec!(1),
            premium_per_share: dec!(0.20),
            multiplier: dec!(100),
            ..sell_to_open()
        };
        book.apply(&open, PairingMode::MovementSide).unwrap();

        let close = OptionTrade {
            code: OptionCode::BuyToClose,
            quantity: dec!(1),
            premium_per_share: dec!(0.05),
            multiplier: dec!(100),
            ..sell_to_open()
        };
        let outcome = book.apply(&close, PairingMode::MovementSide).unwrap();
        // realized is the close's own premium, not open+close combined.
        assert_eq!(outcome.realized.raw(), dec!(-5.00));
    }
}
