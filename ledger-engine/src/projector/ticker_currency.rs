//! TickerCurrency Projector (C4, spec.md §4.4).

use chrono::NaiveDate;
use ledger_model::{CurrencyId, Movement, MovementKind, TickerCurrencySnapshot, TickerId};
use ledger_money::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::PairingMode;
use crate::error::EngineError;
use crate::matcher::OptionBook;
use crate::projector::EPSILON;

/// State carried forward across dates for one (ticker, currency) pair -
/// persisted by the store alongside the public snapshot series so targeted
/// recomputation can resume without replaying full history.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TickerCurrencyState {
    pub total_shares: Decimal,
    pub cost_basis: Money,
    pub real_cost: Money,
    pub dividends_cumulative: Money,
    pub options_cumulative: Money,
    pub realized_cumulative: Money,
    pub book: OptionBook,
}

impl TickerCurrencyState {
    pub fn zero(currency: CurrencyId) -> Self {
        Self {
            total_shares: Decimal::ZERO,
            cost_basis: Money::zero(currency),
            real_cost: Money::zero(currency),
            dividends_cumulative: Money::zero(currency),
            options_cumulative: Money::zero(currency),
            realized_cumulative: Money::zero(currency),
            book: OptionBook::new(),
        }
    }
}

/// Result of projecting one (ticker, currency) pair over a batch of
/// movements: the dense dated series plus the ending state, to be persisted
/// as the next recomputation's seed.
#[derive(Debug, Clone)]
pub struct ProjectionResult {
    pub snapshots: Vec<TickerCurrencySnapshot>,
    pub ending_state: TickerCurrencyState,
}

/// Folds `movements` (already filtered to one (ticker, currency) pair and
/// sorted ascending by `(timestamp, id)`) starting from `seed`, producing one
/// snapshot per distinct event date plus a carry-forward snapshot at `today`
/// if `today` is later than the last event date (spec.md §4.4).
pub fn project(
    ticker_id: TickerId,
    currency_id: CurrencyId,
    seed: TickerCurrencyState,
    movements: &[Movement],
    latest_price: Option<Money>,
    today: NaiveDate,
    pairing_mode: PairingMode,
) -> Result<ProjectionResult, EngineError> {
    let mut state = seed;
    let mut snapshots = Vec::new();
    let mut last_event_date = None;

    let mut index = 0;
    while index < movements.len() {
        let date = movements[index].date();
        let mut day_end = index;
        while day_end < movements.len() && movements[day_end].date() == date {
            day_end += 1;
        }

        for movement in &movements[index..day_end] {
            apply_movement(&mut state, movement, currency_id, pairing_mode)?;
        }

        snapshots.push(snapshot_at(
            ticker_id,
            currency_id,
            date,
            &state,
            latest_price,
        )?);
        last_event_date = Some(date);
        index = day_end;
    }

    let needs_carry_forward = match last_event_date {
        Some(last) => today > last,
        None => true,
    };
    if needs_carry_forward {
        snapshots.push(snapshot_at(
            ticker_id,
            currency_id,
            today,
            &state,
            latest_price,
        )?);
    }

    Ok(ProjectionResult {
        snapshots,
        ending_state: state,
    })
}

fn apply_movement(
    state: &mut TickerCurrencyState,
    movement: &Movement,
    currency_id: CurrencyId,
    pairing_mode: PairingMode,
) -> Result<(), EngineError> {
    match &movement.kind {
        MovementKind::Trade(trade) => {
            let gross = Money::new(trade.quantity * trade.price_per_share, currency_id);
            let costs = Money::new(trade.commissions + trade.fees, currency_id);
            match trade.side {
                ledger_model::TradeSide::Buy => {
                    state.total_shares += trade.quantity;
                    state.cost_basis = state.cost_basis.add(&gross)?.add(&costs)?;
                    state.real_cost = average_cost(&state.cost_basis, state.total_shares)?;
                }
                ledger_model::TradeSide::Sell => {
                    let cost_of_sold = state.real_cost.mul_scalar(trade.quantity)?;
                    let realized_delta = gross.sub(&cost_of_sold)?.sub(&costs)?;
                    state.realized_cumulative = state.realized_cumulative.add(&realized_delta)?;
                    state.total_shares -= trade.quantity;
                    state.cost_basis = state.cost_basis.sub(&cost_of_sold)?;
                    state.real_cost = average_cost(&state.cost_basis, state.total_shares)?;
                }
            }
            if state.total_shares.abs() < EPSILON {
                state.total_shares = Decimal::ZERO;
                state.cost_basis = Money::zero(currency_id);
                state.real_cost = Money::zero(currency_id);
            }
        }
        MovementKind::OptionTrade(option) => {
            let outcome = state.book.apply(option, pairing_mode)?;
            state.options_cumulative = state
                .options_cumulative
                .add(&Money::new(option.net_premium(), currency_id))?;
            state.realized_cumulative = state.realized_cumulative.add(&outcome.realized)?;
        }
        MovementKind::Dividend(dividend) => {
            state.dividends_cumulative = state
                .dividends_cumulative
                .add(&Money::new(dividend.amount, currency_id))?;
        }
        MovementKind::DividendTax(tax) => {
            state.dividends_cumulative = state
                .dividends_cumulative
                .sub(&Money::new(tax.amount, currency_id))?;
        }
        MovementKind::DividendDate(_) | MovementKind::Broker(_) => {}
    }
    Ok(())
}

fn average_cost(cost_basis: &Money, total_shares: Decimal) -> Result<Money, EngineError> {
    if total_shares.abs() < EPSILON {
        return Ok(Money::zero(cost_basis.currency()));
    }
    Ok(cost_basis.mul_scalar(Decimal::ONE / total_shares)?)
}

fn snapshot_at(
    ticker_id: TickerId,
    currency_id: CurrencyId,
    date: NaiveDate,
    state: &TickerCurrencyState,
    latest_price: Option<Money>,
) -> Result<TickerCurrencySnapshot, EngineError> {
    let unrealized = state.book.total_open_premium(currency_id)?;
    let total_incomes = state
        .realized_cumulative
        .add(&unrealized)?
        .add(&state.dividends_cumulative)?;

    let denominator = state.cost_basis.raw().abs() + unrealized.raw().abs();
    let performance = if denominator > EPSILON {
        (total_incomes.raw() / denominator) * Decimal::from(100)
    } else {
        Decimal::ZERO
    };

    let open_trades =
        state.book.total_open_contracts() > Decimal::ZERO || state.total_shares > Decimal::ZERO;

    Ok(TickerCurrencySnapshot {
        ticker_id,
        currency_id,
        date,
        total_shares: state.total_shares,
        weight: Decimal::ZERO,
        cost_basis: state.cost_basis,
        real_cost: state.real_cost,
        dividends: state.dividends_cumulative,
        options: state.options_cumulative,
        total_incomes,
        unrealized,
        realized: state.realized_cumulative,
        performance,
        latest_price: latest_price.unwrap_or_else(|| Money::zero(currency_id)),
        open_trades,
    })
}

