//! BrokerAccount Financial Projector (C6, spec.md §4.6).

use chrono::NaiveDate;
use ledger_model::{BrokerMovementKind, CurrencyId, FinancialOwner, Movement, MovementKind};
use ledger_money::Money;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::projector::EPSILON;

/// The per-date roll-up of every ticker traded in one (account, currency)
/// pair, read out of the C4 series (spec.md §4.6: "the net changes from the
/// ticker-currency projector aggregated over every ticker").
#[derive(Debug, Clone)]
pub struct TickerContribution {
    pub invested: Money,
    pub realized_gains: Money,
    pub unrealized_gains: Money,
    pub options_income: Money,
    pub dividends_received: Money,
    pub commissions: Money,
    pub fees: Money,
}

impl TickerContribution {
    pub fn zero(currency: CurrencyId) -> Self {
        Self {
            invested: Money::zero(currency),
            realized_gains: Money::zero(currency),
            unrealized_gains: Money::zero(currency),
            options_income: Money::zero(currency),
            dividends_received: Money::zero(currency),
            commissions: Money::zero(currency),
            fees: Money::zero(currency),
        }
    }

    pub(crate) fn add(&self, other: &Self) -> Result<Self, ledger_money::MoneyError> {
        Ok(Self {
            invested: self.invested.add(&other.invested)?,
            realized_gains: self.realized_gains.add(&other.realized_gains)?,
            unrealized_gains: self.unrealized_gains.add(&other.unrealized_gains)?,
            options_income: self.options_income.add(&other.options_income)?,
            dividends_received: self.dividends_received.add(&other.dividends_received)?,
            commissions: self.commissions.add(&other.commissions)?,
            fees: self.fees.add(&other.fees)?,
        })
    }
}

/// Looks up the roll-up as-of `date`: the last entry at or before `date`, or
/// zero if the ticker/currency pair had no events yet.
pub fn ticker_rollup_asof(
    series: &BTreeMap<NaiveDate, TickerContribution>,
    date: NaiveDate,
    currency: CurrencyId,
) -> TickerContribution {
    series
        .range(..=date)
        .next_back()
        .map(|(_, c)| c.clone())
        .unwrap_or_else(|| TickerContribution::zero(currency))
}

/// A cash-bearing event folded into one (account, currency) financial series.
pub enum CashEvent<'a> {
    /// A movement whose own currency is this projection's currency.
    Local(&'a Movement),
    /// A `Conversion` movement whose `from_currency` is this projection's
    /// currency - only the debit leg applies here (spec.md §4.6).
    ConversionDebit(&'a Movement),
}

impl CashEvent<'_> {
    fn date(&self) -> NaiveDate {
        match self {
            CashEvent::Local(m) | CashEvent::ConversionDebit(m) => m.date(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrokerAccountState {
    pub deposited: Money,
    pub withdrawn: Money,
    pub commissions: Money,
    pub fees: Money,
    pub other_income: Money,
}

impl BrokerAccountState {
    pub fn zero(currency: CurrencyId) -> Self {
        Self {
            deposited: Money::zero(currency),
            withdrawn: Money::zero(currency),
            commissions: Money::zero(currency),
            fees: Money::zero(currency),
            other_income: Money::zero(currency),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectionResult {
    pub snapshots: Vec<ledger_model::BrokerFinancialSnapshot>,
    pub ending_state: BrokerAccountState,
}

/// Folds `cash_events` (sorted ascending by `(timestamp, id)`) from `seed`,
/// combining at each date with the ticker contributions as-of that date and
/// the account-wide movement counter, into a dense `BrokerFinancialSnapshot`
/// series plus a carry-forward snapshot at `today`.
#[allow(clippy::too_many_arguments)]
pub fn project(
    owner: FinancialOwner,
    currency_id: CurrencyId,
    seed: BrokerAccountState,
    cash_events: &[CashEvent<'_>],
    ticker_series: &BTreeMap<NaiveDate, TickerContribution>,
    movement_counter_asof: impl Fn(NaiveDate) -> u64,
    today: NaiveDate,
) -> Result<ProjectionResult, EngineError> {
    let mut state = seed;
    let mut snapshots = Vec::new();
    let mut last_event_date = None;

    let mut index = 0;
    while index < cash_events.len() {
        let date = cash_events[index].date();
        let mut day_end = index;
        while day_end < cash_events.len() && cash_events[day_end].date() == date {
            day_end += 1;
        }
        for event in &cash_events[index..day_end] {
            apply_cash_event(&mut state, event, currency_id)?;
        }

        snapshots.push(snapshot_at(
            owner,
            currency_id,
            date,
            &state,
            ticker_rollup_asof(ticker_series, date, currency_id),
            movement_counter_asof(date),
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
            owner,
            currency_id,
            today,
            &state,
            ticker_rollup_asof(ticker_series, today, currency_id),
            movement_counter_asof(today),
        )?);
    }

    Ok(ProjectionResult {
        snapshots,
        ending_state: state,
    })
}

fn apply_cash_event(
    state: &mut BrokerAccountState,
    event: &CashEvent<'_>,
    currency_id: CurrencyId,
) -> Result<(), EngineError> {
    match event {
        CashEvent::Local(movement) => {
            let MovementKind::Broker(broker_movement) = &movement.kind else {
                return Ok(());
            };
            state.commissions = state
                .commissions
                .add(&Money::new(broker_movement.commissions, currency_id))?;
            state.fees = state
                .fees
                .add(&Money::new(broker_movement.fees, currency_id))?;

            let amount = Money::new(broker_movement.amount, currency_id);
            match broker_movement.kind {
                BrokerMovementKind::Deposit | BrokerMovementKind::AcatIn => {
                    state.deposited = state.deposited.add(&amount)?;
                }
                BrokerMovementKind::Withdrawal | BrokerMovementKind::AcatOut => {
                    state.withdrawn = state.withdrawn.add(&amount)?;
                }
                BrokerMovementKind::Fee => {
                    state.fees = state.fees.add(&amount)?;
                }
                BrokerMovementKind::Interest | BrokerMovementKind::BalanceAdjustment => {
                    state.other_income = state.other_income.add(&amount)?;
                }
                BrokerMovementKind::Conversion => {
                    // The credit leg: this currency receives `amount`.
                    state.deposited = state.deposited.add(&amount)?;
                }
            }
        }
        CashEvent::ConversionDebit(movement) => {
            let MovementKind::Broker(broker_movement) = &movement.kind else {
                return Ok(());
            };
            if let Some(conversion) = &broker_movement.conversion {
                state.withdrawn = state
                    .withdrawn
                    .add(&Money::new(conversion.amount_changed, currency_id))?;
            }
        }
    }
    Ok(())
}

fn snapshot_at(
    owner: FinancialOwner,
    currency_id: CurrencyId,
    date: NaiveDate,
    state: &BrokerAccountState,
    ticker: TickerContribution,
    movement_counter: u64,
) -> Result<ledger_model::BrokerFinancialSnapshot, EngineError> {
    let commissions = state.commissions.add(&ticker.commissions)?;
    let fees = state.fees.add(&ticker.fees)?;

    let net_cash_flow = state
        .deposited
        .sub(&state.withdrawn)?
        .add(&ticker.realized_gains)?
        .add(&ticker.options_income)?
        .add(&ticker.dividends_received)?
        .sub(&commissions)?
        .sub(&fees)?;

    let portfolio_value = state
        .deposited
        .sub(&state.withdrawn)?
        .add(&ticker.realized_gains)?
        .add(&ticker.dividends_received)?
        .add(&ticker.options_income)?
        .sub(&commissions)?
        .sub(&fees)?;

    let deposited_floor = state.deposited.raw().max(EPSILON);
    let realized_percentage = (ticker.realized_gains.raw() / deposited_floor) * Decimal::from(100);
    let unrealized_gains_percentage =
        (ticker.unrealized_gains.raw() / deposited_floor) * Decimal::from(100);

    Ok(ledger_model::BrokerFinancialSnapshot {
        owner,
        currency_id,
        date,
        deposited: state.deposited,
        withdrawn: state.withdrawn,
        invested: ticker.invested,
        realized_gains: ticker.realized_gains,
        unrealized_gains: ticker.unrealized_gains,
        commissions,
        fees,
        options_income: ticker.options_income,
        dividends_received: ticker.dividends_received,
        other_income: state.other_income,
        open_trades: !ticker.unrealized_gains.is_zero(),
        movement_counter,
        realized_percentage,
        unrealized_gains_percentage,
        net_cash_flow,
        portfolio_value,
    })
}

