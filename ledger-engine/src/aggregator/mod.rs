//! Broker / Overview Aggregator (C8, spec.md §4.8).
//!
//! Both the broker roll-up (over broker-account snapshots) and the overview
//! roll-up (over broker snapshots) are the same operation: sum
//! [`FinancialRollup`]s per currency, filling any account/broker missing an
//! event on a given date with its last-known state before that date.

use chrono::NaiveDate;
use ledger_model::{CurrencyId, FinancialOwner, FinancialRollup};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::projector::EPSILON;
use ledger_model::BrokerFinancialSnapshot;

/// Aggregates one date's worth of child roll-ups (already resolved to their
/// last-known state as of `date`) into a single parent [`FinancialRollup`],
/// linearly summing every currency's financials across children
/// (spec.md §4.8: "Aggregation is linear addition per currency; the
/// overview's currency set is the union").
pub fn aggregate_at(
    owner: FinancialOwner,
    date: NaiveDate,
    children: &[FinancialRollup],
) -> Result<Option<FinancialRollup>, EngineError> {
    if children.is_empty() {
        return Ok(None);
    }

    let mut by_currency: BTreeMap<CurrencyId, Vec<BrokerFinancialSnapshot>> = BTreeMap::new();
    for child in children {
        for financial in child.financials() {
            by_currency
                .entry(financial.currency_id)
                .or_default()
                .push(financial.clone());
        }
    }

    let mut summed: BTreeMap<CurrencyId, BrokerFinancialSnapshot> = BTreeMap::new();
    for (currency_id, financials) in by_currency {
        summed.insert(currency_id, sum_financials(owner, currency_id, date, &financials)?);
    }

    let main = summed
        .values()
        .max_by(|a, b| {
            a.deposited
                .raw()
                .cmp(&b.deposited.raw())
                .then_with(|| b.currency_id.cmp(&a.currency_id))
        })
        .cloned()
        .expect("summed is non-empty because children is non-empty");

    let mut other_currencies: Vec<BrokerFinancialSnapshot> = summed
        .into_values()
        .filter(|f| f.currency_id != main.currency_id)
        .collect();
    other_currencies.sort_by(|a, b| a.currency_id.cmp(&b.currency_id));

    Ok(Some(FinancialRollup {
        date,
        main_currency: main,
        other_currencies,
    }))
}

fn sum_financials(
    owner: FinancialOwner,
    currency_id: CurrencyId,
    date: NaiveDate,
    financials: &[BrokerFinancialSnapshot],
) -> Result<BrokerFinancialSnapshot, EngineError> {
    let mut acc = BrokerFinancialSnapshot {
        owner,
        currency_id,
        date,
        deposited: ledger_money::Money::zero(currency_id),
        withdrawn: ledger_money::Money::zero(currency_id),
        invested: ledger_money::Money::zero(currency_id),
        realized_gains: ledger_money::Money::zero(currency_id),
        unrealized_gains: ledger_money::Money::zero(currency_id),
        commissions: ledger_money::Money::zero(currency_id),
        fees: ledger_money::Money::zero(currency_id),
        options_income: ledger_money::Money::zero(currency_id),
        dividends_received: ledger_money::Money::zero(currency_id),
        other_income: ledger_money::Money::zero(currency_id),
        open_trades: false,
        movement_counter: 0,
        realized_percentage: Decimal::ZERO,
        unrealized_gains_percentage: Decimal::ZERO,
        net_cash_flow: ledger_money::Money::zero(currency_id),
        portfolio_value: ledger_money::Money::zero(currency_id),
    };

    for financial in financials {
        acc.deposited = acc.deposited.add(&financial.deposited)?;
        acc.withdrawn = acc.withdrawn.add(&financial.withdrawn)?;
        acc.invested = acc.invested.add(&financial.invested)?;
        acc.realized_gains = acc.realized_gains.add(&financial.realized_gains)?;
        acc.unrealized_gains = acc.unrealized_gains.add(&financial.unrealized_gains)?;
        acc.commissions = acc.commissions.add(&financial.commissions)?;
        acc.fees = acc.fees.add(&financial.fees)?;
        acc.options_income = acc.options_income.add(&financial.options_income)?;
        acc.dividends_received = acc.dividends_received.add(&financial.dividends_received)?;
        acc.other_income = acc.other_income.add(&financial.other_income)?;
        acc.net_cash_flow = acc.net_cash_flow.add(&financial.net_cash_flow)?;
        acc.portfolio_value = acc.portfolio_value.add(&financial.portfolio_value)?;
        acc.open_trades |= financial.open_trades;
        acc.movement_counter += financial.movement_counter;
    }

    let deposited_floor = acc.deposited.raw().max(EPSILON);
    acc.realized_percentage = (acc.realized_gains.raw() / deposited_floor) * Decimal::from(100);
    acc.unrealized_gains_percentage =
        (acc.unrealized_gains.raw() / deposited_floor) * Decimal::from(100);

    Ok(acc)
}

/// Reads each child's last-known [`FinancialRollup`] at or before `date`,
/// for callers assembling the `children` slice passed to [`aggregate_at`].
pub fn asof<'a>(
    series: &'a BTreeMap<NaiveDate, FinancialRollup>,
    date: NaiveDate,
) -> Option<&'a FinancialRollup> {
    series.range(..=date).next_back().map(|(_, rollup)| rollup)
}
