//! Snapshot data model (spec.md §3): the three roll-up grains the engine
//! maintains - per (ticker, currency), per (broker account, currency) and
//! per (broker | overview, currency).

use crate::ids::{BrokerAccountId, BrokerId, CurrencyId, TickerId};
use chrono::NaiveDate;
use ledger_money::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cumulative state for one (ticker, currency) pair on one date
/// (spec.md §3, §4.4).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TickerCurrencySnapshot {
    pub ticker_id: TickerId,
    pub currency_id: CurrencyId,
    pub date: NaiveDate,
    pub total_shares: Decimal,
    pub weight: Decimal,
    pub cost_basis: Money,
    pub real_cost: Money,
    pub dividends: Money,
    pub options: Money,
    pub total_incomes: Money,
    pub unrealized: Money,
    pub realized: Money,
    pub performance: Decimal,
    pub latest_price: Money,
    pub open_trades: bool,
}

/// One ticker's snapshot on one date: a designated main-currency slice plus
/// the other currencies the ticker has been traded in, ordered by currency
/// code ascending (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TickerSnapshot {
    pub ticker_id: TickerId,
    pub date: NaiveDate,
    pub main_currency: TickerCurrencySnapshot,
    pub other_currencies: Vec<TickerCurrencySnapshot>,
}

/// Which grain a [`BrokerFinancialSnapshot`] belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum FinancialOwner {
    Account(BrokerAccountId),
    Broker(BrokerId),
    Overview,
}

/// Cumulative cash + P&L state for one owner/currency/date (spec.md §3, §4.6).
///
/// `portfolio_value` is computed per-currency rather than cross-currency
/// summed (spec.md §9 open question, resolved in DESIGN.md): it is the value
/// of this financial snapshot's own currency, never converted into another.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BrokerFinancialSnapshot {
    pub owner: FinancialOwner,
    pub currency_id: CurrencyId,
    pub date: NaiveDate,
    pub deposited: Money,
    pub withdrawn: Money,
    pub invested: Money,
    pub realized_gains: Money,
    pub unrealized_gains: Money,
    pub commissions: Money,
    pub fees: Money,
    pub options_income: Money,
    pub dividends_received: Money,
    pub other_income: Money,
    pub open_trades: bool,
    pub movement_counter: u64,
    pub realized_percentage: Decimal,
    pub unrealized_gains_percentage: Decimal,
    pub net_cash_flow: Money,
    pub portfolio_value: Money,
}

/// A main-currency financial snapshot plus zero-or-more other-currency
/// financial snapshots on the same date, shared shape for account, broker
/// and overview grains (spec.md §3: "BrokerAccountSnapshot / BrokerSnapshot /
/// InvestmentOverviewSnapshot - one main financial snapshot + zero-or-more
/// other-currency financial snapshots").
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FinancialRollup {
    pub date: NaiveDate,
    pub main_currency: BrokerFinancialSnapshot,
    pub other_currencies: Vec<BrokerFinancialSnapshot>,
}

impl FinancialRollup {
    pub fn financials(&self) -> impl Iterator<Item = &BrokerFinancialSnapshot> {
        std::iter::once(&self.main_currency).chain(self.other_currencies.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BrokerAccountSnapshot {
    pub broker_account_id: BrokerAccountId,
    pub rollup: FinancialRollup,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BrokerSnapshot {
    pub broker_id: BrokerId,
    pub rollup: FinancialRollup,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InvestmentOverviewSnapshot {
    pub rollup: FinancialRollup,
}
