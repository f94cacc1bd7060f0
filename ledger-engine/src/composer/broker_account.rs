//! BrokerAccount Snapshot Composer (C7, spec.md §4.7).

use chrono::NaiveDate;
use ledger_model::{
    BrokerAccountId, BrokerAccountSnapshot, BrokerFinancialSnapshot, CurrencyId, FinancialRollup,
};
use std::collections::BTreeMap;

/// Assembles a [`BrokerAccountSnapshot`] for every date any currency has a
/// financial snapshot, designating one currency as main.
///
/// `main_currency` is the account's configured currency, or `None` to fall
/// back to whichever currency carries the largest cumulative `deposited` at
/// each date (spec.md §4.7).
pub fn compose(
    broker_account_id: BrokerAccountId,
    main_currency: Option<CurrencyId>,
    by_currency: &BTreeMap<CurrencyId, BTreeMap<NaiveDate, BrokerFinancialSnapshot>>,
) -> Vec<BrokerAccountSnapshot> {
    let dates: std::collections::BTreeSet<NaiveDate> = by_currency
        .values()
        .flat_map(|series| series.keys().copied())
        .collect();

    dates
        .into_iter()
        .filter_map(|date| compose_at(date, main_currency, by_currency))
        .map(|rollup| BrokerAccountSnapshot {
            broker_account_id,
            rollup,
        })
        .collect()
}

fn compose_at(
    date: NaiveDate,
    main_currency: Option<CurrencyId>,
    by_currency: &BTreeMap<CurrencyId, BTreeMap<NaiveDate, BrokerFinancialSnapshot>>,
) -> Option<FinancialRollup> {
    let mut latest: BTreeMap<CurrencyId, BrokerFinancialSnapshot> = BTreeMap::new();
    for (currency_id, series) in by_currency {
        if let Some((_, snapshot)) = series.range(..=date).next_back() {
            latest.insert(*currency_id, snapshot.clone());
        }
    }
    if latest.is_empty() {
        return None;
    }

    let main = main_currency
        .and_then(|id| latest.get(&id).cloned())
        .or_else(|| fallback_main(&latest))?;

    let mut other_currencies: Vec<BrokerFinancialSnapshot> = latest
        .into_iter()
        .filter(|(currency_id, _)| *currency_id != main.currency_id)
        .map(|(_, snapshot)| snapshot)
        .collect();
    other_currencies.sort_by(|a, b| a.currency_id.cmp(&b.currency_id));

    Some(FinancialRollup {
        date,
        main_currency: main,
        other_currencies,
    })
}

/// Falls back to the currency carrying the largest cumulative `deposited`
/// (spec.md §4.7).
fn fallback_main(
    latest: &BTreeMap<CurrencyId, BrokerFinancialSnapshot>,
) -> Option<BrokerFinancialSnapshot> {
    latest
        .values()
        .max_by(|a, b| {
            a.deposited
                .raw()
                .cmp(&b.deposited.raw())
                .then_with(|| b.currency_id.cmp(&a.currency_id))
        })
        .cloned()
}
