//! Ticker Snapshot Composer (C5, spec.md §4.5).

use chrono::NaiveDate;
use ledger_model::{CurrencyId, TickerCurrencySnapshot, TickerId, TickerSnapshot};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Assembles a [`TickerSnapshot`] out of each currency's series for one
/// ticker on every date any currency has a snapshot. `by_currency` holds,
/// for each currency the ticker has ever traded in, its dense date-indexed
/// snapshot series (as produced by
/// [`crate::projector::ticker_currency::project`]).
pub fn compose(
    ticker_id: TickerId,
    main_currency: CurrencyId,
    by_currency: &BTreeMap<CurrencyId, BTreeMap<NaiveDate, TickerCurrencySnapshot>>,
) -> Vec<TickerSnapshot> {
    let dates: std::collections::BTreeSet<NaiveDate> = by_currency
        .values()
        .flat_map(|series| series.keys().copied())
        .collect();

    dates
        .into_iter()
        .filter_map(|date| compose_at(ticker_id, main_currency, by_currency, date))
        .collect()
}

fn compose_at(
    ticker_id: TickerId,
    main_currency: CurrencyId,
    by_currency: &BTreeMap<CurrencyId, BTreeMap<NaiveDate, TickerCurrencySnapshot>>,
    date: NaiveDate,
) -> Option<TickerSnapshot> {
    // The most recently projected snapshot at or before `date` for each
    // currency - series are dense only at event/carry-forward dates, so a
    // currency without an event on `date` still contributes its last state.
    let mut latest: BTreeMap<CurrencyId, TickerCurrencySnapshot> = BTreeMap::new();
    for (currency_id, series) in by_currency {
        if let Some((_, snapshot)) = series.range(..=date).next_back() {
            latest.insert(*currency_id, snapshot.clone());
        }
    }
    if latest.is_empty() {
        return None;
    }

    let weight_basis = |s: &TickerCurrencySnapshot| s.cost_basis.raw().abs() + s.unrealized.raw().abs();
    let total_basis: Decimal = latest.values().map(weight_basis).sum();

    let main = latest
        .get(&main_currency)
        .cloned()
        .or_else(|| fallback_main(&latest));
    let main = main?;

    let mut other_currencies: Vec<TickerCurrencySnapshot> = latest
        .into_iter()
        .filter(|(currency_id, _)| *currency_id != main.currency_id)
        .map(|(_, mut snapshot)| {
            snapshot.weight = weighted(weight_basis(&snapshot), total_basis);
            snapshot
        })
        .collect();
    other_currencies.sort_by(|a, b| a.currency_id.cmp(&b.currency_id));

    let mut main = main;
    main.weight = weighted(weight_basis(&main), total_basis);

    Some(TickerSnapshot {
        ticker_id,
        date,
        main_currency: main,
        other_currencies,
    })
}

/// When no per-currency snapshot matches the designated main currency,
/// falls back to the currency with the highest `cost_basis`, then lowest
/// currency id ascending (spec.md §4.5 tie-break; currency *code* ascending
/// is equivalent to currency id ascending since ids are assigned in code
/// order at seed time - see DESIGN.md).
fn fallback_main(
    latest: &BTreeMap<CurrencyId, TickerCurrencySnapshot>,
) -> Option<TickerCurrencySnapshot> {
    latest
        .values()
        .max_by(|a, b| {
            a.cost_basis
                .raw()
                .abs()
                .cmp(&b.cost_basis.raw().abs())
                .then_with(|| b.currency_id.cmp(&a.currency_id))
        })
        .cloned()
}

fn weighted(numerator: Decimal, total: Decimal) -> Decimal {
    if total.is_zero() {
        Decimal::ZERO
    } else {
        numerator / total
    }
}
