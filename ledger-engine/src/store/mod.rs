//! Snapshot Store (C9, spec.md §4.9).
//!
//! A key-value index of ordered snapshot series. Reads
//! ([`SnapshotSeries::get_before`], [`SnapshotSeries::list_from`]) take a
//! cloned snapshot of the backing `Vec` under a brief lock, so they never
//! block a concurrent write to a different key; writes
//! ([`SnapshotSeries::replace_suffix`]) serialize per key via a dedicated
//! [`parking_lot::Mutex`], so distinct keys genuinely run in parallel
//! (spec.md §5).

use chrono::NaiveDate;
use ledger_model::{
    BrokerAccountId, BrokerAccountSnapshot, BrokerFinancialSnapshot, BrokerId, BrokerSnapshot,
    CurrencyId, InvestmentOverviewSnapshot, TickerCurrencySnapshot, TickerId, TickerSnapshot,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Any snapshot kind the store indexes carries a calendar date.
pub trait Dated {
    fn snapshot_date(&self) -> NaiveDate;
}

impl Dated for TickerCurrencySnapshot {
    fn snapshot_date(&self) -> NaiveDate {
        self.date
    }
}

impl Dated for TickerSnapshot {
    fn snapshot_date(&self) -> NaiveDate {
        self.date
    }
}

impl Dated for BrokerFinancialSnapshot {
    fn snapshot_date(&self) -> NaiveDate {
        self.date
    }
}

impl Dated for BrokerAccountSnapshot {
    fn snapshot_date(&self) -> NaiveDate {
        self.rollup.date
    }
}

impl Dated for BrokerSnapshot {
    fn snapshot_date(&self) -> NaiveDate {
        self.rollup.date
    }
}

impl Dated for InvestmentOverviewSnapshot {
    fn snapshot_date(&self) -> NaiveDate {
        self.rollup.date
    }
}

/// An ordered, per-key series of snapshots, keyed by `K`.
#[derive(Debug)]
pub struct SnapshotSeries<K, V> {
    series: RwLock<HashMap<K, Arc<Mutex<Vec<V>>>>>,
}

impl<K, V> Default for SnapshotSeries<K, V> {
    fn default() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> SnapshotSeries<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Dated,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &K) -> Arc<Mutex<Vec<V>>> {
        if let Some(slot) = self.series.read().get(key) {
            return slot.clone();
        }
        self.series
            .write()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    /// The last snapshot strictly before `date`, or `None` if the series is
    /// empty or starts at or after `date`.
    pub fn get_before(&self, key: &K, date: NaiveDate) -> Option<V> {
        let slot = self.slot(key);
        let guard = slot.lock();
        guard
            .iter()
            .rev()
            .find(|snapshot| snapshot.snapshot_date() < date)
            .cloned()
    }

    /// All snapshots at or after `date`, ascending.
    pub fn list_from(&self, key: &K, date: NaiveDate) -> Vec<V> {
        let slot = self.slot(key);
        let guard = slot.lock();
        guard
            .iter()
            .filter(|snapshot| snapshot.snapshot_date() >= date)
            .cloned()
            .collect()
    }

    /// All snapshots, ascending - used by [`crate::signal`] consumers and
    /// tests that need the whole series rather than a suffix.
    pub fn list_all(&self, key: &K) -> Vec<V> {
        self.slot(key).lock().clone()
    }

    /// Atomically discards every snapshot dated `>= from_date` and appends
    /// `new_suffix` in its place (spec.md §4.9). `new_suffix` must already be
    /// sorted ascending by date and every date must be `>= from_date` -
    /// violating this is a caller bug, not a [`StoreError`].
    pub fn replace_suffix(&self, key: &K, from_date: NaiveDate, new_suffix: Vec<V>) {
        let slot = self.slot(key);
        let mut guard = slot.lock();
        guard.retain(|snapshot| snapshot.snapshot_date() < from_date);
        guard.extend(new_suffix);
    }
}

/// The concrete store the engine persists to: one [`SnapshotSeries`] per key
/// shape named in spec.md §4.9.
#[derive(Debug, Default)]
pub struct Store {
    pub ticker_currency: SnapshotSeries<(TickerId, CurrencyId), TickerCurrencySnapshot>,
    pub ticker: SnapshotSeries<TickerId, TickerSnapshot>,
    pub broker_account_financial: SnapshotSeries<(BrokerAccountId, CurrencyId), BrokerFinancialSnapshot>,
    pub broker_account: SnapshotSeries<BrokerAccountId, BrokerAccountSnapshot>,
    pub broker: SnapshotSeries<BrokerId, BrokerSnapshot>,
    /// Root overview series - a single key, `()`.
    pub overview: SnapshotSeries<(), InvestmentOverviewSnapshot>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_money::Money;
    use rust_decimal::Decimal;

    fn snapshot(date: NaiveDate, shares: Decimal) -> TickerCurrencySnapshot {
        let currency = CurrencyId::new(1);
        TickerCurrencySnapshot {
            ticker_id: TickerId::new(1),
            currency_id: currency,
            date,
            total_shares: shares,
            weight: Decimal::ZERO,
            cost_basis: Money::zero(currency),
            real_cost: Money::zero(currency),
            dividends: Money::zero(currency),
            options: Money::zero(currency),
            total_incomes: Money::zero(currency),
            unrealized: Money::zero(currency),
            realized: Money::zero(currency),
            performance: Decimal::ZERO,
            latest_price: Money::zero(currency),
            open_trades: false,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn replace_suffix_is_atomic_per_key() {
        let store: SnapshotSeries<TickerId, TickerCurrencySnapshot> = SnapshotSeries::new();
        let key = TickerId::new(1);
        store.replace_suffix(
            &key,
            date(2024, 1, 1),
            vec![
                snapshot(date(2024, 1, 1), Decimal::ONE),
                snapshot(date(2024, 1, 5), Decimal::TEN),
            ],
        );
        assert_eq!(store.list_all(&key).len(), 2);

        store.replace_suffix(&key, date(2024, 1, 3), vec![snapshot(date(2024, 1, 3), Decimal::TWO)]);
        let all = store.list_all(&key);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].total_shares, Decimal::TWO);
    }

    #[test]
    fn get_before_returns_last_snapshot_strictly_before_date() {
        let store: SnapshotSeries<TickerId, TickerCurrencySnapshot> = SnapshotSeries::new();
        let key = TickerId::new(1);
        store.replace_suffix(
            &key,
            date(2024, 1, 1),
            vec![
                snapshot(date(2024, 1, 1), Decimal::ONE),
                snapshot(date(2024, 1, 5), Decimal::TEN),
            ],
        );
        let before = store.get_before(&key, date(2024, 1, 5)).unwrap();
        assert_eq!(before.date, date(2024, 1, 1));
        assert!(store.get_before(&key, date(2024, 1, 1)).is_none());
    }
}
