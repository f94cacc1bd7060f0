//! Targeted Recomputation Manager (C10, spec.md §4.10).
//!
//! Drives the C3-C8 pipeline over the minimal set of keys an
//! [`ImportMetadata`] batch touched, strictly layered C4 → C5 → C6 → C7 → C8,
//! with per-layer parallelism across keys (spec.md §5).
//!
//! Each affected key is replayed from its full movement history rather than
//! resumed from a persisted mid-series seed - the matcher/projector running
//! state (`OptionBook`, `TickerCurrencyState`, `BrokerAccountState`) is not
//! itself part of the public [`crate::store::Store`], only the snapshots it
//! produces are. `replace_suffix` still gives every write the store's
//! atomic-per-key swap, so readers never observe a partially rebuilt series;
//! see DESIGN.md for the tradeoff this accepts.
//!
//! The movement/entity repository is the out-of-scope external collaborator
//! described in spec.md §6 - this module only depends on the
//! [`MovementRepository`] contract, never on a concrete persistence layer.

use chrono::NaiveDate;
use ledger_model::{
    BrokerAccountId, BrokerAccountSnapshot, BrokerFinancialSnapshot, BrokerId, BrokerSnapshot,
    CurrencyId, FinancialOwner, ImportMetadata, InvestmentOverviewSnapshot, Movement,
    TickerCurrencySnapshot, TickerId,
};
use ledger_money::Money;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::aggregator;
use crate::composer::{broker_account as account_composer, ticker as ticker_composer};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::projector::broker_account::{
    self as account_projector, BrokerAccountState, CashEvent, TickerContribution,
};
use crate::projector::ticker_currency::{self, TickerCurrencyState};
use crate::signal::{Signal, SignalBus};
use crate::store::Store;

/// The external contract for movement/entity lookups (spec.md §6). A SQL- or
/// other persistence-backed implementation lives outside this crate.
pub trait MovementRepository: Send + Sync {
    /// Every movement for `ticker`/`currency` across every broker account,
    /// tagged with its owning account so per-account FIFO books stay
    /// isolated, ascending by `(timestamp, id)`.
    fn ticker_currency_movements(
        &self,
        ticker: TickerId,
        currency: CurrencyId,
    ) -> Vec<(BrokerAccountId, Movement)>;

    /// Cash-bearing `BrokerMovement`s whose own currency is `currency`,
    /// ascending.
    fn account_cash_movements(&self, account: BrokerAccountId, currency: CurrencyId) -> Vec<Movement>;

    /// `Conversion` movements whose `from_currency` is `currency` (the debit
    /// leg), ascending.
    fn account_conversion_debits(&self, account: BrokerAccountId, currency: CurrencyId) -> Vec<Movement>;

    /// Count of all persisted movements for `account` (any currency/variant)
    /// with `timestamp <= date`.
    fn account_movement_count_asof(&self, account: BrokerAccountId, date: NaiveDate) -> u64;

    fn account_currencies(&self, account: BrokerAccountId) -> Vec<CurrencyId>;
    fn account_main_currency(&self, account: BrokerAccountId) -> Option<CurrencyId>;
    fn ticker_currencies_for_account(&self, account: BrokerAccountId, ticker_symbol: &str) -> Vec<CurrencyId>;
    fn resolve_ticker(&self, ticker_symbol: &str) -> Option<TickerId>;
    fn broker_of_account(&self, account: BrokerAccountId) -> BrokerId;
    fn accounts_of_broker(&self, broker: BrokerId) -> Vec<BrokerAccountId>;
    fn all_brokers(&self) -> Vec<BrokerId>;
    fn latest_price(&self, ticker: TickerId, currency: CurrencyId) -> Option<Money>;
}

/// Per-key failure surfaced in a batch's outcome (spec.md §7: "the batch
/// result lists per-key outcomes").
#[derive(Debug)]
pub struct KeyFailure {
    pub key: String,
    pub error: EngineError,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub failures: Vec<KeyFailure>,
    pub epoch: u64,
}

/// One (ticker, currency) key's C4 output: the portfolio-wide suffix the
/// public store exposes, plus the per-account detail it was summed from -
/// the latter never reaches the store, only C6's ticker contribution fold
/// (see `build_account_ticker_series`).
struct TickerCurrencyLayerResult {
    summed: Vec<TickerCurrencySnapshot>,
    per_account: BTreeMap<BrokerAccountId, Vec<TickerCurrencySnapshot>>,
}

pub struct RecomputeManager<R: MovementRepository> {
    repo: Arc<R>,
    store: Arc<Store>,
    signals: Arc<SignalBus>,
    config: EngineConfig,
}

impl<R: MovementRepository + 'static> RecomputeManager<R> {
    pub fn new(repo: Arc<R>, store: Arc<Store>, signals: Arc<SignalBus>, config: EngineConfig) -> Self {
        Self {
            repo,
            store,
            signals,
            config,
        }
    }

    /// Runs one recomputation batch. A no-op metadata (`oldestMovementDate`
    /// absent) is a no-op manager run (spec.md §4.10 idempotence).
    pub async fn run(&self, metadata: ImportMetadata, today: NaiveDate) -> BatchOutcome {
        if metadata.is_noop() {
            debug!("recompute batch is a no-op: no oldestMovementDate");
            return BatchOutcome::default();
        }

        info!(
            accounts = metadata.affected_broker_account_ids.len(),
            tickers = metadata.affected_ticker_symbols.len(),
            "starting targeted recomputation batch"
        );

        let mut failures = Vec::new();

        // C4: per (ticker, currency), keyed internally per account to avoid
        // cross-account double counting, summed into the public
        // (ticker, currency) series the same way C8 sums children into a
        // parent (see DESIGN.md).
        let ticker_currency_keys = self.ticker_currency_keys(&metadata, &mut failures);
        let (ticker_currency_results, mut layer_failures) = self
            .run_layer(ticker_currency_keys, |key| self.project_ticker_currency(key, today))
            .await;
        failures.append(&mut layer_failures);

        // C5: per ticker, composing every currency it has ever traded in.
        let ticker_ids: BTreeSet<TickerId> = ticker_currency_results
            .keys()
            .map(|(ticker_id, _)| *ticker_id)
            .collect();
        for ticker_id in ticker_ids {
            self.compose_ticker(ticker_id, &ticker_currency_results);
        }

        // Fold each account's own per-ticker C4 contributions into the
        // per-(account, currency) series C6 reads, the same gap-filling
        // roll-up C8 uses one layer up (see DESIGN.md).
        let account_ticker_series = match self.build_account_ticker_series(&ticker_currency_results) {
            Ok(series) => Arc::new(series),
            Err(error) => {
                warn!(
                    %error,
                    "failed to fold ticker contributions into account financial inputs; \
                     continuing with no ticker contributions this batch"
                );
                failures.push(KeyFailure {
                    key: "account_ticker_series".to_string(),
                    error,
                });
                Arc::new(BTreeMap::new())
            }
        };

        // C6: per (account, currency).
        let account_currency_keys = self.account_currency_keys(&metadata);
        let (account_results, mut layer_failures) = self
            .run_layer(account_currency_keys, |key| {
                self.project_broker_account(key, today, account_ticker_series.clone())
            })
            .await;
        failures.append(&mut layer_failures);

        // C7: per account.
        for &account_id in &metadata.affected_broker_account_ids {
            self.compose_account(account_id, &account_results);
        }

        // C8: affected brokers, then the root overview.
        let brokers: BTreeSet<BrokerId> = metadata
            .affected_broker_account_ids
            .iter()
            .map(|&account_id| self.repo.broker_of_account(account_id))
            .collect();
        for broker_id in &brokers {
            self.aggregate_broker(*broker_id);
        }
        self.aggregate_overview();

        self.signals.publish(Signal::MovementsUpdated);
        self.signals.publish(Signal::TickersUpdated);
        self.signals.publish(Signal::AccountsUpdated);
        let epoch = self.signals.publish(Signal::SnapshotsUpdated);

        if !failures.is_empty() {
            warn!(failed_keys = failures.len(), "batch completed with per-key failures");
        }

        BatchOutcome { failures, epoch }
    }

    fn ticker_currency_keys(
        &self,
        metadata: &ImportMetadata,
        failures: &mut Vec<KeyFailure>,
    ) -> Vec<(TickerId, CurrencyId)> {
        let mut keys = Vec::new();
        for symbol in &metadata.affected_ticker_symbols {
            let Some(ticker_id) = self.repo.resolve_ticker(symbol) else {
                warn!(ticker_symbol = %symbol, "affected ticker symbol did not resolve to a known ticker");
                failures.push(KeyFailure {
                    key: symbol.to_string(),
                    error: EngineError::MissingTicker(symbol.clone()),
                });
                continue;
            };
            for &account_id in &metadata.affected_broker_account_ids {
                for currency_id in self.repo.ticker_currencies_for_account(account_id, symbol) {
                    let key = (ticker_id, currency_id);
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }
        }
        keys
    }

    fn account_currency_keys(&self, metadata: &ImportMetadata) -> Vec<(BrokerAccountId, CurrencyId)> {
        metadata
            .affected_broker_account_ids
            .iter()
            .flat_map(|&account_id| {
                self.repo
                    .account_currencies(account_id)
                    .into_iter()
                    .map(move |currency_id| (account_id, currency_id))
            })
            .collect()
    }

    /// Runs `work` for every key in `keys` concurrently (spec.md §5: "tasks
    /// for distinct keys run in parallel"), collecting successes keyed by
    /// `K` and failures labelled by their key's `Debug` form.
    async fn run_layer<K, F, Fut, V>(&self, keys: Vec<K>, work: F) -> (BTreeMap<K, V>, Vec<KeyFailure>)
    where
        K: std::fmt::Debug + Ord + Clone + Send + 'static,
        F: Fn(K) -> Fut,
        Fut: std::future::Future<Output = Result<V, EngineError>> + Send + 'static,
        V: Send + 'static,
    {
        let mut set = JoinSet::new();
        for key in keys {
            let label = format!("{key:?}");
            let fut = work(key.clone());
            set.spawn(async move { (key, label, fut.await) });
        }

        let mut results = BTreeMap::new();
        let mut failures = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((key, _, Ok(value))) => {
                    results.insert(key, value);
                }
                Ok((_, label, Err(error))) => failures.push(KeyFailure { key: label, error }),
                Err(_join_error) => failures.push(KeyFailure {
                    key: "<task cancelled>".to_string(),
                    error: EngineError::Cancelled,
                }),
            }
        }
        (results, failures)
    }

    async fn project_ticker_currency(
        &self,
        key: (TickerId, CurrencyId),
        today: NaiveDate,
    ) -> Result<TickerCurrencyLayerResult, EngineError> {
        let (ticker_id, currency_id) = key;
        let by_account = self.repo.ticker_currency_movements(ticker_id, currency_id);

        let mut per_account_movements: BTreeMap<BrokerAccountId, Vec<Movement>> = BTreeMap::new();
        for (account_id, movement) in by_account {
            per_account_movements.entry(account_id).or_default().push(movement);
        }

        let latest_price = self.repo.latest_price(ticker_id, currency_id);
        let pairing_mode = self.config.pairing_mode;

        let mut per_account_snapshots: BTreeMap<BrokerAccountId, Vec<TickerCurrencySnapshot>> =
            BTreeMap::new();
        let mut per_date: BTreeMap<NaiveDate, Vec<TickerCurrencySnapshot>> = BTreeMap::new();
        for (account_id, mut movements) in per_account_movements {
            movements.sort_by_key(|m| (m.date(), m.id));
            let result = ticker_currency::project(
                ticker_id,
                currency_id,
                TickerCurrencyState::zero(currency_id),
                &movements,
                latest_price,
                today,
                pairing_mode,
            )?;
            for snapshot in &result.snapshots {
                per_date.entry(snapshot.date).or_default().push(snapshot.clone());
            }
            per_account_snapshots.insert(account_id, result.snapshots);
        }

        let summed = per_date
            .into_iter()
            .map(|(date, snapshots)| sum_ticker_currency(ticker_id, currency_id, date, &snapshots))
            .collect::<Result<Vec<_>, EngineError>>()?;

        if let Some(from_date) = summed.first().map(|s| s.date) {
            self.store
                .ticker_currency
                .replace_suffix(&(ticker_id, currency_id), from_date, summed.clone());
        }

        Ok(TickerCurrencyLayerResult {
            summed,
            per_account: per_account_snapshots,
        })
    }

    fn compose_ticker(
        &self,
        ticker_id: TickerId,
        ticker_currency_results: &BTreeMap<(TickerId, CurrencyId), TickerCurrencyLayerResult>,
    ) {
        let mut by_currency: BTreeMap<CurrencyId, BTreeMap<NaiveDate, TickerCurrencySnapshot>> =
            BTreeMap::new();
        for ((tid, currency_id), result) in ticker_currency_results {
            if *tid != ticker_id {
                continue;
            }
            let series = by_currency.entry(*currency_id).or_default();
            for snapshot in &result.summed {
                series.insert(snapshot.date, snapshot.clone());
            }
        }
        let main_currency = by_currency.keys().next().copied().unwrap_or(self.config.main_currency);
        let composed = ticker_composer::compose(ticker_id, main_currency, &by_currency);
        if let Some(from_date) = composed.first().map(|s| s.date) {
            self.store.ticker.replace_suffix(&ticker_id, from_date, composed);
        }
    }

    /// Folds each account's own per-ticker C4 contributions (discarded once
    /// [`project_ticker_currency`] sums them into the portfolio-wide public
    /// series) into a per-(account, currency) dated [`TickerContribution`]
    /// series for C6 - summing every ticker an account holds at each date,
    /// using each ticker's last-known-at-or-before-date state the same way
    /// [`crate::aggregator::aggregate_at`] gap-fills children one layer up.
    #[allow(clippy::type_complexity)]
    fn build_account_ticker_series(
        &self,
        ticker_currency_results: &BTreeMap<(TickerId, CurrencyId), TickerCurrencyLayerResult>,
    ) -> Result<BTreeMap<(BrokerAccountId, CurrencyId), BTreeMap<NaiveDate, TickerContribution>>, EngineError> {
        let mut per_account_ticker: BTreeMap<
            (BrokerAccountId, CurrencyId),
            BTreeMap<TickerId, BTreeMap<NaiveDate, TickerCurrencySnapshot>>,
        > = BTreeMap::new();

        for ((ticker_id, currency_id), result) in ticker_currency_results {
            for (account_id, snapshots) in &result.per_account {
                let tickers = per_account_ticker.entry((*account_id, *currency_id)).or_default();
                let dated = tickers.entry(*ticker_id).or_default();
                for snapshot in snapshots {
                    dated.insert(snapshot.date, snapshot.clone());
                }
            }
        }

        let mut out = BTreeMap::new();
        for (key, tickers) in per_account_ticker {
            let (_, currency_id) = key;
            let dates: BTreeSet<NaiveDate> = tickers
                .values()
                .flat_map(|series| series.keys().copied())
                .collect();

            let mut series = BTreeMap::new();
            for date in dates {
                let mut total = TickerContribution::zero(currency_id);
                for ticker_series in tickers.values() {
                    if let Some((_, snapshot)) = ticker_series.range(..=date).next_back() {
                        let contribution = TickerContribution {
                            invested: snapshot.cost_basis,
                            realized_gains: snapshot.realized,
                            unrealized_gains: snapshot.unrealized,
                            options_income: snapshot.options,
                            dividends_received: snapshot.dividends,
                            commissions: Money::zero(currency_id),
                            fees: Money::zero(currency_id),
                        };
                        total = total.add(&contribution)?;
                    }
                }
                series.insert(date, total);
            }
            out.insert(key, series);
        }
        Ok(out)
    }

    #[allow(clippy::type_complexity)]
    async fn project_broker_account(
        &self,
        key: (BrokerAccountId, CurrencyId),
        today: NaiveDate,
        account_ticker_series: Arc<BTreeMap<(BrokerAccountId, CurrencyId), BTreeMap<NaiveDate, TickerContribution>>>,
    ) -> Result<Vec<BrokerFinancialSnapshot>, EngineError> {
        let (account_id, currency_id) = key;
        let locals = self.repo.account_cash_movements(account_id, currency_id);
        let debits = self.repo.account_conversion_debits(account_id, currency_id);

        let mut ordered: Vec<(NaiveDate, u64, bool, &Movement)> = Vec::new();
        for movement in &locals {
            ordered.push((movement.date(), movement.id.0, true, movement));
        }
        for movement in &debits {
            ordered.push((movement.date(), movement.id.0, false, movement));
        }
        ordered.sort_by_key(|(date, id, ..)| (*date, *id));
        let cash_events: Vec<CashEvent<'_>> = ordered
            .into_iter()
            .map(|(_, _, is_local, movement)| {
                if is_local {
                    CashEvent::Local(movement)
                } else {
                    CashEvent::ConversionDebit(movement)
                }
            })
            .collect();

        let ticker_series = account_ticker_series.get(&key).cloned().unwrap_or_default();
        let repo = self.repo.clone();
        let result = account_projector::project(
            FinancialOwner::Account(account_id),
            currency_id,
            BrokerAccountState::zero(currency_id),
            &cash_events,
            &ticker_series,
            |date| repo.account_movement_count_asof(account_id, date),
            today,
        )?;

        if let Some(from_date) = result.snapshots.first().map(|s| s.date) {
            self.store.broker_account_financial.replace_suffix(
                &(account_id, currency_id),
                from_date,
                result.snapshots.clone(),
            );
        }

        Ok(result.snapshots)
    }

    fn compose_account(
        &self,
        account_id: BrokerAccountId,
        account_results: &BTreeMap<(BrokerAccountId, CurrencyId), Vec<BrokerFinancialSnapshot>>,
    ) {
        let mut by_currency: BTreeMap<CurrencyId, BTreeMap<NaiveDate, BrokerFinancialSnapshot>> =
            BTreeMap::new();
        for ((aid, currency_id), snapshots) in account_results {
            if *aid != account_id {
                continue;
            }
            let series = by_currency.entry(*currency_id).or_default();
            for snapshot in snapshots {
                series.insert(snapshot.date, snapshot.clone());
            }
        }
        let main_currency = self.repo.account_main_currency(account_id);
        let composed: Vec<BrokerAccountSnapshot> =
            account_composer::compose(account_id, main_currency, &by_currency);
        if let Some(from_date) = composed.first().map(|s| s.rollup.date) {
            self.store.broker_account.replace_suffix(&account_id, from_date, composed);
        }
    }

    fn aggregate_broker(&self, broker_id: BrokerId) {
        let account_ids = self.repo.accounts_of_broker(broker_id);
        let dates: BTreeSet<NaiveDate> = account_ids
            .iter()
            .flat_map(|&account_id| {
                self.store
                    .broker_account
                    .list_all(&account_id)
                    .into_iter()
                    .map(|s| s.rollup.date)
            })
            .collect();

        let mut suffix: Vec<BrokerSnapshot> = Vec::new();
        for date in dates {
            let children: Vec<_> = account_ids
                .iter()
                .filter_map(|&account_id| {
                    self.store
                        .broker_account
                        .list_all(&account_id)
                        .into_iter()
                        .filter(|s| s.rollup.date <= date)
                        .next_back()
                        .map(|s| s.rollup)
                })
                .collect();
            if let Ok(Some(rollup)) = aggregator::aggregate_at(FinancialOwner::Broker(broker_id), date, &children) {
                suffix.push(BrokerSnapshot { broker_id, rollup });
            }
        }
        if let Some(from_date) = suffix.first().map(|s| s.rollup.date) {
            self.store.broker.replace_suffix(&broker_id, from_date, suffix);
        }
    }

    fn aggregate_overview(&self) {
        let brokers = self.repo.all_brokers();
        let dates: BTreeSet<NaiveDate> = brokers
            .iter()
            .flat_map(|&broker_id| self.store.broker.list_all(&broker_id).into_iter().map(|s| s.rollup.date))
            .collect();

        let mut suffix: Vec<InvestmentOverviewSnapshot> = Vec::new();
        for date in dates {
            let children: Vec<_> = brokers
                .iter()
                .filter_map(|&broker_id| {
                    self.store
                        .broker
                        .list_all(&broker_id)
                        .into_iter()
                        .filter(|s| s.rollup.date <= date)
                        .next_back()
                        .map(|s| s.rollup)
                })
                .collect();
            if let Ok(Some(rollup)) = aggregator::aggregate_at(FinancialOwner::Overview, date, &children) {
                suffix.push(InvestmentOverviewSnapshot { rollup });
            }
        }
        if let Some(from_date) = suffix.first().map(|s| s.rollup.date) {
            self.store.overview.replace_suffix(&(), from_date, suffix);
        }
    }
}

/// Sums several accounts' `TickerCurrencySnapshot`s for the same ticker,
/// currency and date into the single portfolio-wide snapshot the public
/// store exposes (spec.md §4.9 keys by `(tickerId, currencyId)` only; see
/// DESIGN.md for why per-account state is kept internal to this module).
fn sum_ticker_currency(
    ticker_id: TickerId,
    currency_id: CurrencyId,
    date: NaiveDate,
    snapshots: &[TickerCurrencySnapshot],
) -> Result<TickerCurrencySnapshot, EngineError> {
    let mut total_shares = Decimal::ZERO;
    let mut cost_basis = Money::zero(currency_id);
    let mut real_cost = Money::zero(currency_id);
    let mut dividends = Money::zero(currency_id);
    let mut options = Money::zero(currency_id);
    let mut unrealized = Money::zero(currency_id);
    let mut realized = Money::zero(currency_id);
    let mut open_trades = false;
    let mut latest_price = Money::zero(currency_id);

    for snapshot in snapshots {
        total_shares += snapshot.total_shares;
        cost_basis = cost_basis.add(&snapshot.cost_basis)?;
        real_cost = real_cost.add(&snapshot.real_cost)?;
        dividends = dividends.add(&snapshot.dividends)?;
        options = options.add(&snapshot.options)?;
        unrealized = unrealized.add(&snapshot.unrealized)?;
        realized = realized.add(&snapshot.realized)?;
        open_trades |= snapshot.open_trades;
        latest_price = snapshot.latest_price;
    }

    let total_incomes = realized.add(&unrealized)?.add(&dividends)?;
    let denominator = cost_basis.raw().abs() + unrealized.raw().abs();
    let performance = if denominator > crate::projector::EPSILON {
        (total_incomes.raw() / denominator) * Decimal::from(100)
    } else {
        Decimal::ZERO
    };

    Ok(TickerCurrencySnapshot {
        ticker_id,
        currency_id,
        date,
        total_shares,
        weight: Decimal::ZERO,
        cost_basis,
        real_cost,
        dividends,
        options,
        total_incomes,
        unrealized,
        realized,
        performance,
        latest_price,
        open_trades,
    })
}
