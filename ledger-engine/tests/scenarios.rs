//! Integration tests for the scenario seeds in spec.md §8.

use chrono::NaiveDate;
use ledger_engine::config::{EngineConfig, PairingMode};
use ledger_engine::projector::broker_account::{self as account_projector, BrokerAccountState, CashEvent};
use ledger_engine::projector::ticker_currency::{self, TickerCurrencyState};
use ledger_engine::recompute::MovementRepository;
use ledger_engine::signal::SignalBus;
use ledger_engine::store::{SnapshotSeries, Store};
use ledger_engine::RecomputeManager;
use ledger_model::{
    BrokerAccountId, BrokerId, BrokerMovement, BrokerMovementKind, CurrencyId, FinancialOwner,
    ImportMetadata, Movement, MovementId, MovementKind, OptionCode, OptionTrade, OptionType,
    TickerId, Trade, TradeSide,
};
use ledger_money::Money;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn usd() -> CurrencyId {
    CurrencyId::new(1)
}

fn ticker() -> TickerId {
    TickerId::new(1)
}

fn account() -> BrokerAccountId {
    BrokerAccountId::new(1)
}

fn option_movement(id: u64, when: NaiveDate, trade: OptionTrade) -> Movement {
    Movement {
        id: MovementId::new(id),
        broker_account_id: account(),
        timestamp: when,
        kind: MovementKind::OptionTrade(trade),
    }
}

// S1: a single put sold, then expired worthless - full premium is a realized
// gain, nothing remains open.
#[test]
fn s1_put_sold_then_expired_realizes_full_premium() {
    let open_trade = OptionTrade {
        ticker: ticker(),
        currency: usd(),
        code: OptionCode::SellToOpen,
        option_type: OptionType::Put,
        strike: dec!(8.0),
        expiration: date(2024, 6, 7),
        quantity: dec!(1),
        premium_per_share: dec!(0.1386),
        multiplier: dec!(100),
        commissions: dec!(0),
        fees: dec!(0),
        notes: None,
    };
    let expire_trade = OptionTrade {
        code: OptionCode::Expired,
        quantity: Decimal::ZERO,
        premium_per_share: Decimal::ZERO,
        ..open_trade.clone()
    };

    let movements = vec![
        option_movement(1, date(2024, 5, 1), open_trade),
        option_movement(2, date(2024, 6, 7), expire_trade),
    ];

    let result = ticker_currency::project(
        ticker(),
        usd(),
        TickerCurrencyState::zero(usd()),
        &movements,
        None,
        date(2024, 6, 10),
        PairingMode::Matched,
    )
    .unwrap();

    // one snapshot per event date plus a carry-forward at `today`.
    assert_eq!(result.snapshots.len(), 3);
    let final_snapshot = result.snapshots.last().unwrap();
    assert_eq!(final_snapshot.realized.raw(), dec!(13.86));
    assert!(final_snapshot.unrealized.is_zero());
    assert!(!final_snapshot.open_trades);
}

// S2: buy-to-open then sell-to-close for a profit.
#[test]
fn s2_buy_to_open_then_sell_to_close_realizes_profit() {
    let base = OptionTrade {
        ticker: ticker(),
        currency: usd(),
        code: OptionCode::BuyToOpen,
        option_type: OptionType::Put,
        strike: dec!(8.0),
        expiration: date(2024, 6, 7),
        quantity: dec!(1),
        premium_per_share: dec!(5.54),
        multiplier: dec!(100),
        commissions: dec!(1.00),
        fees: dec!(0.12),
        notes: None,
    };
    let close = OptionTrade {
        code: OptionCode::SellToClose,
        premium_per_share: dec!(7.45),
        commissions: dec!(0),
        fees: dec!(0),
        ..base.clone()
    };

    let movements = vec![
        option_movement(1, date(2024, 5, 1), base),
        option_movement(2, date(2024, 5, 10), close),
    ];

    let result = ticker_currency::project(
        ticker(),
        usd(),
        TickerCurrencyState::zero(usd()),
        &movements,
        None,
        date(2024, 5, 10),
        PairingMode::Matched,
    )
    .unwrap();

    let final_snapshot = result.snapshots.last().unwrap();
    assert_eq!(final_snapshot.realized.raw(), dec!(189.76));
    assert!(final_snapshot.unrealized.is_zero());
}

// S3: nineteen deposits totalling $19,388.40 plus one $25.00 withdrawal;
// movementCounter must equal 20 and net deposited/withdrawn must match.
#[test]
fn s3_cumulative_deposits_and_one_withdrawal() {
    let deposit_amounts = [
        dec!(1000.00), dec!(1000.00), dec!(1000.00), dec!(1000.00), dec!(1000.00),
        dec!(1000.00), dec!(1000.00), dec!(1000.00), dec!(1000.00), dec!(1000.00),
        dec!(1000.00), dec!(1000.00), dec!(1000.00), dec!(1000.00), dec!(1000.00),
        dec!(1000.00), dec!(1000.00), dec!(1000.00), dec!(1388.40),
    ];
    assert_eq!(deposit_amounts.len(), 19);
    let total_deposited: Decimal = deposit_amounts.iter().sum();
    assert_eq!(total_deposited, dec!(19388.40));

    let mut movements = Vec::new();
    let mut id = 1u64;
    for (i, amount) in deposit_amounts.iter().enumerate() {
        movements.push(Movement {
            id: MovementId::new(id),
            broker_account_id: account(),
            timestamp: date(2024, 1, 1 + i as u32),
            kind: MovementKind::Broker(BrokerMovement {
                kind: BrokerMovementKind::Deposit,
                amount: *amount,
                currency: usd(),
                commissions: Decimal::ZERO,
                fees: Decimal::ZERO,
                conversion: None,
                ticker: None,
            }),
        });
        id += 1;
    }
    movements.push(Movement {
        id: MovementId::new(id),
        broker_account_id: account(),
        timestamp: date(2024, 2, 1),
        kind: MovementKind::Broker(BrokerMovement {
            kind: BrokerMovementKind::Withdrawal,
            amount: dec!(25.00),
            currency: usd(),
            commissions: Decimal::ZERO,
            fees: Decimal::ZERO,
            conversion: None,
            ticker: None,
        }),
    });

    let cash_events: Vec<CashEvent<'_>> = movements.iter().map(CashEvent::Local).collect();
    let ticker_series = BTreeMap::new();

    let result = account_projector::project(
        FinancialOwner::Account(account()),
        usd(),
        BrokerAccountState::zero(usd()),
        &cash_events,
        &ticker_series,
        |_date| movements.len() as u64,
        date(2024, 2, 1),
    )
    .unwrap();

    let final_snapshot = result.snapshots.last().unwrap();
    assert_eq!(final_snapshot.deposited.raw(), dec!(19388.40));
    assert_eq!(final_snapshot.withdrawn.raw(), dec!(25.00));
    assert_eq!(final_snapshot.movement_counter, 20);
}

// S5: an incrementally recomputed suffix produces the same tail as a full
// from-scratch recompute over the same movements.
#[test]
fn s5_incremental_recompute_equals_full_recompute() {
    let open_trade = OptionTrade {
        ticker: ticker(),
        currency: usd(),
        code: OptionCode::SellToOpen,
        option_type: OptionType::Put,
        strike: dec!(8.0),
        expiration: date(2024, 6, 7),
        quantity: dec!(1),
        premium_per_share: dec!(0.20),
        multiplier: dec!(100),
        commissions: dec!(0),
        fees: dec!(0),
        notes: None,
    };
    let close_trade = OptionTrade {
        code: OptionCode::BuyToClose,
        premium_per_share: dec!(0.05),
        ..open_trade.clone()
    };

    let movements = vec![
        option_movement(1, date(2024, 5, 1), open_trade.clone()),
        option_movement(2, date(2024, 5, 15), close_trade.clone()),
    ];

    let full = ticker_currency::project(
        ticker(),
        usd(),
        TickerCurrencyState::zero(usd()),
        &movements,
        None,
        date(2024, 5, 15),
        PairingMode::Matched,
    )
    .unwrap();

    let store: SnapshotSeries<TickerId, ledger_model::TickerCurrencySnapshot> = SnapshotSeries::new();
    let first_pass = ticker_currency::project(
        ticker(),
        usd(),
        TickerCurrencyState::zero(usd()),
        &movements[..1],
        None,
        date(2024, 5, 1),
        PairingMode::Matched,
    )
    .unwrap();
    store.replace_suffix(&ticker(), date(2024, 5, 1), first_pass.snapshots);

    let second_pass = ticker_currency::project(
        ticker(),
        usd(),
        first_pass.ending_state,
        &movements[1..],
        None,
        date(2024, 5, 15),
        PairingMode::Matched,
    )
    .unwrap();
    store.replace_suffix(&ticker(), date(2024, 5, 15), second_pass.snapshots);

    let incremental = store.list_all(&ticker());
    assert_eq!(incremental.len(), full.snapshots.len());
    assert_eq!(
        incremental.last().unwrap().realized,
        full.snapshots.last().unwrap().realized
    );
}

// S6: a gap between two event dates still produces a dense carry-forward
// snapshot at `today`, so readers never see a stale-looking hole.
#[test]
fn s6_carry_forward_densifies_to_today() {
    let movement = Movement {
        id: MovementId::new(1),
        broker_account_id: account(),
        timestamp: date(2024, 1, 1),
        kind: MovementKind::Broker(BrokerMovement {
            kind: BrokerMovementKind::Deposit,
            amount: dec!(100.00),
            currency: usd(),
            commissions: Decimal::ZERO,
            fees: Decimal::ZERO,
            conversion: None,
            ticker: None,
        }),
    };
    let cash_events = vec![CashEvent::Local(&movement)];
    let ticker_series = BTreeMap::new();

    let result = account_projector::project(
        FinancialOwner::Account(account()),
        usd(),
        BrokerAccountState::zero(usd()),
        &cash_events,
        &ticker_series,
        |_date| 1,
        date(2024, 3, 1),
    )
    .unwrap();

    assert_eq!(result.snapshots.len(), 2);
    assert_eq!(result.snapshots[0].date, date(2024, 1, 1));
    assert_eq!(result.snapshots[1].date, date(2024, 3, 1));
    assert_eq!(result.snapshots[1].deposited.raw(), dec!(100.00));
}

/// Test-only [`MovementRepository`] over a fixed, in-memory movement list -
/// enough surface to drive one account/ticker/currency through a full batch.
struct FakeRepository {
    movements: Vec<Movement>,
    account: BrokerAccountId,
    broker: BrokerId,
    ticker: TickerId,
    ticker_symbol: &'static str,
    currency: CurrencyId,
}

impl MovementRepository for FakeRepository {
    fn ticker_currency_movements(&self, ticker: TickerId, currency: CurrencyId) -> Vec<(BrokerAccountId, Movement)> {
        self.movements
            .iter()
            .filter(|m| m.ticker() == Some(ticker) && m.currency() == Some(currency) && !matches!(m.kind, MovementKind::Broker(_)))
            .map(|m| (m.broker_account_id, m.clone()))
            .collect()
    }

    fn account_cash_movements(&self, account: BrokerAccountId, currency: CurrencyId) -> Vec<Movement> {
        self.movements
            .iter()
            .filter(|m| {
                m.broker_account_id == account
                    && matches!(&m.kind, MovementKind::Broker(b) if b.currency == currency)
            })
            .cloned()
            .collect()
    }

    fn account_conversion_debits(&self, account: BrokerAccountId, currency: CurrencyId) -> Vec<Movement> {
        self.movements
            .iter()
            .filter(|m| {
                m.broker_account_id == account
                    && matches!(&m.kind, MovementKind::Broker(b) if b.conversion.as_ref().is_some_and(|c| c.from_currency == currency))
            })
            .cloned()
            .collect()
    }

    fn account_movement_count_asof(&self, account: BrokerAccountId, date: NaiveDate) -> u64 {
        self.movements
            .iter()
            .filter(|m| m.broker_account_id == account && m.date() <= date)
            .count() as u64
    }

    fn account_currencies(&self, account: BrokerAccountId) -> Vec<CurrencyId> {
        if account == self.account {
            vec![self.currency]
        } else {
            Vec::new()
        }
    }

    fn account_main_currency(&self, account: BrokerAccountId) -> Option<CurrencyId> {
        (account == self.account).then_some(self.currency)
    }

    fn ticker_currencies_for_account(&self, account: BrokerAccountId, ticker_symbol: &str) -> Vec<CurrencyId> {
        if account == self.account && ticker_symbol == self.ticker_symbol {
            vec![self.currency]
        } else {
            Vec::new()
        }
    }

    fn resolve_ticker(&self, ticker_symbol: &str) -> Option<TickerId> {
        (ticker_symbol == self.ticker_symbol).then_some(self.ticker)
    }

    fn broker_of_account(&self, _account: BrokerAccountId) -> BrokerId {
        self.broker
    }

    fn accounts_of_broker(&self, broker: BrokerId) -> Vec<BrokerAccountId> {
        if broker == self.broker {
            vec![self.account]
        } else {
            Vec::new()
        }
    }

    fn all_brokers(&self) -> Vec<BrokerId> {
        vec![self.broker]
    }

    fn latest_price(&self, _ticker: TickerId, _currency: CurrencyId) -> Option<Money> {
        None
    }
}

// Drives a buy-then-sell for a profit through the full C4 -> C5 -> C6 -> C7 ->
// C8 pipeline and checks the resulting account snapshot's realized/unrealized
// figures equal the sum of that account's own ticker-currency snapshot - the
// roll-up law a hard-coded empty ticker series for C6 would silently violate.
#[tokio::test]
async fn recompute_manager_folds_ticker_gains_into_account_snapshot() {
    let acc = account();
    let tick = ticker();
    let cur = usd();
    let broker = BrokerId::new(1);

    let buy = Movement {
        id: MovementId::new(1),
        broker_account_id: acc,
        timestamp: date(2024, 1, 2),
        kind: MovementKind::Trade(Trade {
            ticker: tick,
            currency: cur,
            side: TradeSide::Buy,
            quantity: dec!(10),
            price_per_share: dec!(10),
            commissions: dec!(0),
            fees: dec!(0),
        }),
    };
    let sell = Movement {
        id: MovementId::new(2),
        broker_account_id: acc,
        timestamp: date(2024, 1, 10),
        kind: MovementKind::Trade(Trade {
            ticker: tick,
            currency: cur,
            side: TradeSide::Sell,
            quantity: dec!(10),
            price_per_share: dec!(15),
            commissions: dec!(0),
            fees: dec!(0),
        }),
    };

    let repo = Arc::new(FakeRepository {
        movements: vec![buy, sell],
        account: acc,
        broker,
        ticker: tick,
        ticker_symbol: "ACME",
        currency: cur,
    });
    let store = Arc::new(Store::new());
    let signals = Arc::new(SignalBus::new());
    let config = EngineConfig::new(cur);
    let manager = RecomputeManager::new(repo, store.clone(), signals, config);

    let metadata = ImportMetadata {
        oldest_movement_date: Some(date(2024, 1, 2)),
        affected_broker_account_ids: BTreeSet::from([acc]),
        affected_ticker_symbols: BTreeSet::from(["ACME".into()]),
        total_movements_imported: 2,
    };

    let outcome = manager.run(metadata, date(2024, 1, 15)).await;
    assert!(outcome.failures.is_empty(), "unexpected failures: {:?}", outcome.failures);

    let ticker_snapshot = store.ticker_currency.list_all(&(tick, cur)).last().unwrap().clone();
    let account_snapshot = store.broker_account_financial.list_all(&(acc, cur)).last().unwrap().clone();

    assert_eq!(account_snapshot.realized_gains, ticker_snapshot.realized);
    assert_eq!(account_snapshot.unrealized_gains, ticker_snapshot.unrealized);
    assert_eq!(account_snapshot.options_income, ticker_snapshot.options);
    assert_eq!(account_snapshot.dividends_received, ticker_snapshot.dividends);
    assert_eq!(account_snapshot.realized_gains.raw(), dec!(50));
}

#[test]
fn store_is_reusable_across_independent_keys() {
    let store = Store::new();
    let key_a = (ticker(), usd());
    let snapshot = ledger_model::TickerCurrencySnapshot {
        ticker_id: ticker(),
        currency_id: usd(),
        date: date(2024, 1, 1),
        total_shares: Decimal::ZERO,
        weight: Decimal::ZERO,
        cost_basis: Money::zero(usd()),
        real_cost: Money::zero(usd()),
        dividends: Money::zero(usd()),
        options: Money::zero(usd()),
        total_incomes: Money::zero(usd()),
        unrealized: Money::zero(usd()),
        realized: Money::zero(usd()),
        performance: Decimal::ZERO,
        latest_price: Money::zero(usd()),
        open_trades: false,
    };
    store.ticker_currency.replace_suffix(&key_a, date(2024, 1, 1), vec![snapshot]);
    assert_eq!(store.ticker_currency.list_all(&key_a).len(), 1);
    assert!(store.broker.list_all(&ledger_model::BrokerId::new(1)).is_empty());
}
