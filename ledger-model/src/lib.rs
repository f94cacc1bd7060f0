#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Entities, the tagged-variant movement model, and the snapshot data model
//! shared between the import layer, the projection engine and the
//! persistence layer.

/// Stable integer identifiers assigned by the snapshot store (spec.md §3).
pub mod ids;

/// [`entity::Currency`], [`entity::Ticker`], [`entity::Broker`],
/// [`entity::BrokerAccount`].
pub mod entity;

/// The contract consumed from the import layer (spec.md §4.10, §6).
pub mod import;

/// The tagged-variant [`movement::Movement`] model (spec.md §4.2).
pub mod movement;

/// The snapshot data model (spec.md §3).
pub mod snapshot;

pub use entity::{Broker, BrokerAccount, Currency, Ticker};
pub use ids::{BankAccountId, BrokerAccountId, BrokerId, CurrencyId, MovementId, TickerId};
pub use import::ImportMetadata;
pub use movement::{
    BrokerMovement, BrokerMovementKind, ContractKey, ConversionSource, Dividend, DividendDate,
    DividendTax, Movement, MovementError, MovementKind, OptionCode, OptionTrade, OptionType,
    Trade, TradeSide,
};
pub use snapshot::{
    BrokerAccountSnapshot, BrokerFinancialSnapshot, BrokerSnapshot, FinancialOwner,
    FinancialRollup, InvestmentOverviewSnapshot, TickerCurrencySnapshot, TickerSnapshot,
};
