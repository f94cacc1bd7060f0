//! Reference entities: [`Currency`], [`Ticker`], [`Broker`], [`BrokerAccount`].
//!
//! These carry just the attributes the engine needs to resolve snapshot keys
//! and main-currency designation; the rest of an entity's record (display
//! name, broker metadata, etc.) is owned by the persistence layer (spec.md §6).

use crate::ids::{BrokerAccountId, BrokerId, CurrencyId, TickerId};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A currency, seeded once at initialization (spec.md §3).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct Currency {
    pub id: CurrencyId,
    pub code: SmolStr,
}

/// A ticker symbol, created on first reference and never deleted while
/// movements reference it.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct Ticker {
    pub id: TickerId,
    pub symbol: SmolStr,
}

/// A broker, the parent of one or more [`BrokerAccount`]s.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct Broker {
    pub id: BrokerId,
    pub name: SmolStr,
}

/// An account held at a [`Broker`]. `account_number` is unique within the
/// broker. `main_currency` is the account's configured presentation
/// currency; `None` falls back to the currency with the largest cumulative
/// `deposited` (spec.md §4.7).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct BrokerAccount {
    pub id: BrokerAccountId,
    pub broker_id: BrokerId,
    pub account_number: SmolStr,
    pub main_currency: Option<CurrencyId>,
}
