//! Engine-wide configuration (spec.md §9 open questions, resolved here and
//! in DESIGN.md).

use ledger_model::CurrencyId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the Option Pair Matcher (C3) pairs closing legs against open ones
/// within a [`ledger_model::ContractKey`] queue.
///
/// `Matched` (FIFO, the default) only consumes open legs of the opposite
/// direction from the closing code (e.g. a `BuyToClose` only closes
/// `SellToOpen` legs), draining the oldest eligible leg first.
/// `MovementSide` instead drains the oldest open leg regardless of its
/// direction, and realizes the closing movement's own premium directly
/// rather than pairing it against what was drained - useful for brokers
/// that report wash-sale-adjacent same-day round trips separately.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Deserialize, Serialize)]
pub enum PairingMode {
    #[default]
    Matched,
    MovementSide,
}

/// How the TickerCurrency Projector (C4) computes the cost basis used for
/// `unrealized`/`performance`.
///
/// Only `AverageCost` is implemented: the moving-average cost of all open
/// shares. Lot-level (FIFO/specific-lot) equity basis tracking is out of
/// scope (spec.md §9 open question, resolved in DESIGN.md) - `LotTracked`
/// exists to make that scope boundary explicit in the type rather than
/// silently defaulting.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Deserialize, Serialize)]
pub enum EquityBasisPolicy {
    #[default]
    AverageCost,
    LotTracked,
}

/// Engine-wide configuration, constructed once at startup and shared
/// read-only across all recomputation tasks.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Designated main currency used when a [`ledger_model::BrokerAccount`]
    /// has no configured `main_currency` and no movements yet (spec.md §4.7).
    pub main_currency: CurrencyId,
    pub pairing_mode: PairingMode,
    pub equity_basis: EquityBasisPolicy,
    /// How long the recomputation manager waits to coalesce consecutive
    /// import batches into one recompute pass before running anyway
    /// (spec.md §5).
    #[serde(with = "humantime_duration")]
    pub batch_timeout: Duration,
    /// Number of times a `StoreConflict` on `replaceSuffix` is retried
    /// before the batch for that key is abandoned (spec.md §7).
    pub store_conflict_retries: u8,
}

impl EngineConfig {
    pub fn new(main_currency: CurrencyId) -> Self {
        Self {
            main_currency,
            pairing_mode: PairingMode::default(),
            equity_basis: EquityBasisPolicy::default(),
            batch_timeout: Duration::from_secs(30),
            store_conflict_retries: 3,
        }
    }
}

/// Serializes [`Duration`] as whole seconds - avoids pulling in `humantime`
/// for a single field.
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
