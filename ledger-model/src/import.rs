//! The contract between the (out-of-scope) import layer and the engine
//! (spec.md §4.10, §6).

use crate::ids::BrokerAccountId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeSet;

/// Describes what an import batch touched, so the engine can recompute only
/// the affected suffix of the snapshot series rather than a full rebuild.
///
/// Movements are persisted before `ImportMetadata` is delivered; the import
/// layer never calls the projector/composer/aggregator components directly
/// (spec.md §6).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Deserialize, Serialize)]
pub struct ImportMetadata {
    /// `None` means nothing changed - the recomputation manager is then a
    /// no-op (spec.md §4.10 idempotence).
    pub oldest_movement_date: Option<NaiveDate>,
    pub affected_broker_account_ids: BTreeSet<BrokerAccountId>,
    pub affected_ticker_symbols: BTreeSet<SmolStr>,
    pub total_movements_imported: u64,
}

impl ImportMetadata {
    pub fn is_noop(&self) -> bool {
        self.oldest_movement_date.is_none()
    }
}
