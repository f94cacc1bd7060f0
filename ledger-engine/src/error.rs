use ledger_model::MovementError;
use thiserror::Error;

/// All possible errors raised by the snapshot engine (spec.md §7).
///
/// `CurrencyMismatch`, `Overflow` and `InvalidMovement` are programmer
/// errors: they abort the current batch loudly, because the atomic
/// `replaceSuffix` contract guarantees no partial writes can have occurred.
/// `MissingAccount`/`MissingTicker` are integrity errors that are recorded
/// against the failing key without blocking the rest of the batch.
/// `StoreConflict` is retriable; `Cancelled` is never logged as an error
/// (spec.md §7).
///
/// `ContractKeyMismatch`/strict-mode `UnmatchedClose` are not raised: the
/// matcher always operates in the permissive mode spec.md §4.3 describes as
/// the default (a close exceeding available opposite legs flips into a new
/// leg rather than erroring); see DESIGN.md.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("currency mismatch: {0}")]
    CurrencyMismatch(#[from] ledger_money::MoneyError),

    #[error("invalid movement: {0}")]
    InvalidMovement(#[from] MovementError),

    #[error("option matcher: {0}")]
    Match(#[from] crate::matcher::MatchError),

    #[error("missing broker account {0}")]
    MissingAccount(ledger_model::BrokerAccountId),

    #[error("ticker symbol {0:?} did not resolve to a known ticker")]
    MissingTicker(smol_str::SmolStr),

    #[error("store conflict on key {key}: concurrent replaceSuffix raced and lost")]
    StoreConflict { key: String },

    #[error("batch cancelled")]
    Cancelled,
}

impl EngineError {
    /// Whether this error is a programmer/data-model bug that should abort
    /// the whole batch rather than be recorded per-key (spec.md §7).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::CurrencyMismatch(_) | EngineError::InvalidMovement(_) | EngineError::Match(_)
        )
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, EngineError::StoreConflict { .. })
    }
}
