//! Composers merge per-currency projections into the main/other-currencies
//! roll-up shape shared by ticker and account snapshots (spec.md §4.5, §4.7).

pub mod broker_account;
pub mod ticker;
