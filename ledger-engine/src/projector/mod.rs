//! Projectors fold chronologically ordered movements into dated snapshot
//! series (spec.md §4.4, §4.6).

pub mod broker_account;
pub mod ticker_currency;

/// Below this magnitude a denominator is treated as zero, to avoid
/// division blow-up on a flat position (spec.md §4.4, §4.6: "max(x, ε)").
pub(crate) const EPSILON: rust_decimal::Decimal = rust_decimal::Decimal::from_parts(1, 0, 0, false, 4);
