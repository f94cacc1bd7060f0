#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! The snapshot projection engine: option pair matching (C3), projectors and
//! composers across the ticker/currency, broker-account and broker/overview
//! grains (C4-C8), the snapshot store (C9), targeted recomputation (C10) and
//! the signal bus (C11) described in spec.md §4.

pub mod aggregator;
pub mod composer;
pub mod config;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod projector;
pub mod recompute;
pub mod signal;
pub mod store;

pub use config::{EngineConfig, EquityBasisPolicy, PairingMode};
pub use error::EngineError;
pub use recompute::{BatchOutcome, KeyFailure, MovementRepository, RecomputeManager};
pub use signal::{Signal, SignalBus, SignalEvent};
pub use store::Store;
