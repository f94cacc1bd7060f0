//! Signal Bus (C11, spec.md §4.11).
//!
//! A `tokio::sync::broadcast` channel notifying subscribers (live UI views,
//! caches) which grains changed after a recomputation batch commits. Signals
//! fire in a fixed order - Movements, then Tickers, then Accounts, then
//! Snapshots - the order consumers may rely on for invalidating their own
//! caches downstream-first (spec.md §4.11). `Brokers`/`Currencies`/`Banks`
//! signals are driven by entity CRUD outside this batch's scope (spec.md §6)
//! but are declared here since every consumer subscribes to one channel.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Signal {
    MovementsUpdated,
    TickersUpdated,
    AccountsUpdated,
    SnapshotsUpdated,
    BrokersUpdated,
    CurrenciesUpdated,
    BanksUpdated,
}

/// One published signal, tagged with the bus's monotonic epoch at the time
/// it fired - consumers can use the epoch to detect whether they've missed a
/// broadcast (spec.md §4.11: "late subscribers can tell they joined mid-epoch").
#[derive(Debug, Copy, Clone)]
pub struct SignalEvent {
    pub signal: Signal,
    pub epoch: u64,
}

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct SignalBus {
    sender: broadcast::Sender<SignalEvent>,
    epoch: AtomicU64,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBus {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SignalEvent> {
        self.sender.subscribe()
    }

    /// Publishes `signal`, advancing the bus's epoch and returning it. A send
    /// with no subscribers is not an error (spec.md §4.11: the bus is
    /// fire-and-forget when nobody is listening).
    pub fn publish(&self, signal: Signal) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(?signal, epoch, "publishing signal");
        let _ = self.sender.send(SignalEvent { signal, epoch });
        epoch
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_signals_in_publish_order() {
        let bus = SignalBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(Signal::MovementsUpdated);
        bus.publish(Signal::TickersUpdated);
        bus.publish(Signal::AccountsUpdated);
        bus.publish(Signal::SnapshotsUpdated);

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.signal, Signal::MovementsUpdated);
        assert_eq!(first.epoch, 1);

        let fourth = {
            receiver.recv().await.unwrap();
            receiver.recv().await.unwrap();
            receiver.recv().await.unwrap()
        };
        assert_eq!(fourth.signal, Signal::SnapshotsUpdated);
        assert_eq!(fourth.epoch, 4);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = SignalBus::new();
        assert_eq!(bus.publish(Signal::BrokersUpdated), 1);
    }
}
