//! The observer surface of the wallet.
//!
//! Events are broadcast synchronously as state changes are applied;
//! listeners receive them over a channel and must not block on handling
//! them, or they will lag and miss events.

use crate::model::{Height, Transaction};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// A transaction involving the wallet was confirmed.
    Transaction(Transaction),

    /// A confirmed transaction with a positive net amount.
    IncomingTransaction(Transaction),

    /// A confirmed transaction with a negative net amount.
    OutgoingTransaction(Transaction),

    /// A confirmed fusion involving the wallet.
    FusionTransaction(Transaction),

    /// The wallet created and submitted a transaction.
    CreatedTransaction(Transaction),

    /// The wallet created and submitted a fusion.
    CreatedFusionTransaction(Transaction),

    /// The wallet caught up with the network, fired on first convergence
    /// and again after every recovery from a desync.
    Sync {
        wallet_height: Height,
        network_height: Height,
    },

    /// The wallet fell behind the network; only ever fired after a prior
    /// [`WalletEvent::Sync`].
    Desync {
        wallet_height: Height,
        network_height: Height,
    },
}

pub(crate) struct EventSink {
    tx: broadcast::Sender<WalletEvent>,
}

impl EventSink {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.tx.subscribe()
    }

    /// Fire and forget; an event with no listeners is dropped.
    pub(crate) fn emit(&self, event: WalletEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit the per-transaction events for a newly confirmed transaction.
    pub(crate) fn emit_for_transaction(&self, transaction: &Transaction) {
        self.emit(WalletEvent::Transaction(transaction.clone()));
        if transaction.is_fusion() {
            self.emit(WalletEvent::FusionTransaction(transaction.clone()));
        } else {
            let total = transaction.total_amount();
            if total > 0 {
                self.emit(WalletEvent::IncomingTransaction(transaction.clone()));
            } else if total < 0 {
                self.emit(WalletEvent::OutgoingTransaction(transaction.clone()));
            }
        }
    }
}

/// Edge triggering for sync/desync: one flag, two transitions.
#[derive(Debug, Default)]
pub(crate) struct SyncEdge {
    synced: bool,
}

impl SyncEdge {
    /// Observe the current heights and return the event to emit, if any.
    pub(crate) fn observe(
        &mut self,
        wallet_height: Height,
        network_height: Height,
    ) -> Option<WalletEvent> {
        let caught_up = wallet_height >= network_height && network_height > 0;
        match (self.synced, caught_up) {
            (false, true) => {
                self.synced = true;
                Some(WalletEvent::Sync {
                    wallet_height,
                    network_height,
                })
            }
            (true, false) => {
                self.synced = false;
                Some(WalletEvent::Desync {
                    wallet_height,
                    network_height,
                })
            }
            _ => None,
        }
    }

    pub(crate) fn is_synced(&self) -> bool {
        self.synced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_desync_edges() {
        let mut edge = SyncEdge::default();

        // Behind before any sync: silence
        assert_eq!(edge.observe(10, 100), None);
        assert_eq!(edge.observe(50, 100), None);

        assert!(matches!(
            edge.observe(100, 100),
            Some(WalletEvent::Sync { .. })
        ));
        // Staying synced does not re-fire
        assert_eq!(edge.observe(101, 101), None);

        assert!(matches!(
            edge.observe(101, 110),
            Some(WalletEvent::Desync {
                wallet_height: 101,
                network_height: 110,
            })
        ));
        // Recovery fires sync again
        assert!(matches!(
            edge.observe(110, 110),
            Some(WalletEvent::Sync { .. })
        ));
    }

    #[test]
    fn test_no_sync_before_network_height_known() {
        let mut edge = SyncEdge::default();
        assert_eq!(edge.observe(0, 0), None);
        assert!(!edge.is_synced());
    }

    #[tokio::test]
    async fn test_transaction_event_fanout() {
        let sink = EventSink::new();
        let mut rx = sink.subscribe();

        let mut transaction = crate::model::Transaction {
            transfers: [(cwk_common::PublicKey::from_bytes([1; 32]), 1000i64)]
                .into_iter()
                .collect(),
            hash: cwk_common::TxHash::from_bytes([7; 32]),
            fee: 10,
            block_height: 5,
            timestamp: 0,
            payment_id: String::new(),
            unlock_time: 0,
            is_coinbase: false,
        };
        sink.emit_for_transaction(&transaction);

        assert!(matches!(rx.recv().await.unwrap(), WalletEvent::Transaction(_)));
        assert!(matches!(
            rx.recv().await.unwrap(),
            WalletEvent::IncomingTransaction(_)
        ));

        transaction.transfers.insert(
            cwk_common::PublicKey::from_bytes([1; 32]),
            -1010,
        );
        sink.emit_for_transaction(&transaction);
        assert!(matches!(rx.recv().await.unwrap(), WalletEvent::Transaction(_)));
        assert!(matches!(
            rx.recv().await.unwrap(),
            WalletEvent::OutgoingTransaction(_)
        ));
    }
}
