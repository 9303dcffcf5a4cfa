use cwk_common::{KeyImage, PublicKey, TxHash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Block height. 0 also denotes "not yet in a block" for transactions and
/// "unspent" for spend heights.
pub type Height = u64;

/// Seconds since the epoch, on the chain's clock.
pub type Timestamp = u64;

/// Unlock times below this are block heights, above are unix timestamps.
pub const UNLOCK_TIME_IS_TIMESTAMP: u64 = 1_000_000_000;

/// An output belonging to one of our subwallets.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    /// The double-spend nullifier, null for view-only subwallets.
    pub key_image: KeyImage,

    /// The amount in atomic units.
    pub amount: u64,

    /// The height of the block containing the parent transaction.
    pub block_height: Height,

    /// The public key of the parent transaction.
    pub tx_public_key: PublicKey,

    /// The index of this output within the parent transaction.
    pub index_in_tx: u64,

    /// The network-wide index of this output for its amount. Absent until
    /// lazily fetched from a chain node; cache services embed it at scan time.
    pub global_output_index: Option<u64>,

    /// The one-time output key.
    pub one_time_public_key: PublicKey,

    /// 0 while unspent or locked, the spending block height once spent.
    pub spend_height: Height,

    /// Height or timestamp before which the output cannot be spent.
    pub unlock_time: u64,

    /// Hash of the transaction that created this output.
    pub parent_tx_hash: TxHash,
}

impl TransactionInput {
    /// Whether the unlock condition has passed, given the chain height and
    /// the current time.
    pub fn is_unlocked(&self, current_height: Height, now: Timestamp) -> bool {
        if self.unlock_time < UNLOCK_TIME_IS_TIMESTAMP {
            self.unlock_time <= current_height
        } else {
            self.unlock_time <= now
        }
    }
}

/// An output paid to us by a transaction we created, not yet confirmed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnconfirmedInput {
    pub amount: u64,
    pub one_time_public_key: PublicKey,
    pub parent_tx_hash: TxHash,
}

/// A transaction from the point of view of the wallet container.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Net amount per subwallet, by public spend key. Positive for funds
    /// received, negative for funds spent.
    pub transfers: BTreeMap<PublicKey, i64>,

    pub hash: TxHash,

    /// 0 for coinbase transactions.
    pub fee: u64,

    /// 0 while unconfirmed.
    pub block_height: Height,

    pub timestamp: Timestamp,

    /// Empty when the transaction carries no payment ID.
    #[serde(rename = "paymentID")]
    pub payment_id: String,

    pub unlock_time: u64,

    pub is_coinbase: bool,
}

impl Transaction {
    /// The sum of the transfers, plus the fee when the transaction is
    /// outgoing (we paid the fee, so it is part of what left the wallet).
    pub fn total_amount(&self) -> i64 {
        let sum: i64 = self.transfers.values().sum();
        if sum < 0 {
            sum + self.fee as i64
        } else {
            sum
        }
    }

    /// A fusion is a zero-fee transaction whose transfers cancel out.
    pub fn is_fusion(&self) -> bool {
        self.fee == 0 && self.transfers.values().sum::<i64>() == 0 && !self.is_coinbase
    }
}

/// The result of processing one block: everything the store has to apply.
#[derive(Debug, Default, Clone)]
pub struct TransactionData {
    pub txs_to_add: Vec<Transaction>,

    pub inputs_to_add: Vec<(PublicKey, TransactionInput)>,

    pub key_images_to_mark_spent: Vec<(PublicKey, KeyImage)>,
}

impl TransactionData {
    pub fn is_empty(&self) -> bool {
        self.txs_to_add.is_empty()
            && self.inputs_to_add.is_empty()
            && self.key_images_to_mark_spent.is_empty()
    }
}

/// Last known state of the remote node, refreshed on its own cadence.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    /// The height of the chain as the node has synced it.
    pub local_height: Height,

    /// The height of the network as the node observes it.
    pub network_height: Height,

    pub incoming_connections: u64,

    pub outgoing_connections: u64,

    pub difficulty: u64,

    /// `difficulty / block_target_time`, the implied network hashrate.
    pub hashrate: u64,
}

/// The header the node reports for its top block once we are synced,
/// letting the scheduler re-align height without processing blocks.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopBlock {
    pub hash: cwk_common::BlockHash,
    pub height: Height,
}
