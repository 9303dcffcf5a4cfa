//! Request and response bodies of the two remote protocols.
//!
//! Field names match the wire exactly; the daemon speaks camelCase on the
//! wallet-sync endpoints and snake_case on the older JSON-RPC-era ones.

use crate::model::TopBlock;
use cwk_common::{BlockHash, KeyImage, PublicKey, TxHash};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone, Default)]
pub(crate) struct InfoResponse {
    /// Missing on a semantically empty response, which is what an HTTPS
    /// probe against a plain HTTP daemon yields.
    pub height: Option<u64>,

    #[serde(default)]
    pub network_height: u64,

    #[serde(default)]
    pub incoming_connections_count: u64,

    #[serde(default)]
    pub outgoing_connections_count: u64,

    #[serde(default)]
    pub difficulty: u64,

    #[serde(rename = "isCacheApi")]
    pub is_cache_api: Option<bool>,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct FeeResponse {
    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub amount: u64,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WalletSyncDataRequest {
    pub block_hash_checkpoints: Vec<BlockHash>,
    pub start_height: u64,
    pub start_timestamp: u64,
    pub block_count: u64,
    pub skip_coinbase_transactions: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WalletSyncDataResponse {
    #[serde(default)]
    pub items: Vec<RawBlock>,

    #[serde(default)]
    pub synced: bool,

    #[serde(default)]
    pub top_block: Option<TopBlock>,
}

/// A block as served by `getBlocks`, already filtered down to the fields a
/// view key can act on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    pub block_height: u64,

    pub block_hash: BlockHash,

    /// Hash of the parent block; what fork detection compares against the
    /// top of the recent-hash window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_block_hash: Option<BlockHash>,

    pub block_timestamp: u64,

    /// Absent when the request asked to skip coinbase transactions.
    #[serde(rename = "coinbaseTX", default, skip_serializing_if = "Option::is_none")]
    pub coinbase_tx: Option<RawCoinbaseTransaction>,

    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
}

impl RawBlock {
    /// Rough in-memory footprint, for the fetch queue byte cap.
    pub(crate) fn approx_size(&self) -> usize {
        let outputs: usize = self
            .transactions
            .iter()
            .map(|tx| tx.outputs.len() + tx.inputs.len())
            .sum::<usize>()
            + self
                .coinbase_tx
                .as_ref()
                .map(|tx| tx.outputs.len())
                .unwrap_or(0);
        256 + self.transactions.len() * 192 + outputs * 64
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawCoinbaseTransaction {
    pub hash: TxHash,

    pub tx_public_key: PublicKey,

    pub unlock_time: u64,

    #[serde(default)]
    pub outputs: Vec<KeyOutput>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub hash: TxHash,

    pub tx_public_key: PublicKey,

    pub unlock_time: u64,

    /// 64 zero hex characters when the transaction carries no payment ID.
    #[serde(rename = "paymentID", default)]
    pub payment_id: String,

    #[serde(default)]
    pub inputs: Vec<KeyInput>,

    #[serde(default)]
    pub outputs: Vec<KeyOutput>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyOutput {
    pub amount: u64,

    /// The one-time output key.
    pub key: PublicKey,

    /// Embedded by the cache service; absent from a chain node.
    #[serde(rename = "globalIndex", default, skip_serializing_if = "Option::is_none")]
    pub global_index: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyInput {
    pub amount: u64,

    pub key_image: KeyImage,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GlobalIndexesRequest {
    pub start_height: u64,
    pub end_height: u64,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub(crate) struct GlobalIndexesResponse {
    #[serde(default)]
    pub indexes: Vec<GlobalIndexEntry>,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct GlobalIndexEntry {
    pub key: TxHash,
    pub value: Vec<u64>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransactionStatusRequest {
    pub transaction_hashes: Vec<TxHash>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransactionStatusResponse {
    #[serde(default)]
    pub transactions_unknown: Vec<TxHash>,
}

#[derive(Serialize, Debug, Clone)]
pub(crate) struct RandomOutsCacheRequest {
    pub amounts: Vec<u64>,
    pub mixin: u64,
}

#[derive(Serialize, Debug, Clone)]
pub(crate) struct RandomOutsChainRequest {
    pub amounts: Vec<u64>,
    pub outs_count: u64,
}

/// Decoys for one amount, ordered by global index so the position of the
/// real input leaks nothing.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RandomOutsForAmount {
    pub amount: u64,

    #[serde(default)]
    pub outs: Vec<RandomOutput>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomOutput {
    pub global_amount_index: u64,

    pub out_key: PublicKey,
}

#[derive(Serialize, Debug, Clone)]
pub(crate) struct SendRawTransactionRequest {
    pub tx_as_hex: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub(crate) struct SendRawTransactionResponse {
    #[serde(default)]
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_response_variants() {
        let full: InfoResponse = serde_json::from_str(
            r#"{"height":100,"network_height":101,"incoming_connections_count":3,
                "outgoing_connections_count":8,"difficulty":60,"isCacheApi":true}"#,
        )
        .unwrap();
        assert_eq!(full.height, Some(100));
        assert_eq!(full.network_height, 101);
        assert_eq!(full.is_cache_api, Some(true));

        // Semantically empty: parses, but carries no height
        let empty: InfoResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.height, None);
        assert_eq!(empty.is_cache_api, None);
    }

    #[test]
    fn test_sync_data_response() {
        let json = r#"{
            "items": [{
                "blockHeight": 5,
                "blockHash": "0202020202020202020202020202020202020202020202020202020202020202",
                "blockTimestamp": 1600000000,
                "coinbaseTX": {
                    "hash": "0303030303030303030303030303030303030303030303030303030303030303",
                    "txPublicKey": "0404040404040404040404040404040404040404040404040404040404040404",
                    "unlockTime": 45,
                    "outputs": [{"amount": 29350, "key": "0505050505050505050505050505050505050505050505050505050505050505"}]
                },
                "transactions": [{
                    "hash": "0606060606060606060606060606060606060606060606060606060606060606",
                    "txPublicKey": "0707070707070707070707070707070707070707070707070707070707070707",
                    "unlockTime": 0,
                    "paymentID": "",
                    "inputs": [{"amount": 2000, "keyImage": "0808080808080808080808080808080808080808080808080808080808080808"}],
                    "outputs": [{"amount": 1000, "key": "0909090909090909090909090909090909090909090909090909090909090909", "globalIndex": 12345}]
                }]
            }],
            "synced": true,
            "topBlock": {"hash": "0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a", "height": 5}
        }"#;
        let response: WalletSyncDataResponse = serde_json::from_str(json).unwrap();
        assert!(response.synced);
        assert_eq!(response.top_block.unwrap().height, 5);

        let block = &response.items[0];
        assert_eq!(block.block_height, 5);
        assert_eq!(block.coinbase_tx.as_ref().unwrap().outputs[0].amount, 29350);
        let tx = &block.transactions[0];
        assert_eq!(tx.inputs[0].amount, 2000);
        assert_eq!(tx.outputs[0].global_index, Some(12345));

        // The request side round-trips through the same names
        let request = WalletSyncDataRequest {
            block_hash_checkpoints: vec![BlockHash::NULL],
            start_height: 0,
            start_timestamp: 0,
            block_count: 100,
            skip_coinbase_transactions: true,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("blockHashCheckpoints").is_some());
        assert!(body.get("skipCoinbaseTransactions").is_some());
    }

    #[test]
    fn test_random_outs_response() {
        let json = r#"[{"amount": 1000, "outs": [
            {"global_amount_index": 4, "out_key": "0101010101010101010101010101010101010101010101010101010101010101"},
            {"global_amount_index": 7, "out_key": "0202020202020202020202020202020202020202020202020202020202020202"}
        ]}]"#;
        let outs: Vec<RandomOutsForAmount> = serde_json::from_str(json).unwrap();
        assert_eq!(outs[0].outs.len(), 2);
        assert_eq!(outs[0].outs[1].global_amount_index, 7);
    }
}
