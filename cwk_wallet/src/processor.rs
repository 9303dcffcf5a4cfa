//! Turns raw blocks into [`TransactionData`] against the wallet's keys.

use crate::clients::wire::{KeyInput, KeyOutput, RawBlock};
use crate::crypto::CryptoProvider;
use crate::model::{Height, Timestamp, Transaction, TransactionData};
use crate::subwallets::SubWalletStore;
use crate::sync_status::SyncStatus;
use cwk_common::{KeyImage, PublicKey, TxHash};
use std::collections::BTreeMap;

/// What a block's linkage to our recorded chain implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ForkAction {
    /// The block extends what we know.
    Extends,

    /// The daemon resumed below our top: the chain forked at this height.
    /// Purge state at and above it, then process the block.
    ForkAt(Height),

    /// The block is contiguous but its parent hash disagrees with our
    /// window top. Rewind to the given height and refetch via checkpoints.
    StaleWindow(Height),
}

pub(crate) fn detect_fork(block: &RawBlock, status: &SyncStatus) -> ForkAction {
    if status.is_empty() {
        return ForkAction::Extends;
    }
    if block.block_height <= status.last_known_height() {
        return ForkAction::ForkAt(block.block_height);
    }
    if block.block_height == status.last_known_height() + 1 {
        if let (Some(parent), Some(top)) = (block.previous_block_hash, status.top_hash()) {
            if parent != top {
                return ForkAction::StaleWindow(status.last_known_height());
            }
        }
    }
    ForkAction::Extends
}

/// Classify every output and key input of `block` against the wallet's keys.
///
/// `scan_coinbase` mirrors the config switch; when off the coinbase
/// transaction is skipped entirely.
pub(crate) fn process_block(
    block: &RawBlock,
    store: &SubWalletStore,
    crypto: &dyn CryptoProvider,
    scan_coinbase: bool,
) -> TransactionData {
    let mut data = TransactionData::default();

    if scan_coinbase {
        if let Some(coinbase) = block.coinbase_tx.as_ref() {
            process_transaction(
                &mut data,
                store,
                crypto,
                TxView {
                    hash: coinbase.hash,
                    tx_public_key: coinbase.tx_public_key,
                    unlock_time: coinbase.unlock_time,
                    payment_id: "",
                    inputs: &[],
                    outputs: &coinbase.outputs,
                    is_coinbase: true,
                },
                block.block_height,
                block.block_timestamp,
            );
        }
    }

    for tx in &block.transactions {
        process_transaction(
            &mut data,
            store,
            crypto,
            TxView {
                hash: tx.hash,
                tx_public_key: tx.tx_public_key,
                unlock_time: tx.unlock_time,
                payment_id: &tx.payment_id,
                inputs: &tx.inputs,
                outputs: &tx.outputs,
                is_coinbase: false,
            },
            block.block_height,
            block.block_timestamp,
        );
    }

    data
}

struct TxView<'a> {
    hash: TxHash,
    tx_public_key: PublicKey,
    unlock_time: u64,
    payment_id: &'a str,
    inputs: &'a [KeyInput],
    outputs: &'a [KeyOutput],
    is_coinbase: bool,
}

fn process_transaction(
    data: &mut TransactionData,
    store: &SubWalletStore,
    crypto: &dyn CryptoProvider,
    tx: TxView<'_>,
    block_height: Height,
    block_timestamp: Timestamp,
) {
    let mut transfers: BTreeMap<PublicKey, i64> = BTreeMap::new();

    // One shared secret per transaction, reused across its outputs. A null
    // derivation (undecodable tx key) classifies every output as not ours.
    let derivation = crypto.key_derivation(&tx.tx_public_key, store.private_view_key());

    let mut our_inputs = Vec::new();
    for (index, output) in tx.outputs.iter().enumerate() {
        let candidate = crypto.underive_public_key(&derivation, index as u64, &output.key);
        let subwallet = match store.subwallet(&candidate) {
            Some(subwallet) => subwallet,
            None => continue,
        };

        let key_image = if subwallet.is_view_only() {
            KeyImage::NULL
        } else {
            let private_ephemeral =
                crypto.private_ephemeral(&derivation, index as u64, subwallet.private_spend_key());
            crypto.key_image(&output.key, &private_ephemeral)
        };

        *transfers.entry(candidate).or_insert(0) += output.amount as i64;
        our_inputs.push((
            candidate,
            crate::model::TransactionInput {
                key_image,
                amount: output.amount,
                block_height,
                tx_public_key: tx.tx_public_key,
                index_in_tx: index as u64,
                global_output_index: output.global_index,
                one_time_public_key: output.key,
                spend_height: 0,
                unlock_time: tx.unlock_time,
                parent_tx_hash: tx.hash,
            },
        ));
    }

    let mut spent = Vec::new();
    for input in tx.inputs {
        if let Some(owner) = store.get_key_image_owner(&input.key_image) {
            *transfers.entry(owner).or_insert(0) -= input.amount as i64;
            spent.push((owner, input.key_image));
        }
    }

    // A transaction is ours iff it moved value for some subwallet
    if transfers.values().all(|amount| *amount == 0) && spent.is_empty() {
        return;
    }

    let fee = if tx.is_coinbase {
        0
    } else {
        let in_sum: u64 = tx.inputs.iter().map(|input| input.amount).sum();
        let out_sum: u64 = tx.outputs.iter().map(|output| output.amount).sum();
        in_sum.saturating_sub(out_sum)
    };

    data.txs_to_add.push(Transaction {
        transfers,
        hash: tx.hash,
        fee,
        block_height,
        timestamp: block_timestamp,
        payment_id: tx.payment_id.to_string(),
        unlock_time: tx.unlock_time,
        is_coinbase: tx.is_coinbase,
    });
    data.inputs_to_add.extend(our_inputs);
    data.key_images_to_mark_spent.extend(spent);
}
