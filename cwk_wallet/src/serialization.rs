//! The persisted wallet document.
//!
//! The JSON shape is shared with the external file collaborator (which owns
//! encryption and on-disk framing); field names are part of that contract.
//! Serialization is deterministic: maps are ordered, vectors keep insertion
//! order, so serialize → deserialize → serialize is byte-identical.

use crate::error::Error;
use crate::model::{Transaction, Height, Timestamp};
use crate::subwallet::SubWallet;
use crate::subwallets::SubWalletStore;
use crate::sync_status::SyncStatus;
use cwk_common::{BlockHash, KeyImage, PublicKey, SecretKey, TxHash};
use serde::{Deserialize, Serialize};

pub(crate) const WALLET_FILE_FORMAT_VERSION: u16 = 1;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WalletFile {
    pub wallet_file_format_version: u16,
    pub sub_wallets: SubWalletsFile,
    pub wallet_synchronizer: WalletSynchronizerFile,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubWalletsFile {
    pub public_spend_keys: Vec<PublicKey>,

    #[serde(rename = "subWallet")]
    pub sub_wallets: Vec<SubWallet>,

    pub transactions: Vec<Transaction>,

    pub locked_transactions: Vec<Transaction>,

    /// Which inputs each locked transaction spent; restored so a cancelled
    /// transaction can still unlock exactly its inputs after a reload.
    pub locked_transaction_inputs: Vec<LockedTransactionInputs>,

    pub private_view_key: SecretKey,

    pub is_view_wallet: bool,

    pub tx_private_keys: Vec<TxPrivateKeyEntry>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LockedTransactionInputs {
    pub transaction_hash: TxHash,
    pub inputs: Vec<LockedInputRef>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LockedInputRef {
    pub public_spend_key: PublicKey,
    pub key_image: KeyImage,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TxPrivateKeyEntry {
    pub transaction_hash: TxHash,
    pub tx_private_key: SecretKey,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WalletSynchronizerFile {
    pub start_timestamp: Timestamp,

    pub start_height: Height,

    pub private_view_key: SecretKey,

    pub transaction_synchronizer_status: SynchronizerStatusFile,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SynchronizerStatusFile {
    pub block_hash_checkpoints: Vec<BlockHash>,

    pub last_known_block_hashes: Vec<BlockHash>,

    pub last_known_block_height: Height,
}

/// Snapshot the live state into the persisted document.
pub(crate) fn to_wallet_file(
    store: &SubWalletStore,
    status: &SyncStatus,
    start_height: Height,
    start_timestamp: Timestamp,
) -> WalletFile {
    WalletFile {
        wallet_file_format_version: WALLET_FILE_FORMAT_VERSION,
        sub_wallets: SubWalletsFile {
            public_spend_keys: store.public_spend_keys(),
            sub_wallets: store.subwallets().cloned().collect(),
            transactions: store.transactions_slice().to_vec(),
            locked_transactions: store.locked_transactions_slice().to_vec(),
            locked_transaction_inputs: store
                .locked_tx_inputs_map()
                .iter()
                .map(|(hash, inputs)| LockedTransactionInputs {
                    transaction_hash: *hash,
                    inputs: inputs
                        .iter()
                        .map(|(key, image)| LockedInputRef {
                            public_spend_key: *key,
                            key_image: *image,
                        })
                        .collect(),
                })
                .collect(),
            private_view_key: store.private_view_key().clone(),
            is_view_wallet: store.is_view_wallet(),
            tx_private_keys: store
                .tx_private_keys_map()
                .iter()
                .map(|(hash, key)| TxPrivateKeyEntry {
                    transaction_hash: *hash,
                    tx_private_key: key.clone(),
                })
                .collect(),
        },
        wallet_synchronizer: WalletSynchronizerFile {
            start_timestamp,
            start_height,
            private_view_key: store.private_view_key().clone(),
            transaction_synchronizer_status: SynchronizerStatusFile {
                block_hash_checkpoints: status.checkpoint_hashes().copied().collect(),
                last_known_block_hashes: status.window().copied().collect(),
                last_known_block_height: status.last_known_height(),
            },
        },
    }
}

/// Rebuild the live state from the persisted document.
pub(crate) fn from_wallet_file(
    file: WalletFile,
) -> Result<(SubWalletStore, SyncStatus, Height, Timestamp), Error> {
    if file.wallet_file_format_version != WALLET_FILE_FORMAT_VERSION {
        return Err(Error::UnsupportedWalletVersion(
            file.wallet_file_format_version,
        ));
    }

    let sub_wallets = file.sub_wallets;
    let subwallets = sub_wallets
        .sub_wallets
        .into_iter()
        .map(|sub| (sub.public_spend_key(), sub))
        .collect();
    let locked_tx_inputs = sub_wallets
        .locked_transaction_inputs
        .into_iter()
        .map(|entry| {
            (
                entry.transaction_hash,
                entry
                    .inputs
                    .into_iter()
                    .map(|input| (input.public_spend_key, input.key_image))
                    .collect(),
            )
        })
        .collect();
    let tx_private_keys = sub_wallets
        .tx_private_keys
        .into_iter()
        .map(|entry| (entry.transaction_hash, entry.tx_private_key))
        .collect();

    let store = SubWalletStore::from_parts(
        subwallets,
        sub_wallets.transactions,
        sub_wallets.locked_transactions,
        locked_tx_inputs,
        sub_wallets.private_view_key,
        sub_wallets.is_view_wallet,
        tx_private_keys,
    );

    let synchronizer = file.wallet_synchronizer;
    let status = SyncStatus::from_parts(
        synchronizer
            .transaction_synchronizer_status
            .last_known_block_hashes,
        synchronizer
            .transaction_synchronizer_status
            .block_hash_checkpoints,
        synchronizer
            .transaction_synchronizer_status
            .last_known_block_height,
    );

    Ok((
        store,
        status,
        synchronizer.start_height,
        synchronizer.start_timestamp,
    ))
}
