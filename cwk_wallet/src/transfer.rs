//! Outgoing transactions: input selection, policy checks, and the handoff
//! to the external transaction builder and the node.
//!
//! The actual ring-signature construction lives behind the
//! [`TransactionBuilder`] trait; this module owns everything around it:
//! what to spend, what to validate, what to stage, and how to undo the
//! staging when the node rejects the result.

use crate::clients::wire::RandomOutsForAmount;
use crate::error::{Error, WalletError};
use crate::events::WalletEvent;
use crate::model::{Transaction, TransactionInput, UnconfirmedInput};
use crate::validators;
use crate::wallet::WalletInner;
use cwk_common::{Address, KeyImage, PublicKey, SecretKey, TxHash};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

/// An input selected for spending, with the ephemeral secret the ring
/// signature needs.
#[derive(Debug, Clone)]
pub struct PreparedInput {
    pub owner: PublicKey,
    pub input: TransactionInput,
    pub private_ephemeral: SecretKey,
}

/// Everything the external builder needs to produce a signed transaction.
pub struct BuildParams<'a> {
    pub inputs: &'a [PreparedInput],
    pub destinations: &'a [(Address, u64)],
    pub change_address: &'a Address,
    pub change_amount: u64,
    pub mixin: u64,
    pub fee: u64,
    /// Empty when no payment ID applies.
    pub payment_id: &'a str,
    pub random_outs: &'a [RandomOutsForAmount],
}

/// What the external builder hands back.
pub struct BuiltTransaction {
    pub hash: TxHash,
    pub raw_hex: String,
    pub tx_private_key: SecretKey,
    /// One-time key of the change output, when there is change.
    pub change_output_key: Option<PublicKey>,
}

/// The external collaborator that turns selected inputs into a raw
/// transaction blob. The wallet core never builds ring signatures itself.
pub trait TransactionBuilder: Send + Sync {
    fn build(&self, params: BuildParams<'_>) -> Result<BuiltTransaction, Error>;
}

/// Releases the single-flight transacting flag on scope exit.
struct TransactingGuard<'a>(&'a WalletInner);

impl Drop for TransactingGuard<'_> {
    fn drop(&mut self) {
        self.0.transacting.store(false, Ordering::SeqCst);
    }
}

fn acquire_transacting(inner: &WalletInner) -> Result<TransactingGuard<'_>, WalletError> {
    if inner
        .transacting
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(WalletError::TransactionInProgress);
    }
    Ok(TransactingGuard(inner))
}

pub(crate) async fn send_basic(
    inner: &WalletInner,
    destination: &str,
    amount: u64,
    payment_id: Option<String>,
) -> Result<TxHash, Error> {
    send_advanced(
        inner,
        vec![(destination.to_string(), amount)],
        None,
        None,
        payment_id,
        None,
        None,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn send_advanced(
    inner: &WalletInner,
    destinations: Vec<(String, u64)>,
    mixin: Option<u64>,
    fee: Option<u64>,
    payment_id: Option<String>,
    sources: Option<Vec<PublicKey>>,
    change_address: Option<String>,
) -> Result<TxHash, Error> {
    let _guard = acquire_transacting(inner)?;

    let height = inner.best_known_height().await;
    let now = crate::wallet::unix_time();
    let fee = fee.unwrap_or(inner.config.minimum_fee);
    let mixin = mixin.unwrap_or_else(|| inner.config.mixin_limits.default_by_height(height));
    let payment_id = payment_id.unwrap_or_default();

    // Validation, all before any state is touched
    let total_needed = validators::validate_destinations(&destinations, fee)?;
    let destination_refs: Vec<&str> = destinations.iter().map(|(a, _)| a.as_str()).collect();
    validators::validate_addresses(&destination_refs, true, &inner.config)?;
    validators::validate_payment_id(&payment_id)?;
    validators::validate_payment_id_against_destinations(&payment_id, &destinations, &inner.config)?;
    validators::validate_fee(fee, inner.config.minimum_fee)?;
    validators::validate_mixin(mixin, height, &inner.config.mixin_limits)?;

    let (picked, total, change_address) = {
        let store = inner.store.lock().await;
        if store.is_view_wallet() {
            return Err(Error::ViewWalletCannotSpend);
        }
        let sources = match sources {
            Some(sources) => {
                for key in &sources {
                    if store.subwallet(key).is_none() {
                        return Err(WalletError::AddressNotInWallet.into());
                    }
                }
                sources
            }
            None => store.public_spend_keys(),
        };
        let change_address = match change_address {
            Some(address) => {
                let decoded = validators::validate_address(&address, false, &inner.config)?;
                if store.subwallet(&decoded.spend()).is_none() {
                    return Err(WalletError::AddressNotInWallet.into());
                }
                decoded
            }
            None => inner.primary_address(&store)?,
        };

        let (picked, total) = store.get_transaction_inputs_for_amount(
            total_needed,
            &sources,
            height,
            now,
        )?;
        (picked, total, change_address)
    };
    let change = total - total_needed;

    let builder = inner.builder.get().ok_or(Error::NoTransactionBuilder)?;
    let built = prepare_and_build(
        inner,
        builder.as_ref(),
        picked.clone(),
        &parse_destinations(&destinations, &inner.config)?,
        &change_address,
        change,
        mixin,
        fee,
        &payment_id,
    )
    .await?;

    let transaction = staged_transaction(&built, &picked, &change_address, change, fee, &payment_id);

    stage_and_submit(inner, built, transaction, picked, change, &change_address, false).await
}

pub(crate) async fn send_fusion_basic(inner: &WalletInner) -> Result<TxHash, Error> {
    send_fusion_advanced(inner, None, None).await
}

pub(crate) async fn send_fusion_advanced(
    inner: &WalletInner,
    mixin: Option<u64>,
    sources: Option<Vec<PublicKey>>,
) -> Result<TxHash, Error> {
    let _guard = acquire_transacting(inner)?;

    let height = inner.best_known_height().await;
    let now = crate::wallet::unix_time();
    let mixin = mixin.unwrap_or_else(|| inner.config.mixin_limits.default_by_height(height));
    validators::validate_mixin(mixin, height, &inner.config.mixin_limits)?;

    let (picked, total, destination) = {
        let store = inner.store.lock().await;
        if store.is_view_wallet() {
            return Err(Error::ViewWalletCannotSpend);
        }
        let sources = sources.unwrap_or_else(|| store.public_spend_keys());
        let picked =
            store.get_fusion_inputs(inner.config.max_fusion_inputs, &sources, height, now);
        let total: u64 = picked.iter().map(|(_, input)| input.amount).sum();
        (picked, total, inner.primary_address(&store)?)
    };

    // A fusion must strictly reduce the input count
    if picked.len() < 2 || count_denominations(total) >= picked.len() {
        return Err(Error::FullyOptimized);
    }

    let builder = inner.builder.get().ok_or(Error::NoTransactionBuilder)?;
    let built = prepare_and_build(
        inner,
        builder.as_ref(),
        picked.clone(),
        &[(destination.clone(), total)],
        &destination,
        0,
        mixin,
        0,
        "",
    )
    .await?;

    let transaction = staged_transaction(&built, &picked, &destination, total, 0, "");

    stage_and_submit(inner, built, transaction, picked, 0, &destination, true).await
}

fn parse_destinations(
    destinations: &[(String, u64)],
    config: &crate::Config,
) -> Result<Vec<(Address, u64)>, Error> {
    destinations
        .iter()
        .map(|(address, amount)| {
            let decoded =
                validators::validate_address(address, true, config).map_err(Error::from)?;
            Ok((decoded, *amount))
        })
        .collect()
}

/// Backfill missing global indexes, derive the ephemeral secrets, fetch the
/// decoys, and run the external builder.
#[allow(clippy::too_many_arguments)]
async fn prepare_and_build(
    inner: &WalletInner,
    builder: &dyn TransactionBuilder,
    mut picked: Vec<(PublicKey, TransactionInput)>,
    destinations: &[(Address, u64)],
    change_address: &Address,
    change: u64,
    mixin: u64,
    fee: u64,
    payment_id: &str,
) -> Result<BuiltTransaction, Error> {
    fill_global_indexes(inner, &mut picked).await?;

    let prepared = {
        let store = inner.store.lock().await;
        let crypto = inner.config.crypto.as_ref();
        let view_key = store.private_view_key().clone();
        picked
            .into_iter()
            .map(|(owner, input)| {
                let spend_key = store
                    .subwallet(&owner)
                    .map(|sub| sub.private_spend_key().clone())
                    .unwrap_or(SecretKey::NULL);
                let derivation = crypto.key_derivation(&input.tx_public_key, &view_key);
                let private_ephemeral =
                    crypto.private_ephemeral(&derivation, input.index_in_tx, &spend_key);
                PreparedInput {
                    owner,
                    input,
                    private_ephemeral,
                }
            })
            .collect::<Vec<_>>()
    };

    // One extra decoy per ring in case the node returns the real output
    let random_outs = if mixin > 0 {
        let amounts: Vec<u64> = prepared.iter().map(|p| p.input.amount).collect();
        let mut node = inner.node.lock().await;
        node.get_random_outputs(amounts, mixin + 1).await?
    } else {
        Vec::new()
    };

    builder.build(BuildParams {
        inputs: &prepared,
        destinations,
        change_address,
        change_amount: change,
        mixin,
        fee,
        payment_id,
        random_outs: &random_outs,
    })
}

/// Chain nodes do not embed global indexes in the sync data; fetch them for
/// the block span covering the selected inputs.
async fn fill_global_indexes(
    inner: &WalletInner,
    picked: &mut [(PublicKey, TransactionInput)],
) -> Result<(), Error> {
    let missing: Vec<u64> = picked
        .iter()
        .filter(|(_, input)| input.global_output_index.is_none())
        .map(|(_, input)| input.block_height)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let start = missing.iter().min().copied().unwrap_or(0);
    let end = missing.iter().max().copied().unwrap_or(0) + 1;
    let indexes = {
        let mut node = inner.node.lock().await;
        node.get_global_indexes_for_range(start, end).await?
    };

    for (_, input) in picked.iter_mut() {
        if input.global_output_index.is_some() {
            continue;
        }
        let tx_indexes = indexes
            .get(&input.parent_tx_hash)
            .ok_or(Error::MissingGlobalIndex)?;
        input.global_output_index = tx_indexes
            .get(input.index_in_tx as usize)
            .copied()
            .map(Some)
            .ok_or(Error::MissingGlobalIndex)?;
    }

    // Reflect the learned indexes in the store so the next spend skips the
    // round-trip
    let mut store = inner.store.lock().await;
    for (owner, input) in picked.iter() {
        if let Some(subwallet_input) = store
            .subwallet_mut(owner)
            .and_then(|sub| sub.input_mut(&input.key_image))
        {
            subwallet_input.global_output_index = input.global_output_index;
        }
    }
    Ok(())
}

/// The wallet-side view of the transaction being staged: spends per owner,
/// change back to the change subwallet.
fn staged_transaction(
    built: &BuiltTransaction,
    picked: &[(PublicKey, TransactionInput)],
    change_address: &Address,
    change: u64,
    fee: u64,
    payment_id: &str,
) -> Transaction {
    let mut transfers: BTreeMap<PublicKey, i64> = BTreeMap::new();
    for (owner, input) in picked {
        *transfers.entry(*owner).or_insert(0) -= input.amount as i64;
    }
    if change > 0 {
        *transfers.entry(change_address.spend()).or_insert(0) += change as i64;
    }
    Transaction {
        transfers,
        hash: built.hash,
        fee,
        block_height: 0,
        timestamp: 0,
        payment_id: payment_id.to_string(),
        unlock_time: 0,
        is_coinbase: false,
    }
}

/// Lock the inputs, stage the transaction, submit it, and undo everything
/// if the node rejects it.
async fn stage_and_submit(
    inner: &WalletInner,
    built: BuiltTransaction,
    transaction: Transaction,
    picked: Vec<(PublicKey, TransactionInput)>,
    change: u64,
    change_address: &Address,
    is_fusion: bool,
) -> Result<TxHash, Error> {
    let hash = built.hash;
    let locked: Vec<(PublicKey, KeyImage)> = picked
        .iter()
        .map(|(owner, input)| (*owner, input.key_image))
        .collect();

    {
        let mut store = inner.store.lock().await;
        for (owner, key_image) in &locked {
            store.mark_input_as_locked(owner, key_image);
        }
        store.add_unconfirmed_transaction(transaction.clone(), locked);
        if change > 0 {
            store.store_unconfirmed_incoming(
                &change_address.spend(),
                UnconfirmedInput {
                    amount: change,
                    one_time_public_key: built.change_output_key.unwrap_or(PublicKey::NULL),
                    parent_tx_hash: hash,
                },
            );
        }
        store.store_tx_private_key(hash, built.tx_private_key.clone());
    }

    let accepted = {
        let mut node = inner.node.lock().await;
        node.send_raw_transaction(built.raw_hex.clone()).await
    };

    match accepted {
        Ok(true) => {
            log::info!("transaction {hash} submitted");
            inner.events.emit(if is_fusion {
                WalletEvent::CreatedFusionTransaction(transaction)
            } else {
                WalletEvent::CreatedTransaction(transaction)
            });
            Ok(hash)
        }
        Ok(false) => {
            revert_staging(inner, &hash).await;
            Err(Error::TransactionRejected)
        }
        Err(e) => {
            revert_staging(inner, &hash).await;
            Err(e)
        }
    }
}

async fn revert_staging(inner: &WalletInner, hash: &TxHash) {
    log::warn!("reverting rejected transaction {hash}");
    let mut store = inner.store.lock().await;
    store.remove_cancelled_transaction(hash);
}

/// How many outputs a CryptoNote wallet needs to represent `amount`: one
/// per nonzero decimal digit.
pub(crate) fn count_denominations(mut amount: u64) -> usize {
    let mut count = 0;
    while amount > 0 {
        if amount % 10 != 0 {
            count += 1;
        }
        amount /= 10;
    }
    count
}
