use crate::error::{Error, WalletError};
use crate::model::{Height, Timestamp, Transaction, TransactionData, TransactionInput};
use crate::subwallet::SubWallet;
use cwk_common::{KeyImage, PublicKey, SecretKey, TxHash};
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::{BTreeMap, HashMap};

/// The authoritative in-memory ledger: every subwallet, the transaction
/// history, and the derived key-image ownership index.
///
/// The container owns all subwallets, inputs and transactions; subwallets are
/// created at construction or by import and never destroyed.
pub struct SubWalletStore {
    subwallets: BTreeMap<PublicKey, SubWallet>,

    /// Confirmed wallet transactions, in arrival order.
    transactions: Vec<Transaction>,

    /// Locally created transactions not yet seen in a block.
    locked_transactions: Vec<Transaction>,

    /// Which inputs each locked transaction spent, so cancellation can
    /// unlock exactly those.
    locked_tx_inputs: BTreeMap<TxHash, Vec<(PublicKey, KeyImage)>>,

    /// keyImage → owning public spend key, for O(1) ownership queries.
    key_image_owners: HashMap<KeyImage, PublicKey>,

    private_view_key: SecretKey,

    is_view_wallet: bool,

    /// Per-created-transaction private keys, kept for payment proofs.
    tx_private_keys: BTreeMap<TxHash, SecretKey>,
}

impl SubWalletStore {
    pub(crate) fn new(private_view_key: SecretKey, is_view_wallet: bool) -> Self {
        Self {
            subwallets: BTreeMap::new(),
            transactions: Vec::new(),
            locked_transactions: Vec::new(),
            locked_tx_inputs: BTreeMap::new(),
            key_image_owners: HashMap::new(),
            private_view_key,
            is_view_wallet,
            tx_private_keys: BTreeMap::new(),
        }
    }

    pub(crate) fn add_subwallet(&mut self, subwallet: SubWallet) -> Result<(), Error> {
        let key = subwallet.public_spend_key();
        if self.subwallets.contains_key(&key) {
            return Err(Error::SubWalletAlreadyExists);
        }
        self.subwallets.insert(key, subwallet);
        Ok(())
    }

    pub(crate) fn subwallets(&self) -> impl Iterator<Item = &SubWallet> {
        self.subwallets.values()
    }

    pub(crate) fn subwallet(&self, key: &PublicKey) -> Option<&SubWallet> {
        self.subwallets.get(key)
    }

    pub(crate) fn subwallet_mut(&mut self, key: &PublicKey) -> Option<&mut SubWallet> {
        self.subwallets.get_mut(key)
    }

    pub(crate) fn primary(&self) -> Option<&SubWallet> {
        self.subwallets.values().find(|sub| sub.is_primary())
    }

    pub fn public_spend_keys(&self) -> Vec<PublicKey> {
        self.subwallets.keys().copied().collect()
    }

    pub(crate) fn private_view_key(&self) -> &SecretKey {
        &self.private_view_key
    }

    pub fn is_view_wallet(&self) -> bool {
        self.is_view_wallet
    }

    /// Append a confirmed transaction. Idempotent by hash. A locked
    /// transaction with the same hash has confirmed: it leaves the locked
    /// list and its staged unconfirmed incoming amounts are dropped (the
    /// real outputs arrive through [`Self::store_transaction_input`]).
    pub fn add_transaction(&mut self, transaction: Transaction) {
        if self.transactions.iter().any(|tx| tx.hash == transaction.hash) {
            return;
        }

        let hash = transaction.hash;
        if self.locked_transactions.iter().any(|tx| tx.hash == hash) {
            self.locked_transactions.retain(|tx| tx.hash != hash);
            self.locked_tx_inputs.remove(&hash);
            for subwallet in self.subwallets.values_mut() {
                subwallet.remove_unconfirmed_incoming(&hash);
            }
        }

        self.transactions.push(transaction);
    }

    /// Stage a locally created outgoing transaction along with the inputs it
    /// locked, so a later cancellation can undo exactly that lock.
    pub fn add_unconfirmed_transaction(
        &mut self,
        transaction: Transaction,
        locked_inputs: Vec<(PublicKey, KeyImage)>,
    ) {
        self.locked_tx_inputs
            .insert(transaction.hash, locked_inputs);
        self.locked_transactions.push(transaction);
    }

    /// Record a newly discovered output for `owner`.
    ///
    /// A key image already present in the index is skipped: re-processing a
    /// block must not duplicate inputs.
    pub fn store_transaction_input(&mut self, owner: PublicKey, input: TransactionInput) {
        if !input.key_image.is_null() {
            if self.key_image_owners.contains_key(&input.key_image) {
                return;
            }
            self.key_image_owners.insert(input.key_image, owner);
        }
        if let Some(subwallet) = self.subwallets.get_mut(&owner) {
            subwallet.store_unspent_input(input);
        }
    }

    pub fn mark_input_as_spent(
        &mut self,
        owner: &PublicKey,
        key_image: &KeyImage,
        spend_height: Height,
    ) {
        if let Some(subwallet) = self.subwallets.get_mut(owner) {
            subwallet.mark_spent(key_image, spend_height);
        }
    }

    pub fn mark_input_as_locked(&mut self, owner: &PublicKey, key_image: &KeyImage) {
        if let Some(subwallet) = self.subwallets.get_mut(owner) {
            subwallet.mark_locked(key_image);
        }
    }

    /// A locked transaction did not confirm: unlock the inputs it spent and
    /// drop its staged state.
    pub fn remove_cancelled_transaction(&mut self, hash: &TxHash) {
        if let Some(locked) = self.locked_tx_inputs.remove(hash) {
            for (owner, key_image) in locked {
                if let Some(subwallet) = self.subwallets.get_mut(&owner) {
                    subwallet.unlock(&key_image);
                }
            }
        }
        self.locked_transactions.retain(|tx| tx.hash != *hash);
        self.tx_private_keys.remove(hash);
        for subwallet in self.subwallets.values_mut() {
            subwallet.remove_unconfirmed_incoming(hash);
        }
    }

    /// Revert all state recorded at or above `fork_height`.
    pub fn remove_forked_transactions(&mut self, fork_height: Height) {
        self.transactions
            .retain(|tx| tx.block_height < fork_height);
        for subwallet in self.subwallets.values_mut() {
            for key_image in subwallet.remove_forked(fork_height) {
                self.key_image_owners.remove(&key_image);
            }
        }
    }

    /// Apply the output of processing one block. Outputs are added before
    /// spends are marked, so a transaction that both pays us and spends from
    /// us lands correctly.
    pub(crate) fn apply_transaction_data(&mut self, data: TransactionData, block_height: Height) {
        for (owner, input) in data.inputs_to_add {
            self.store_transaction_input(owner, input);
        }
        for (owner, key_image) in &data.key_images_to_mark_spent {
            self.mark_input_as_spent(owner, key_image, block_height);
        }
        for transaction in data.txs_to_add {
            self.add_transaction(transaction);
        }
    }

    /// Pick unspent, unlockable inputs totalling at least `amount`,
    /// shuffle-then-accumulate. On success the returned total is `>= amount`.
    pub fn get_transaction_inputs_for_amount(
        &self,
        amount: u64,
        sources: &[PublicKey],
        current_height: Height,
        now: Timestamp,
    ) -> Result<(Vec<(PublicKey, TransactionInput)>, u64), WalletError> {
        let mut candidates: Vec<(PublicKey, TransactionInput)> = Vec::new();
        for key in sources {
            if let Some(subwallet) = self.subwallets.get(key) {
                candidates.extend(
                    subwallet
                        .spendable_inputs(current_height, now)
                        .map(|input| (*key, input.clone())),
                );
            }
        }
        candidates.shuffle(&mut thread_rng());

        let mut total = 0u64;
        let mut picked = Vec::new();
        for (key, input) in candidates {
            total = total
                .checked_add(input.amount)
                .ok_or(WalletError::WillOverflow)?;
            picked.push((key, input));
            if total >= amount {
                return Ok((picked, total));
            }
        }
        Err(WalletError::NotEnoughBalance)
    }

    /// Up to `max_inputs` of the smallest spendable inputs, for fusions.
    pub(crate) fn get_fusion_inputs(
        &self,
        max_inputs: usize,
        sources: &[PublicKey],
        current_height: Height,
        now: Timestamp,
    ) -> Vec<(PublicKey, TransactionInput)> {
        let mut candidates: Vec<(PublicKey, TransactionInput)> = Vec::new();
        for key in sources {
            if let Some(subwallet) = self.subwallets.get(key) {
                candidates.extend(
                    subwallet
                        .spendable_inputs(current_height, now)
                        .map(|input| (*key, input.clone())),
                );
            }
        }
        candidates.sort_by_key(|(_, input)| input.amount);
        candidates.truncate(max_inputs);
        candidates
    }

    /// The (unlocked, locked) balance over `sources`, or over every
    /// subwallet when `sources` is `None`.
    pub fn get_balance(
        &self,
        current_height: Height,
        now: Timestamp,
        sources: Option<&[PublicKey]>,
    ) -> (u64, u64) {
        let mut unlocked = 0u64;
        let mut locked = 0u64;
        for (key, subwallet) in &self.subwallets {
            if let Some(sources) = sources {
                if !sources.contains(key) {
                    continue;
                }
            }
            let (u, l) = subwallet.balance(current_height, now);
            unlocked += u;
            locked += l;
        }
        (unlocked, locked)
    }

    /// Which subwallet owns `key_image`, if any.
    pub fn get_key_image_owner(&self, key_image: &KeyImage) -> Option<PublicKey> {
        self.key_image_owners.get(key_image).copied()
    }

    /// The transaction history, newest first, with unconfirmed transactions
    /// always at the front regardless of timestamp.
    pub fn get_transactions(&self) -> Vec<Transaction> {
        let mut confirmed = self.transactions.clone();
        confirmed.sort_by(|a, b| b.block_height.cmp(&a.block_height));
        self.locked_transactions
            .iter()
            .rev()
            .cloned()
            .chain(confirmed)
            .collect()
    }

    pub fn get_transaction(&self, hash: &TxHash) -> Option<&Transaction> {
        self.locked_transactions
            .iter()
            .chain(self.transactions.iter())
            .find(|tx| tx.hash == *hash)
    }

    pub(crate) fn locked_transaction_hashes(&self) -> Vec<TxHash> {
        self.locked_transactions.iter().map(|tx| tx.hash).collect()
    }

    pub(crate) fn store_tx_private_key(&mut self, hash: TxHash, key: SecretKey) {
        self.tx_private_keys.insert(hash, key);
    }

    pub fn get_tx_private_key(&self, hash: &TxHash) -> Option<&SecretKey> {
        self.tx_private_keys.get(hash)
    }

    pub(crate) fn store_unconfirmed_incoming(
        &mut self,
        owner: &PublicKey,
        input: crate::model::UnconfirmedInput,
    ) {
        if let Some(subwallet) = self.subwallets.get_mut(owner) {
            subwallet.store_unconfirmed_incoming(input);
        }
    }

    /// Rebuild the derived key-image index; used after deserialization.
    pub(crate) fn rebuild_key_image_index(&mut self) {
        self.key_image_owners.clear();
        for (key, subwallet) in &self.subwallets {
            for input in subwallet
                .unspent_inputs
                .iter()
                .chain(subwallet.locked_inputs.iter())
                .chain(subwallet.spent_inputs.iter())
            {
                if !input.key_image.is_null() {
                    self.key_image_owners.insert(input.key_image, *key);
                }
            }
        }
    }

    pub(crate) fn transactions_slice(&self) -> &[Transaction] {
        &self.transactions
    }

    pub(crate) fn locked_transactions_slice(&self) -> &[Transaction] {
        &self.locked_transactions
    }

    pub(crate) fn locked_tx_inputs_map(&self) -> &BTreeMap<TxHash, Vec<(PublicKey, KeyImage)>> {
        &self.locked_tx_inputs
    }

    pub(crate) fn tx_private_keys_map(&self) -> &BTreeMap<TxHash, SecretKey> {
        &self.tx_private_keys
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        subwallets: BTreeMap<PublicKey, SubWallet>,
        transactions: Vec<Transaction>,
        locked_transactions: Vec<Transaction>,
        locked_tx_inputs: BTreeMap<TxHash, Vec<(PublicKey, KeyImage)>>,
        private_view_key: SecretKey,
        is_view_wallet: bool,
        tx_private_keys: BTreeMap<TxHash, SecretKey>,
    ) -> Self {
        let mut store = Self {
            subwallets,
            transactions,
            locked_transactions,
            locked_tx_inputs,
            key_image_owners: HashMap::new(),
            private_view_key,
            is_view_wallet,
            tx_private_keys,
        };
        store.rebuild_key_image_index();
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnconfirmedInput;

    fn input(amount: u64, block_height: Height, fill: u8) -> TransactionInput {
        TransactionInput {
            key_image: KeyImage::from_bytes([fill; 32]),
            amount,
            block_height,
            tx_public_key: PublicKey::NULL,
            index_in_tx: 0,
            global_output_index: None,
            one_time_public_key: PublicKey::from_bytes([fill; 32]),
            spend_height: 0,
            unlock_time: 0,
            parent_tx_hash: TxHash::from_bytes([fill; 32]),
        }
    }

    fn tx(hash_fill: u8, height: Height, transfers: &[(PublicKey, i64)], fee: u64) -> Transaction {
        Transaction {
            transfers: transfers.iter().cloned().collect(),
            hash: TxHash::from_bytes([hash_fill; 32]),
            fee,
            block_height: height,
            timestamp: 0,
            payment_id: String::new(),
            unlock_time: 0,
            is_coinbase: false,
        }
    }

    fn store_with_subwallet() -> (SubWalletStore, PublicKey) {
        let key = PublicKey::from_bytes([9; 32]);
        let mut store = SubWalletStore::new(SecretKey::NULL, false);
        store
            .add_subwallet(SubWallet::new(key, SecretKey::NULL, 0, 0, true))
            .unwrap();
        (store, key)
    }

    #[test]
    fn test_key_image_index_unique_ownership() {
        let (mut store, key) = store_with_subwallet();
        store.store_transaction_input(key, input(100, 1, 1));
        // a second arrival of the same key image is ignored
        store.store_transaction_input(key, input(100, 1, 1));

        assert_eq!(
            store.get_key_image_owner(&KeyImage::from_bytes([1; 32])),
            Some(key)
        );
        let subwallet = store.subwallet(&key).unwrap();
        assert_eq!(subwallet.unspent_inputs.len(), 1);
    }

    #[test]
    fn test_add_transaction_idempotent() {
        let (mut store, key) = store_with_subwallet();
        let transaction = tx(1, 5, &[(key, 1000)], 10);
        store.add_transaction(transaction.clone());
        store.add_transaction(transaction);
        assert_eq!(store.get_transactions().len(), 1);
    }

    #[test]
    fn test_confirming_locked_transaction() {
        let (mut store, key) = store_with_subwallet();
        store.store_transaction_input(key, input(1000, 1, 1));
        let key_image = KeyImage::from_bytes([1; 32]);

        let pending = tx(7, 0, &[(key, -510)], 10);
        store.mark_input_as_locked(&key, &key_image);
        store.add_unconfirmed_transaction(pending.clone(), vec![(key, key_image)]);
        store.store_unconfirmed_incoming(
            &key,
            UnconfirmedInput {
                amount: 490,
                one_time_public_key: PublicKey::NULL,
                parent_tx_hash: pending.hash,
            },
        );

        // History shows the unconfirmed transaction first
        assert_eq!(store.get_transactions()[0].hash, pending.hash);
        assert_eq!(store.get_balance(1, 0, None), (0, 490));

        // The transaction confirms at height 9
        let confirmed = tx(7, 9, &[(key, -510)], 10);
        store.mark_input_as_spent(&key, &key_image, 9);
        store.add_transaction(confirmed);

        assert_eq!(store.locked_transaction_hashes().len(), 0);
        assert_eq!(store.get_balance(9, 0, None), (0, 0));
        let subwallet = store.subwallet(&key).unwrap();
        assert_eq!(subwallet.spent_inputs.len(), 1);
        assert!(subwallet.unconfirmed_incoming.is_empty());
    }

    #[test]
    fn test_cancelled_transaction_restores_partition() {
        let (mut store, key) = store_with_subwallet();
        store.store_transaction_input(key, input(1000, 1, 1));
        let key_image = KeyImage::from_bytes([1; 32]);
        let pending = tx(7, 0, &[(key, -510)], 10);

        store.mark_input_as_locked(&key, &key_image);
        store.add_unconfirmed_transaction(pending.clone(), vec![(key, key_image)]);
        store.remove_cancelled_transaction(&pending.hash);

        assert_eq!(store.get_balance(1, 0, None), (1000, 0));
        assert!(store.get_transactions().is_empty());
        let subwallet = store.subwallet(&key).unwrap();
        assert!(subwallet.locked_inputs.is_empty());
        assert_eq!(subwallet.unspent_inputs.len(), 1);
    }

    #[test]
    fn test_fork_purges_everything_above() {
        let (mut store, key) = store_with_subwallet();
        store.store_transaction_input(key, input(100, 5, 1));
        store.store_transaction_input(key, input(200, 9, 2));
        store.add_transaction(tx(1, 5, &[(key, 100)], 0));
        store.add_transaction(tx(2, 9, &[(key, 200)], 0));
        store.mark_input_as_spent(&key, &KeyImage::from_bytes([1; 32]), 9);

        store.remove_forked_transactions(8);

        let remaining = store.get_transactions();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].block_height < 8);
        assert_eq!(store.get_key_image_owner(&KeyImage::from_bytes([2; 32])), None);
        // the spent mark at height 9 was reverted
        assert_eq!(store.get_balance(9, 0, None), (100, 0));
    }

    #[test]
    fn test_input_selection_totals() {
        let (mut store, key) = store_with_subwallet();
        for (amount, fill) in [(100u64, 1u8), (200, 2), (300, 3)] {
            store.store_transaction_input(key, input(amount, 1, fill));
        }

        let (picked, total) = store
            .get_transaction_inputs_for_amount(250, &[key], 10, 0)
            .unwrap();
        assert!(total >= 250);
        assert_eq!(
            total,
            picked.iter().map(|(_, input)| input.amount).sum::<u64>()
        );

        let err = store
            .get_transaction_inputs_for_amount(601, &[key], 10, 0)
            .unwrap_err();
        assert_eq!(err, WalletError::NotEnoughBalance);
    }

    #[test]
    fn test_fusion_inputs_prefer_small() {
        let (mut store, key) = store_with_subwallet();
        for (amount, fill) in [(500u64, 1u8), (10, 2), (20, 3), (30, 4)] {
            store.store_transaction_input(key, input(amount, 1, fill));
        }
        let picked = store.get_fusion_inputs(3, &[key], 10, 0);
        let amounts: Vec<u64> = picked.iter().map(|(_, input)| input.amount).collect();
        assert_eq!(amounts, vec![10, 20, 30]);
    }

    #[test]
    fn test_history_ordering() {
        let (mut store, key) = store_with_subwallet();
        store.add_transaction(tx(1, 5, &[(key, 100)], 0));
        store.add_transaction(tx(2, 9, &[(key, 200)], 0));
        store.add_unconfirmed_transaction(tx(3, 0, &[(key, -50)], 10), vec![]);

        let history = store.get_transactions();
        let hashes: Vec<TxHash> = history.iter().map(|tx| tx.hash).collect();
        assert_eq!(
            hashes,
            vec![
                TxHash::from_bytes([3; 32]),
                TxHash::from_bytes([2; 32]),
                TxHash::from_bytes([1; 32]),
            ]
        );
    }

    #[test]
    fn test_index_rebuild_matches() {
        let (mut store, key) = store_with_subwallet();
        store.store_transaction_input(key, input(100, 1, 1));
        store.store_transaction_input(key, input(200, 2, 2));

        let before: Vec<_> = [[1u8; 32], [2u8; 32]]
            .iter()
            .map(|fill| store.get_key_image_owner(&KeyImage::from_bytes(*fill)))
            .collect();
        store.rebuild_key_image_index();
        let after: Vec<_> = [[1u8; 32], [2u8; 32]]
            .iter()
            .map(|fill| store.get_key_image_owner(&KeyImage::from_bytes(*fill)))
            .collect();
        assert_eq!(before, after);
    }
}
