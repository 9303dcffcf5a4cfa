use crate::model::{Height, Timestamp, TransactionInput, UnconfirmedInput};
use cwk_common::{KeyImage, PublicKey, SecretKey, TxHash};
use serde::{Deserialize, Serialize};

/// One spend-keypair-addressable account within the wallet container.
///
/// Holds the three disjoint input sets. An input moves
/// unspent → locked → spent monotonically; only a fork may destroy inputs or
/// revert a spent mark.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubWallet {
    pub(crate) public_spend_key: PublicKey,

    /// The zero scalar for a view-only subwallet.
    pub(crate) private_spend_key: SecretKey,

    pub(crate) scan_start_height: Height,

    pub(crate) scan_start_timestamp: Timestamp,

    pub(crate) is_primary: bool,

    pub(crate) unspent_inputs: Vec<TransactionInput>,

    pub(crate) locked_inputs: Vec<TransactionInput>,

    pub(crate) spent_inputs: Vec<TransactionInput>,

    pub(crate) unconfirmed_incoming: Vec<UnconfirmedInput>,
}

impl SubWallet {
    pub(crate) fn new(
        public_spend_key: PublicKey,
        private_spend_key: SecretKey,
        scan_start_height: Height,
        scan_start_timestamp: Timestamp,
        is_primary: bool,
    ) -> Self {
        Self {
            public_spend_key,
            private_spend_key,
            scan_start_height,
            scan_start_timestamp,
            is_primary,
            unspent_inputs: Vec::new(),
            locked_inputs: Vec::new(),
            spent_inputs: Vec::new(),
            unconfirmed_incoming: Vec::new(),
        }
    }

    pub fn public_spend_key(&self) -> PublicKey {
        self.public_spend_key
    }

    pub(crate) fn private_spend_key(&self) -> &SecretKey {
        &self.private_spend_key
    }

    /// Whether this subwallet cannot spend (no private spend key).
    pub fn is_view_only(&self) -> bool {
        self.private_spend_key.is_null()
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub(crate) fn store_unspent_input(&mut self, input: TransactionInput) {
        self.unspent_inputs.push(input);
    }

    /// Move an input to the spent set, recording the spending height.
    /// Searches unspent first, then locked (our own pending spend confirming).
    pub(crate) fn mark_spent(&mut self, key_image: &KeyImage, spend_height: Height) -> bool {
        let from_unspent = take_input(&mut self.unspent_inputs, key_image);
        let mut input = match from_unspent.or_else(|| take_input(&mut self.locked_inputs, key_image))
        {
            Some(input) => input,
            None => return false,
        };
        input.spend_height = spend_height;
        self.spent_inputs.push(input);
        true
    }

    /// Move an input from unspent to locked, pending our own transaction.
    pub(crate) fn mark_locked(&mut self, key_image: &KeyImage) -> bool {
        match take_input(&mut self.unspent_inputs, key_image) {
            Some(input) => {
                self.locked_inputs.push(input);
                true
            }
            None => false,
        }
    }

    /// Move an input from locked back to unspent (cancelled transaction).
    pub(crate) fn unlock(&mut self, key_image: &KeyImage) -> bool {
        match take_input(&mut self.locked_inputs, key_image) {
            Some(mut input) => {
                input.spend_height = 0;
                self.unspent_inputs.push(input);
                true
            }
            None => false,
        }
    }

    pub(crate) fn store_unconfirmed_incoming(&mut self, input: UnconfirmedInput) {
        self.unconfirmed_incoming.push(input);
    }

    pub(crate) fn remove_unconfirmed_incoming(&mut self, tx_hash: &TxHash) {
        self.unconfirmed_incoming
            .retain(|input| input.parent_tx_hash != *tx_hash);
    }

    /// Destroy inputs created at or above the fork and revert spent marks
    /// recorded at or above it. Returns the key images of destroyed inputs
    /// so the store can drop them from its index.
    pub(crate) fn remove_forked(&mut self, fork_height: Height) -> Vec<KeyImage> {
        let mut destroyed = Vec::new();
        for inputs in [
            &mut self.unspent_inputs,
            &mut self.locked_inputs,
            &mut self.spent_inputs,
        ] {
            inputs.retain(|input| {
                if input.block_height >= fork_height {
                    destroyed.push(input.key_image);
                    false
                } else {
                    true
                }
            });
        }

        // Spent marks above the fork are invalid, the inputs become unspent
        let mut reverted = Vec::new();
        self.spent_inputs.retain(|input| {
            if input.spend_height >= fork_height {
                reverted.push(input.clone());
                false
            } else {
                true
            }
        });
        for mut input in reverted {
            input.spend_height = 0;
            self.unspent_inputs.push(input);
        }

        destroyed
    }

    /// The (unlocked, locked) balance of this subwallet. The locked side
    /// counts time-locked unspent inputs and unconfirmed incoming amounts;
    /// inputs locked by our own pending transactions count for neither.
    pub(crate) fn balance(&self, current_height: Height, now: Timestamp) -> (u64, u64) {
        let mut unlocked = 0u64;
        let mut locked = 0u64;
        for input in &self.unspent_inputs {
            if input.is_unlocked(current_height, now) {
                unlocked += input.amount;
            } else {
                locked += input.amount;
            }
        }
        for input in &self.unconfirmed_incoming {
            locked += input.amount;
        }
        (unlocked, locked)
    }

    /// Unspent inputs that can be spent at the given height.
    pub(crate) fn spendable_inputs(
        &self,
        current_height: Height,
        now: Timestamp,
    ) -> impl Iterator<Item = &TransactionInput> {
        self.unspent_inputs
            .iter()
            .filter(move |input| input.is_unlocked(current_height, now))
    }

    pub(crate) fn input_mut(&mut self, key_image: &KeyImage) -> Option<&mut TransactionInput> {
        self.unspent_inputs
            .iter_mut()
            .chain(self.locked_inputs.iter_mut())
            .find(|input| input.key_image == *key_image)
    }
}

fn take_input(inputs: &mut Vec<TransactionInput>, key_image: &KeyImage) -> Option<TransactionInput> {
    let position = inputs.iter().position(|input| input.key_image == *key_image)?;
    Some(inputs.swap_remove(position))
}
