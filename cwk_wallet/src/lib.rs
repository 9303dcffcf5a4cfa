#![cfg_attr(not(test), deny(clippy::unwrap_used))]

//! # CryptoNote Wallet Kit
//!
//! A light-client wallet backend for a CryptoNote-family chain: it holds
//! the keys, replicates the on-chain state relevant to them from a remote
//! node, and builds outgoing transactions.
//!
//! For an entry point see [`WalletBackend::create()`] or
//! [`WalletBackend::import_from_keys()`]; call [`WalletBackend::start()`]
//! to begin syncing.

mod clients;
mod config;
mod crypto;
mod error;
mod events;
mod model;
mod processor;
mod scheduler;
mod serialization;
mod subwallet;
mod subwallets;
mod sync_status;
mod transfer;
mod validators;
mod wallet;

pub use crate::clients::wire::{
    KeyInput, KeyOutput, RandomOutput, RandomOutsForAmount, RawBlock, RawCoinbaseTransaction,
    RawTransaction,
};
pub use crate::clients::{FeeInfo, NodeClient, NodeKind};
pub use crate::config::{Config, MixinLimit, MixinLimits};
pub use crate::crypto::{BuiltinCrypto, CryptoProvider};
pub use crate::error::{Error, WalletError};
pub use crate::events::WalletEvent;
pub use crate::model::{
    Height, NodeInfo, Timestamp, TopBlock, Transaction, TransactionData, TransactionInput,
    UnconfirmedInput,
};
pub use crate::subwallet::SubWallet;
pub use crate::subwallets::SubWalletStore;
pub use crate::sync_status::SyncStatus;
pub use crate::transfer::{BuildParams, BuiltTransaction, PreparedInput, TransactionBuilder};
pub use crate::validators::{
    parse_amount, validate_address, validate_addresses, validate_destinations, validate_fee,
    validate_mixin, validate_our_addresses, validate_payment_id,
};
pub use crate::wallet::WalletBackend;

pub use cwk_common;
