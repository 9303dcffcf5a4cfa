#![cfg_attr(not(test), deny(clippy::unwrap_used))]

//! A crate containing common code used by the other crates in the workspace, such as:
//!
//!   * 32-byte key newtypes ([`PublicKey`], [`SecretKey`], [`KeyImage`]) with hex
//!     text and serde representations
//!   * The CryptoNote block-wise base58 codec and the [`Address`] codec built on it
//!   * [`Precision`]: conversion between atomic units and display strings
//!
//! To avoid circular dependencies this crate must not depend on other crates of the workspace

mod address;
mod base58;
mod error;
mod keys;
pub mod precision;

pub use crate::address::Address;
pub use crate::base58::{cn_base58_decode, cn_base58_encode, is_base58_char};
pub use crate::error::Error;
pub use crate::keys::{BlockHash, KeyImage, PublicKey, SecretKey, TxHash};
pub use crate::precision::Precision;

/// Length in hex characters of a key or key image.
pub const KEY_HEX_LEN: usize = 64;

/// Length in hex characters of a payment ID.
pub const PAYMENT_ID_HEX_LEN: usize = 64;
