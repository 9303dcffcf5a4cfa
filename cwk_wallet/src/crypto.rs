//! The handful of one-shot CryptoNote operations the wallet needs.
//!
//! Every operation is deterministic and total: when the built-in path cannot
//! interpret its input as curve data it returns the null key rather than an
//! error, and downstream classification treats a null result as "not mine".
//!
//! Embedders may override any subset of the operations by implementing
//! [`CryptoProvider`] (e.g. with a native implementation) and installing it
//! via [`crate::Config::with_crypto_provider`].

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use cwk_common::{KeyImage, PublicKey, SecretKey};
use monero_generators::hash_to_point;
use rand::RngCore;
use sha3::{Digest, Keccak256};

/// The five primitive operations used during scanning and spending.
///
/// The default methods are the built-in implementation; override any subset.
pub trait CryptoProvider: Send + Sync {
    /// `D = 8 · (privView · txPub)`, the shared secret of a transaction.
    fn key_derivation(&self, tx_public_key: &PublicKey, private_view_key: &SecretKey) -> PublicKey {
        key_derivation(tx_public_key, private_view_key)
    }

    /// `P = H_s(D ‖ idx)·G + pubSpend`, the one-time key of an output.
    fn public_ephemeral(
        &self,
        derivation: &PublicKey,
        output_index: u64,
        public_spend_key: &PublicKey,
    ) -> PublicKey {
        public_ephemeral(derivation, output_index, public_spend_key)
    }

    /// `p = H_s(D ‖ idx) + privSpend`, the secret behind [`Self::public_ephemeral`].
    fn private_ephemeral(
        &self,
        derivation: &PublicKey,
        output_index: u64,
        private_spend_key: &SecretKey,
    ) -> SecretKey {
        private_ephemeral(derivation, output_index, private_spend_key)
    }

    /// `I = p · H_p(P)`, the double-spend nullifier of an output.
    fn key_image(&self, public_ephemeral: &PublicKey, private_ephemeral: &SecretKey) -> KeyImage {
        key_image(public_ephemeral, private_ephemeral)
    }

    /// `pubSpend' = outKey − H_s(D ‖ idx)·G`, inverting [`Self::public_ephemeral`].
    fn underive_public_key(
        &self,
        derivation: &PublicKey,
        output_index: u64,
        output_key: &PublicKey,
    ) -> PublicKey {
        underive_public_key(derivation, output_index, output_key)
    }
}

/// The built-in [`CryptoProvider`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinCrypto;

impl CryptoProvider for BuiltinCrypto {}

fn decompress(key: &PublicKey) -> Option<EdwardsPoint> {
    CompressedEdwardsY(key.to_bytes()).decompress()
}

fn as_scalar(key: &SecretKey) -> Scalar {
    Scalar::from_bytes_mod_order(key.to_bytes())
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// `H_s(D ‖ varint(idx))`, reduced to a scalar.
fn derivation_to_scalar(derivation: &PublicKey, output_index: u64) -> Scalar {
    let mut buf = Vec::with_capacity(32 + 10);
    buf.extend_from_slice(derivation.as_bytes());
    write_varint(&mut buf, output_index);
    Scalar::from_bytes_mod_order(Keccak256::digest(&buf).into())
}

pub(crate) fn key_derivation(
    tx_public_key: &PublicKey,
    private_view_key: &SecretKey,
) -> PublicKey {
    match decompress(tx_public_key) {
        Some(point) => {
            let shared = (point * as_scalar(private_view_key)).mul_by_cofactor();
            PublicKey::from_bytes(shared.compress().to_bytes())
        }
        None => PublicKey::NULL,
    }
}

pub(crate) fn public_ephemeral(
    derivation: &PublicKey,
    output_index: u64,
    public_spend_key: &PublicKey,
) -> PublicKey {
    match decompress(public_spend_key) {
        Some(spend) => {
            let scalar = derivation_to_scalar(derivation, output_index);
            let point = ED25519_BASEPOINT_TABLE * &scalar + spend;
            PublicKey::from_bytes(point.compress().to_bytes())
        }
        None => PublicKey::NULL,
    }
}

pub(crate) fn private_ephemeral(
    derivation: &PublicKey,
    output_index: u64,
    private_spend_key: &SecretKey,
) -> SecretKey {
    let scalar = derivation_to_scalar(derivation, output_index) + as_scalar(private_spend_key);
    SecretKey::from_bytes(scalar.to_bytes())
}

pub(crate) fn key_image(
    public_ephemeral: &PublicKey,
    private_ephemeral: &SecretKey,
) -> KeyImage {
    let image = hash_to_point(public_ephemeral.to_bytes()) * as_scalar(private_ephemeral);
    KeyImage::from_bytes(image.compress().to_bytes())
}

pub(crate) fn underive_public_key(
    derivation: &PublicKey,
    output_index: u64,
    output_key: &PublicKey,
) -> PublicKey {
    match decompress(output_key) {
        Some(output) => {
            let scalar = derivation_to_scalar(derivation, output_index);
            let spend = output - ED25519_BASEPOINT_TABLE * &scalar;
            PublicKey::from_bytes(spend.compress().to_bytes())
        }
        None => PublicKey::NULL,
    }
}

/// The public key of a secret scalar, `s·G`.
pub(crate) fn public_from_secret(secret: &SecretKey) -> PublicKey {
    let point = ED25519_BASEPOINT_TABLE * &as_scalar(secret);
    PublicKey::from_bytes(point.compress().to_bytes())
}

/// A fresh random scalar.
pub(crate) fn random_secret_key<R: RngCore>(rng: &mut R) -> SecretKey {
    let mut wide = [0u8; 64];
    rng.fill_bytes(&mut wide);
    SecretKey::from_bytes(Scalar::from_bytes_mod_order_wide(&wide).to_bytes())
}

/// The deterministic view key of a spend key, `H_s(privSpend)` reduced.
///
/// Keeps a single mnemonic sufficient to restore both halves of the pair.
pub(crate) fn view_key_from_spend(private_spend_key: &SecretKey) -> SecretKey {
    let digest = Keccak256::digest(private_spend_key.as_bytes());
    SecretKey::from_bytes(Scalar::from_bytes_mod_order(digest.into()).to_bytes())
}
