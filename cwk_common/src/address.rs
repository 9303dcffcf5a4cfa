use crate::base58::{cn_base58_decode, cn_base58_encode};
use crate::{Error, PublicKey, PAYMENT_ID_HEX_LEN};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

const CHECKSUM_SIZE: usize = 4;
const KEYS_SIZE: usize = 64;

/// A CryptoNote address: a coin prefix, the two public keys, and for
/// integrated addresses an embedded payment ID.
///
/// The payment ID is embedded as the 64 ascii bytes of its hex form, between
/// the prefix and the keys, per the coin's wallet convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    prefix: u64,
    payment_id: Option<String>,
    spend: PublicKey,
    view: PublicKey,
}

impl Address {
    /// Create a standard address.
    pub fn new(prefix: u64, spend: PublicKey, view: PublicKey) -> Self {
        Self {
            prefix,
            payment_id: None,
            spend,
            view,
        }
    }

    /// Create an integrated address carrying `payment_id` (64 hex characters).
    pub fn with_payment_id(
        prefix: u64,
        spend: PublicKey,
        view: PublicKey,
        payment_id: String,
    ) -> Result<Self, Error> {
        if payment_id.len() != PAYMENT_ID_HEX_LEN || !payment_id.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(Error::InvalidEmbeddedPaymentId);
        }
        Ok(Self {
            prefix,
            payment_id: Some(payment_id),
            spend,
            view,
        })
    }

    /// The coin prefix encoded at the front of the address.
    pub fn prefix(&self) -> u64 {
        self.prefix
    }

    /// The public spend key.
    pub fn spend(&self) -> PublicKey {
        self.spend
    }

    /// The public view key.
    pub fn view(&self) -> PublicKey {
        self.view
    }

    /// The embedded payment ID, if this is an integrated address.
    pub fn payment_id(&self) -> Option<&str> {
        self.payment_id.as_deref()
    }

    /// Whether this is an integrated address.
    pub fn is_integrated(&self) -> bool {
        self.payment_id.is_some()
    }

    /// Drop the embedded payment ID, yielding the standard address.
    pub fn to_standard(&self) -> Address {
        Address::new(self.prefix, self.spend, self.view)
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_varint(data: &[u8]) -> Result<(u64, usize), Error> {
    let mut value = 0u64;
    for (i, byte) in data.iter().enumerate() {
        if i * 7 >= 64 {
            return Err(Error::InvalidVarint);
        }
        value |= u64::from(byte & 0x7f) << (i * 7);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(Error::InvalidVarint)
}

fn checksum(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&digest[..CHECKSUM_SIZE]);
    out
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = Vec::with_capacity(128);
        write_varint(&mut bytes, self.prefix);
        if let Some(payment_id) = self.payment_id.as_ref() {
            bytes.extend_from_slice(payment_id.as_bytes());
        }
        bytes.extend_from_slice(self.spend.as_bytes());
        bytes.extend_from_slice(self.view.as_bytes());
        let check = checksum(&bytes);
        bytes.extend_from_slice(&check);
        write!(f, "{}", cn_base58_encode(&bytes))
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = cn_base58_decode(s)?;
        let (prefix, prefix_len) = read_varint(&bytes)?;
        let body_len = bytes.len().saturating_sub(prefix_len + CHECKSUM_SIZE);

        let payment_id = match body_len {
            KEYS_SIZE => None,
            len if len == KEYS_SIZE + PAYMENT_ID_HEX_LEN => {
                let raw = &bytes[prefix_len..prefix_len + PAYMENT_ID_HEX_LEN];
                let id = std::str::from_utf8(raw)
                    .map_err(|_| Error::InvalidEmbeddedPaymentId)?
                    .to_string();
                if !id.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(Error::InvalidEmbeddedPaymentId);
                }
                Some(id)
            }
            _ => return Err(Error::AddressTooShort),
        };

        let checked = bytes.len() - CHECKSUM_SIZE;
        if checksum(&bytes[..checked]) != bytes[checked..] {
            return Err(Error::BadChecksum);
        }

        let keys_at = checked - KEYS_SIZE;
        let mut spend = [0u8; 32];
        let mut view = [0u8; 32];
        spend.copy_from_slice(&bytes[keys_at..keys_at + 32]);
        view.copy_from_slice(&bytes[keys_at + 32..checked]);

        Ok(Address {
            prefix,
            payment_id,
            spend: PublicKey::from_bytes(spend),
            view: PublicKey::from_bytes(view),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The prefix rendering "TRTL..." addresses at 99 characters.
    const PREFIX: u64 = 3_914_525;

    fn some_key(fill: u8) -> PublicKey {
        PublicKey::from_bytes([fill; 32])
    }

    #[test]
    fn test_standard_roundtrip() {
        let address = Address::new(PREFIX, some_key(0x11), some_key(0x22));
        let encoded = address.to_string();
        assert_eq!(encoded.len(), 99);
        assert!(encoded.starts_with("TRTL"));

        let back: Address = encoded.parse().unwrap();
        assert_eq!(back, address);
        assert_eq!(back.prefix(), PREFIX);
        assert!(!back.is_integrated());
    }

    #[test]
    fn test_integrated_roundtrip() {
        let payment_id = "f0".repeat(32);
        let address =
            Address::with_payment_id(PREFIX, some_key(0x11), some_key(0x22), payment_id.clone())
                .unwrap();
        let encoded = address.to_string();
        assert_eq!(encoded.len(), 99 + 88);

        let back: Address = encoded.parse().unwrap();
        assert_eq!(back.payment_id(), Some(payment_id.as_str()));
        assert_eq!(back.to_standard().to_string().len(), 99);
    }

    #[test]
    fn test_bad_payment_id() {
        assert!(Address::with_payment_id(PREFIX, some_key(1), some_key(2), "ff".into()).is_err());
        let not_hex = "zz".repeat(32);
        assert!(Address::with_payment_id(PREFIX, some_key(1), some_key(2), not_hex).is_err());
    }

    #[test]
    fn test_corrupted_address() {
        let encoded = Address::new(PREFIX, some_key(0x11), some_key(0x22)).to_string();

        // Flipping a character breaks the checksum (or the block decode)
        let mut corrupted = encoded.clone().into_bytes();
        corrupted[50] = if corrupted[50] == b'2' { b'3' } else { b'2' };
        let corrupted = String::from_utf8(corrupted).unwrap();
        assert!(corrupted.parse::<Address>().is_err());

        // Truncation cannot decode to the right body length
        assert!(matches!(
            encoded[..88].parse::<Address>(),
            Err(Error::AddressTooShort) | Err(Error::InvalidBase58BlockLength(_))
        ));
    }
}
