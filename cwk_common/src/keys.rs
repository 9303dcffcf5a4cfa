use crate::{Error, KEY_HEX_LEN};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

macro_rules! impl_hex_key {
    ($t:ident) => {
        impl $t {
            /// The null key, 64 zero hex characters.
            pub const NULL: $t = $t([0u8; 32]);

            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                $t(bytes)
            }

            /// The raw bytes.
            pub const fn to_bytes(&self) -> [u8; 32] {
                self.0
            }

            /// Borrow the raw bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Whether this is the null key.
            pub fn is_null(&self) -> bool {
                self.0 == [0u8; 32]
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl FromStr for $t {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.len() != KEY_HEX_LEN {
                    return Err(Error::KeyWrongLength {
                        expected: KEY_HEX_LEN,
                        given: s.len(),
                    });
                }
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes)?;
                Ok($t(bytes))
            }
        }

        impl Serialize for $t {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $t {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// A compressed ed25519 point, such as a public spend key or a transaction public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; 32]);

impl_hex_key!(PublicKey);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

/// The double-spend nullifier of a spent output.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyImage([u8; 32]);

impl_hex_key!(KeyImage);

impl fmt::Debug for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyImage({self})")
    }
}

/// A transaction hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxHash([u8; 32]);

impl_hex_key!(TxHash);

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

/// A block hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHash([u8; 32]);

impl_hex_key!(BlockHash);

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({self})")
    }
}

/// An ed25519 scalar, such as a private view or private spend key.
///
/// The zero scalar denotes a missing key (a view-only subwallet has a zero
/// private spend key). Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl_hex_key!(SecretKey);

// The hex is intentionally not part of the Debug output.
impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "7849297236cd7c0d6c69a3c8c179c038d3c1c434735741bb3c8995c3c9d6f2ac";

    #[test]
    fn test_key_roundtrip() {
        let key: PublicKey = KEY.parse().unwrap();
        assert_eq!(key.to_string(), KEY);

        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{KEY}\""));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }

    #[test]
    fn test_key_errors() {
        let err = "deadbeef".parse::<PublicKey>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Key must be 64 hex characters, given 8"
        );

        let not_hex = format!("{}zz", &KEY[..62]);
        assert!(not_hex.parse::<PublicKey>().is_err());
    }

    #[test]
    fn test_null_key() {
        assert!(PublicKey::NULL.is_null());
        assert_eq!(PublicKey::NULL.to_string(), "0".repeat(64));
        let key: KeyImage = KEY.parse().unwrap();
        assert!(!key.is_null());
    }
}
