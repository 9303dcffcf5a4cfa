#[allow(missing_docs)]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Key must be {expected} hex characters, given {given}")]
    KeyWrongLength { expected: usize, given: usize },

    #[error(transparent)]
    Hex(#[from] hex::FromHexError),

    #[error("Character '{0}' is not in the base58 alphabet")]
    NotBase58(char),

    #[error("Base58 block of {0} characters cannot be decoded")]
    InvalidBase58BlockLength(usize),

    #[error("Base58 block value overflows 8 bytes")]
    Base58Overflow,

    #[error("Address too short to contain prefix, keys and checksum")]
    AddressTooShort,

    #[error("Address checksum mismatch")]
    BadChecksum,

    #[error("Embedded payment ID is not 64 hex characters")]
    InvalidEmbeddedPaymentId,

    #[error("Varint is truncated or exceeds 64 bits")]
    InvalidVarint,
}
