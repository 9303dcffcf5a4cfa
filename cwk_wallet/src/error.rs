#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Generic(String),

    #[error(transparent)]
    Common(#[from] cwk_common::Error),

    #[error(transparent)]
    Precision(#[from] cwk_common::precision::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Validation(#[from] WalletError),

    #[error("Node response is missing the `{0}` field")]
    MalformedResponse(&'static str),

    #[error("Node response body of {got} bytes exceeds the {limit} bytes limit")]
    BodyTooLarge { got: usize, limit: usize },

    #[error("The cache service embeds global indexes in getBlocks, use those instead")]
    GlobalIndexesEmbedded,

    #[error("Global output index unavailable for an input required by this transaction")]
    MissingGlobalIndex,

    #[error("The remote node did not acknowledge the transaction")]
    TransactionRejected,

    #[error("No transaction builder has been configured")]
    NoTransactionBuilder,

    #[error("The wallet does not contain enough small inputs for a fusion transaction")]
    FullyOptimized,

    #[error("Wallet file format version {0} is not supported")]
    UnsupportedWalletVersion(u16),

    #[error("A view-only wallet cannot spend funds")]
    ViewWalletCannotSpend,

    #[error("Subwallet with the given public spend key already exists")]
    SubWalletAlreadyExists,
}

/// Typed validation outcome, never panicked and never logged as a failure:
/// these are answers about user input, returned to the caller unchanged.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletError {
    #[error("The address length is neither the standard nor the integrated length")]
    AddressWrongLength,

    #[error("The address contains characters outside the base58 alphabet")]
    AddressNotBase58,

    #[error("The address prefix does not match the configured coin prefix")]
    AddressWrongPrefix,

    #[error("Integrated addresses are not allowed here")]
    AddressIsIntegrated,

    #[error("The address could not be decoded")]
    AddressNotValid,

    #[error("The address does not belong to a subwallet of this container")]
    AddressNotInWallet,

    #[error("The payment ID is not 64 characters")]
    PaymentIdWrongLength,

    #[error("The payment ID is not hexadecimal")]
    PaymentIdInvalid,

    #[error("No destinations were given")]
    NoDestinationsGiven,

    #[error("An amount of zero was given")]
    AmountIsZero,

    #[error("A negative value was given")]
    NegativeValueGiven,

    #[error("A non integer value was given")]
    NonIntegerGiven,

    #[error("The fee is below the minimum fee")]
    FeeTooSmall,

    #[error("The wallet does not have enough unlocked balance")]
    NotEnoughBalance,

    #[error("The amounts given would overflow")]
    WillOverflow,

    #[error("The mixin is below the minimum for this height")]
    MixinTooSmall,

    #[error("The mixin is above the maximum for this height")]
    MixinTooBig,

    #[error("A payment ID was given along with an integrated address carrying a different one")]
    ConflictingPaymentIds,

    #[error("A transaction is already in progress")]
    TransactionInProgress,
}

impl WalletError {
    /// The stable error code, for embedders matching on a string.
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::AddressWrongLength => "ADDRESS_WRONG_LENGTH",
            WalletError::AddressNotBase58 => "ADDRESS_NOT_BASE58",
            WalletError::AddressWrongPrefix => "ADDRESS_WRONG_PREFIX",
            WalletError::AddressIsIntegrated => "ADDRESS_IS_INTEGRATED",
            WalletError::AddressNotValid => "ADDRESS_NOT_VALID",
            WalletError::AddressNotInWallet => "ADDRESS_NOT_IN_WALLET",
            WalletError::PaymentIdWrongLength => "PAYMENT_ID_WRONG_LENGTH",
            WalletError::PaymentIdInvalid => "PAYMENT_ID_INVALID",
            WalletError::NoDestinationsGiven => "NO_DESTINATIONS_GIVEN",
            WalletError::AmountIsZero => "AMOUNT_IS_ZERO",
            WalletError::NegativeValueGiven => "NEGATIVE_VALUE_GIVEN",
            WalletError::NonIntegerGiven => "NON_INTEGER_GIVEN",
            WalletError::FeeTooSmall => "FEE_TOO_SMALL",
            WalletError::NotEnoughBalance => "NOT_ENOUGH_BALANCE",
            WalletError::WillOverflow => "WILL_OVERFLOW",
            WalletError::MixinTooSmall => "MIXIN_TOO_SMALL",
            WalletError::MixinTooBig => "MIXIN_TOO_BIG",
            WalletError::ConflictingPaymentIds => "CONFLICTING_PAYMENT_IDS",
            WalletError::TransactionInProgress => "TRANSACTION_IN_PROGRESS",
        }
    }
}
