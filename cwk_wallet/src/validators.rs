//! Parameter validation.
//!
//! Every function answers with `Ok` or a typed [`WalletError`]; nothing in
//! here is a failure of the wallet itself, so nothing is logged or thrown.

use crate::config::{Config, MixinLimits};
use crate::error::WalletError;
use crate::model::Height;
use cwk_common::{is_base58_char, Address, PublicKey};

/// Structural validation of one address against the configured coin:
/// length, alphabet, decodability, prefix, and (when disallowed) the
/// presence of an embedded payment ID.
pub fn validate_address(
    address: &str,
    allow_integrated: bool,
    config: &Config,
) -> Result<Address, WalletError> {
    if address.len() != config.standard_address_length
        && address.len() != config.integrated_address_length
    {
        return Err(WalletError::AddressWrongLength);
    }

    if !address.chars().all(is_base58_char) {
        return Err(WalletError::AddressNotBase58);
    }

    let decoded: Address = address.parse().map_err(|_| WalletError::AddressNotValid)?;

    if decoded.prefix() != config.address_prefix {
        return Err(WalletError::AddressWrongPrefix);
    }

    if decoded.is_integrated() && !allow_integrated {
        return Err(WalletError::AddressIsIntegrated);
    }

    Ok(decoded)
}

/// Validate a batch of addresses with the same policy.
pub fn validate_addresses(
    addresses: &[&str],
    allow_integrated: bool,
    config: &Config,
) -> Result<(), WalletError> {
    for address in addresses {
        validate_address(address, allow_integrated, config)?;
    }
    Ok(())
}

/// Every address must decode to a spend key present in `our_keys`.
pub fn validate_our_addresses(
    addresses: &[&str],
    our_keys: &[PublicKey],
    config: &Config,
) -> Result<(), WalletError> {
    for address in addresses {
        let decoded = validate_address(address, true, config)?;
        if !our_keys.contains(&decoded.spend()) {
            return Err(WalletError::AddressNotInWallet);
        }
    }
    Ok(())
}

/// A payment ID is 64 hex characters; the empty string means "none".
pub fn validate_payment_id(payment_id: &str) -> Result<(), WalletError> {
    if payment_id.is_empty() {
        return Ok(());
    }
    if payment_id.len() != 64 {
        return Err(WalletError::PaymentIdWrongLength);
    }
    if !payment_id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(WalletError::PaymentIdInvalid);
    }
    Ok(())
}

/// Destinations must be non-empty, nonzero, and sum without overflow
/// (fee included).
pub fn validate_destinations(
    destinations: &[(String, u64)],
    fee: u64,
) -> Result<u64, WalletError> {
    if destinations.is_empty() {
        return Err(WalletError::NoDestinationsGiven);
    }
    let mut total = fee;
    for (_, amount) in destinations {
        if *amount == 0 {
            return Err(WalletError::AmountIsZero);
        }
        total = total
            .checked_add(*amount)
            .ok_or(WalletError::WillOverflow)?;
    }
    Ok(total)
}

/// Fee floor for regular sends. Fusion transactions never pass through
/// here: their fee is structurally zero.
pub fn validate_fee(fee: u64, minimum_fee: u64) -> Result<(), WalletError> {
    if fee < minimum_fee {
        return Err(WalletError::FeeTooSmall);
    }
    Ok(())
}

/// The mixin must be within the band the policy sets at this height.
pub fn validate_mixin(
    mixin: u64,
    height: Height,
    limits: &MixinLimits,
) -> Result<(), WalletError> {
    let (min, max) = limits.by_height(height);
    if mixin < min {
        return Err(WalletError::MixinTooSmall);
    }
    if mixin > max {
        return Err(WalletError::MixinTooBig);
    }
    Ok(())
}

/// An explicit payment ID must not fight a payment ID embedded in an
/// integrated destination address.
pub fn validate_payment_id_against_destinations(
    payment_id: &str,
    destinations: &[(String, u64)],
    config: &Config,
) -> Result<(), WalletError> {
    for (address, _) in destinations {
        if let Ok(decoded) = validate_address(address, true, config) {
            if let Some(embedded) = decoded.payment_id() {
                if !payment_id.is_empty() && payment_id != embedded {
                    return Err(WalletError::ConflictingPaymentIds);
                }
            }
        }
    }
    Ok(())
}

/// Parse a user-facing decimal amount into atomic units, mapping the
/// precision failures onto the validation codes.
pub fn parse_amount(amount: &str, config: &Config) -> Result<u64, WalletError> {
    use cwk_common::precision::Error as PrecisionError;

    let precision = cwk_common::Precision::new(config.decimal_places)
        .map_err(|_| WalletError::NonIntegerGiven)?;
    precision.string_to_atomic(amount).map_err(|e| match e {
        PrecisionError::Negative => WalletError::NegativeValueGiven,
        PrecisionError::StringTooPrecise { .. } => WalletError::NonIntegerGiven,
        PrecisionError::Overflow(_) => WalletError::WillOverflow,
        _ => WalletError::NonIntegerGiven,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwk_common::{Address, PublicKey};

    fn config() -> Config {
        Config::default()
    }

    fn our_address(fill: u8) -> String {
        Address::new(
            config().address_prefix,
            PublicKey::from_bytes([fill; 32]),
            PublicKey::from_bytes([fill ^ 1; 32]),
        )
        .to_string()
    }

    fn integrated_address(fill: u8) -> String {
        Address::with_payment_id(
            config().address_prefix,
            PublicKey::from_bytes([fill; 32]),
            PublicKey::from_bytes([fill ^ 1; 32]),
            "ab".repeat(32),
        )
        .unwrap()
        .to_string()
    }

    #[test]
    fn test_address_code_matrix() {
        let config = config();

        // One char short of the standard length
        let short = &our_address(1)[..98];
        assert_eq!(
            validate_address(short, false, &config).unwrap_err(),
            WalletError::AddressWrongLength
        );

        // Right length, one character outside the alphabet
        let mut bad_char = our_address(1);
        bad_char.replace_range(50..51, "0");
        assert_eq!(
            validate_address(&bad_char, false, &config).unwrap_err(),
            WalletError::AddressNotBase58
        );

        // Right length and alphabet, wrong coin prefix (the neighbouring
        // prefix has the same varint width, so the length still matches)
        let wrong_prefix = Address::new(
            config.address_prefix + 1,
            PublicKey::from_bytes([1; 32]),
            PublicKey::from_bytes([2; 32]),
        )
        .to_string();
        assert_eq!(
            validate_address(&wrong_prefix, false, &config).unwrap_err(),
            WalletError::AddressWrongPrefix
        );

        // Valid but integrated while integrated is disallowed
        assert_eq!(
            validate_address(&integrated_address(1), false, &config).unwrap_err(),
            WalletError::AddressIsIntegrated
        );
        assert!(validate_address(&integrated_address(1), true, &config).is_ok());

        assert!(validate_address(&our_address(1), false, &config).is_ok());
    }

    #[test]
    fn test_payment_id() {
        assert!(validate_payment_id("").is_ok());
        assert!(validate_payment_id(&"ab".repeat(32)).is_ok());
        assert_eq!(
            validate_payment_id("abcd").unwrap_err(),
            WalletError::PaymentIdWrongLength
        );
        assert_eq!(
            validate_payment_id(&"zz".repeat(32)).unwrap_err(),
            WalletError::PaymentIdInvalid
        );
    }

    #[test]
    fn test_destinations() {
        assert_eq!(
            validate_destinations(&[], 10).unwrap_err(),
            WalletError::NoDestinationsGiven
        );
        assert_eq!(
            validate_destinations(&[("a".into(), 0)], 10).unwrap_err(),
            WalletError::AmountIsZero
        );
        assert_eq!(
            validate_destinations(&[("a".into(), u64::MAX)], 10).unwrap_err(),
            WalletError::WillOverflow
        );
        assert_eq!(
            validate_destinations(&[("a".into(), 500)], 10).unwrap(),
            510
        );
    }

    #[test]
    fn test_fee_and_mixin() {
        assert_eq!(
            validate_fee(9, 10).unwrap_err(),
            WalletError::FeeTooSmall
        );
        assert!(validate_fee(10, 10).is_ok());

        let limits = crate::config::MixinLimits::new(vec![crate::config::MixinLimit {
            height: 0,
            min_mixin: 3,
            max_mixin: 7,
            default_mixin: 3,
        }]);
        assert_eq!(
            validate_mixin(2, 10, &limits).unwrap_err(),
            WalletError::MixinTooSmall
        );
        assert_eq!(
            validate_mixin(8, 10, &limits).unwrap_err(),
            WalletError::MixinTooBig
        );
        assert!(validate_mixin(5, 10, &limits).is_ok());
    }

    #[test]
    fn test_conflicting_payment_ids() {
        let config = config();
        let destinations = vec![(integrated_address(1), 100u64)];

        // Same ID as embedded: fine
        assert!(validate_payment_id_against_destinations(
            &"ab".repeat(32),
            &destinations,
            &config
        )
        .is_ok());

        assert_eq!(
            validate_payment_id_against_destinations(&"cd".repeat(32), &destinations, &config)
                .unwrap_err(),
            WalletError::ConflictingPaymentIds
        );
    }

    #[test]
    fn test_our_addresses() {
        let config = config();
        let ours = [PublicKey::from_bytes([1; 32])];
        assert!(validate_our_addresses(&[&our_address(1)], &ours, &config).is_ok());
        assert_eq!(
            validate_our_addresses(&[&our_address(2)], &ours, &config).unwrap_err(),
            WalletError::AddressNotInWallet
        );
    }

    #[test]
    fn test_parse_amount() {
        let config = config();
        assert_eq!(parse_amount("12.34", &config).unwrap(), 1234);
        assert_eq!(
            parse_amount("-1", &config).unwrap_err(),
            WalletError::NegativeValueGiven
        );
        assert_eq!(
            parse_amount("0.001", &config).unwrap_err(),
            WalletError::NonIntegerGiven
        );
    }
}
