use crate::crypto::{BuiltinCrypto, CryptoProvider};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Height at which a mixin rule starts to apply, with the allowed band and
/// the value used when the caller does not choose one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixinLimit {
    pub height: u64,
    pub min_mixin: u64,
    pub max_mixin: u64,
    pub default_mixin: u64,
}

/// Height-indexed mixin policy.
///
/// When no rule matches the queried height the band is `[0, u64::MAX]`: the
/// policy only narrows when a matching height rule fires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MixinLimits {
    limits: Vec<MixinLimit>,
}

impl MixinLimits {
    /// Create from rules; rules are kept sorted by activation height.
    pub fn new(mut limits: Vec<MixinLimit>) -> Self {
        limits.sort_by_key(|limit| limit.height);
        Self { limits }
    }

    /// The `[min, max]` band applying at `height`.
    pub fn by_height(&self, height: u64) -> (u64, u64) {
        self.limits
            .iter()
            .rev()
            .find(|limit| limit.height <= height)
            .map(|limit| (limit.min_mixin, limit.max_mixin))
            .unwrap_or((0, u64::MAX))
    }

    /// The default mixin at `height`, 0 when no rule matches.
    pub fn default_by_height(&self, height: u64) -> u64 {
        self.limits
            .iter()
            .rev()
            .find(|limit| limit.height <= height)
            .map(|limit| limit.default_mixin)
            .unwrap_or(0)
    }
}

/// Explicit configuration context, threaded into every subcomponent.
///
/// Construct with [`Config::default()`] and adjust with the `with_` setters:
///
/// ```
/// # use cwk_wallet::Config;
/// let config = Config::default().with_scan_coinbase_transactions(true);
/// ```
#[derive(Clone)]
pub struct Config {
    pub(crate) decimal_places: u8,
    pub(crate) address_prefix: u64,
    pub(crate) request_timeout: Duration,
    pub(crate) block_target_time: Duration,
    pub(crate) sync_thread_interval: Duration,
    pub(crate) daemon_update_interval: Duration,
    pub(crate) locked_transactions_check_interval: Duration,
    pub(crate) blocks_per_tick: usize,
    pub(crate) scan_coinbase_transactions: bool,
    pub(crate) minimum_fee: u64,
    pub(crate) mixin_limits: MixinLimits,
    pub(crate) standard_address_length: usize,
    pub(crate) integrated_address_length: usize,
    pub(crate) block_store_memory_limit: usize,
    pub(crate) blocks_per_daemon_request: u64,
    pub(crate) max_body_response_size: usize,
    pub(crate) max_fusion_inputs: usize,
    pub(crate) crypto: Arc<dyn CryptoProvider>,
}

impl Default for Config {
    fn default() -> Self {
        let standard_address_length = 99;
        Config {
            decimal_places: 2,
            address_prefix: 3_914_525,
            request_timeout: Duration::from_millis(10_000),
            block_target_time: Duration::from_secs(30),
            sync_thread_interval: Duration::from_millis(10),
            daemon_update_interval: Duration::from_millis(10_000),
            locked_transactions_check_interval: Duration::from_millis(30_000),
            blocks_per_tick: 1,
            scan_coinbase_transactions: false,
            minimum_fee: 10,
            mixin_limits: MixinLimits::default(),
            standard_address_length,
            integrated_address_length: standard_address_length + 88,
            block_store_memory_limit: 50 * 1024 * 1024,
            blocks_per_daemon_request: 100,
            max_body_response_size: 50 * 1024 * 1024,
            max_fusion_inputs: 20,
            crypto: Arc::new(BuiltinCrypto),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("decimal_places", &self.decimal_places)
            .field("address_prefix", &self.address_prefix)
            .field("request_timeout", &self.request_timeout)
            .field("blocks_per_tick", &self.blocks_per_tick)
            .field("scan_coinbase_transactions", &self.scan_coinbase_transactions)
            .field("minimum_fee", &self.minimum_fee)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn with_decimal_places(mut self, decimal_places: u8) -> Self {
        self.decimal_places = decimal_places;
        self
    }

    pub fn with_address_prefix(mut self, address_prefix: u64) -> Self {
        self.address_prefix = address_prefix;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_block_target_time(mut self, block_target_time: Duration) -> Self {
        self.block_target_time = block_target_time;
        self
    }

    pub fn with_sync_thread_interval(mut self, interval: Duration) -> Self {
        self.sync_thread_interval = interval;
        self
    }

    pub fn with_daemon_update_interval(mut self, interval: Duration) -> Self {
        self.daemon_update_interval = interval;
        self
    }

    pub fn with_locked_transactions_check_interval(mut self, interval: Duration) -> Self {
        self.locked_transactions_check_interval = interval;
        self
    }

    /// How many blocks at most one sync tick may process.
    pub fn with_blocks_per_tick(mut self, blocks_per_tick: usize) -> Self {
        self.blocks_per_tick = blocks_per_tick.max(1);
        self
    }

    pub fn with_scan_coinbase_transactions(mut self, scan: bool) -> Self {
        self.scan_coinbase_transactions = scan;
        self
    }

    pub fn with_minimum_fee(mut self, minimum_fee: u64) -> Self {
        self.minimum_fee = minimum_fee;
        self
    }

    pub fn with_mixin_limits(mut self, mixin_limits: MixinLimits) -> Self {
        self.mixin_limits = mixin_limits;
        self
    }

    /// Set the standard address length; the integrated length follows as
    /// `standard + 88` (the embedded hex payment ID).
    pub fn with_standard_address_length(mut self, length: usize) -> Self {
        self.standard_address_length = length;
        self.integrated_address_length = length + 88;
        self
    }

    pub fn with_block_store_memory_limit(mut self, bytes: usize) -> Self {
        self.block_store_memory_limit = bytes;
        self
    }

    /// Blocks requested per `getBlocks` call, capped at 100 by the remote.
    pub fn with_blocks_per_daemon_request(mut self, count: u64) -> Self {
        self.blocks_per_daemon_request = count.clamp(1, 100);
        self
    }

    pub fn with_max_body_response_size(mut self, bytes: usize) -> Self {
        self.max_body_response_size = bytes;
        self
    }

    pub fn with_max_fusion_inputs(mut self, count: usize) -> Self {
        self.max_fusion_inputs = count.max(2);
        self
    }

    /// Replace any subset of the cryptographic primitives with the
    /// embedder's own implementation.
    pub fn with_crypto_provider(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = crypto;
        self
    }

    pub fn decimal_places(&self) -> u8 {
        self.decimal_places
    }

    pub fn address_prefix(&self) -> u64 {
        self.address_prefix
    }

    pub fn minimum_fee(&self) -> u64 {
        self.minimum_fee
    }

    pub fn mixin_limits(&self) -> &MixinLimits {
        &self.mixin_limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixin_fall_through() {
        let limits = MixinLimits::default();
        assert_eq!(limits.by_height(0), (0, u64::MAX));
        assert_eq!(limits.by_height(1_000_000), (0, u64::MAX));

        let limits = MixinLimits::new(vec![
            MixinLimit {
                height: 800_000,
                min_mixin: 3,
                max_mixin: 7,
                default_mixin: 7,
            },
            MixinLimit {
                height: 440_000,
                min_mixin: 0,
                max_mixin: 100,
                default_mixin: 3,
            },
        ]);
        assert_eq!(limits.by_height(0), (0, u64::MAX));
        assert_eq!(limits.by_height(439_999), (0, u64::MAX));
        assert_eq!(limits.by_height(440_000), (0, 100));
        assert_eq!(limits.by_height(800_000), (3, 7));
        assert_eq!(limits.default_by_height(500_000), 3);
        assert_eq!(limits.default_by_height(100), 0);
    }

    #[test]
    fn test_address_lengths_follow() {
        let config = Config::default();
        assert_eq!(config.integrated_address_length, 187);
        let config = config.with_standard_address_length(95);
        assert_eq!(config.integrated_address_length, 183);
    }
}
