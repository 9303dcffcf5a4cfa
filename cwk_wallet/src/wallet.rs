use crate::clients::wire::RawBlock;
use crate::clients::{NodeClient, NodeKind};
use crate::config::Config;
use crate::crypto;
use crate::error::Error;
use crate::events::{EventSink, SyncEdge, WalletEvent};
use crate::model::{Height, NodeInfo, Timestamp, Transaction};
use crate::processor::{self, ForkAction};
use crate::scheduler::Metronome;
use crate::serialization;
use crate::subwallet::SubWallet;
use crate::subwallets::SubWalletStore;
use crate::sync_status::SyncStatus;
use crate::transfer::{self, TransactionBuilder};
use cwk_common::{Address, PublicKey, SecretKey, TxHash};
use once_cell::sync::OnceCell;
use rand::thread_rng;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

pub(crate) fn unix_time() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Synchronizer state: where we are on the chain and what is fetched but
/// not yet processed.
pub(crate) struct SyncState {
    pub(crate) status: SyncStatus,

    /// Fetched blocks awaiting processing, byte-capped by
    /// `block_store_memory_limit`.
    pub(crate) queue: VecDeque<RawBlock>,
    pub(crate) queue_bytes: usize,

    pub(crate) start_height: Height,
    pub(crate) start_timestamp: Timestamp,

    /// Set once the first block is processed: from then on resumption is by
    /// height and checkpoint only.
    pub(crate) anchored: bool,

    /// Backoff after an empty fetch, so an idle wallet does not hammer the
    /// node every sync tick.
    pub(crate) idle_until: Option<tokio::time::Instant>,
}

impl SyncState {
    fn new(status: SyncStatus, start_height: Height, start_timestamp: Timestamp) -> Self {
        Self {
            anchored: !status.is_empty(),
            status,
            queue: VecDeque::new(),
            queue_bytes: 0,
            start_height,
            start_timestamp,
            idle_until: None,
        }
    }

    pub(crate) fn wallet_height(&self) -> Height {
        if self.status.is_empty() && !self.anchored {
            self.start_height
        } else {
            self.status.last_known_height()
        }
    }
}

pub(crate) struct WalletInner {
    pub(crate) config: Config,
    pub(crate) node: Mutex<NodeClient>,
    pub(crate) store: Mutex<SubWalletStore>,
    pub(crate) sync: Mutex<SyncState>,
    pub(crate) daemon_info: Mutex<NodeInfo>,
    pub(crate) sync_edge: Mutex<SyncEdge>,
    pub(crate) events: EventSink,
    pub(crate) transacting: AtomicBool,
    pub(crate) builder: OnceCell<Arc<dyn TransactionBuilder>>,
}

impl WalletInner {
    /// The best height to evaluate unlock conditions and policy bands at.
    pub(crate) async fn best_known_height(&self) -> Height {
        let wallet_height = self.sync.lock().await.wallet_height();
        let network_height = self.daemon_info.lock().await.network_height;
        wallet_height.max(network_height)
    }

    pub(crate) fn primary_address(&self, store: &SubWalletStore) -> Result<Address, Error> {
        let primary = store
            .primary()
            .ok_or_else(|| Error::Generic("wallet has no primary subwallet".into()))?;
        Ok(Address::new(
            self.config.address_prefix,
            primary.public_spend_key(),
            crypto::public_from_secret(store.private_view_key()),
        ))
    }

    fn address_for(&self, store: &SubWalletStore, spend_key: PublicKey) -> Address {
        Address::new(
            self.config.address_prefix,
            spend_key,
            crypto::public_from_secret(store.private_view_key()),
        )
    }
}

struct Metronomes {
    sync: Metronome,
    daemon: Metronome,
    locked: Metronome,
}

/// A light-client wallet backend for a CryptoNote chain.
///
/// Holds the keys, keeps a local replica of the chain state relevant to
/// them, and emits [`WalletEvent`]s as relevant transactions confirm.
/// Nothing happens until [`WalletBackend::start`] spins up the scheduler.
pub struct WalletBackend {
    inner: Arc<WalletInner>,
    metronomes: Mutex<Option<Metronomes>>,
}

impl WalletBackend {
    fn assemble(
        config: Config,
        node: NodeClient,
        store: SubWalletStore,
        status: SyncStatus,
        start_height: Height,
        start_timestamp: Timestamp,
    ) -> Self {
        let inner = WalletInner {
            node: Mutex::new(node),
            store: Mutex::new(store),
            sync: Mutex::new(SyncState::new(status, start_height, start_timestamp)),
            daemon_info: Mutex::new(NodeInfo::default()),
            sync_edge: Mutex::new(SyncEdge::default()),
            events: EventSink::new(),
            transacting: AtomicBool::new(false),
            builder: OnceCell::new(),
            config,
        };
        Self {
            inner: Arc::new(inner),
            metronomes: Mutex::new(None),
        }
    }

    /// Create a wallet with a fresh random spend key; the view key is
    /// derived from it so one secret restores both.
    pub fn create(config: Config, node: NodeClient) -> Self {
        let private_spend = crypto::random_secret_key(&mut thread_rng());
        let private_view = crypto::view_key_from_spend(&private_spend);
        let public_spend = crypto::public_from_secret(&private_spend);

        let mut store = SubWalletStore::new(private_view, false);
        let subwallet = SubWallet::new(public_spend, private_spend, 0, unix_time(), true);
        store
            .add_subwallet(subwallet)
            .expect("fresh store cannot contain the key");

        Self::assemble(config, node, store, SyncStatus::default(), 0, unix_time())
    }

    /// Restore a wallet from its private keys, scanning from `scan_height`.
    pub fn import_from_keys(
        config: Config,
        node: NodeClient,
        private_view_key: &str,
        private_spend_key: &str,
        scan_height: Height,
    ) -> Result<Self, Error> {
        let private_view: SecretKey = private_view_key.parse()?;
        let private_spend: SecretKey = private_spend_key.parse()?;
        let public_spend = crypto::public_from_secret(&private_spend);

        let mut store = SubWalletStore::new(private_view, false);
        store.add_subwallet(SubWallet::new(
            public_spend,
            private_spend,
            scan_height,
            0,
            true,
        ))?;

        Ok(Self::assemble(
            config,
            node,
            store,
            SyncStatus::default(),
            scan_height,
            0,
        ))
    }

    /// Restore a view-only wallet: it can classify incoming outputs but
    /// never spend them.
    pub fn import_view_wallet(
        config: Config,
        node: NodeClient,
        private_view_key: &str,
        public_spend_key: &str,
        scan_height: Height,
    ) -> Result<Self, Error> {
        let private_view: SecretKey = private_view_key.parse()?;
        let public_spend: PublicKey = public_spend_key.parse()?;

        let mut store = SubWalletStore::new(private_view, true);
        store.add_subwallet(SubWallet::new(
            public_spend,
            SecretKey::NULL,
            scan_height,
            0,
            true,
        ))?;

        Ok(Self::assemble(
            config,
            node,
            store,
            SyncStatus::default(),
            scan_height,
            0,
        ))
    }

    /// Restore from the persisted wallet document.
    pub fn from_json(config: Config, node: NodeClient, json: &str) -> Result<Self, Error> {
        let file: serialization::WalletFile = serde_json::from_str(json)?;
        let (store, status, start_height, start_timestamp) =
            serialization::from_wallet_file(file)?;
        Ok(Self::assemble(
            config,
            node,
            store,
            status,
            start_height,
            start_timestamp,
        ))
    }

    /// Snapshot the wallet into the persisted document.
    pub async fn to_json(&self) -> Result<String, Error> {
        // Lock order: sync before store, as everywhere else
        let sync = self.inner.sync.lock().await;
        let store = self.inner.store.lock().await;
        let file = serialization::to_wallet_file(
            &store,
            &sync.status,
            sync.start_height,
            sync.start_timestamp,
        );
        Ok(serde_json::to_string(&file)?)
    }

    /// Install the external transaction builder. May be set once.
    pub fn set_transaction_builder(&self, builder: Arc<dyn TransactionBuilder>) {
        let _ = self.inner.builder.set(builder);
    }

    /// Listen for wallet events. Listeners must not block: a lagging
    /// receiver misses events.
    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.inner.events.subscribe()
    }

    /// Start the scheduler: block sync, node info refresh, and
    /// locked-transaction reconciliation, each on its own cadence.
    pub async fn start(&self) {
        let mut metronomes = self.metronomes.lock().await;
        if metronomes.is_some() {
            return;
        }

        let mut sync = Metronome::new("sync", self.inner.config.sync_thread_interval);
        let inner = self.inner.clone();
        sync.start(move || {
            let inner = inner.clone();
            async move { sync_tick(&inner).await }
        });

        let mut daemon = Metronome::new("daemon-info", self.inner.config.daemon_update_interval);
        let inner = self.inner.clone();
        daemon.start(move || {
            let inner = inner.clone();
            async move { daemon_info_tick(&inner).await }
        });

        let mut locked = Metronome::new(
            "locked-transactions",
            self.inner.config.locked_transactions_check_interval,
        );
        let inner = self.inner.clone();
        locked.start(move || {
            let inner = inner.clone();
            async move { locked_transactions_tick(&inner).await }
        });

        *metronomes = Some(Metronomes {
            sync,
            daemon,
            locked,
        });
    }

    /// Stop the scheduler. Resolves once in-flight ticks have completed;
    /// calling it again (or before `start`) resolves immediately.
    pub async fn stop(&self) {
        let mut metronomes = self.metronomes.lock().await;
        if let Some(mut running) = metronomes.take() {
            running.sync.stop().await;
            running.daemon.stop().await;
            running.locked.stop().await;
        }
    }

    /// The (unlocked, locked) balance over `sources`, or the whole
    /// container when `None`.
    pub async fn get_balance(&self, sources: Option<&[PublicKey]>) -> (u64, u64) {
        let height = self.wallet_height().await;
        let store = self.inner.store.lock().await;
        store.get_balance(height, unix_time(), sources)
    }

    /// Transaction history, newest first, unconfirmed at the front.
    pub async fn get_transactions(&self) -> Vec<Transaction> {
        self.inner.store.lock().await.get_transactions()
    }

    pub async fn get_transaction(&self, hash: &TxHash) -> Option<Transaction> {
        self.inner.store.lock().await.get_transaction(hash).cloned()
    }

    /// The private key of a transaction this wallet created.
    pub async fn get_tx_private_key(&self, hash: &TxHash) -> Option<SecretKey> {
        self.inner.store.lock().await.get_tx_private_key(hash).cloned()
    }

    pub async fn wallet_height(&self) -> Height {
        self.inner.sync.lock().await.wallet_height()
    }

    /// (wallet height, network height).
    pub async fn sync_progress(&self) -> (Height, Height) {
        let wallet_height = self.wallet_height().await;
        let network_height = self.inner.daemon_info.lock().await.network_height;
        (wallet_height, network_height)
    }

    pub async fn is_synced(&self) -> bool {
        self.inner.sync_edge.lock().await.is_synced()
    }

    /// The last node state seen by the refresh tick.
    pub async fn node_info(&self) -> NodeInfo {
        *self.inner.daemon_info.lock().await
    }

    /// The fee advertised by the node operator, if it validates.
    pub async fn node_fee(&self) -> Result<Option<crate::clients::FeeInfo>, Error> {
        self.inner.node.lock().await.get_fee().await
    }

    /// The address of the primary subwallet.
    pub async fn primary_address(&self) -> Result<Address, Error> {
        let store = self.inner.store.lock().await;
        self.inner.primary_address(&store)
    }

    /// The primary address with `payment_id` (64 hex characters) embedded.
    pub async fn integrated_address(&self, payment_id: &str) -> Result<Address, Error> {
        crate::validators::validate_payment_id(payment_id)?;
        if payment_id.is_empty() {
            return Err(Error::Validation(crate::WalletError::PaymentIdWrongLength));
        }
        let standard = self.primary_address().await?;
        Ok(Address::with_payment_id(
            self.inner.config.address_prefix,
            standard.spend(),
            standard.view(),
            payment_id.to_string(),
        )?)
    }

    /// Every subwallet address, primary first.
    pub async fn addresses(&self) -> Vec<Address> {
        let store = self.inner.store.lock().await;
        let mut addresses: Vec<(bool, Address)> = store
            .subwallets()
            .map(|sub| {
                (
                    sub.is_primary(),
                    self.inner.address_for(&store, sub.public_spend_key()),
                )
            })
            .collect();
        addresses.sort_by_key(|(is_primary, _)| !*is_primary);
        addresses.into_iter().map(|(_, address)| address).collect()
    }

    /// Add a new subwallet with fresh keys, scanning from the current
    /// wallet height. Returns its address.
    pub async fn add_sub_wallet(&self) -> Result<Address, Error> {
        let private_spend = crypto::random_secret_key(&mut thread_rng());
        self.import_sub_wallet_inner(private_spend, self.wallet_height().await)
            .await
    }

    /// Import a subwallet from its private spend key.
    pub async fn import_sub_wallet(
        &self,
        private_spend_key: &str,
        scan_height: Height,
    ) -> Result<Address, Error> {
        let private_spend: SecretKey = private_spend_key.parse()?;
        self.import_sub_wallet_inner(private_spend, scan_height).await
    }

    async fn import_sub_wallet_inner(
        &self,
        private_spend: SecretKey,
        scan_height: Height,
    ) -> Result<Address, Error> {
        let public_spend = crypto::public_from_secret(&private_spend);
        let mut store = self.inner.store.lock().await;
        store.add_subwallet(SubWallet::new(
            public_spend,
            private_spend,
            scan_height,
            0,
            false,
        ))?;
        Ok(self.inner.address_for(&store, public_spend))
    }

    /// Discard local state at and above `height` and rescan from there.
    pub async fn rewind(&self, height: Height) {
        let mut sync = self.inner.sync.lock().await;
        {
            let mut store = self.inner.store.lock().await;
            store.remove_forked_transactions(height);
        }
        sync.status.rewind_to(height.saturating_sub(1));
        sync.queue.clear();
        sync.queue_bytes = 0;
        sync.idle_until = None;
        if sync.status.is_empty() {
            sync.start_height = height;
            sync.anchored = true;
        }
    }

    /// Point the wallet at a different node. Sync state is kept; protocol
    /// and transport are re-discovered against the new remote.
    pub async fn swap_node(&self, host: &str, port: u16) -> Result<(), Error> {
        let client = NodeClient::new(host, port, &self.inner.config)?;
        *self.inner.node.lock().await = client;
        Ok(())
    }

    pub async fn node_kind(&self) -> NodeKind {
        self.inner.node.lock().await.kind()
    }

    /// Send `amount` to `destination` with default fee, mixin and sources.
    pub async fn send_basic(
        &self,
        destination: &str,
        amount: u64,
        payment_id: Option<String>,
    ) -> Result<TxHash, Error> {
        transfer::send_basic(&self.inner, destination, amount, payment_id).await
    }

    /// Send with full control over fee, mixin, source subwallets and the
    /// change address.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_advanced(
        &self,
        destinations: Vec<(String, u64)>,
        mixin: Option<u64>,
        fee: Option<u64>,
        payment_id: Option<String>,
        sources: Option<Vec<PublicKey>>,
        change_address: Option<String>,
    ) -> Result<TxHash, Error> {
        transfer::send_advanced(
            &self.inner,
            destinations,
            mixin,
            fee,
            payment_id,
            sources,
            change_address,
        )
        .await
    }

    /// Combine small inputs into one output, fee-free.
    pub async fn send_fusion_basic(&self) -> Result<TxHash, Error> {
        transfer::send_fusion_basic(&self.inner).await
    }

    pub async fn send_fusion_advanced(
        &self,
        mixin: Option<u64>,
        sources: Option<Vec<PublicKey>>,
    ) -> Result<TxHash, Error> {
        transfer::send_fusion_advanced(&self.inner, mixin, sources).await
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<WalletInner> {
        &self.inner
    }
}

/// One pass of the sync pipeline: top up the block queue, process a bounded
/// number of blocks, then re-evaluate the sync/desync edge.
pub(crate) async fn sync_tick(inner: &WalletInner) -> Result<(), Error> {
    fetch_blocks(inner).await?;
    process_blocks(inner).await?;

    let wallet_height = inner.sync.lock().await.wallet_height();
    let network_height = inner.daemon_info.lock().await.network_height;
    let event = inner
        .sync_edge
        .lock()
        .await
        .observe(wallet_height, network_height);
    if let Some(event) = event {
        inner.events.emit(event);
    }
    Ok(())
}

async fn fetch_blocks(inner: &WalletInner) -> Result<(), Error> {
    let (checkpoints, start_height, start_timestamp) = {
        let sync = inner.sync.lock().await;
        if !sync.queue.is_empty()
            || sync.queue_bytes >= inner.config.block_store_memory_limit
        {
            return Ok(());
        }
        if let Some(idle_until) = sync.idle_until {
            if tokio::time::Instant::now() < idle_until {
                return Ok(());
            }
        }
        (
            sync.status.checkpoints_for_request(),
            sync.start_height,
            sync.start_timestamp,
        )
    };

    let response = {
        let mut node = inner.node.lock().await;
        node.get_wallet_sync_data(
            checkpoints,
            start_height,
            start_timestamp,
            !inner.config.scan_coinbase_transactions,
        )
        .await
    };

    // A transient fetch failure leaves the sync status untouched, so the
    // next tick retries from the same checkpoints
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            log::info!("getBlocks failed, retrying next tick: {e}");
            return Ok(());
        }
    };

    let mut sync = inner.sync.lock().await;
    if response.items.is_empty() {
        sync.idle_until =
            Some(tokio::time::Instant::now() + inner.config.daemon_update_interval);
        if response.synced {
            if let Some(top) = response.top_block {
                if top.height > sync.status.last_known_height() {
                    sync.status.store_block_hash(top.height, top.hash);
                    sync.anchored = true;
                    sync.start_timestamp = 0;
                }
            }
        }
        return Ok(());
    }

    sync.idle_until = None;
    for block in response.items {
        sync.queue_bytes += block.approx_size();
        sync.queue.push_back(block);
    }
    Ok(())
}

async fn process_blocks(inner: &WalletInner) -> Result<(), Error> {
    let mut sync = inner.sync.lock().await;

    for _ in 0..inner.config.blocks_per_tick {
        let block = match sync.queue.pop_front() {
            Some(block) => block,
            None => break,
        };
        sync.queue_bytes = sync.queue_bytes.saturating_sub(block.approx_size());

        match processor::detect_fork(&block, &sync.status) {
            ForkAction::Extends => {}
            ForkAction::ForkAt(fork_height) => {
                log::warn!(
                    "chain forked at height {fork_height}, rewinding local state"
                );
                inner
                    .store
                    .lock()
                    .await
                    .remove_forked_transactions(fork_height);
                sync.status.rewind_to(fork_height.saturating_sub(1));
            }
            ForkAction::StaleWindow(top_height) => {
                log::warn!(
                    "block {} does not connect to our top at {top_height}, refetching from checkpoints",
                    block.block_height
                );
                inner
                    .store
                    .lock()
                    .await
                    .remove_forked_transactions(top_height);
                sync.status.rewind_to(top_height.saturating_sub(1));
                sync.queue.clear();
                sync.queue_bytes = 0;
                break;
            }
        }

        let data = {
            let store = inner.store.lock().await;
            processor::process_block(
                &block,
                &store,
                inner.config.crypto.as_ref(),
                inner.config.scan_coinbase_transactions,
            )
        };

        let confirmed = data.txs_to_add.clone();
        {
            let mut store = inner.store.lock().await;
            store.apply_transaction_data(data, block.block_height);
        }
        for transaction in &confirmed {
            inner.events.emit_for_transaction(transaction);
        }

        sync.status
            .store_block_hash(block.block_height, block.block_hash);

        // After the first processed block resumption is by height only
        if !sync.anchored {
            sync.anchored = true;
            sync.start_timestamp = 0;
            sync.start_height = block.block_height;
        }
    }
    Ok(())
}

async fn daemon_info_tick(inner: &WalletInner) -> Result<(), Error> {
    let info = {
        let mut node = inner.node.lock().await;
        node.get_info().await
    };
    match info {
        Ok(info) => {
            *inner.daemon_info.lock().await = info;
        }
        Err(e) => {
            // Prior values stay; the wallet keeps working against them
            log::info!("failed to refresh node info: {e}");
        }
    }
    Ok(())
}

async fn locked_transactions_tick(inner: &WalletInner) -> Result<(), Error> {
    let hashes = {
        let store = inner.store.lock().await;
        store.locked_transaction_hashes()
    };
    if hashes.is_empty() {
        return Ok(());
    }

    let unknown = {
        let mut node = inner.node.lock().await;
        match node.get_transactions_status(hashes).await {
            Ok(unknown) => unknown,
            Err(e) => {
                log::info!("failed to check locked transactions: {e}");
                return Ok(());
            }
        }
    };

    if unknown.is_empty() {
        return Ok(());
    }
    let mut store = inner.store.lock().await;
    for hash in unknown {
        log::warn!("transaction {hash} fell out of the pool, cancelling");
        store.remove_cancelled_transaction(&hash);
    }
    Ok(())
}
