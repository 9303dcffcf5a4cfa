//! The unified remote-node contract.
//!
//! One client speaks to either remote flavour behind the same set of calls:
//! a pre-indexed cache service or a direct chain node. Which one, and over
//! which transport, is discovered on the first successful `/info` and kept
//! for the life of the client (the [`NodeKind::Auto`] variant mutates in
//! place).

pub mod wire;

use crate::error::Error;
use crate::model::NodeInfo;
use crate::validators;
use crate::Config;
use cwk_common::{BlockHash, TxHash};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use self::wire::{
    FeeResponse, GlobalIndexesRequest, GlobalIndexesResponse, InfoResponse,
    RandomOutsCacheRequest, RandomOutsChainRequest, RandomOutsForAmount,
    SendRawTransactionRequest, SendRawTransactionResponse, TransactionStatusRequest,
    TransactionStatusResponse, WalletSyncDataRequest, WalletSyncDataResponse,
};

/// Which protocol the remote speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Decide from the `/info` payload (`isCacheApi`).
    Auto,

    /// A pre-indexed cache service: embeds global indexes in `getBlocks`.
    Cache,

    /// A direct chain node.
    Chain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Https,
    Http,
}

impl Transport {
    fn scheme(&self) -> &'static str {
        match self {
            Transport::Https => "https",
            Transport::Http => "http",
        }
    }
}

/// Fee advertised by the node operator, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeInfo {
    pub address: String,
    pub amount: u64,
}

/// HTTP client for a remote node.
pub struct NodeClient {
    client: reqwest::Client,
    host: String,
    port: u16,
    kind: NodeKind,
    transport: Option<Transport>,

    /// Blocks asked for per `getBlocks`; halved under body-size
    /// back-pressure, restored on success.
    block_count: u64,

    config: Config,
}

impl std::fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("kind", &self.kind)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl NodeClient {
    /// Create a client for `host:port`.
    ///
    /// A `http://` or `https://` prefix on `host` pins the transport;
    /// otherwise HTTPS is probed first and plain HTTP is the fallback.
    pub fn new(host: &str, port: u16, config: &Config) -> Result<Self, Error> {
        let (transport, host) = if let Some(rest) = host.strip_prefix("https://") {
            (Some(Transport::Https), rest)
        } else if let Some(rest) = host.strip_prefix("http://") {
            (Some(Transport::Http), rest)
        } else {
            (None, host)
        };

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            port,
            kind: NodeKind::Auto,
            transport,
            block_count: config.blocks_per_daemon_request,
            config: config.clone(),
        })
    }

    /// Pin the protocol instead of discovering it.
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn url(&self, transport: Transport, path: &str) -> String {
        format!("{}://{}:{}{}", transport.scheme(), self.host, self.port, path)
    }

    /// Current node state. The remote reports `network_height` one block
    /// ahead; the decrement is applied here so callers never see it.
    pub async fn get_info(&mut self) -> Result<NodeInfo, Error> {
        let info = self.fetch_info().await?;
        Ok(node_info_from_wire(&info, self.config.block_target_time.as_secs())?)
    }

    async fn fetch_info(&mut self) -> Result<InfoResponse, Error> {
        match self.transport {
            Some(transport) => {
                let info: InfoResponse = self.get_json(transport, "/info").await?;
                if info.height.is_none() {
                    return Err(Error::MalformedResponse("height"));
                }
                self.adopt(transport, &info);
                Ok(info)
            }
            None => {
                // Probe HTTPS; a daemon listening in plain HTTP typically
                // answers with something parseable but semantically empty.
                match self.get_json::<InfoResponse>(Transport::Https, "/info").await {
                    Ok(info) if info.height.is_some() => {
                        self.adopt(Transport::Https, &info);
                        Ok(info)
                    }
                    Ok(_) | Err(_) => {
                        let info: InfoResponse =
                            self.get_json(Transport::Http, "/info").await?;
                        if info.height.is_none() {
                            return Err(Error::MalformedResponse("height"));
                        }
                        self.adopt(Transport::Http, &info);
                        Ok(info)
                    }
                }
            }
        }
    }

    fn adopt(&mut self, transport: Transport, info: &InfoResponse) {
        if self.transport.is_none() {
            log::debug!("node {} answered over {}", self.host, transport.scheme());
        }
        self.transport = Some(transport);
        if self.kind == NodeKind::Auto {
            self.kind = match info.is_cache_api {
                Some(true) => NodeKind::Cache,
                _ => NodeKind::Chain,
            };
            log::debug!("node {} adopted as {:?}", self.host, self.kind);
        }
    }

    async fn ensure_transport(&mut self) -> Result<Transport, Error> {
        if let Some(transport) = self.transport {
            return Ok(transport);
        }
        self.fetch_info().await?;
        self.transport.ok_or(Error::MalformedResponse("height"))
    }

    /// Fetch blocks the wallet has not seen. `checkpoints` is ordered
    /// newest-first so the node resumes from the most recent hash it knows.
    ///
    /// Against a cache service the response body is capped at
    /// `max_body_response_size`: on overflow the block count is halved and
    /// the request retried, failing normally once a single block is too big.
    pub async fn get_wallet_sync_data(
        &mut self,
        checkpoints: Vec<BlockHash>,
        start_height: u64,
        start_timestamp: u64,
        skip_coinbase_transactions: bool,
    ) -> Result<WalletSyncDataResponse, Error> {
        loop {
            let request = WalletSyncDataRequest {
                block_hash_checkpoints: checkpoints.clone(),
                start_height,
                start_timestamp,
                block_count: self.block_count,
                skip_coinbase_transactions,
            };
            let limit = (self.kind == NodeKind::Cache)
                .then_some(self.config.max_body_response_size);

            match self
                .post_json::<WalletSyncDataResponse, _>("/getwalletsyncdata", &request, limit)
                .await
            {
                Ok(response) => {
                    // Back-pressure recovers: a burst of large blocks must
                    // not degrade the rest of the sync
                    self.block_count =
                        (self.block_count * 2).min(self.config.blocks_per_daemon_request);
                    return Ok(response);
                }
                Err(Error::BodyTooLarge { got, limit }) if self.block_count > 1 => {
                    self.block_count /= 2;
                    log::debug!(
                        "getwalletsyncdata body {got} over {limit}, retrying with {} blocks",
                        self.block_count
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Global output indexes for every transaction in `[start, end)`.
    ///
    /// Chain nodes only: the cache service embeds the indexes in
    /// `getBlocks` and refuses this call.
    pub async fn get_global_indexes_for_range(
        &mut self,
        start_height: u64,
        end_height: u64,
    ) -> Result<HashMap<TxHash, Vec<u64>>, Error> {
        if self.kind == NodeKind::Cache {
            return Err(Error::GlobalIndexesEmbedded);
        }
        let request = GlobalIndexesRequest {
            start_height,
            end_height,
        };
        let response: GlobalIndexesResponse = self
            .post_json("/get_global_indexes_for_range", &request, None)
            .await?;
        Ok(response
            .indexes
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect())
    }

    /// Decoy outputs for each amount, `mixin` per amount, ordered by global
    /// index so the real input's position leaks nothing.
    pub async fn get_random_outputs(
        &mut self,
        amounts: Vec<u64>,
        mixin: u64,
    ) -> Result<Vec<RandomOutsForAmount>, Error> {
        let mut outs: Vec<RandomOutsForAmount> = match self.kind {
            NodeKind::Chain => {
                let request = RandomOutsChainRequest {
                    amounts,
                    outs_count: mixin,
                };
                self.post_json("/getrandom_outs", &request, None).await?
            }
            _ => {
                let request = RandomOutsCacheRequest { amounts, mixin };
                self.post_json("/randomOutputs", &request, None).await?
            }
        };
        for per_amount in outs.iter_mut() {
            per_amount
                .outs
                .sort_by_key(|output| output.global_amount_index);
        }
        Ok(outs)
    }

    /// Submit a raw transaction. `true` iff the node acknowledged it.
    pub async fn send_raw_transaction(&mut self, tx_as_hex: String) -> Result<bool, Error> {
        let request = SendRawTransactionRequest { tx_as_hex };
        let response: SendRawTransactionResponse = self
            .post_json("/sendrawtransaction", &request, None)
            .await?;
        Ok(response.status == "OK")
    }

    /// Which of `hashes` the node no longer knows about (fell out of the
    /// pool without confirming).
    pub async fn get_transactions_status(
        &mut self,
        hashes: Vec<TxHash>,
    ) -> Result<Vec<TxHash>, Error> {
        let request = TransactionStatusRequest {
            transaction_hashes: hashes,
        };
        let response: TransactionStatusResponse = self
            .post_json("/get_transactions_status", &request, None)
            .await?;
        Ok(response.transactions_unknown)
    }

    /// The node operator's fee, discarded unless its address validates as a
    /// standard (non integrated) address.
    pub async fn get_fee(&mut self) -> Result<Option<FeeInfo>, Error> {
        let transport = self.ensure_transport().await?;
        let response: FeeResponse = self.get_json(transport, "/fee").await?;

        if response.address.is_empty() || response.amount == 0 {
            return Ok(None);
        }
        if let Err(e) = validators::validate_address(&response.address, false, &self.config) {
            log::warn!(
                "discarding node fee info, address {} invalid: {}",
                response.address,
                e.code()
            );
            return Ok(None);
        }
        Ok(Some(FeeInfo {
            address: response.address,
            amount: response.amount,
        }))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        transport: Transport,
        path: &str,
    ) -> Result<T, Error> {
        let response = self.client.get(self.url(transport, path)).send().await?;
        Ok(response.json().await?)
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &mut self,
        path: &str,
        body: &B,
        body_limit: Option<usize>,
    ) -> Result<T, Error> {
        let transport = self.ensure_transport().await?;
        let response = self
            .client
            .post(self.url(transport, path))
            .json(body)
            .send()
            .await?;
        let bytes = response.bytes().await?;
        if let Some(limit) = body_limit {
            if bytes.len() > limit {
                return Err(Error::BodyTooLarge {
                    got: bytes.len(),
                    limit,
                });
            }
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Map the wire info onto [`NodeInfo`], fixing the remote's off-by-one on
/// `network_height` and deriving the hashrate.
fn node_info_from_wire(info: &InfoResponse, block_target_secs: u64) -> Result<NodeInfo, Error> {
    let local_height = info.height.ok_or(Error::MalformedResponse("height"))?;
    let network_height = info.network_height.saturating_sub(1);
    Ok(NodeInfo {
        local_height,
        network_height,
        incoming_connections: info.incoming_connections_count,
        outgoing_connections: info.outgoing_connections_count,
        difficulty: info.difficulty,
        hashrate: info.difficulty / block_target_secs.max(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_height_off_by_one() {
        let wire: InfoResponse = serde_json::from_str(
            r#"{"height":100,"network_height":101,"difficulty":60}"#,
        )
        .unwrap();
        let info = node_info_from_wire(&wire, 30).unwrap();
        assert_eq!(info.local_height, 100);
        assert_eq!(info.network_height, 100);
        assert_eq!(info.hashrate, 2);

        // height 0 must not underflow
        let wire: InfoResponse =
            serde_json::from_str(r#"{"height":0,"network_height":0}"#).unwrap();
        let info = node_info_from_wire(&wire, 30).unwrap();
        assert_eq!(info.network_height, 0);
    }

    #[test]
    fn test_info_without_height_rejected() {
        let wire: InfoResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            node_info_from_wire(&wire, 30),
            Err(Error::MalformedResponse("height"))
        ));
    }

    #[test]
    fn test_explicit_scheme_pins_transport() {
        let config = Config::default();
        let client = NodeClient::new("https://node.example.org", 11898, &config).unwrap();
        assert_eq!(client.transport, Some(Transport::Https));
        assert_eq!(client.host(), "node.example.org");

        let client = NodeClient::new("http://127.0.0.1", 11898, &config).unwrap();
        assert_eq!(client.transport, Some(Transport::Http));

        let client = NodeClient::new("node.example.org", 11898, &config).unwrap();
        assert_eq!(client.transport, None);
    }

    #[test]
    fn test_url_building() {
        let config = Config::default();
        let client = NodeClient::new("http://127.0.0.1/", 11898, &config).unwrap();
        assert_eq!(
            client.url(Transport::Http, "/getwalletsyncdata"),
            "http://127.0.0.1:11898/getwalletsyncdata"
        );
    }
}
