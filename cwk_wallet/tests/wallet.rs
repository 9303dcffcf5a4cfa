use cwk_wallet::cwk_common::{PublicKey, SecretKey, TxHash};
use cwk_wallet::{
    BuildParams, BuiltTransaction, Config, Error, NodeClient, TransactionBuilder, WalletBackend,
    WalletError,
};
use serde_json::json;
use std::sync::Arc;

fn offline_node(config: &Config) -> NodeClient {
    // Nothing listens on port 1; every request fails fast
    NodeClient::new("http://127.0.0.1", 1, config).unwrap()
}

const SPEND_KEY: &str = "0909090909090909090909090909090909090909090909090909090909090909";

/// A wallet document holding one subwallet with a single spendable input of
/// 1000, synced to height 100.
fn wallet_document() -> String {
    json!({
        "walletFileFormatVersion": 1,
        "subWallets": {
            "publicSpendKeys": [SPEND_KEY],
            "subWallet": [{
                "publicSpendKey": SPEND_KEY,
                "privateSpendKey": "0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a",
                "scanStartHeight": 0,
                "scanStartTimestamp": 0,
                "isPrimary": true,
                "unspentInputs": [{
                    "keyImage": "0101010101010101010101010101010101010101010101010101010101010101",
                    "amount": 1000,
                    "blockHeight": 50,
                    "txPublicKey": "0202020202020202020202020202020202020202020202020202020202020202",
                    "indexInTx": 0,
                    "globalOutputIndex": 40,
                    "oneTimePublicKey": "0303030303030303030303030303030303030303030303030303030303030303",
                    "spendHeight": 0,
                    "unlockTime": 0,
                    "parentTxHash": "0404040404040404040404040404040404040404040404040404040404040404"
                }],
                "lockedInputs": [],
                "spentInputs": [],
                "unconfirmedIncoming": []
            }],
            "transactions": [{
                "transfers": { (SPEND_KEY): 1000 },
                "hash": "0404040404040404040404040404040404040404040404040404040404040404",
                "fee": 10,
                "blockHeight": 50,
                "timestamp": 1600000000,
                "paymentID": "",
                "unlockTime": 0,
                "isCoinbase": false
            }],
            "lockedTransactions": [],
            "lockedTransactionInputs": [],
            "privateViewKey": "0505050505050505050505050505050505050505050505050505050505050505",
            "isViewWallet": false,
            "txPrivateKeys": []
        },
        "walletSynchronizer": {
            "startTimestamp": 0,
            "startHeight": 0,
            "privateViewKey": "0505050505050505050505050505050505050505050505050505050505050505",
            "transactionSynchronizerStatus": {
                "blockHashCheckpoints": [],
                "lastKnownBlockHashes": ["0606060606060606060606060606060606060606060606060606060606060606"],
                "lastKnownBlockHeight": 100
            }
        }
    })
    .to_string()
}

struct StubBuilder;

impl TransactionBuilder for StubBuilder {
    fn build(&self, params: BuildParams<'_>) -> Result<BuiltTransaction, Error> {
        assert!(!params.inputs.is_empty());
        Ok(BuiltTransaction {
            hash: TxHash::from_bytes([0xaa; 32]),
            raw_hex: "deadbeef".into(),
            tx_private_key: SecretKey::from_bytes([0xbb; 32]),
            change_output_key: Some(PublicKey::from_bytes([0xcc; 32])),
        })
    }
}

#[tokio::test]
async fn restore_from_document_and_query() {
    let config = Config::default();
    let wallet =
        WalletBackend::from_json(config.clone(), offline_node(&config), &wallet_document())
            .unwrap();

    assert_eq!(wallet.get_balance(None).await, (1000, 0));
    assert_eq!(wallet.wallet_height().await, 100);

    let history = wallet.get_transactions().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].fee, 10);

    let addresses = wallet.addresses().await;
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].to_string().len(), 99);

    // The document round-trips unchanged (field order aside)
    let out: serde_json::Value =
        serde_json::from_str(&wallet.to_json().await.unwrap()).unwrap();
    let reference: serde_json::Value = serde_json::from_str(&wallet_document()).unwrap();
    assert_eq!(out, reference);
}

#[tokio::test]
async fn send_reverts_when_node_rejects() {
    let config = Config::default();
    let wallet =
        WalletBackend::from_json(config.clone(), offline_node(&config), &wallet_document())
            .unwrap();
    wallet.set_transaction_builder(Arc::new(StubBuilder));

    let destination = wallet.primary_address().await.unwrap().to_string();
    let before = wallet.get_balance(None).await;

    // The builder succeeds, the submission cannot: the store must be
    // exactly as it was before the call
    let result = wallet
        .send_advanced(vec![(destination, 500)], Some(0), Some(10), None, None, None)
        .await;
    assert!(result.is_err());

    assert_eq!(wallet.get_balance(None).await, before);
    assert_eq!(wallet.get_transactions().await.len(), 1);
    assert_eq!(
        wallet
            .get_tx_private_key(&TxHash::from_bytes([0xaa; 32]))
            .await,
        None
    );
}

#[tokio::test]
async fn validation_codes_reach_the_caller() {
    let config = Config::default();
    let wallet =
        WalletBackend::from_json(config.clone(), offline_node(&config), &wallet_document())
            .unwrap();
    wallet.set_transaction_builder(Arc::new(StubBuilder));

    let valid = wallet.primary_address().await.unwrap().to_string();

    // Wrong length
    let result = wallet.send_basic(&valid[..98], 500, None).await;
    assert!(matches!(
        result,
        Err(Error::Validation(WalletError::AddressWrongLength))
    ));

    // Not base58
    let mut bad = valid.clone();
    bad.replace_range(40..41, "0");
    let result = wallet.send_basic(&bad, 500, None).await;
    assert!(matches!(
        result,
        Err(Error::Validation(WalletError::AddressNotBase58))
    ));

    // More than the wallet holds
    let result = wallet.send_basic(&valid, 100_000, None).await;
    assert!(matches!(
        result,
        Err(Error::Validation(WalletError::NotEnoughBalance))
    ));

    // Below the fee floor
    let result = wallet
        .send_advanced(vec![(valid, 500)], Some(0), Some(1), None, None, None)
        .await;
    assert!(matches!(
        result,
        Err(Error::Validation(WalletError::FeeTooSmall))
    ));
}

#[tokio::test]
async fn fresh_wallet_has_no_funds_and_a_primary_address() {
    let config = Config::default();
    let wallet = WalletBackend::create(config.clone(), offline_node(&config));

    assert_eq!(wallet.get_balance(None).await, (0, 0));
    assert!(wallet.get_transactions().await.is_empty());

    let address = wallet.primary_address().await.unwrap().to_string();
    assert_eq!(address.len(), 99);
    assert!(address.starts_with("TRTL"));

    // A fresh wallet serializes and restores
    let json = wallet.to_json().await.unwrap();
    let restored = WalletBackend::from_json(config.clone(), offline_node(&config), &json).unwrap();
    assert_eq!(restored.primary_address().await.unwrap().to_string(), address);

    // The integrated form embeds the payment ID and decodes back to it
    let payment_id = "1f".repeat(32);
    let integrated = wallet.integrated_address(&payment_id).await.unwrap();
    assert_eq!(integrated.to_string().len(), 99 + 88);
    assert_eq!(integrated.payment_id(), Some(payment_id.as_str()));
    assert_eq!(integrated.to_standard().to_string(), address);
}

#[ignore = "needs a reachable node"]
#[tokio::test]
async fn live_sync_against_public_node() {
    let _ = env_logger::builder().is_test(true).try_init();

    let config = Config::default();
    let node = NodeClient::new("blockapi.turtlepay.io", 443, &config).unwrap();
    let wallet = WalletBackend::create(config, node);

    let mut events = wallet.subscribe();
    wallet.start().await;

    let event = tokio::time::timeout(std::time::Duration::from_secs(60), events.recv())
        .await
        .expect("no event within a minute")
        .unwrap();
    println!("first event: {event:?}");

    let (wallet_height, network_height) = wallet.sync_progress().await;
    println!("wallet {wallet_height} network {network_height}");
    assert!(network_height > 0);

    wallet.stop().await;
}
