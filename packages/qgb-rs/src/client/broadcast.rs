//! Cosmos SDK transaction broadcaster for confirm messages
//!
//! Signs confirm transactions with a mnemonic-derived secp256k1 key and posts
//! them to the LCD in `BROADCAST_MODE_SYNC`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bip39::Mnemonic;
use cosmrs::{
    bip32::DerivationPath,
    crypto::secp256k1::SigningKey,
    tx::{self, Fee, SignDoc, SignerInfo},
    AccountId, Any, Coin,
};
use eyre::{eyre, Result, WrapErr};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::proto::{MsgDataCommitmentConfirm, MsgValsetConfirm};
use super::TxBroadcaster;
use crate::types::{DataCommitmentConfirm, ValsetConfirm};

/// Cosmos derivation path
const COSMOS_DERIVATION_PATH: &str = "m/44'/118'/0'/0/0";

/// Account info from LCD
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub sequence: u64,
    pub account_number: u64,
}

/// Settings for [`CosmosBroadcaster`]
#[derive(Clone)]
pub struct BroadcasterConfig {
    pub lcd_url: String,
    pub chain_id: String,
    pub mnemonic: String,
    pub account_prefix: String,
    pub fee_denom: String,
    pub gas_limit: u64,
    pub gas_price: f64,
}

impl fmt::Debug for BroadcasterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcasterConfig")
            .field("lcd_url", &self.lcd_url)
            .field("chain_id", &self.chain_id)
            .field("mnemonic", &"<redacted>")
            .field("account_prefix", &self.account_prefix)
            .field("fee_denom", &self.fee_denom)
            .field("gas_limit", &self.gas_limit)
            .field("gas_price", &self.gas_price)
            .finish()
    }
}

/// Broadcasts confirm transactions from the orchestrator account
pub struct CosmosBroadcaster {
    lcd_url: String,
    chain_id: String,
    fee_denom: String,
    gas_limit: u64,
    gas_price: f64,
    signing_key: SigningKey,
    pub address: AccountId,
    client: Client,
    /// Serializes sign+broadcast so concurrent workers never reuse a sequence
    submit_lock: Mutex<()>,
}

impl CosmosBroadcaster {
    pub fn new(config: &BroadcasterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to create HTTP client")?;

        let mnemonic =
            Mnemonic::parse(&config.mnemonic).map_err(|e| eyre!("Invalid mnemonic: {}", e))?;

        let seed = mnemonic.to_seed("");
        let path: DerivationPath = COSMOS_DERIVATION_PATH
            .parse()
            .map_err(|e| eyre!("Invalid derivation path: {:?}", e))?;

        let signing_key = SigningKey::derive_from_path(seed, &path)
            .map_err(|e| eyre!("Failed to derive signing key: {}", e))?;

        let address = signing_key
            .public_key()
            .account_id(&config.account_prefix)
            .map_err(|e| eyre!("Failed to get account ID: {}", e))?;

        info!(orchestrator = %address, chain_id = %config.chain_id, "Cosmos broadcaster initialized");

        Ok(Self {
            lcd_url: config.lcd_url.trim_end_matches('/').to_string(),
            chain_id: config.chain_id.clone(),
            fee_denom: config.fee_denom.clone(),
            gas_limit: config.gas_limit,
            gas_price: config.gas_price,
            signing_key,
            address,
            client,
            submit_lock: Mutex::new(()),
        })
    }

    /// Get account info (sequence and account number)
    async fn get_account_info(&self) -> Result<AccountInfo> {
        let url = format!(
            "{}/cosmos/auth/v1beta1/accounts/{}",
            self.lcd_url, self.address
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err("Failed to query account info")?;

        if !response.status().is_success() {
            return Err(eyre!(
                "Account query failed: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let data: serde_json::Value = response.json().await?;
        parse_account_info(&data)
    }

    fn fee_amount(&self) -> u128 {
        ((self.gas_limit as f64) * self.gas_price).ceil() as u128
    }

    /// Sign and broadcast a single-message transaction
    async fn submit(&self, msg: Any) -> Result<String> {
        let _guard = self.submit_lock.lock().await;

        let account_info = self.get_account_info().await?;

        let body = tx::Body::new(vec![msg], "", 0u32);

        let public_key = self.signing_key.public_key();
        let signer_info = SignerInfo::single_direct(Some(public_key), account_info.sequence);

        let fee = Fee::from_amount_and_gas(
            Coin {
                denom: self
                    .fee_denom
                    .parse()
                    .map_err(|e| eyre!("Invalid fee denom: {:?}", e))?,
                amount: self.fee_amount(),
            },
            self.gas_limit,
        );

        let auth_info = signer_info.auth_info(fee);

        let chain_id = self
            .chain_id
            .parse()
            .map_err(|_| eyre!("Invalid chain ID"))?;

        let sign_doc = SignDoc::new(&body, &auth_info, &chain_id, account_info.account_number)
            .map_err(|e| eyre!("Failed to create sign doc: {}", e))?;

        let tx_raw = sign_doc
            .sign(&self.signing_key)
            .map_err(|e| eyre!("Failed to sign transaction: {}", e))?;

        let tx_bytes = tx_raw
            .to_bytes()
            .map_err(|e| eyre!("Failed to serialize transaction: {}", e))?;

        self.broadcast_tx(&tx_bytes).await
    }

    /// Broadcast a signed transaction
    async fn broadcast_tx(&self, tx_bytes: &[u8]) -> Result<String> {
        let tx_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, tx_bytes);

        let broadcast_request = serde_json::json!({
            "tx_bytes": tx_b64,
            "mode": "BROADCAST_MODE_SYNC"
        });

        let broadcast_url = format!("{}/cosmos/tx/v1beta1/txs", self.lcd_url);

        debug!(url = %broadcast_url, "Broadcasting transaction");

        let response = self
            .client
            .post(&broadcast_url)
            .json(&broadcast_request)
            .send()
            .await
            .map_err(|e| eyre!("Failed to broadcast: {}", e))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .unwrap_or_else(|_| serde_json::json!({"error": "Failed to parse response"}));

        if status.is_success() {
            return parse_broadcast_response(&body);
        }

        Err(eyre!("Broadcast failed: {}", body))
    }
}

/// Read sequence and account number, also under a nested `base_account`.
fn parse_account_info(data: &serde_json::Value) -> Result<AccountInfo> {
    let account = data
        .get("account")
        .ok_or_else(|| eyre!("Missing 'account' field in response"))?;

    let field = |name: &str| -> Result<u64> {
        let raw = account
            .get(name)
            .or_else(|| account.get("base_account").and_then(|b| b.get(name)))
            .and_then(|v| v.as_str())
            .ok_or_else(|| eyre!("Missing '{}' field in account response", name))?;
        raw.parse()
            .map_err(|e| eyre!("Invalid '{}' value {:?} in account response: {}", name, raw, e))
    };

    Ok(AccountInfo {
        sequence: field("sequence")?,
        account_number: field("account_number")?,
    })
}

/// Extract the tx hash, or fail on a non-zero `code`.
fn parse_broadcast_response(body: &serde_json::Value) -> Result<String> {
    let tx_response = body
        .get("tx_response")
        .ok_or_else(|| eyre!("Broadcast failed: {}", body))?;

    let code = tx_response
        .get("code")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    if code != 0 {
        let raw_log = tx_response
            .get("raw_log")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown error");
        return Err(eyre!("Transaction failed (code {}): {}", code, raw_log));
    }

    Ok(tx_response
        .get("txhash")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string())
}

#[async_trait]
impl TxBroadcaster for CosmosBroadcaster {
    fn orchestrator_address(&self) -> String {
        self.address.to_string()
    }

    async fn broadcast_valset_confirm(&self, confirm: ValsetConfirm) -> Result<String> {
        let nonce = confirm.nonce;
        let tx_hash = self.submit(MsgValsetConfirm::from(confirm).to_any()).await?;
        info!(nonce, tx_hash = %tx_hash, "Valset confirm broadcast");
        Ok(tx_hash)
    }

    async fn broadcast_data_commitment_confirm(
        &self,
        confirm: DataCommitmentConfirm,
    ) -> Result<String> {
        let nonce = confirm.nonce;
        let tx_hash = self
            .submit(MsgDataCommitmentConfirm::from(confirm).to_any())
            .await?;
        info!(nonce, tx_hash = %tx_hash, "Data commitment confirm broadcast");
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn test_config() -> BroadcasterConfig {
        BroadcasterConfig {
            lcd_url: "http://localhost:1317/".to_string(),
            chain_id: "qgb-test".to_string(),
            mnemonic: TEST_MNEMONIC.to_string(),
            account_prefix: "celestia".to_string(),
            fee_denom: "utia".to_string(),
            gas_limit: 200_000,
            gas_price: 0.002,
        }
    }

    #[test]
    fn test_derives_prefixed_address() {
        let b = CosmosBroadcaster::new(&test_config()).unwrap();
        assert!(b.orchestrator_address().starts_with("celestia1"));
        assert_eq!(b.lcd_url, "http://localhost:1317");
        assert_eq!(b.fee_amount(), 400);
    }

    #[test]
    fn test_invalid_mnemonic_rejected() {
        let mut config = test_config();
        config.mnemonic = "not a mnemonic".to_string();
        assert!(CosmosBroadcaster::new(&config).is_err());
    }

    #[test]
    fn test_config_debug_redacts_mnemonic() {
        let debug = format!("{:?}", test_config());
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("abandon"));
    }

    #[test]
    fn test_parse_account_info_nested() {
        let flat = serde_json::json!({"account": {"sequence": "4", "account_number": "9"}});
        let info = parse_account_info(&flat).unwrap();
        assert_eq!((info.sequence, info.account_number), (4, 9));

        let nested = serde_json::json!({
            "account": {"base_account": {"sequence": "12", "account_number": "3"}}
        });
        let info = parse_account_info(&nested).unwrap();
        assert_eq!((info.sequence, info.account_number), (12, 3));

        assert!(parse_account_info(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_parse_account_info_rejects_missing_or_malformed_fields() {
        let no_sequence = serde_json::json!({"account": {"account_number": "9"}});
        let err = parse_account_info(&no_sequence).unwrap_err();
        assert!(err.to_string().contains("'sequence'"));

        let no_number = serde_json::json!({
            "account": {"base_account": {"sequence": "12"}}
        });
        let err = parse_account_info(&no_number).unwrap_err();
        assert!(err.to_string().contains("'account_number'"));

        let garbled = serde_json::json!({"account": {"sequence": "x", "account_number": "1"}});
        assert!(parse_account_info(&garbled).is_err());

        // a fresh account reports sequence "0" explicitly
        let fresh = serde_json::json!({"account": {"sequence": "0", "account_number": "7"}});
        assert_eq!(parse_account_info(&fresh).unwrap().sequence, 0);
    }

    #[test]
    fn test_parse_broadcast_response() {
        let ok = serde_json::json!({"tx_response": {"code": 0, "txhash": "ABC"}});
        assert_eq!(parse_broadcast_response(&ok).unwrap(), "ABC");

        let failed = serde_json::json!({
            "tx_response": {"code": 18, "raw_log": "confirm already exists"}
        });
        let err = parse_broadcast_response(&failed).unwrap_err();
        assert!(err.to_string().contains("code 18"));
        assert!(err.to_string().contains("already exists"));
    }
}
