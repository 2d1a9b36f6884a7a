//! Relayer configuration

use std::env;
use std::fmt;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use eyre::{eyre, Result, WrapErr};
use qgb_rs::client::ConfirmQuery;
use qgb_rs::retry::RetryPolicy;
use qgb_rs::EncoderConfig;

use crate::relayer::RelayerSettings;

/// Relayer configuration
#[derive(Clone)]
pub struct Config {
    /// App LCD (REST gateway) URL
    pub app_lcd_url: String,
    /// Tendermint RPC URL, used for data commitment roots
    pub tendermint_rpc_url: String,

    /// EVM RPC URL
    pub evm_rpc_url: String,
    /// EVM native chain ID, checked against the node at startup
    pub evm_chain_id: u64,
    /// Key paying for contract submissions
    pub evm_private_key: String,
    /// Deployed QGB contract
    pub qgb_contract_address: String,
    /// 32-byte bridge ID the confirms were signed under
    pub bridge_id: String,

    /// Pause between relay ticks when caught up
    pub poll_interval_ms: u64,
    /// How long to wait for two thirds of the confirms
    pub quorum_timeout_secs: u64,
    pub quorum_poll_interval_secs: u64,
    /// Polls of the contract nonce after a submission
    pub nonce_wait_polls: u32,
    pub nonce_wait_interval_secs: u64,

    pub retry_max_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,

    /// Health server port (default 9101)
    pub health_port: u16,
}

/// Custom Debug that redacts the EVM key.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("app_lcd_url", &self.app_lcd_url)
            .field("tendermint_rpc_url", &self.tendermint_rpc_url)
            .field("evm_rpc_url", &self.evm_rpc_url)
            .field("evm_chain_id", &self.evm_chain_id)
            .field("evm_private_key", &"<redacted>")
            .field("qgb_contract_address", &self.qgb_contract_address)
            .field("bridge_id", &self.bridge_id)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("quorum_timeout_secs", &self.quorum_timeout_secs)
            .field("quorum_poll_interval_secs", &self.quorum_poll_interval_secs)
            .field("nonce_wait_polls", &self.nonce_wait_polls)
            .field("nonce_wait_interval_secs", &self.nonce_wait_interval_secs)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_initial_backoff_ms", &self.retry_initial_backoff_ms)
            .field("retry_max_backoff_ms", &self.retry_max_backoff_ms)
            .field("health_port", &self.health_port)
            .finish()
    }
}

fn optional<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }

        let config = Self {
            app_lcd_url: env::var("APP_LCD_URL").map_err(|_| eyre!("APP_LCD_URL required"))?,
            tendermint_rpc_url: env::var("TENDERMINT_RPC_URL")
                .map_err(|_| eyre!("TENDERMINT_RPC_URL required"))?,

            evm_rpc_url: env::var("EVM_RPC_URL").map_err(|_| eyre!("EVM_RPC_URL required"))?,
            evm_chain_id: env::var("EVM_CHAIN_ID")
                .map_err(|_| eyre!("EVM_CHAIN_ID required"))?
                .parse()
                .map_err(|_| eyre!("Invalid EVM_CHAIN_ID"))?,
            evm_private_key: env::var("EVM_PRIVATE_KEY")
                .map_err(|_| eyre!("EVM_PRIVATE_KEY required"))?,
            qgb_contract_address: env::var("QGB_CONTRACT_ADDRESS")
                .map_err(|_| eyre!("QGB_CONTRACT_ADDRESS required"))?,
            bridge_id: env::var("BRIDGE_ID").map_err(|_| eyre!("BRIDGE_ID required"))?,

            poll_interval_ms: optional("POLL_INTERVAL_MS", 10_000),
            quorum_timeout_secs: optional("QUORUM_TIMEOUT_SECS", 3_600),
            quorum_poll_interval_secs: optional("QUORUM_POLL_INTERVAL_SECS", 30),
            nonce_wait_polls: optional("NONCE_WAIT_POLLS", 60),
            nonce_wait_interval_secs: optional("NONCE_WAIT_INTERVAL_SECS", 10),

            retry_max_attempts: optional("RETRY_MAX_ATTEMPTS", 5),
            retry_initial_backoff_ms: optional("RETRY_INITIAL_BACKOFF_MS", 2_000),
            retry_max_backoff_ms: optional("RETRY_MAX_BACKOFF_MS", 60_000),

            health_port: optional("HEALTH_PORT", 9101),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("APP_LCD_URL", &self.app_lcd_url),
            ("TENDERMINT_RPC_URL", &self.tendermint_rpc_url),
            ("EVM_RPC_URL", &self.evm_rpc_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(eyre!("{} must be an http(s) URL", name));
            }
        }

        self.contract_address()?;

        let key = self
            .evm_private_key
            .trim()
            .strip_prefix("0x")
            .unwrap_or(self.evm_private_key.trim());
        if key.len() != 64 || hex::decode(key).is_err() {
            return Err(eyre!(
                "EVM_PRIVATE_KEY must be 64 hex chars (optionally 0x-prefixed)"
            ));
        }

        self.bridge_id()?;

        if self.quorum_poll_interval_secs == 0 {
            return Err(eyre!("QUORUM_POLL_INTERVAL_SECS must be greater than 0"));
        }

        Ok(())
    }

    pub fn contract_address(&self) -> Result<Address> {
        let addr = &self.qgb_contract_address;
        if addr.len() != 42 || !addr.starts_with("0x") {
            return Err(eyre!(
                "QGB_CONTRACT_ADDRESS must be a valid hex address (42 chars with 0x prefix)"
            ));
        }
        addr.parse()
            .map_err(|e| eyre!("Invalid QGB_CONTRACT_ADDRESS: {}", e))
    }

    pub fn bridge_id(&self) -> Result<B256> {
        let value = self.bridge_id.trim();
        let stripped = value.strip_prefix("0x").unwrap_or(value);
        let bytes = hex::decode(stripped).wrap_err("BRIDGE_ID must be hex")?;
        if bytes.len() != 32 {
            return Err(eyre!(
                "BRIDGE_ID must be 32 bytes (64 hex chars), got {} bytes",
                bytes.len()
            ));
        }
        Ok(B256::from_slice(&bytes))
    }

    pub fn encoder_config(&self) -> Result<EncoderConfig> {
        Ok(EncoderConfig::new(self.bridge_id()?))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_initial_backoff_ms),
            Duration::from_millis(self.retry_max_backoff_ms),
        )
    }

    pub fn relayer_settings(&self) -> RelayerSettings {
        RelayerSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            confirm_query: ConfirmQuery {
                timeout: Duration::from_secs(self.quorum_timeout_secs),
                poll_interval: Duration::from_secs(self.quorum_poll_interval_secs),
            },
            nonce_wait_polls: self.nonce_wait_polls,
            nonce_wait_interval: Duration::from_secs(self.nonce_wait_interval_secs),
        }
    }
}
