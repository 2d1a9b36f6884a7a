//! Orchestrator configuration

use std::env;
use std::fmt;
use std::time::Duration;

use alloy::primitives::B256;
use eyre::{eyre, Result, WrapErr};
use qgb_rs::client::BroadcasterConfig;
use qgb_rs::retry::RetryPolicy;
use qgb_rs::EncoderConfig;

/// Orchestrator configuration
#[derive(Clone)]
pub struct Config {
    /// App LCD (REST gateway) URL
    pub app_lcd_url: String,
    /// Tendermint RPC URL, used for the event websocket
    pub tendermint_rpc_url: String,
    /// Celestia chain ID
    pub chain_id: String,
    /// Mnemonic of the orchestrator account that sends confirms
    pub orchestrator_mnemonic: String,
    /// Bech32 prefix of the orchestrator account
    pub account_prefix: String,
    /// EVM key the attestations are signed with
    pub evm_private_key: String,
    /// 32-byte bridge ID baked into every digest
    pub bridge_id: String,

    pub fee_denom: String,
    pub gas_limit: u64,
    pub gas_price: f64,

    /// Capacity of the nonce and per-kind work queues
    pub queue_capacity: usize,

    pub retry_max_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,

    /// Health server port (default 9100)
    pub health_port: u16,

    /// Nonces remembered to suppress duplicate work between replay and follow
    pub dedupe_cache_size: usize,
    pub dedupe_cache_ttl_secs: u64,
}

/// Custom Debug that redacts the mnemonic and the EVM key.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("app_lcd_url", &self.app_lcd_url)
            .field("tendermint_rpc_url", &self.tendermint_rpc_url)
            .field("chain_id", &self.chain_id)
            .field("orchestrator_mnemonic", &"<redacted>")
            .field("account_prefix", &self.account_prefix)
            .field("evm_private_key", &"<redacted>")
            .field("bridge_id", &self.bridge_id)
            .field("fee_denom", &self.fee_denom)
            .field("gas_limit", &self.gas_limit)
            .field("gas_price", &self.gas_price)
            .field("queue_capacity", &self.queue_capacity)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_initial_backoff_ms", &self.retry_initial_backoff_ms)
            .field("retry_max_backoff_ms", &self.retry_max_backoff_ms)
            .field("health_port", &self.health_port)
            .field("dedupe_cache_size", &self.dedupe_cache_size)
            .field("dedupe_cache_ttl_secs", &self.dedupe_cache_ttl_secs)
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
        // Try to load .env file
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }

        let config = Self {
            app_lcd_url: env::var("APP_LCD_URL").map_err(|_| eyre!("APP_LCD_URL required"))?,
            tendermint_rpc_url: env::var("TENDERMINT_RPC_URL")
                .map_err(|_| eyre!("TENDERMINT_RPC_URL required"))?,
            chain_id: env::var("CHAIN_ID").map_err(|_| eyre!("CHAIN_ID required"))?,
            orchestrator_mnemonic: env::var("ORCHESTRATOR_MNEMONIC")
                .map_err(|_| eyre!("ORCHESTRATOR_MNEMONIC required"))?,
            account_prefix: env::var("ACCOUNT_PREFIX").unwrap_or_else(|_| "celestia".to_string()),
            evm_private_key: env::var("EVM_PRIVATE_KEY")
                .map_err(|_| eyre!("EVM_PRIVATE_KEY required"))?,
            bridge_id: env::var("BRIDGE_ID").map_err(|_| eyre!("BRIDGE_ID required"))?,

            fee_denom: env::var("FEE_DENOM").unwrap_or_else(|_| "utia".to_string()),
            gas_limit: optional("GAS_LIMIT", 200_000),
            gas_price: optional("GAS_PRICE", 0.1),

            queue_capacity: optional("QUEUE_CAPACITY", 100),

            retry_max_attempts: optional("RETRY_MAX_ATTEMPTS", 5),
            retry_initial_backoff_ms: optional("RETRY_INITIAL_BACKOFF_MS", 2_000),
            retry_max_backoff_ms: optional("RETRY_MAX_BACKOFF_MS", 60_000),

            health_port: optional("HEALTH_PORT", 9100),

            dedupe_cache_size: optional("DEDUPE_CACHE_SIZE", 10_000),
            dedupe_cache_ttl_secs: optional("DEDUPE_CACHE_TTL_SECS", 3_600),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.app_lcd_url) {
            return Err(eyre!("APP_LCD_URL must be an http(s) URL"));
        }

        if !is_http_url(&self.tendermint_rpc_url) {
            return Err(eyre!("TENDERMINT_RPC_URL must be an http(s) URL"));
        }

        if self.chain_id.is_empty() {
            return Err(eyre!("CHAIN_ID cannot be empty"));
        }

        let words = self.orchestrator_mnemonic.split_whitespace().count();
        if words < 12 {
            return Err(eyre!("ORCHESTRATOR_MNEMONIC must have at least 12 words"));
        }

        validate_private_key(&self.evm_private_key)?;
        self.bridge_id()?;

        if self.queue_capacity == 0 {
            return Err(eyre!("QUEUE_CAPACITY must be greater than 0"));
        }

        if self.dedupe_cache_size == 0 {
            return Err(eyre!("DEDUPE_CACHE_SIZE must be greater than 0"));
        }

        if self.gas_price < 0.0 {
            return Err(eyre!("GAS_PRICE cannot be negative"));
        }

        Ok(())
    }

    pub fn bridge_id(&self) -> Result<B256> {
        parse_bridge_id(&self.bridge_id)
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

    pub fn broadcaster_config(&self) -> BroadcasterConfig {
        BroadcasterConfig {
            lcd_url: self.app_lcd_url.clone(),
            chain_id: self.chain_id.clone(),
            mnemonic: self.orchestrator_mnemonic.clone(),
            account_prefix: self.account_prefix.clone(),
            fee_denom: self.fee_denom.clone(),
            gas_limit: self.gas_limit,
            gas_price: self.gas_price,
        }
    }

    /// Websocket endpoint derived from the Tendermint RPC URL
    pub fn websocket_url(&self) -> String {
        let base = self.tendermint_rpc_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/websocket", base)
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Parse a 32-byte hex bridge ID (with or without `0x`)
pub fn parse_bridge_id(value: &str) -> Result<B256> {
    let stripped = value.trim().strip_prefix("0x").unwrap_or(value.trim());
    let bytes = hex::decode(stripped).wrap_err("BRIDGE_ID must be hex")?;
    if bytes.len() != 32 {
        return Err(eyre!(
            "BRIDGE_ID must be 32 bytes (64 hex chars), got {} bytes",
            bytes.len()
        ));
    }
    Ok(B256::from_slice(&bytes))
}

fn validate_private_key(key: &str) -> Result<()> {
    let stripped = key.trim().strip_prefix("0x").unwrap_or(key.trim());
    if stripped.len() != 64 || hex::decode(stripped).is_err() {
        return Err(eyre!("EVM_PRIVATE_KEY must be 64 hex chars (optionally 0x-prefixed)"));
    }
    Ok(())
}
