//! LCD / Tendermint RPC implementation of [`AppQuerier`]

use std::time::Duration;

use alloy::primitives::B256;
use async_trait::async_trait;
use base64::Engine;
use eyre::{eyre, Result, WrapErr};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::AppQuerier;
use crate::types::{AttestationRequest, DataCommitmentConfirm, Params, Valset, ValsetConfirm};

#[derive(Debug, Deserialize)]
struct AttestationResponse {
    attestation: Option<AttestationRequest>,
}

#[derive(Debug, Deserialize)]
struct NonceResponse {
    nonce: u64,
}

#[derive(Debug, Deserialize)]
struct ValsetResponse {
    valset: Valset,
}

#[derive(Debug, Deserialize)]
struct ParamsResponse {
    params: Params,
}

#[derive(Debug, Deserialize)]
struct HeightResponse {
    height: u64,
}

#[derive(Debug, Deserialize)]
struct ConfirmResponse<T> {
    confirm: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ConfirmsResponse<T> {
    confirms: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct DataCommitmentRpcResponse {
    result: DataCommitmentRpcResult,
}

#[derive(Debug, Deserialize)]
struct DataCommitmentRpcResult {
    /// base64 tuple root
    data_commitment: String,
}

/// Queries attestation state through the LCD REST gateway
#[derive(Debug, Clone)]
pub struct RestQuerier {
    lcd_url: String,
    rpc_url: String,
    client: Client,
}

impl RestQuerier {
    pub fn new(lcd_url: &str, rpc_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to create HTTP client")?;

        Ok(Self {
            lcd_url: lcd_url.trim_end_matches('/').to_string(),
            rpc_url: rpc_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// GET a JSON document; 404 maps to `None`.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        debug!(url = %url, "Querying chain");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .wrap_err_with(|| format!("Failed to query {}", url))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(eyre!(
                "Query failed: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let parsed = response
            .json::<T>()
            .await
            .wrap_err_with(|| format!("Failed to decode response from {}", url))?;
        Ok(Some(parsed))
    }

    async fn lcd<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.get_json(&format!("{}/qgb/v1/{}", self.lcd_url, path))
            .await
    }

    async fn lcd_required<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.lcd(path)
            .await?
            .ok_or_else(|| eyre!("{} not found", path))
    }
}

/// Decode the base64 tuple root returned by the `data_commitment` RPC.
pub fn decode_data_commitment(encoded: &str) -> Result<B256> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| eyre!("Invalid data commitment encoding: {}", e))?;
    if bytes.len() != 32 {
        return Err(eyre!(
            "Invalid data commitment length: expected 32 bytes, got {}",
            bytes.len()
        ));
    }
    Ok(B256::from_slice(&bytes))
}

#[async_trait]
impl AppQuerier for RestQuerier {
    async fn attestation_by_nonce(&self, nonce: u64) -> Result<Option<AttestationRequest>> {
        Ok(self
            .lcd::<AttestationResponse>(&format!("attestations/{}", nonce))
            .await?
            .and_then(|r| r.attestation))
    }

    async fn latest_attestation_nonce(&self) -> Result<u64> {
        let r: NonceResponse = self.lcd_required("attestations/nonce/latest").await?;
        Ok(r.nonce)
    }

    async fn earliest_attestation_nonce(&self) -> Result<u64> {
        let r: NonceResponse = self.lcd_required("attestations/nonce/earliest").await?;
        Ok(r.nonce)
    }

    async fn last_valset_before_nonce(&self, nonce: u64) -> Result<Valset> {
        let r: ValsetResponse = self
            .lcd_required(&format!("valset/before/{}", nonce))
            .await?;
        Ok(r.valset)
    }

    async fn params(&self) -> Result<Params> {
        let r: ParamsResponse = self.lcd_required("params").await?;
        Ok(r.params)
    }

    async fn last_unbonding_height(&self) -> Result<u64> {
        let r: HeightResponse = self.lcd_required("unbonding/height").await?;
        Ok(r.height)
    }

    async fn valset_confirm(
        &self,
        nonce: u64,
        orchestrator: &str,
    ) -> Result<Option<ValsetConfirm>> {
        Ok(self
            .lcd::<ConfirmResponse<ValsetConfirm>>(&format!(
                "valset_confirm/{}/{}",
                nonce, orchestrator
            ))
            .await?
            .and_then(|r| r.confirm))
    }

    async fn valset_confirms(&self, nonce: u64) -> Result<Vec<ValsetConfirm>> {
        Ok(self
            .lcd::<ConfirmsResponse<ValsetConfirm>>(&format!("valset_confirms/{}", nonce))
            .await?
            .map(|r| r.confirms)
            .unwrap_or_default())
    }

    async fn data_commitment_confirm(
        &self,
        begin_block: u64,
        end_block: u64,
        orchestrator: &str,
    ) -> Result<Option<DataCommitmentConfirm>> {
        Ok(self
            .lcd::<ConfirmResponse<DataCommitmentConfirm>>(&format!(
                "data_commitment_confirm/{}/{}/{}",
                begin_block, end_block, orchestrator
            ))
            .await?
            .and_then(|r| r.confirm))
    }

    async fn data_commitment_confirms(&self, nonce: u64) -> Result<Vec<DataCommitmentConfirm>> {
        Ok(self
            .lcd::<ConfirmsResponse<DataCommitmentConfirm>>(&format!(
                "data_commitment_confirms/{}",
                nonce
            ))
            .await?
            .map(|r| r.confirms)
            .unwrap_or_default())
    }

    async fn data_commitment_root(&self, begin_block: u64, end_block: u64) -> Result<B256> {
        let url = format!(
            "{}/data_commitment?start={}&end={}",
            self.rpc_url, begin_block, end_block
        );
        let r: DataCommitmentRpcResponse = self
            .get_json(&url)
            .await?
            .ok_or_else(|| eyre!("data commitment [{}, {}) not found", begin_block, end_block))?;
        decode_data_commitment(&r.result.data_commitment)
    }
}
