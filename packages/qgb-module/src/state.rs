//! State definitions for the QGB attestation module
//!
//! Attestations are keyed by nonce. Confirms are keyed by `(nonce, orchestrator)`
//! so a resubmitted confirm replaces the previous one.

use alloy::primitives::B256;
use cosmwasm_std::{Addr, StdError, StdResult};
use cw_storage_plus::{Item, Map};
use qgb_rs::{
    AttestationRequest, DataCommitment, DataCommitmentConfirm, EncoderConfig, EvmEncoder, Params,
    ValsetConfirm,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

pub const CONTRACT_NAME: &str = "crates.io:qgb-module";
pub const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Module configuration, fixed at instantiation except for the admin
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Governance account allowed to update params
    pub admin: Addr,
    /// 32-byte bridge ID, `0x` hex
    pub bridge_id: String,
    /// `0x` hex
    pub valset_domain_separator: String,
    /// `0x` hex
    pub data_root_domain_separator: String,
}

fn parse_bytes32(field: &str, value: &str) -> StdResult<[u8; 32]> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(stripped)
        .map_err(|e| StdError::generic_err(format!("invalid {}: {}", field, e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        StdError::generic_err(format!("invalid {}: expected 32 bytes, got {}", field, b.len()))
    })
}

impl Config {
    pub fn encoder_config(&self) -> StdResult<EncoderConfig> {
        Ok(EncoderConfig {
            bridge_id: B256::from(parse_bytes32("bridge_id", &self.bridge_id)?),
            valset_domain_separator: parse_bytes32(
                "valset_domain_separator",
                &self.valset_domain_separator,
            )?,
            data_root_domain_separator: parse_bytes32(
                "data_root_domain_separator",
                &self.data_root_domain_separator,
            )?,
        })
    }

    pub fn encoder(&self) -> StdResult<EvmEncoder> {
        Ok(EvmEncoder::new(self.encoder_config()?))
    }
}

pub const CONFIG: Item<Config> = Item::new("config");

pub const PARAMS: Item<Params> = Item::new("params");

// ============================================================================
// Attestation Store
// ============================================================================

/// Nonce of the newest attestation; absent until the first one is stored
pub const LATEST_ATTESTATION_NONCE: Item<u64> = Item::new("latest_attestation_nonce");

/// Lowest nonce not yet pruned
pub const EARLIEST_AVAILABLE_NONCE: Item<u64> = Item::new("earliest_available_nonce");

/// Nonce of the newest valset
pub const LATEST_VALSET_NONCE: Item<u64> = Item::new("latest_valset_nonce");

/// Copy of the newest data commitment, kept even after it is pruned so ranges
/// never restart
pub const LATEST_DATA_COMMITMENT: Item<DataCommitment> = Item::new("latest_data_commitment");

pub const ATTESTATIONS: Map<u64, AttestationRequest> = Map::new("attestations");

/// (begin_block, end_block) -> nonce
pub const DATA_COMMITMENT_RANGES: Map<(u64, u64), u64> = Map::new("data_commitment_ranges");

// ============================================================================
// Unbonding Tracking
// ============================================================================

/// Height at which a validator most recently began unbonding
pub const LAST_UNBONDING_HEIGHT: Item<u64> = Item::new("last_unbonding_height");

/// Nonce of the valset created at `LAST_UNBONDING_HEIGHT`
pub const LAST_UNBONDING_NONCE: Item<u64> = Item::new("last_unbonding_nonce");

// ============================================================================
// Confirms
// ============================================================================

/// (nonce, orchestrator) -> confirm
pub const VALSET_CONFIRMS: Map<(u64, &str), ValsetConfirm> = Map::new("valset_confirms");

/// (nonce, orchestrator) -> confirm
pub const DATA_COMMITMENT_CONFIRMS: Map<(u64, &str), DataCommitmentConfirm> =
    Map::new("data_commitment_confirms");

// ============================================================================
// EVM Address Registry
// ============================================================================

/// EVM identity of a validator
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EvmAddressRecord {
    /// Validator operator address
    pub validator: String,
    /// Account that sends confirms for this validator, once registered
    pub orchestrator: Option<String>,
    /// Checksummed `0x` address
    pub evm_address: String,
}

/// validator operator -> record
pub const EVM_ADDRESSES: Map<&str, EvmAddressRecord> = Map::new("evm_addresses");

/// lowercase evm address -> validator operator
pub const EVM_ADDRESS_OWNERS: Map<&str, String> = Map::new("evm_address_owners");

/// orchestrator account -> validator operator
pub const ORCHESTRATOR_VALIDATORS: Map<&str, String> = Map::new("orchestrator_validators");
