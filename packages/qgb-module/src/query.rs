//! Query handlers for the QGB attestation module.
//!
//! Lookups of a single item return `None` inside the response when the item is
//! missing or pruned; only malformed requests are errors.

use cosmwasm_std::{Deps, StdError, StdResult};

use crate::error::ModuleError;
use crate::keeper::{
    attestation_by_nonce, data_commitment_confirm, data_commitment_confirm_by_eth_address,
    data_commitment_confirms_by_nonce, data_commitment_for_height, earliest_attestation_nonce,
    evm_address_record, latest_attestation_nonce, latest_data_commitment, latest_valset,
    latest_valset_before_nonce, valset_confirm, valset_confirm_by_eth_address,
    valset_confirms_by_nonce,
};
use crate::msg::{
    AttestationResponse, ConfigResponse, DataCommitmentConfirmResponse,
    DataCommitmentConfirmsResponse, DataCommitmentResponse, EvmAddressResponse,
    LatestValsetResponse, NonceResponse, ParamsResponse, UnbondingHeightResponse,
    ValsetConfirmResponse, ValsetConfirmsResponse, ValsetResponse,
};
use crate::state::{CONFIG, LAST_UNBONDING_HEIGHT, PARAMS};

fn to_std(err: ModuleError) -> StdError {
    match err {
        ModuleError::Std(e) => e,
        ModuleError::AttestationNotFound { .. } | ModuleError::DataCommitmentNotFound { .. } => {
            StdError::not_found(err.to_string())
        }
        other => StdError::generic_err(other.to_string()),
    }
}

// ============================================================================
// Core Queries
// ============================================================================

pub fn query_config(deps: Deps) -> StdResult<ConfigResponse> {
    let config = CONFIG.load(deps.storage)?;
    Ok(ConfigResponse {
        admin: config.admin,
        bridge_id: config.bridge_id,
        valset_domain_separator: config.valset_domain_separator,
        data_root_domain_separator: config.data_root_domain_separator,
    })
}

pub fn query_params(deps: Deps) -> StdResult<ParamsResponse> {
    Ok(ParamsResponse {
        params: PARAMS.load(deps.storage)?,
    })
}

// ============================================================================
// Attestations
// ============================================================================

pub fn query_attestation_by_nonce(deps: Deps, nonce: u64) -> StdResult<AttestationResponse> {
    Ok(AttestationResponse {
        attestation: attestation_by_nonce(deps.storage, nonce).map_err(to_std)?,
    })
}

pub fn query_latest_attestation_nonce(deps: Deps) -> StdResult<NonceResponse> {
    Ok(NonceResponse {
        nonce: latest_attestation_nonce(deps.storage).map_err(to_std)?,
    })
}

pub fn query_earliest_attestation_nonce(deps: Deps) -> StdResult<NonceResponse> {
    Ok(NonceResponse {
        nonce: earliest_attestation_nonce(deps.storage).map_err(to_std)?,
    })
}

/// Errors for nonce 1, a pruned nonce, and a nonce above the latest.
pub fn query_latest_valset_before_nonce(deps: Deps, nonce: u64) -> StdResult<ValsetResponse> {
    Ok(ValsetResponse {
        valset: latest_valset_before_nonce(deps.storage, nonce).map_err(to_std)?,
    })
}

pub fn query_latest_valset(deps: Deps) -> StdResult<LatestValsetResponse> {
    Ok(LatestValsetResponse {
        valset: latest_valset(deps.storage).map_err(to_std)?,
    })
}

pub fn query_latest_data_commitment(deps: Deps) -> StdResult<DataCommitmentResponse> {
    Ok(DataCommitmentResponse {
        data_commitment: latest_data_commitment(deps.storage).map_err(to_std)?,
    })
}

pub fn query_data_commitment_for_height(
    deps: Deps,
    height: u64,
) -> StdResult<DataCommitmentResponse> {
    let data_commitment = match data_commitment_for_height(deps.storage, height) {
        Ok(dc) => Some(dc),
        Err(ModuleError::DataCommitmentNotFound { .. }) => None,
        Err(e) => return Err(to_std(e)),
    };
    Ok(DataCommitmentResponse { data_commitment })
}

/// 0 when no validator has begun unbonding
pub fn query_last_unbonding_height(deps: Deps) -> StdResult<UnbondingHeightResponse> {
    Ok(UnbondingHeightResponse {
        height: LAST_UNBONDING_HEIGHT.may_load(deps.storage)?.unwrap_or(0),
    })
}

// ============================================================================
// Confirms
// ============================================================================

pub fn query_valset_confirm(
    deps: Deps,
    nonce: u64,
    orchestrator: String,
) -> StdResult<ValsetConfirmResponse> {
    Ok(ValsetConfirmResponse {
        confirm: valset_confirm(deps.storage, nonce, &orchestrator).map_err(to_std)?,
    })
}

pub fn query_valset_confirms_by_nonce(deps: Deps, nonce: u64) -> StdResult<ValsetConfirmsResponse> {
    Ok(ValsetConfirmsResponse {
        confirms: valset_confirms_by_nonce(deps.storage, nonce).map_err(to_std)?,
    })
}

pub fn query_valset_confirm_by_eth_address(
    deps: Deps,
    nonce: u64,
    eth_address: String,
) -> StdResult<ValsetConfirmResponse> {
    Ok(ValsetConfirmResponse {
        confirm: valset_confirm_by_eth_address(deps.storage, nonce, &eth_address)
            .map_err(to_std)?,
    })
}

pub fn query_data_commitment_confirm(
    deps: Deps,
    begin_block: u64,
    end_block: u64,
    orchestrator: String,
) -> StdResult<DataCommitmentConfirmResponse> {
    Ok(DataCommitmentConfirmResponse {
        confirm: data_commitment_confirm(deps.storage, begin_block, end_block, &orchestrator)
            .map_err(to_std)?,
    })
}

pub fn query_data_commitment_confirms_by_nonce(
    deps: Deps,
    nonce: u64,
) -> StdResult<DataCommitmentConfirmsResponse> {
    Ok(DataCommitmentConfirmsResponse {
        confirms: data_commitment_confirms_by_nonce(deps.storage, nonce).map_err(to_std)?,
    })
}

pub fn query_data_commitment_confirm_by_eth_address(
    deps: Deps,
    begin_block: u64,
    end_block: u64,
    eth_address: String,
) -> StdResult<DataCommitmentConfirmResponse> {
    Ok(DataCommitmentConfirmResponse {
        confirm: data_commitment_confirm_by_eth_address(
            deps.storage,
            begin_block,
            end_block,
            &eth_address,
        )
        .map_err(to_std)?,
    })
}

// ============================================================================
// Registry
// ============================================================================

pub fn query_evm_address(deps: Deps, validator: String) -> StdResult<EvmAddressResponse> {
    Ok(EvmAddressResponse {
        record: evm_address_record(deps.storage, &validator).map_err(to_std)?,
    })
}
