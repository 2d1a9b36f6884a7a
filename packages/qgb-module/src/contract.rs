//! QGB Attestation Module - Entry Points
//!
//! - `instantiate` - bridge ID, domain separators, params, admin
//! - `execute` - confirms, EVM address registration, admin updates
//! - `sudo` - end blocker and staking hooks, called by the host chain
//! - `query` - attestation, confirm and registry lookups

use cosmwasm_std::{
    entry_point, to_json_binary, Binary, Deps, DepsMut, Env, MessageInfo, Response, StdResult,
};
use cw2::set_contract_version;
use qgb_rs::{
    DataCommitmentConfirm, ValsetConfirm, DATA_ROOT_DOMAIN_SEPARATOR,
    VALIDATOR_SET_DOMAIN_SEPARATOR,
};

use crate::abci::{after_validator_begin_unbonding, after_validator_created, end_block};
use crate::error::ModuleError;
use crate::execute::{
    execute_data_commitment_confirm, execute_register_evm_address, execute_update_admin,
    execute_update_params, execute_valset_confirm,
};
use crate::msg::{ExecuteMsg, InstantiateMsg, QueryMsg, SudoMsg};
use crate::query::{
    query_attestation_by_nonce, query_config, query_data_commitment_confirm,
    query_data_commitment_confirm_by_eth_address, query_data_commitment_confirms_by_nonce,
    query_data_commitment_for_height, query_earliest_attestation_nonce, query_evm_address,
    query_last_unbonding_height, query_latest_attestation_nonce, query_latest_data_commitment,
    query_latest_valset, query_latest_valset_before_nonce, query_params, query_valset_confirm,
    query_valset_confirm_by_eth_address, query_valset_confirms_by_nonce,
};
use crate::state::{Config, CONFIG, CONTRACT_NAME, CONTRACT_VERSION, PARAMS};

// ============================================================================
// Instantiate
// ============================================================================

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn instantiate(
    deps: DepsMut,
    _env: Env,
    _info: MessageInfo,
    msg: InstantiateMsg,
) -> Result<Response, ModuleError> {
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;

    let admin = deps.api.addr_validate(&msg.admin)?;

    let config = Config {
        admin,
        bridge_id: normalize_hex(&msg.bridge_id),
        valset_domain_separator: msg
            .valset_domain_separator
            .as_deref()
            .map(normalize_hex)
            .unwrap_or_else(|| format!("0x{}", hex::encode(VALIDATOR_SET_DOMAIN_SEPARATOR))),
        data_root_domain_separator: msg
            .data_root_domain_separator
            .as_deref()
            .map(normalize_hex)
            .unwrap_or_else(|| format!("0x{}", hex::encode(DATA_ROOT_DOMAIN_SEPARATOR))),
    };
    // rejects anything that is not 32 bytes of hex
    config.encoder_config()?;
    CONFIG.save(deps.storage, &config)?;

    let params = msg.params.unwrap_or_default();
    params
        .validate()
        .map_err(|reason| ModuleError::InvalidParams { reason })?;
    PARAMS.save(deps.storage, &params)?;

    Ok(Response::new()
        .add_attribute("method", "instantiate")
        .add_attribute("admin", config.admin)
        .add_attribute("bridge_id", config.bridge_id)
        .add_attribute(
            "data_commitment_window",
            params.data_commitment_window.to_string(),
        ))
}

fn normalize_hex(value: &str) -> String {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    format!("0x{}", stripped.to_lowercase())
}

// ============================================================================
// Execute
// ============================================================================

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn execute(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response, ModuleError> {
    match msg {
        // Confirms
        ExecuteMsg::ValsetConfirm {
            nonce,
            orchestrator,
            eth_address,
            signature,
        } => execute_valset_confirm(
            deps,
            env,
            info,
            ValsetConfirm {
                nonce,
                orchestrator,
                eth_address,
                signature,
            },
        ),
        ExecuteMsg::DataCommitmentConfirm {
            nonce,
            begin_block,
            end_block,
            validator_address,
            eth_address,
            commitment,
            signature,
        } => execute_data_commitment_confirm(
            deps,
            env,
            info,
            DataCommitmentConfirm {
                nonce,
                begin_block,
                end_block,
                validator_address,
                eth_address,
                commitment,
                signature,
            },
        ),

        // Registry
        ExecuteMsg::RegisterEvmAddress {
            validator,
            orchestrator,
            evm_address,
        } => execute_register_evm_address(deps, env, info, validator, orchestrator, evm_address),

        // Admin
        ExecuteMsg::UpdateParams { params } => execute_update_params(deps, env, info, params),
        ExecuteMsg::UpdateAdmin { admin } => execute_update_admin(deps, env, info, admin),
    }
}

// ============================================================================
// Sudo
// ============================================================================

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn sudo(deps: DepsMut, env: Env, msg: SudoMsg) -> Result<Response, ModuleError> {
    match msg {
        SudoMsg::EndBlock { validators } => end_block(deps, env, validators),
        SudoMsg::AfterValidatorCreated { operator } => after_validator_created(deps, operator),
        SudoMsg::AfterValidatorBeginUnbonding { operator } => {
            after_validator_begin_unbonding(deps, env, operator)
        }
    }
}

// ============================================================================
// Query
// ============================================================================

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn query(deps: Deps, _env: Env, msg: QueryMsg) -> StdResult<Binary> {
    match msg {
        QueryMsg::Config {} => to_json_binary(&query_config(deps)?),
        QueryMsg::Params {} => to_json_binary(&query_params(deps)?),

        QueryMsg::AttestationRequestByNonce { nonce } => {
            to_json_binary(&query_attestation_by_nonce(deps, nonce)?)
        }
        QueryMsg::LatestAttestationNonce {} => {
            to_json_binary(&query_latest_attestation_nonce(deps)?)
        }
        QueryMsg::EarliestAttestationNonce {} => {
            to_json_binary(&query_earliest_attestation_nonce(deps)?)
        }
        QueryMsg::LatestValsetBeforeNonce { nonce } => {
            to_json_binary(&query_latest_valset_before_nonce(deps, nonce)?)
        }
        QueryMsg::LatestValset {} => to_json_binary(&query_latest_valset(deps)?),
        QueryMsg::LatestDataCommitment {} => to_json_binary(&query_latest_data_commitment(deps)?),
        QueryMsg::DataCommitmentForHeight { height } => {
            to_json_binary(&query_data_commitment_for_height(deps, height)?)
        }
        QueryMsg::LastUnbondingHeight {} => to_json_binary(&query_last_unbonding_height(deps)?),

        QueryMsg::ValsetConfirm {
            nonce,
            orchestrator,
        } => to_json_binary(&query_valset_confirm(deps, nonce, orchestrator)?),
        QueryMsg::ValsetConfirmsByNonce { nonce } => {
            to_json_binary(&query_valset_confirms_by_nonce(deps, nonce)?)
        }
        QueryMsg::ValsetConfirmByEthAddress { nonce, eth_address } => {
            to_json_binary(&query_valset_confirm_by_eth_address(deps, nonce, eth_address)?)
        }
        QueryMsg::DataCommitmentConfirm {
            begin_block,
            end_block,
            orchestrator,
        } => to_json_binary(&query_data_commitment_confirm(
            deps,
            begin_block,
            end_block,
            orchestrator,
        )?),
        QueryMsg::DataCommitmentConfirmsByNonce { nonce } => {
            to_json_binary(&query_data_commitment_confirms_by_nonce(deps, nonce)?)
        }
        QueryMsg::DataCommitmentConfirmByEthAddress {
            begin_block,
            end_block,
            eth_address,
        } => to_json_binary(&query_data_commitment_confirm_by_eth_address(
            deps,
            begin_block,
            end_block,
            eth_address,
        )?),

        QueryMsg::EvmAddress { validator } => to_json_binary(&query_evm_address(deps, validator)?),
    }
}
