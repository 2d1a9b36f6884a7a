//! End blocker and staking hooks
//!
//! `end_block` runs once per block after the staking updates, in this order:
//! the valset trigger, the data commitment trigger, then pruning of at most one
//! expired attestation. Errors for which
//! [`ModuleError::is_invariant_violation`] holds must halt the chain.

use cosmwasm_std::{DepsMut, Env, Event, Response, Storage};
use qgb_rs::power::is_significant_power_diff;
use qgb_rs::{AttestationRequest, DataCommitment, Params};

use crate::error::ModuleError;
use crate::keeper::{
    attestation_by_nonce, block_time, current_valset, delete_attestation,
    earliest_attestation_nonce, is_initialized, latest_attestation_nonce,
    latest_data_commitment, latest_valset, next_data_commitment_range, set_default_evm_address,
    store_attestation,
};
use crate::msg::StakingValidator;
use crate::state::{
    EARLIEST_AVAILABLE_NONCE, LAST_UNBONDING_HEIGHT, LAST_UNBONDING_NONCE, LATEST_VALSET_NONCE,
    PARAMS,
};

// ============================================================================
// End Block
// ============================================================================

pub fn end_block(
    deps: DepsMut,
    env: Env,
    validators: Vec<StakingValidator>,
) -> Result<Response, ModuleError> {
    let params = PARAMS.load(deps.storage)?;
    let mut events = Vec::new();

    if let Some(event) = handle_valset_request(deps.storage, &env, &validators, &params)? {
        events.push(event);
    }
    events.extend(handle_data_commitment_request(deps.storage, &env, &params)?);

    let mut response = Response::new()
        .add_attribute("method", "end_block")
        .add_attribute("height", env.block.height.to_string());
    if let Some(pruned) = prune_attestations(deps.storage, env.block.height, &params)? {
        response = response.add_attribute("pruned_nonce", pruned.to_string());
    }

    Ok(response.add_events(events))
}

/// Store a new valset when none exists yet, when a validator began unbonding
/// at this height, or when power drifted past the configured threshold.
///
/// Without bonded validators the trigger is skipped.
pub fn handle_valset_request(
    storage: &mut dyn Storage,
    env: &Env,
    validators: &[StakingValidator],
    params: &Params,
) -> Result<Option<Event>, ModuleError> {
    let latest = if is_initialized(storage)? {
        latest_valset(storage)?
    } else {
        None
    };

    let current = match current_valset(storage, env, validators) {
        Ok(valset) => valset,
        Err(ModuleError::NoValidators) => return Ok(None),
        Err(e) => return Err(e),
    };

    let height = env.block.height;
    let at_unbonding_height = LAST_UNBONDING_HEIGHT.may_load(storage)? == Some(height);
    let significant = latest.as_ref().map_or(false, |latest| {
        is_significant_power_diff(
            &current.members,
            &latest.members,
            params.significant_power_diff_bps,
        )
    });

    if latest.is_some() && !at_unbonding_height && !significant {
        return Ok(None);
    }

    let nonce = current.nonce;
    let event = store_attestation(storage, &AttestationRequest::Valset(current))?;
    if at_unbonding_height {
        LAST_UNBONDING_NONCE.save(storage, &nonce)?;
    }
    Ok(Some(event))
}

/// Create every data commitment whose window has fully elapsed.
///
/// Ranges are only created once the first valset exists.
pub fn handle_data_commitment_request(
    storage: &mut dyn Storage,
    env: &Env,
    params: &Params,
) -> Result<Vec<Event>, ModuleError> {
    let mut events = Vec::new();
    if !is_initialized(storage)? {
        return Ok(events);
    }

    let time = block_time(env)?;
    loop {
        let previous = latest_data_commitment(storage)?;
        let Some((begin_block, end_block)) = next_data_commitment_range(
            previous.as_ref(),
            env.block.height,
            params.data_commitment_window,
        ) else {
            break;
        };
        let nonce = latest_attestation_nonce(storage)? + 1;
        let dc = DataCommitment::new(nonce, begin_block, end_block, time);
        events.push(store_attestation(
            storage,
            &AttestationRequest::DataCommitment(dc),
        )?);
    }
    Ok(events)
}

/// Delete the earliest attestation once it is older than the pruning
/// threshold. Returns the pruned nonce.
///
/// The latest attestation, the latest valset and the valset created at the
/// last unbonding height are always kept, along with everything after them.
pub fn prune_attestations(
    storage: &mut dyn Storage,
    height: u64,
    params: &Params,
) -> Result<Option<u64>, ModuleError> {
    if !is_initialized(storage)? {
        return Ok(None);
    }
    let earliest = earliest_attestation_nonce(storage)?;
    let latest = latest_attestation_nonce(storage)?;
    if earliest >= latest {
        return Ok(None);
    }

    let floor = match LAST_UNBONDING_NONCE.may_load(storage)? {
        Some(nonce) => nonce,
        None => LATEST_VALSET_NONCE.may_load(storage)?.unwrap_or(latest),
    };
    if earliest >= floor {
        return Ok(None);
    }

    let oldest = attestation_by_nonce(storage, earliest)?.ok_or_else(|| {
        ModuleError::CorruptedStore {
            reason: format!("earliest available nonce {} is missing", earliest),
        }
    })?;
    let oldest_height = oldest.height();
    if LAST_UNBONDING_HEIGHT.may_load(storage)? == Some(oldest_height) {
        return Ok(None);
    }
    if height.saturating_sub(oldest_height) <= params.pruning_threshold {
        return Ok(None);
    }

    delete_attestation(storage, earliest)?;
    EARLIEST_AVAILABLE_NONCE.save(storage, &(earliest + 1))?;
    Ok(Some(earliest))
}

// ============================================================================
// Staking Hooks
// ============================================================================

pub fn after_validator_created(deps: DepsMut, operator: String) -> Result<Response, ModuleError> {
    let mut response = Response::new()
        .add_attribute("method", "after_validator_created")
        .add_attribute("validator", operator.clone());
    if let Some(evm_address) = set_default_evm_address(deps.storage, &operator)? {
        response = response.add_attribute("evm_address", evm_address.to_checksum(None));
    }
    Ok(response)
}

/// Record the unbonding height so the next end blocker snapshots a valset.
pub fn after_validator_begin_unbonding(
    deps: DepsMut,
    env: Env,
    operator: String,
) -> Result<Response, ModuleError> {
    LAST_UNBONDING_HEIGHT.save(deps.storage, &env.block.height)?;
    Ok(Response::new()
        .add_attribute("method", "after_validator_begin_unbonding")
        .add_attribute("validator", operator)
        .add_attribute("height", env.block.height.to_string()))
}
