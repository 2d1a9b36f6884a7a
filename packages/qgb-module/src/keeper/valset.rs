//! Validator set snapshots

use std::collections::HashSet;

use alloy::primitives::Address;
use cosmwasm_std::{Env, Order, Storage};
use qgb_rs::power::normalize_members;
use cw_storage_plus::Bound;
use qgb_rs::{AttestationRequest, Valset};

use super::{
    attestation_by_nonce, block_time, earliest_attestation_nonce, evm_address_of,
    latest_attestation_nonce,
};
use crate::error::ModuleError;
use crate::msg::StakingValidator;
use crate::staking::default_evm_address;
use crate::state::{ATTESTATIONS, LATEST_VALSET_NONCE};

/// Build the valset implied by the bonded validators at the current block,
/// with nonce `latest + 1`.
///
/// Validators without a registered EVM address get their default one. A
/// validator whose address is already used by an earlier entry is left out.
/// Fails with [`ModuleError::NoValidators`] when nothing with power remains.
pub fn current_valset(
    storage: &dyn Storage,
    env: &Env,
    validators: &[StakingValidator],
) -> Result<Valset, ModuleError> {
    let mut seen: HashSet<Address> = HashSet::with_capacity(validators.len());
    let mut raw: Vec<(Address, u64)> = Vec::with_capacity(validators.len());

    for validator in validators.iter().filter(|v| v.power > 0) {
        let evm_address = match evm_address_of(storage, &validator.operator)? {
            Some(addr) => addr,
            None => default_evm_address(&validator.operator)?,
        };
        if seen.insert(evm_address) {
            raw.push((evm_address, validator.power));
        }
    }

    let members = normalize_members(&raw);
    if members.is_empty() {
        return Err(ModuleError::NoValidators);
    }

    let nonce = latest_attestation_nonce(storage)? + 1;
    Valset::new(nonce, env.block.height, block_time(env)?, members).map_err(|e| {
        ModuleError::InvalidValset {
            reason: e.to_string(),
        }
    })
}

/// Most recently stored valset, if any
pub fn latest_valset(storage: &dyn Storage) -> Result<Option<Valset>, ModuleError> {
    let Some(nonce) = LATEST_VALSET_NONCE.may_load(storage)? else {
        return Ok(None);
    };
    match attestation_by_nonce(storage, nonce)? {
        Some(AttestationRequest::Valset(valset)) => Ok(Some(valset)),
        Some(AttestationRequest::DataCommitment(_)) => Err(ModuleError::CorruptedStore {
            reason: format!("latest valset nonce {} holds a data commitment", nonce),
        }),
        // the latest valset is never pruned
        None => Err(ModuleError::CorruptedStore {
            reason: format!("latest valset nonce {} is missing", nonce),
        }),
    }
}

/// The valset in effect when `nonce` was created: the newest valset with a
/// nonce strictly below it.
pub fn latest_valset_before_nonce(storage: &dyn Storage, nonce: u64) -> Result<Valset, ModuleError> {
    if nonce <= 1 {
        return Err(ModuleError::NoValsetBeforeNonce {
            nonce,
            reason: "the first attestation has no predecessor".to_string(),
        });
    }
    let latest = latest_attestation_nonce(storage)?;
    if nonce > latest {
        return Err(ModuleError::AttestationNotFound { nonce });
    }
    let earliest = earliest_attestation_nonce(storage)?;
    if nonce < earliest {
        return Err(ModuleError::NoncePruned { nonce, earliest });
    }

    for item in ATTESTATIONS.range(
        storage,
        None,
        Some(Bound::exclusive(nonce)),
        Order::Descending,
    ) {
        let (_, request) = item?;
        if let AttestationRequest::Valset(valset) = request {
            return Ok(valset);
        }
    }

    Err(ModuleError::NoValsetBeforeNonce {
        nonce,
        reason: "every earlier valset was pruned".to_string(),
    })
}
