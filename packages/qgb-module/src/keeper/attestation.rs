//! Nonce-ordered attestation store

use cosmwasm_std::{Event, Storage};
use qgb_rs::AttestationRequest;

use crate::error::ModuleError;
use crate::state::{
    ATTESTATIONS, DATA_COMMITMENT_RANGES, EARLIEST_AVAILABLE_NONCE, LATEST_ATTESTATION_NONCE,
    LATEST_DATA_COMMITMENT, LATEST_VALSET_NONCE,
};

pub const ATTESTATION_REQUEST_EVENT: &str = "attestation_request";

/// Latest attestation nonce, or 0 before the first attestation
pub fn latest_attestation_nonce(storage: &dyn Storage) -> Result<u64, ModuleError> {
    Ok(LATEST_ATTESTATION_NONCE.may_load(storage)?.unwrap_or(0))
}

/// Earliest attestation nonce still stored, or 0 before the first attestation
pub fn earliest_attestation_nonce(storage: &dyn Storage) -> Result<u64, ModuleError> {
    Ok(EARLIEST_AVAILABLE_NONCE.may_load(storage)?.unwrap_or(0))
}

/// True once the first attestation has been stored
pub fn is_initialized(storage: &dyn Storage) -> Result<bool, ModuleError> {
    Ok(LATEST_ATTESTATION_NONCE.may_load(storage)?.is_some())
}

pub fn attestation_by_nonce(
    storage: &dyn Storage,
    nonce: u64,
) -> Result<Option<AttestationRequest>, ModuleError> {
    Ok(ATTESTATIONS.may_load(storage, nonce)?)
}

/// Store `request` as the next attestation.
///
/// The nonce must be exactly one above the latest nonce and must not be
/// stored already. Either failure is an invariant violation. Returns the
/// `attestation_request` event to attach to the response.
pub fn store_attestation(
    storage: &mut dyn Storage,
    request: &AttestationRequest,
) -> Result<Event, ModuleError> {
    let nonce = request.nonce();
    let expected = latest_attestation_nonce(storage)? + 1;
    if nonce != expected {
        return Err(ModuleError::NonceGap {
            expected,
            got: nonce,
        });
    }
    if ATTESTATIONS.has(storage, nonce) {
        return Err(ModuleError::Overwrite { nonce });
    }

    ATTESTATIONS.save(storage, nonce, request)?;
    LATEST_ATTESTATION_NONCE.save(storage, &nonce)?;
    if EARLIEST_AVAILABLE_NONCE.may_load(storage)?.is_none() {
        EARLIEST_AVAILABLE_NONCE.save(storage, &nonce)?;
    }

    match request {
        AttestationRequest::Valset(_) => {
            LATEST_VALSET_NONCE.save(storage, &nonce)?;
        }
        AttestationRequest::DataCommitment(dc) => {
            DATA_COMMITMENT_RANGES.save(storage, (dc.begin_block, dc.end_block), &nonce)?;
            LATEST_DATA_COMMITMENT.save(storage, dc)?;
        }
    }

    Ok(Event::new(ATTESTATION_REQUEST_EVENT)
        .add_attribute("nonce", nonce.to_string())
        .add_attribute("type", request.kind().to_string()))
}

/// Delete the attestation at `nonce`. Confirms for it are kept.
pub fn delete_attestation(storage: &mut dyn Storage, nonce: u64) -> Result<(), ModuleError> {
    let request = ATTESTATIONS
        .may_load(storage, nonce)?
        .ok_or(ModuleError::AttestationNotFound { nonce })?;
    if let AttestationRequest::DataCommitment(dc) = &request {
        DATA_COMMITMENT_RANGES.remove(storage, (dc.begin_block, dc.end_block));
    }
    ATTESTATIONS.remove(storage, nonce);
    Ok(())
}
