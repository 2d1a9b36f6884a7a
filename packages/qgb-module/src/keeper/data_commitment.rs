//! Data commitment ranges
//!
//! Ranges are half-open, `[begin_block, end_block)`, and contiguous: the first
//! covers `[1, window + 1)` and each next one begins where the previous ended.

use cosmwasm_std::{Order, Storage};
use qgb_rs::{AttestationRequest, DataCommitment};

use super::attestation_by_nonce;
use crate::error::ModuleError;
use crate::state::{DATA_COMMITMENT_RANGES, LATEST_DATA_COMMITMENT};

/// Newest data commitment ever created, including a pruned one
pub fn latest_data_commitment(storage: &dyn Storage) -> Result<Option<DataCommitment>, ModuleError> {
    Ok(LATEST_DATA_COMMITMENT.may_load(storage)?)
}

/// True if an unpruned data commitment covers exactly `[begin_block, end_block)`
pub fn has_data_commitment(
    storage: &dyn Storage,
    begin_block: u64,
    end_block: u64,
) -> bool {
    DATA_COMMITMENT_RANGES.has(storage, (begin_block, end_block))
}

/// Nonce of the data commitment over `[begin_block, end_block)`
pub fn data_commitment_nonce(
    storage: &dyn Storage,
    begin_block: u64,
    end_block: u64,
) -> Result<Option<u64>, ModuleError> {
    Ok(DATA_COMMITMENT_RANGES.may_load(storage, (begin_block, end_block))?)
}

/// The stored data commitment whose range contains `height`
pub fn data_commitment_for_height(
    storage: &dyn Storage,
    height: u64,
) -> Result<DataCommitment, ModuleError> {
    for item in DATA_COMMITMENT_RANGES.range(storage, None, None, Order::Descending) {
        let ((begin_block, end_block), nonce) = item?;
        if end_block <= height {
            break;
        }
        if begin_block <= height {
            return match attestation_by_nonce(storage, nonce)? {
                Some(AttestationRequest::DataCommitment(dc)) => Ok(dc),
                _ => Err(ModuleError::CorruptedStore {
                    reason: format!(
                        "range [{}, {}) points at nonce {} which is not a data commitment",
                        begin_block, end_block, nonce
                    ),
                }),
            };
        }
    }
    Err(ModuleError::DataCommitmentNotFound { height })
}

/// The next range to commit at `height`, if a full window has elapsed since the
/// previous one.
pub fn next_data_commitment_range(
    previous: Option<&DataCommitment>,
    height: u64,
    window: u64,
) -> Option<(u64, u64)> {
    match previous {
        None if height >= window => Some((1, window + 1)),
        None => None,
        Some(last) if height.saturating_sub(last.end_block) >= window => {
            Some((last.end_block, last.end_block + window))
        }
        Some(_) => None,
    }
}
