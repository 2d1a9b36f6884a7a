//! Confirm store
//!
//! Confirms are upserted by `(nonce, orchestrator)` and are never pruned.

use cosmwasm_std::{Order, Storage};
use qgb_rs::{DataCommitmentConfirm, ValsetConfirm};

use super::data_commitment_nonce;
use crate::error::ModuleError;
use crate::state::{DATA_COMMITMENT_CONFIRMS, VALSET_CONFIRMS};

// ============================================================================
// Valset Confirms
// ============================================================================

pub fn set_valset_confirm(
    storage: &mut dyn Storage,
    confirm: &ValsetConfirm,
) -> Result<(), ModuleError> {
    VALSET_CONFIRMS.save(
        storage,
        (confirm.nonce, confirm.orchestrator.as_str()),
        confirm,
    )?;
    Ok(())
}

pub fn valset_confirm(
    storage: &dyn Storage,
    nonce: u64,
    orchestrator: &str,
) -> Result<Option<ValsetConfirm>, ModuleError> {
    Ok(VALSET_CONFIRMS.may_load(storage, (nonce, orchestrator))?)
}

pub fn valset_confirms_by_nonce(
    storage: &dyn Storage,
    nonce: u64,
) -> Result<Vec<ValsetConfirm>, ModuleError> {
    let confirms = VALSET_CONFIRMS
        .prefix(nonce)
        .range(storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, confirm)| confirm))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(confirms)
}

pub fn valset_confirm_by_eth_address(
    storage: &dyn Storage,
    nonce: u64,
    eth_address: &str,
) -> Result<Option<ValsetConfirm>, ModuleError> {
    Ok(valset_confirms_by_nonce(storage, nonce)?
        .into_iter()
        .find(|c| c.eth_address.eq_ignore_ascii_case(eth_address)))
}

// ============================================================================
// Data Commitment Confirms
// ============================================================================

pub fn set_data_commitment_confirm(
    storage: &mut dyn Storage,
    confirm: &DataCommitmentConfirm,
) -> Result<(), ModuleError> {
    DATA_COMMITMENT_CONFIRMS.save(
        storage,
        (confirm.nonce, confirm.validator_address.as_str()),
        confirm,
    )?;
    Ok(())
}

pub fn data_commitment_confirms_by_nonce(
    storage: &dyn Storage,
    nonce: u64,
) -> Result<Vec<DataCommitmentConfirm>, ModuleError> {
    let confirms = DATA_COMMITMENT_CONFIRMS
        .prefix(nonce)
        .range(storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, confirm)| confirm))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(confirms)
}

/// Confirm for the range `[begin_block, end_block)` sent by `orchestrator`.
///
/// The range is resolved to its nonce through the range index, so confirms
/// of a pruned data commitment are no longer reachable this way.
pub fn data_commitment_confirm(
    storage: &dyn Storage,
    begin_block: u64,
    end_block: u64,
    orchestrator: &str,
) -> Result<Option<DataCommitmentConfirm>, ModuleError> {
    let Some(nonce) = data_commitment_nonce(storage, begin_block, end_block)? else {
        return Ok(None);
    };
    Ok(DATA_COMMITMENT_CONFIRMS.may_load(storage, (nonce, orchestrator))?)
}

pub fn data_commitment_confirm_by_eth_address(
    storage: &dyn Storage,
    begin_block: u64,
    end_block: u64,
    eth_address: &str,
) -> Result<Option<DataCommitmentConfirm>, ModuleError> {
    let Some(nonce) = data_commitment_nonce(storage, begin_block, end_block)? else {
        return Ok(None);
    };
    Ok(data_commitment_confirms_by_nonce(storage, nonce)?
        .into_iter()
        .find(|c| c.eth_address.eq_ignore_ascii_case(eth_address)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::testing::MockStorage;

    fn confirm(nonce: u64, orchestrator: &str, signature: &str) -> ValsetConfirm {
        ValsetConfirm {
            nonce,
            orchestrator: orchestrator.to_string(),
            eth_address: "0x00000000000000000000000000000000000000Aa".to_string(),
            signature: signature.to_string(),
        }
    }

    #[test]
    fn test_upsert_replaces_previous_confirm() {
        let mut storage = MockStorage::new();
        set_valset_confirm(&mut storage, &confirm(3, "orch1", "aa")).unwrap();
        set_valset_confirm(&mut storage, &confirm(3, "orch1", "bb")).unwrap();
        set_valset_confirm(&mut storage, &confirm(4, "orch1", "cc")).unwrap();

        let confirms = valset_confirms_by_nonce(&storage, 3).unwrap();
        assert_eq!(confirms.len(), 1);
        assert_eq!(confirms[0].signature, "bb");
        assert_eq!(
            valset_confirm(&storage, 4, "orch1").unwrap().unwrap().signature,
            "cc"
        );
    }

    #[test]
    fn test_lookup_by_eth_address_ignores_case() {
        let mut storage = MockStorage::new();
        set_valset_confirm(&mut storage, &confirm(3, "orch1", "aa")).unwrap();

        let found = valset_confirm_by_eth_address(
            &storage,
            3,
            "0x00000000000000000000000000000000000000aA",
        )
        .unwrap();
        assert!(found.is_some());
        assert!(valset_confirm_by_eth_address(&storage, 4, "0x00")
            .unwrap()
            .is_none());
    }
}
