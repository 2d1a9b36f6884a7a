//! Validator EVM address registry
//!
//! Every validator gets a default EVM address when it is created. The operator
//! can later register its own address together with the orchestrator account
//! that sends confirms. EVM addresses and orchestrators are unique across
//! validators.

use alloy::primitives::Address;
use cosmwasm_std::Storage;
use qgb_rs::parse_evm_address;

use crate::error::ModuleError;
use crate::staking::default_evm_address;
use crate::state::{EvmAddressRecord, EVM_ADDRESSES, EVM_ADDRESS_OWNERS, ORCHESTRATOR_VALIDATORS};

fn owner_key(evm_address: &Address) -> String {
    format!("{:#x}", evm_address)
}

fn parse_stored(record: &EvmAddressRecord) -> Result<Address, ModuleError> {
    parse_evm_address(&record.evm_address).map_err(|e| ModuleError::CorruptedStore {
        reason: format!(
            "stored EVM address of {} is invalid: {}",
            record.validator, e
        ),
    })
}

pub fn evm_address_record(
    storage: &dyn Storage,
    validator: &str,
) -> Result<Option<EvmAddressRecord>, ModuleError> {
    Ok(EVM_ADDRESSES.may_load(storage, validator)?)
}

/// EVM address currently assigned to `validator`
pub fn evm_address_of(storage: &dyn Storage, validator: &str) -> Result<Option<Address>, ModuleError> {
    evm_address_record(storage, validator)?
        .map(|record| parse_stored(&record))
        .transpose()
}

/// Validator that owns `evm_address`, if any
pub fn evm_address_owner(
    storage: &dyn Storage,
    evm_address: &Address,
) -> Result<Option<String>, ModuleError> {
    Ok(EVM_ADDRESS_OWNERS.may_load(storage, &owner_key(evm_address))?)
}

/// Assign the default EVM address to a new validator.
///
/// Does nothing when the validator already has an address. Returns the address
/// that was assigned.
pub fn set_default_evm_address(
    storage: &mut dyn Storage,
    validator: &str,
) -> Result<Option<Address>, ModuleError> {
    if EVM_ADDRESSES.has(storage, validator) {
        return Ok(None);
    }
    let evm_address = default_evm_address(validator)?;
    if let Some(owner) = evm_address_owner(storage, &evm_address)? {
        return Err(ModuleError::EvmAddressTaken {
            evm_address: evm_address.to_string(),
            validator: owner,
        });
    }

    let record = EvmAddressRecord {
        validator: validator.to_string(),
        orchestrator: None,
        evm_address: evm_address.to_checksum(None),
    };
    EVM_ADDRESSES.save(storage, validator, &record)?;
    EVM_ADDRESS_OWNERS.save(storage, &owner_key(&evm_address), &validator.to_string())?;
    Ok(Some(evm_address))
}

/// Replace the EVM address and orchestrator of a known validator.
pub fn register_evm_address(
    storage: &mut dyn Storage,
    validator: &str,
    orchestrator: &str,
    evm_address: Address,
) -> Result<EvmAddressRecord, ModuleError> {
    let previous = EVM_ADDRESSES
        .may_load(storage, validator)?
        .ok_or_else(|| ModuleError::UnknownValidator {
            validator: validator.to_string(),
        })?;

    if let Some(owner) = evm_address_owner(storage, &evm_address)? {
        if owner != validator {
            return Err(ModuleError::EvmAddressTaken {
                evm_address: evm_address.to_string(),
                validator: owner,
            });
        }
    }
    if let Some(owner) = ORCHESTRATOR_VALIDATORS.may_load(storage, orchestrator)? {
        if owner != validator {
            return Err(ModuleError::OrchestratorTaken {
                orchestrator: orchestrator.to_string(),
                validator: owner,
            });
        }
    }

    EVM_ADDRESS_OWNERS.remove(storage, &owner_key(&parse_stored(&previous)?));
    if let Some(old) = &previous.orchestrator {
        ORCHESTRATOR_VALIDATORS.remove(storage, old);
    }

    let record = EvmAddressRecord {
        validator: validator.to_string(),
        orchestrator: Some(orchestrator.to_string()),
        evm_address: evm_address.to_checksum(None),
    };
    EVM_ADDRESSES.save(storage, validator, &record)?;
    EVM_ADDRESS_OWNERS.save(storage, &owner_key(&evm_address), &validator.to_string())?;
    ORCHESTRATOR_VALIDATORS.save(storage, orchestrator, &validator.to_string())?;
    Ok(record)
}

/// Registered EVM address of the validator `orchestrator` signs for
pub fn orchestrator_evm_address(
    storage: &dyn Storage,
    orchestrator: &str,
) -> Result<Address, ModuleError> {
    let not_registered = || ModuleError::OrchestratorNotRegistered {
        orchestrator: orchestrator.to_string(),
    };
    let validator = ORCHESTRATOR_VALIDATORS
        .may_load(storage, orchestrator)?
        .ok_or_else(not_registered)?;
    let record = EVM_ADDRESSES
        .may_load(storage, &validator)?
        .ok_or_else(not_registered)?;
    parse_stored(&record)
}
