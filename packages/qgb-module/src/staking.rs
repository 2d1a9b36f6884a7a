//! Bech32 helpers for validator operator and account addresses
//!
//! An operator address (`celestiavaloper1...`) and the account address of the
//! same key (`celestia1...`) share the same payload bytes, only the prefix
//! differs.

use alloy::primitives::Address;
use bech32::FromBase32;

use crate::error::ModuleError;

/// Decode the payload bytes of a bech32 address.
pub fn address_bytes(address: &str) -> Result<Vec<u8>, ModuleError> {
    let (_, data, _) = bech32::decode(address).map_err(|e| ModuleError::InvalidAddress {
        reason: format!("{}: {}", address, e),
    })?;
    let bytes = Vec::<u8>::from_base32(&data).map_err(|e| ModuleError::InvalidAddress {
        reason: format!("{}: {}", address, e),
    })?;
    if bytes.is_empty() {
        return Err(ModuleError::InvalidAddress {
            reason: format!("{}: empty payload", address),
        });
    }
    Ok(bytes)
}

/// EVM address assigned to a validator that never registered one: its last 20
/// operator bytes, left-padded with zeros when shorter.
pub fn default_evm_address(operator: &str) -> Result<Address, ModuleError> {
    let bytes = address_bytes(operator)?;
    let mut out = [0u8; 20];
    if bytes.len() >= 20 {
        out.copy_from_slice(&bytes[bytes.len() - 20..]);
    } else {
        out[20 - bytes.len()..].copy_from_slice(&bytes);
    }
    Ok(Address::from(out))
}

/// True when `account` is the account address of the `operator` key.
pub fn is_operator_account(account: &str, operator: &str) -> Result<bool, ModuleError> {
    Ok(address_bytes(account)? == address_bytes(operator)?)
}
