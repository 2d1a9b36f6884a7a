//! Registry handler: RegisterEvmAddress

use cosmwasm_std::{DepsMut, Env, MessageInfo, Response};
use qgb_rs::parse_evm_address;

use crate::error::ModuleError;
use crate::keeper::register_evm_address;
use crate::staking::{address_bytes, is_operator_account};

/// Bind `evm_address` and `orchestrator` to `validator`.
///
/// Must be sent by the account of the validator operator key.
pub fn execute_register_evm_address(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    validator: String,
    orchestrator: String,
    evm_address: String,
) -> Result<Response, ModuleError> {
    if !is_operator_account(info.sender.as_str(), &validator)? {
        return Err(ModuleError::NotValidatorOperator {
            sender: info.sender.to_string(),
            validator,
        });
    }
    // orchestrator must be a well-formed account address
    address_bytes(&orchestrator)?;
    let evm_address = parse_evm_address(&evm_address).map_err(|e| {
        ModuleError::InvalidEvmAddress {
            reason: e.to_string(),
        }
    })?;

    let record = register_evm_address(deps.storage, &validator, &orchestrator, evm_address)?;

    Ok(Response::new()
        .add_attribute("method", "register_evm_address")
        .add_attribute("validator", record.validator)
        .add_attribute("orchestrator", orchestrator)
        .add_attribute("evm_address", record.evm_address))
}
