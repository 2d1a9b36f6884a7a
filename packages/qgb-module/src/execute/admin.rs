//! Admin handlers: UpdateParams, UpdateAdmin

use cosmwasm_std::{DepsMut, Env, MessageInfo, Response};
use qgb_rs::Params;

use crate::error::ModuleError;
use crate::state::{CONFIG, PARAMS};

/// Replace the module params. Admin only.
pub fn execute_update_params(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    params: Params,
) -> Result<Response, ModuleError> {
    let config = CONFIG.load(deps.storage)?;
    if info.sender != config.admin {
        return Err(ModuleError::Unauthorized);
    }

    params
        .validate()
        .map_err(|reason| ModuleError::InvalidParams { reason })?;
    PARAMS.save(deps.storage, &params)?;

    Ok(Response::new()
        .add_attribute("method", "update_params")
        .add_attribute(
            "data_commitment_window",
            params.data_commitment_window.to_string(),
        )
        .add_attribute(
            "significant_power_diff_bps",
            params.significant_power_diff_bps.to_string(),
        )
        .add_attribute("pruning_threshold", params.pruning_threshold.to_string()))
}

/// Hand the admin role to another account. Admin only.
pub fn execute_update_admin(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    admin: String,
) -> Result<Response, ModuleError> {
    let mut config = CONFIG.load(deps.storage)?;
    if info.sender != config.admin {
        return Err(ModuleError::Unauthorized);
    }

    config.admin = deps.api.addr_validate(&admin)?;
    CONFIG.save(deps.storage, &config)?;

    Ok(Response::new()
        .add_attribute("method", "update_admin")
        .add_attribute("admin", admin))
}
