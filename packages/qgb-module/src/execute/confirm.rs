//! Confirm handlers: ValsetConfirm, DataCommitmentConfirm

use alloy::primitives::{Address, B256};
use cosmwasm_std::{DepsMut, Env, MessageInfo, Response, Storage};
use qgb_rs::{
    parse_evm_address, verify_signature, AttestationKind, AttestationRequest,
    DataCommitmentConfirm, EthSignature, ValsetConfirm,
};

use crate::error::ModuleError;
use crate::keeper::{
    attestation_by_nonce, orchestrator_evm_address, set_data_commitment_confirm,
    set_valset_confirm,
};
use crate::state::CONFIG;

fn ensure_sender(info: &MessageInfo, orchestrator: &str) -> Result<(), ModuleError> {
    if info.sender.as_str() != orchestrator {
        return Err(ModuleError::InvalidAddress {
            reason: format!(
                "sender {} does not match orchestrator {}",
                info.sender, orchestrator
            ),
        });
    }
    Ok(())
}

/// Parse the signature and EVM address, and check the address is the one
/// registered for `orchestrator`.
fn check_signer(
    storage: &dyn Storage,
    orchestrator: &str,
    eth_address: &str,
    signature: &str,
) -> Result<(Address, EthSignature), ModuleError> {
    let signature = EthSignature::from_hex(signature).map_err(|e| ModuleError::InvalidSignature {
        reason: e.to_string(),
    })?;
    let submitted = parse_evm_address(eth_address).map_err(|e| ModuleError::InvalidEvmAddress {
        reason: e.to_string(),
    })?;
    let registered = orchestrator_evm_address(storage, orchestrator)?;
    if submitted != registered {
        return Err(ModuleError::EvmAddressMismatch {
            submitted: submitted.to_string(),
            registered: registered.to_string(),
        });
    }
    Ok((submitted, signature))
}

fn parse_commitment(commitment: &str) -> Result<B256, ModuleError> {
    let stripped = commitment.strip_prefix("0x").unwrap_or(commitment);
    let bytes = hex::decode(stripped).map_err(|e| ModuleError::InvalidCommitment {
        reason: e.to_string(),
    })?;
    if bytes.len() != 32 {
        return Err(ModuleError::InvalidCommitment {
            reason: format!("expected 32 bytes, got {}", bytes.len()),
        });
    }
    Ok(B256::from_slice(&bytes))
}

// ============================================================================
// Valset Confirm
// ============================================================================

/// Store an orchestrator's signature over the valset at `nonce`.
pub fn execute_valset_confirm(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    confirm: ValsetConfirm,
) -> Result<Response, ModuleError> {
    ensure_sender(&info, &confirm.orchestrator)?;

    let valset = match attestation_by_nonce(deps.storage, confirm.nonce)? {
        Some(AttestationRequest::Valset(valset)) => valset,
        Some(_) => {
            return Err(ModuleError::WrongAttestationKind {
                nonce: confirm.nonce,
                expected: AttestationKind::Valset.to_string(),
            })
        }
        None => return Err(ModuleError::AttestationNotFound { nonce: confirm.nonce }),
    };

    let (signer, signature) = check_signer(
        deps.storage,
        &confirm.orchestrator,
        &confirm.eth_address,
        &confirm.signature,
    )?;

    let encoder = CONFIG.load(deps.storage)?.encoder()?;
    verify_signature(encoder.valset_digest(&valset), &signature, signer).map_err(|e| {
        ModuleError::InvalidSignature {
            reason: e.to_string(),
        }
    })?;

    set_valset_confirm(deps.storage, &confirm)?;

    Ok(Response::new()
        .add_attribute("method", "valset_confirm")
        .add_attribute("nonce", confirm.nonce.to_string())
        .add_attribute("orchestrator", confirm.orchestrator)
        .add_attribute("eth_address", confirm.eth_address))
}

// ============================================================================
// Data Commitment Confirm
// ============================================================================

/// Store an orchestrator's signature over the tuple root of the data
/// commitment at `nonce`.
pub fn execute_data_commitment_confirm(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    confirm: DataCommitmentConfirm,
) -> Result<Response, ModuleError> {
    ensure_sender(&info, &confirm.validator_address)?;

    let dc = match attestation_by_nonce(deps.storage, confirm.nonce)? {
        Some(AttestationRequest::DataCommitment(dc)) => dc,
        Some(_) => {
            return Err(ModuleError::WrongAttestationKind {
                nonce: confirm.nonce,
                expected: AttestationKind::DataCommitment.to_string(),
            })
        }
        None => return Err(ModuleError::AttestationNotFound { nonce: confirm.nonce }),
    };
    if dc.begin_block != confirm.begin_block || dc.end_block != confirm.end_block {
        return Err(ModuleError::RangeMismatch {
            nonce: confirm.nonce,
            begin_block: confirm.begin_block,
            end_block: confirm.end_block,
        });
    }

    let commitment = parse_commitment(&confirm.commitment)?;
    let (signer, signature) = check_signer(
        deps.storage,
        &confirm.validator_address,
        &confirm.eth_address,
        &confirm.signature,
    )?;

    let encoder = CONFIG.load(deps.storage)?.encoder()?;
    verify_signature(
        encoder.data_commitment_digest(confirm.nonce, commitment),
        &signature,
        signer,
    )
    .map_err(|e| ModuleError::InvalidSignature {
        reason: e.to_string(),
    })?;

    set_data_commitment_confirm(deps.storage, &confirm)?;

    Ok(Response::new()
        .add_attribute("method", "data_commitment_confirm")
        .add_attribute("nonce", confirm.nonce.to_string())
        .add_attribute("begin_block", confirm.begin_block.to_string())
        .add_attribute("end_block", confirm.end_block.to_string())
        .add_attribute("orchestrator", confirm.validator_address)
        .add_attribute("eth_address", confirm.eth_address))
}
