//! Error types for the QGB attestation module
//!
//! Variants fall in two groups. Invariant violations mean the store itself is
//! inconsistent: the host must halt block processing when one comes back from
//! `end_block`. Everything else is an ordinary rejection of a message.

use cosmwasm_std::StdError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ModuleError {
    #[error("{0}")]
    Std(#[from] StdError),

    // ========================================================================
    // Invariant Violations (fatal)
    // ========================================================================

    #[error("Attestation nonce gap: expected {expected}, got {got}")]
    NonceGap { expected: u64, got: u64 },

    #[error("Attestation with nonce {nonce} already exists")]
    Overwrite { nonce: u64 },

    #[error("Attestation store corrupted: {reason}")]
    CorruptedStore { reason: String },

    // ========================================================================
    // Authorization Errors
    // ========================================================================

    #[error("Unauthorized: only admin can perform this action")]
    Unauthorized,

    #[error("Unauthorized: sender {sender} does not control validator {validator}")]
    NotValidatorOperator { sender: String, validator: String },

    // ========================================================================
    // Attestation Errors
    // ========================================================================

    #[error("No bonded validators")]
    NoValidators,

    #[error("Attestation nonce {nonce} not found")]
    AttestationNotFound { nonce: u64 },

    #[error("Attestation nonce {nonce} is not a {expected}")]
    WrongAttestationKind { nonce: u64, expected: String },

    #[error("No valset before nonce {nonce}: {reason}")]
    NoValsetBeforeNonce { nonce: u64, reason: String },

    #[error("Nonce {nonce} was pruned (earliest available {earliest})")]
    NoncePruned { nonce: u64, earliest: u64 },

    #[error("No data commitment found for height {height}")]
    DataCommitmentNotFound { height: u64 },

    #[error("Invalid valset: {reason}")]
    InvalidValset { reason: String },

    #[error("Invalid params: {reason}")]
    InvalidParams { reason: String },

    // ========================================================================
    // Confirm Validation Errors
    // ========================================================================

    #[error("Invalid signature: {reason}")]
    InvalidSignature { reason: String },

    #[error("Invalid EVM address: {reason}")]
    InvalidEvmAddress { reason: String },

    #[error("Invalid address: {reason}")]
    InvalidAddress { reason: String },

    #[error("Invalid commitment: {reason}")]
    InvalidCommitment { reason: String },

    #[error("Orchestrator {orchestrator} is not registered")]
    OrchestratorNotRegistered { orchestrator: String },

    #[error("Submitted EVM address {submitted} does not match registered {registered}")]
    EvmAddressMismatch {
        submitted: String,
        registered: String,
    },

    #[error("Data commitment range [{begin_block}, {end_block}) does not match nonce {nonce}")]
    RangeMismatch {
        nonce: u64,
        begin_block: u64,
        end_block: u64,
    },

    // ========================================================================
    // Registry Errors
    // ========================================================================

    #[error("Unknown validator {validator}")]
    UnknownValidator { validator: String },

    #[error("EVM address {evm_address} already registered to {validator}")]
    EvmAddressTaken {
        evm_address: String,
        validator: String,
    },

    #[error("Orchestrator {orchestrator} already registered to {validator}")]
    OrchestratorTaken {
        orchestrator: String,
        validator: String,
    },
}

impl ModuleError {
    /// True for errors that mean the attestation store is inconsistent.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            ModuleError::NonceGap { .. }
                | ModuleError::Overwrite { .. }
                | ModuleError::CorruptedStore { .. }
        )
    }
}
