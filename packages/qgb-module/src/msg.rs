//! Message types for the QGB attestation module
//!
//! Execute messages carry orchestrator confirms and registry updates. Sudo
//! messages are delivered by the host chain: the end blocker and the staking
//! hooks.

use cosmwasm_std::Addr;
use qgb_rs::{AttestationRequest, DataCommitment, DataCommitmentConfirm, Params, Valset, ValsetConfirm};
use serde::{Deserialize, Serialize};

use crate::state::EvmAddressRecord;

// ============================================================================
// Instantiate
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct InstantiateMsg {
    /// Account allowed to update params
    pub admin: String,
    /// 32-byte bridge ID, hex with or without `0x`
    pub bridge_id: String,
    /// Defaults to `"checkpoint"` right-padded to 32 bytes
    #[serde(default)]
    pub valset_domain_separator: Option<String>,
    /// Defaults to `"transactionBatch"` right-padded to 32 bytes
    #[serde(default)]
    pub data_root_domain_separator: Option<String>,
    #[serde(default)]
    pub params: Option<Params>,
}

// ============================================================================
// Execute Messages
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ExecuteMsg {
    // ========================================================================
    // Confirms (sent by orchestrators)
    // ========================================================================
    /// Signature over a valset update; `orchestrator` must be the sender
    ValsetConfirm {
        nonce: u64,
        orchestrator: String,
        eth_address: String,
        /// 65-byte signature, hex
        signature: String,
    },

    /// Signature over a data commitment tuple root; `validator_address` is the
    /// orchestrator account and must be the sender
    DataCommitmentConfirm {
        nonce: u64,
        begin_block: u64,
        end_block: u64,
        validator_address: String,
        eth_address: String,
        /// 32-byte tuple root, hex
        commitment: String,
        signature: String,
    },

    // ========================================================================
    // Registry (sent by validator operators)
    // ========================================================================
    /// Bind an EVM address and an orchestrator account to a validator
    RegisterEvmAddress {
        validator: String,
        orchestrator: String,
        evm_address: String,
    },

    // ========================================================================
    // Admin
    // ========================================================================
    UpdateParams { params: Params },

    UpdateAdmin { admin: String },
}

// ============================================================================
// Sudo Messages (host chain)
// ============================================================================

/// A bonded validator as reported by the staking module
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct StakingValidator {
    /// Validator operator address (bech32)
    pub operator: String,
    /// Consensus power
    pub power: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum SudoMsg {
    /// Runs the valset trigger, the data commitment trigger and pruning.
    /// `validators` is the bonded set after this block's staking updates.
    EndBlock { validators: Vec<StakingValidator> },

    AfterValidatorCreated { operator: String },

    AfterValidatorBeginUnbonding { operator: String },
}

// ============================================================================
// Query Messages
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum QueryMsg {
    // ========================================================================
    // Core Queries
    // ========================================================================
    /// Returns [`ConfigResponse`]
    Config {},

    /// Returns [`ParamsResponse`]
    Params {},

    // ========================================================================
    // Attestations
    // ========================================================================
    /// Returns [`AttestationResponse`]
    AttestationRequestByNonce { nonce: u64 },

    /// Returns [`NonceResponse`]; 0 before the first attestation
    LatestAttestationNonce {},

    /// Returns [`NonceResponse`]
    EarliestAttestationNonce {},

    /// Returns [`ValsetResponse`]
    LatestValsetBeforeNonce { nonce: u64 },

    /// Returns [`LatestValsetResponse`]
    LatestValset {},

    /// Returns [`DataCommitmentResponse`]
    LatestDataCommitment {},

    /// Returns [`DataCommitmentResponse`]
    DataCommitmentForHeight { height: u64 },

    /// Returns [`UnbondingHeightResponse`]
    LastUnbondingHeight {},

    // ========================================================================
    // Confirms
    // ========================================================================
    /// Returns [`ValsetConfirmResponse`]
    ValsetConfirm { nonce: u64, orchestrator: String },

    /// Returns [`ValsetConfirmsResponse`]
    ValsetConfirmsByNonce { nonce: u64 },

    /// Returns [`ValsetConfirmResponse`]
    ValsetConfirmByEthAddress { nonce: u64, eth_address: String },

    /// Returns [`DataCommitmentConfirmResponse`]
    DataCommitmentConfirm {
        begin_block: u64,
        end_block: u64,
        orchestrator: String,
    },

    /// Returns [`DataCommitmentConfirmsResponse`]
    DataCommitmentConfirmsByNonce { nonce: u64 },

    /// Returns [`DataCommitmentConfirmResponse`]
    DataCommitmentConfirmByEthAddress {
        begin_block: u64,
        end_block: u64,
        eth_address: String,
    },

    // ========================================================================
    // Registry
    // ========================================================================
    /// Returns [`EvmAddressResponse`]
    EvmAddress { validator: String },
}

// ============================================================================
// Query Responses
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConfigResponse {
    pub admin: Addr,
    pub bridge_id: String,
    pub valset_domain_separator: String,
    pub data_root_domain_separator: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ParamsResponse {
    pub params: Params,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AttestationResponse {
    pub attestation: Option<AttestationRequest>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NonceResponse {
    pub nonce: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ValsetResponse {
    pub valset: Valset,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LatestValsetResponse {
    pub valset: Option<Valset>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DataCommitmentResponse {
    pub data_commitment: Option<DataCommitment>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UnbondingHeightResponse {
    pub height: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ValsetConfirmResponse {
    pub confirm: Option<ValsetConfirm>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ValsetConfirmsResponse {
    pub confirms: Vec<ValsetConfirm>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DataCommitmentConfirmResponse {
    pub confirm: Option<DataCommitmentConfirm>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DataCommitmentConfirmsResponse {
    pub confirms: Vec<DataCommitmentConfirm>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EvmAddressResponse {
    pub record: Option<EvmAddressRecord>,
}
