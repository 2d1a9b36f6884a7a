//! Shared types for the QGB attestation bridge
//!
//! Everything stored by the state machine and exchanged with the orchestrator
//! and relayer lives here, so both sides encode and sign the exact same values.

use std::collections::HashSet;
use std::fmt;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::power::two_thirds_threshold;

// ============================================================================
// Attestation Kinds
// ============================================================================

/// Discriminant of an [`AttestationRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationKind {
    Valset,
    DataCommitment,
}

impl fmt::Display for AttestationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttestationKind::Valset => write!(f, "valset"),
            AttestationKind::DataCommitment => write!(f, "data_commitment"),
        }
    }
}

// ============================================================================
// Validator Sets
// ============================================================================

/// A validator as seen by the bridge contract: EVM address plus normalized power
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeValidator {
    pub evm_address: Address,
    /// Normalized power in `[0, 2^32]`
    pub power: u64,
}

impl BridgeValidator {
    pub fn new(evm_address: Address, power: u64) -> Self {
        Self { evm_address, power }
    }
}

/// Errors raised when building or validating a [`Valset`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValsetError {
    #[error("valset has no members")]
    EmptyMembers,

    #[error("valset member {address} has zero power")]
    ZeroPower { address: Address },

    #[error("duplicate valset member {address}")]
    DuplicateMember { address: Address },
}

/// Power-weighted validator snapshot at a height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valset {
    pub nonce: u64,
    pub height: u64,
    pub time: DateTime<Utc>,
    /// Sorted by power descending, ties by ascending address bytes
    pub members: Vec<BridgeValidator>,
}

impl Valset {
    /// Build a valset, sorting members into contract order and validating them.
    pub fn new(
        nonce: u64,
        height: u64,
        time: DateTime<Utc>,
        mut members: Vec<BridgeValidator>,
    ) -> Result<Self, ValsetError> {
        sort_members(&mut members);
        let valset = Self {
            nonce,
            height,
            time,
            members,
        };
        valset.validate_basic()?;
        Ok(valset)
    }

    /// Non-empty, no zero power, no duplicate addresses.
    pub fn validate_basic(&self) -> Result<(), ValsetError> {
        if self.members.is_empty() {
            return Err(ValsetError::EmptyMembers);
        }
        let mut seen = HashSet::with_capacity(self.members.len());
        for member in &self.members {
            if member.power == 0 {
                return Err(ValsetError::ZeroPower {
                    address: member.evm_address,
                });
            }
            if !seen.insert(member.evm_address) {
                return Err(ValsetError::DuplicateMember {
                    address: member.evm_address,
                });
            }
        }
        Ok(())
    }

    pub fn total_power(&self) -> u128 {
        self.members.iter().map(|m| m.power as u128).sum()
    }

    pub fn two_thirds_threshold(&self) -> u128 {
        two_thirds_threshold(self.total_power())
    }

    /// Find a member by EVM address
    pub fn member(&self, address: &Address) -> Option<&BridgeValidator> {
        self.members.iter().find(|m| &m.evm_address == address)
    }
}

/// Sort members into the order the contract expects.
pub fn sort_members(members: &mut [BridgeValidator]) {
    members.sort_by(|a, b| {
        b.power
            .cmp(&a.power)
            .then_with(|| a.evm_address.cmp(&b.evm_address))
    });
}

// ============================================================================
// Data Commitments
// ============================================================================

/// A committed block range `[begin_block, end_block)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCommitment {
    pub nonce: u64,
    pub begin_block: u64,
    pub end_block: u64,
    pub time: DateTime<Utc>,
}

impl DataCommitment {
    pub fn new(nonce: u64, begin_block: u64, end_block: u64, time: DateTime<Utc>) -> Self {
        Self {
            nonce,
            begin_block,
            end_block,
            time,
        }
    }

    /// True if `height` falls inside the committed range.
    pub fn contains(&self, height: u64) -> bool {
        self.begin_block <= height && height < self.end_block
    }
}

// ============================================================================
// Attestation Requests
// ============================================================================

/// Chain-certified request that orchestrators sign and relayers submit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationRequest {
    Valset(Valset),
    DataCommitment(DataCommitment),
}

impl AttestationRequest {
    pub fn nonce(&self) -> u64 {
        match self {
            AttestationRequest::Valset(vs) => vs.nonce,
            AttestationRequest::DataCommitment(dc) => dc.nonce,
        }
    }

    pub fn kind(&self) -> AttestationKind {
        match self {
            AttestationRequest::Valset(_) => AttestationKind::Valset,
            AttestationRequest::DataCommitment(_) => AttestationKind::DataCommitment,
        }
    }

    pub fn block_time(&self) -> DateTime<Utc> {
        match self {
            AttestationRequest::Valset(vs) => vs.time,
            AttestationRequest::DataCommitment(dc) => dc.time,
        }
    }

    /// Height the attestation is anchored to: the snapshot height of a valset,
    /// the end block of a data commitment.
    pub fn height(&self) -> u64 {
        match self {
            AttestationRequest::Valset(vs) => vs.height,
            AttestationRequest::DataCommitment(dc) => dc.end_block,
        }
    }

    pub fn as_valset(&self) -> Option<&Valset> {
        match self {
            AttestationRequest::Valset(vs) => Some(vs),
            AttestationRequest::DataCommitment(_) => None,
        }
    }

    pub fn as_data_commitment(&self) -> Option<&DataCommitment> {
        match self {
            AttestationRequest::DataCommitment(dc) => Some(dc),
            AttestationRequest::Valset(_) => None,
        }
    }
}

impl From<Valset> for AttestationRequest {
    fn from(vs: Valset) -> Self {
        AttestationRequest::Valset(vs)
    }
}

impl From<DataCommitment> for AttestationRequest {
    fn from(dc: DataCommitment) -> Self {
        AttestationRequest::DataCommitment(dc)
    }
}

// ============================================================================
// Confirms
// ============================================================================

/// Common view over signed confirms, used by quorum evaluation.
pub trait Confirm {
    fn nonce(&self) -> u64;
    /// Chain account of the orchestrator that sent the confirm
    fn orchestrator(&self) -> &str;
    fn eth_address(&self) -> &str;
    /// Hex-encoded 65-byte signature
    fn signature(&self) -> &str;
}

/// An orchestrator's signature over a valset update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValsetConfirm {
    pub nonce: u64,
    pub orchestrator: String,
    pub eth_address: String,
    pub signature: String,
}

impl Confirm for ValsetConfirm {
    fn nonce(&self) -> u64 {
        self.nonce
    }
    fn orchestrator(&self) -> &str {
        &self.orchestrator
    }
    fn eth_address(&self) -> &str {
        &self.eth_address
    }
    fn signature(&self) -> &str {
        &self.signature
    }
}

/// An orchestrator's signature over a data commitment tuple root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCommitmentConfirm {
    pub nonce: u64,
    pub begin_block: u64,
    pub end_block: u64,
    pub validator_address: String,
    pub eth_address: String,
    /// Hex-encoded 32-byte tuple root
    pub commitment: String,
    pub signature: String,
}

impl Confirm for DataCommitmentConfirm {
    fn nonce(&self) -> u64 {
        self.nonce
    }
    fn orchestrator(&self) -> &str {
        &self.validator_address
    }
    fn eth_address(&self) -> &str {
        &self.eth_address
    }
    fn signature(&self) -> &str {
        &self.signature
    }
}

// ============================================================================
// Params
// ============================================================================

pub const MIN_DATA_COMMITMENT_WINDOW: u64 = 100;
pub const MAX_DATA_COMMITMENT_WINDOW: u64 = 10_000;

/// Governance parameters of the attestation module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Number of blocks covered by each data commitment
    pub data_commitment_window: u64,
    /// Power drift (in basis points of 2^32) that triggers a new valset
    pub significant_power_diff_bps: u64,
    /// Minimum age in blocks before an attestation may be pruned
    pub pruning_threshold: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            data_commitment_window: 400,
            significant_power_diff_bps: 500,
            // three weeks of 6 second blocks
            pruning_threshold: 302_400,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), String> {
        if self.data_commitment_window < MIN_DATA_COMMITMENT_WINDOW
            || self.data_commitment_window > MAX_DATA_COMMITMENT_WINDOW
        {
            return Err(format!(
                "data commitment window {} outside [{}, {}]",
                self.data_commitment_window, MIN_DATA_COMMITMENT_WINDOW, MAX_DATA_COMMITMENT_WINDOW
            ));
        }
        if self.significant_power_diff_bps == 0 || self.significant_power_diff_bps > 10_000 {
            return Err(format!(
                "significant power diff {} bps outside (0, 10000]",
                self.significant_power_diff_bps
            ));
        }
        if self.pruning_threshold == 0 {
            return Err("pruning threshold must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn genesis() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_members_sorted_by_power_then_address() {
        let vs = Valset::new(
            1,
            10,
            genesis(),
            vec![
                BridgeValidator::new(addr(0x03), 100),
                BridgeValidator::new(addr(0x02), 300),
                BridgeValidator::new(addr(0x01), 100),
            ],
        )
        .unwrap();

        let order: Vec<_> = vs.members.iter().map(|m| m.evm_address).collect();
        assert_eq!(order, vec![addr(0x02), addr(0x01), addr(0x03)]);
    }

    #[test]
    fn test_validate_basic() {
        assert_eq!(
            Valset::new(1, 1, genesis(), vec![]).unwrap_err(),
            ValsetError::EmptyMembers
        );
        assert_eq!(
            Valset::new(1, 1, genesis(), vec![BridgeValidator::new(addr(1), 0)]).unwrap_err(),
            ValsetError::ZeroPower { address: addr(1) }
        );
        assert_eq!(
            Valset::new(
                1,
                1,
                genesis(),
                vec![
                    BridgeValidator::new(addr(1), 5),
                    BridgeValidator::new(addr(1), 7)
                ]
            )
            .unwrap_err(),
            ValsetError::DuplicateMember { address: addr(1) }
        );
    }

    #[test]
    fn test_attestation_accessors() {
        let vs = Valset::new(1, 42, genesis(), vec![BridgeValidator::new(addr(1), 10)]).unwrap();
        let dc = DataCommitment::new(2, 1, 401, genesis());

        let a: AttestationRequest = vs.into();
        let b: AttestationRequest = dc.into();

        assert_eq!(a.nonce(), 1);
        assert_eq!(a.kind(), AttestationKind::Valset);
        assert_eq!(a.height(), 42);
        assert_eq!(b.nonce(), 2);
        assert_eq!(b.kind(), AttestationKind::DataCommitment);
        assert_eq!(b.height(), 401);
        assert!(b.as_valset().is_none());
        assert!(b.as_data_commitment().unwrap().contains(400));
        assert!(!b.as_data_commitment().unwrap().contains(401));
    }

    #[test]
    fn test_attestation_json_is_tagged() {
        let dc: AttestationRequest = DataCommitment::new(3, 401, 801, genesis()).into();
        let json = serde_json::to_value(&dc).unwrap();
        assert_eq!(json["data_commitment"]["begin_block"], 401);

        let back: AttestationRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, dc);
    }

    #[test]
    fn test_params_validation() {
        assert!(Params::default().validate().is_ok());
        let bad = Params {
            data_commitment_window: 10,
            ..Params::default()
        };
        assert!(bad.validate().is_err());
    }
}
