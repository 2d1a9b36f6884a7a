//! QGB-RS: Shared Library for the Quantum Gravity Bridge
//!
//! This crate provides the pieces shared by the on-chain attestation module, the
//! orchestrator and the relayer:
//!
//! - **Types** - Valset, DataCommitment, AttestationRequest, confirms, params
//! - **Power** - Normalization of staking power into bridge power, power diff, thresholds
//! - **Hash** - ABI encoding and domain-separated digests matching the bridge contract
//! - **Signature** - Personal-sign signing, recovery and verification of 65-byte signatures
//! - **Quorum** - Two-thirds tallies and contract-ordered signature arrays
//! - **Client Module** - Chain queries, event subscription, tx broadcast, retry policy
//! - **Testing Module** - In-memory chain for service tests
//!
//! ## Feature Flags
//!
//! - `client` - Enable RPC clients and the retry policy (default)
//! - `testing` - Enable the in-memory chain used by orchestrator/relayer tests
//!
//! The state machine depends on this crate with `default-features = false`, so
//! nothing under `client` ever runs inside block execution.

// Core modules (always available)
pub mod hash;
pub mod power;
pub mod quorum;
pub mod signature;
pub mod types;

// Network-facing modules (feature-gated)
#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "client")]
pub mod retry;

#[cfg(feature = "testing")]
pub mod testing;

// Re-export commonly used items at the crate root
pub use hash::{
    bytes32_to_hex, compute_valset_hash, data_commitment_signing_digest, keccak256,
    valset_signing_digest, EncoderConfig, EvmEncoder, DATA_ROOT_DOMAIN_SEPARATOR,
    VALIDATOR_SET_DOMAIN_SEPARATOR,
};
pub use power::{normalize_power, two_thirds_threshold, MAX_BRIDGE_POWER};
pub use quorum::{order_signatures, tally_confirms, QuorumError, QuorumTally};
pub use signature::{parse_evm_address, verify_signature, EthSignature, EvmSigner, SignatureError};
pub use types::{
    AttestationKind, AttestationRequest, BridgeValidator, Confirm, DataCommitment,
    DataCommitmentConfirm, Params, Valset, ValsetConfirm, ValsetError,
};
