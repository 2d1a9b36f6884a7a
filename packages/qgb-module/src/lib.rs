//! QGB Attestation Module
//!
//! Deterministic state machine that turns validator-set changes and elapsed
//! block windows into nonce-ordered attestation requests, stores the confirms
//! orchestrators sign for them, and prunes old attestations.
//!
//! The host chain drives it through `sudo`: `EndBlock` once per block after the
//! staking updates, plus the validator-created and begin-unbonding hooks.
//! Orchestrators and validator operators send `execute` messages. Every stored
//! attestation emits an `attestation_request` event carrying its `nonce`.

pub mod abci;
pub mod contract;
pub mod error;
pub mod execute;
pub mod keeper;
pub mod msg;
pub mod query;
pub mod staking;
pub mod state;

pub use crate::error::ModuleError;
