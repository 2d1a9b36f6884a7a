//! Chain-facing clients used by the orchestrator and the relayer
//!
//! The services only talk to the chain through the [`AppQuerier`] and
//! [`TxBroadcaster`] traits, so tests can swap in
//! [`crate::testing::InMemoryChain`].

use alloy::primitives::B256;
use async_trait::async_trait;
use eyre::Result;

use crate::types::{
    AttestationRequest, DataCommitmentConfirm, Params, Valset, ValsetConfirm,
};

pub mod broadcast;
pub mod confirms;
pub mod events;
pub mod proto;
pub mod rest;

pub use broadcast::{BroadcasterConfig, CosmosBroadcaster};
pub use confirms::{query_two_thirds_confirms, ConfirmQuery, ConfirmSet, QuorumConfirms};
pub use events::{subscribe_attestation_nonces, ATTESTATION_EVENT_QUERY};
pub use rest::RestQuerier;

/// Read access to attestation state
#[async_trait]
pub trait AppQuerier: Send + Sync {
    /// `None` when the nonce was never created or has been pruned
    async fn attestation_by_nonce(&self, nonce: u64) -> Result<Option<AttestationRequest>>;

    /// 0 when no attestation exists yet
    async fn latest_attestation_nonce(&self) -> Result<u64>;

    async fn earliest_attestation_nonce(&self) -> Result<u64>;

    /// The valset in effect when `nonce` was created
    async fn last_valset_before_nonce(&self, nonce: u64) -> Result<Valset>;

    async fn params(&self) -> Result<Params>;

    async fn last_unbonding_height(&self) -> Result<u64>;

    async fn valset_confirm(&self, nonce: u64, orchestrator: &str)
        -> Result<Option<ValsetConfirm>>;

    async fn valset_confirms(&self, nonce: u64) -> Result<Vec<ValsetConfirm>>;

    async fn data_commitment_confirm(
        &self,
        begin_block: u64,
        end_block: u64,
        orchestrator: &str,
    ) -> Result<Option<DataCommitmentConfirm>>;

    async fn data_commitment_confirms(&self, nonce: u64) -> Result<Vec<DataCommitmentConfirm>>;

    /// Data root tuple root over `[begin_block, end_block)`
    async fn data_commitment_root(&self, begin_block: u64, end_block: u64) -> Result<B256>;
}

/// Submits confirm messages as chain transactions
#[async_trait]
pub trait TxBroadcaster: Send + Sync {
    /// Chain account the confirms are sent from
    fn orchestrator_address(&self) -> String;

    /// Returns the transaction hash
    async fn broadcast_valset_confirm(&self, confirm: ValsetConfirm) -> Result<String>;

    async fn broadcast_data_commitment_confirm(
        &self,
        confirm: DataCommitmentConfirm,
    ) -> Result<String>;
}
