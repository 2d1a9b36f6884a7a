//! In-memory chain for orchestrator and relayer tests
//!
//! [`InMemoryChain`] implements both [`AppQuerier`] and [`TxBroadcaster`]:
//! broadcast confirms land in its confirm maps, so a test can drive a full
//! sign → broadcast → quorum cycle without a node.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use alloy::primitives::B256;
use async_trait::async_trait;
use eyre::{eyre, Result};

use crate::client::{AppQuerier, TxBroadcaster};
use crate::hash::keccak256;
use crate::types::{
    AttestationRequest, DataCommitmentConfirm, Params, Valset, ValsetConfirm,
};

#[derive(Default)]
struct ChainState {
    attestations: BTreeMap<u64, AttestationRequest>,
    valset_confirms: BTreeMap<(u64, String), ValsetConfirm>,
    dc_confirms: BTreeMap<(u64, String), DataCommitmentConfirm>,
    data_roots: HashMap<(u64, u64), B256>,
    params: Params,
    last_unbonding_height: u64,
    broadcasts: usize,
    failing_broadcasts: u32,
    failing_nonce_queries: u32,
    stalled_valset_broadcasts: bool,
}

/// Shared-state fake of the chain
pub struct InMemoryChain {
    orchestrator: String,
    state: Mutex<ChainState>,
}

/// Deterministic stand-in for a tuple root when a test did not set one
pub fn default_data_root(begin_block: u64, end_block: u64) -> B256 {
    let mut data = [0u8; 16];
    data[..8].copy_from_slice(&begin_block.to_be_bytes());
    data[8..].copy_from_slice(&end_block.to_be_bytes());
    B256::from(keccak256(&data))
}

impl InMemoryChain {
    /// `orchestrator` is the account reported by the broadcaster side
    pub fn new(orchestrator: &str) -> Self {
        Self {
            orchestrator: orchestrator.to_string(),
            state: Mutex::new(ChainState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChainState> {
        // a panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store the next attestation; its nonce must follow the latest one.
    pub fn push_attestation(&self, attestation: impl Into<AttestationRequest>) {
        let attestation = attestation.into();
        let mut state = self.state();
        let expected = state.attestations.keys().next_back().map_or(1, |n| n + 1);
        assert_eq!(attestation.nonce(), expected, "attestation nonce out of sequence");
        state.attestations.insert(attestation.nonce(), attestation);
    }

    /// Drop every attestation below `nonce`
    pub fn prune_below(&self, nonce: u64) {
        self.state().attestations.retain(|n, _| *n >= nonce);
    }

    pub fn set_params(&self, params: Params) {
        self.state().params = params;
    }

    pub fn set_last_unbonding_height(&self, height: u64) {
        self.state().last_unbonding_height = height;
    }

    pub fn set_data_root(&self, begin_block: u64, end_block: u64, root: B256) {
        self.state().data_roots.insert((begin_block, end_block), root);
    }

    pub fn insert_valset_confirm(&self, confirm: ValsetConfirm) {
        self.state()
            .valset_confirms
            .insert((confirm.nonce, confirm.orchestrator.clone()), confirm);
    }

    pub fn insert_data_commitment_confirm(&self, confirm: DataCommitmentConfirm) {
        self.state()
            .dc_confirms
            .insert((confirm.nonce, confirm.validator_address.clone()), confirm);
    }

    /// Make the next `count` broadcasts fail with a transient error
    pub fn fail_next_broadcasts(&self, count: u32) {
        self.state().failing_broadcasts = count;
    }

    /// Make the next `count` latest-nonce queries fail with a transient error
    pub fn fail_next_nonce_queries(&self, count: u32) {
        self.state().failing_nonce_queries = count;
    }

    /// Valset confirm broadcasts never complete while set
    pub fn stall_valset_broadcasts(&self, stalled: bool) {
        self.state().stalled_valset_broadcasts = stalled;
    }

    /// Successful broadcasts so far
    pub fn broadcast_count(&self) -> usize {
        self.state().broadcasts
    }

    fn record_broadcast(&self) -> Result<String> {
        let mut state = self.state();
        if state.failing_broadcasts > 0 {
            state.failing_broadcasts -= 1;
            return Err(eyre!("connection reset by peer"));
        }
        state.broadcasts += 1;
        Ok(format!("{:064X}", state.broadcasts))
    }
}

#[async_trait]
impl AppQuerier for InMemoryChain {
    async fn attestation_by_nonce(&self, nonce: u64) -> Result<Option<AttestationRequest>> {
        Ok(self.state().attestations.get(&nonce).cloned())
    }

    async fn latest_attestation_nonce(&self) -> Result<u64> {
        let mut state = self.state();
        if state.failing_nonce_queries > 0 {
            state.failing_nonce_queries -= 1;
            return Err(eyre!("connection refused"));
        }
        Ok(state
            .attestations
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0))
    }

    async fn earliest_attestation_nonce(&self) -> Result<u64> {
        Ok(self.state().attestations.keys().next().copied().unwrap_or(0))
    }

    async fn last_valset_before_nonce(&self, nonce: u64) -> Result<Valset> {
        let state = self.state();
        state
            .attestations
            .range(..nonce)
            .rev()
            .find_map(|(_, a)| a.as_valset().cloned())
            .ok_or_else(|| eyre!("no valset found before nonce {}", nonce))
    }

    async fn params(&self) -> Result<Params> {
        Ok(self.state().params.clone())
    }

    async fn last_unbonding_height(&self) -> Result<u64> {
        Ok(self.state().last_unbonding_height)
    }

    async fn valset_confirm(
        &self,
        nonce: u64,
        orchestrator: &str,
    ) -> Result<Option<ValsetConfirm>> {
        Ok(self
            .state()
            .valset_confirms
            .get(&(nonce, orchestrator.to_string()))
            .cloned())
    }

    async fn valset_confirms(&self, nonce: u64) -> Result<Vec<ValsetConfirm>> {
        Ok(self
            .state()
            .valset_confirms
            .values()
            .filter(|c| c.nonce == nonce)
            .cloned()
            .collect())
    }

    async fn data_commitment_confirm(
        &self,
        begin_block: u64,
        end_block: u64,
        orchestrator: &str,
    ) -> Result<Option<DataCommitmentConfirm>> {
        Ok(self
            .state()
            .dc_confirms
            .values()
            .find(|c| {
                c.begin_block == begin_block
                    && c.end_block == end_block
                    && c.validator_address == orchestrator
            })
            .cloned())
    }

    async fn data_commitment_confirms(&self, nonce: u64) -> Result<Vec<DataCommitmentConfirm>> {
        Ok(self
            .state()
            .dc_confirms
            .values()
            .filter(|c| c.nonce == nonce)
            .cloned()
            .collect())
    }

    async fn data_commitment_root(&self, begin_block: u64, end_block: u64) -> Result<B256> {
        Ok(self
            .state()
            .data_roots
            .get(&(begin_block, end_block))
            .copied()
            .unwrap_or_else(|| default_data_root(begin_block, end_block)))
    }
}

#[async_trait]
impl TxBroadcaster for InMemoryChain {
    fn orchestrator_address(&self) -> String {
        self.orchestrator.clone()
    }

    async fn broadcast_valset_confirm(&self, confirm: ValsetConfirm) -> Result<String> {
        let stalled = self.state().stalled_valset_broadcasts;
        if stalled {
            std::future::pending::<()>().await;
        }
        let tx_hash = self.record_broadcast()?;
        self.insert_valset_confirm(confirm);
        Ok(tx_hash)
    }

    async fn broadcast_data_commitment_confirm(
        &self,
        confirm: DataCommitmentConfirm,
    ) -> Result<String> {
        let tx_hash = self.record_broadcast()?;
        self.insert_data_commitment_confirm(confirm);
        Ok(tx_hash)
    }
}
