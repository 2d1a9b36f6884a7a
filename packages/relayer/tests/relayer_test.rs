//! Relayer tests against the in-memory chain and a recording contract
//!
//! Run with: cargo test -p qgb-relayer --test relayer_test

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::B256;
use async_trait::async_trait;
use chrono::DateTime;
use eyre::{eyre, Result};
use qgb_rs::client::ConfirmQuery;
use qgb_rs::retry::RetryPolicy;
use qgb_rs::testing::{default_data_root, InMemoryChain};
use qgb_rs::{
    bytes32_to_hex, verify_signature, AttestationKind, BridgeValidator, DataCommitment,
    DataCommitmentConfirm, EncoderConfig, EthSignature, EvmEncoder, EvmSigner, Valset,
    ValsetConfirm,
};
use relayer::evm_client::BridgeContract;
use relayer::relayer::{Relayer, RelayerSettings, TickOutcome};
use relayer::server::{Metrics, RelayerStats, SharedMetrics, SharedStats};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Setup
// ============================================================================

/// What the contract was asked to do
#[derive(Debug, Clone)]
enum Submission {
    Valset {
        nonce: u64,
        current: Valset,
        signatures: Vec<EthSignature>,
    },
    DataRoot {
        nonce: u64,
        tuple_root: B256,
        current: Valset,
        signatures: Vec<EthSignature>,
    },
}

#[derive(Default)]
struct ContractState {
    event_nonce: u64,
    valset_nonce: u64,
    data_root_nonce: u64,
    failing_submissions: u32,
    submissions: Vec<Submission>,
}

/// Contract double that accepts every submission and advances its nonces
struct MockContract {
    state: Mutex<ContractState>,
}

impl MockContract {
    /// Deployed with valset 1, as the real contract is
    fn deployed() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ContractState {
                event_nonce: 1,
                valset_nonce: 1,
                ..Default::default()
            }),
        })
    }

    fn at_nonce(nonce: u64) -> Arc<Self> {
        let contract = Self::deployed();
        contract.state.lock().unwrap().event_nonce = nonce;
        contract
    }

    fn fail_next_submissions(&self, count: u32) {
        self.state.lock().unwrap().failing_submissions = count;
    }

    fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    fn event_nonce(&self) -> u64 {
        self.state.lock().unwrap().event_nonce
    }

    fn accept(&self, nonce: u64, submission: Submission) -> Result<B256> {
        let mut state = self.state.lock().unwrap();
        if state.failing_submissions > 0 {
            state.failing_submissions -= 1;
            return Err(eyre!("connection refused"));
        }
        if nonce != state.event_nonce + 1 {
            return Err(eyre!("execution reverted: InvalidNonce"));
        }
        state.event_nonce = nonce;
        match submission {
            Submission::Valset { .. } => state.valset_nonce = nonce,
            Submission::DataRoot { .. } => state.data_root_nonce = nonce,
        }
        state.submissions.push(submission);
        Ok(B256::repeat_byte(nonce as u8))
    }
}

#[async_trait]
impl BridgeContract for MockContract {
    async fn last_event_nonce(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().event_nonce)
    }

    async fn last_valset_nonce(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().valset_nonce)
    }

    async fn last_data_root_tuple_root_nonce(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().data_root_nonce)
    }

    async fn update_validator_set(
        &self,
        new_valset: &Valset,
        current_valset: &Valset,
        signatures: &[EthSignature],
    ) -> Result<B256> {
        self.accept(
            new_valset.nonce,
            Submission::Valset {
                nonce: new_valset.nonce,
                current: current_valset.clone(),
                signatures: signatures.to_vec(),
            },
        )
    }

    async fn submit_data_root_tuple_root(
        &self,
        nonce: u64,
        tuple_root: B256,
        current_valset: &Valset,
        signatures: &[EthSignature],
    ) -> Result<B256> {
        self.accept(
            nonce,
            Submission::DataRoot {
                nonce,
                tuple_root,
                current: current_valset.clone(),
                signatures: signatures.to_vec(),
            },
        )
    }
}

fn encoder() -> EvmEncoder {
    EvmEncoder::new(EncoderConfig::new(B256::repeat_byte(0xab)))
}

/// Validators A, B and C
fn signer(index: u8) -> EvmSigner {
    EvmSigner::from_bytes(&[index; 32]).unwrap()
}

fn orchestrator(index: u8) -> String {
    format!("celestia1orchestrator{}", index)
}

fn valset(nonce: u64, height: u64, powers: [u64; 3]) -> Valset {
    Valset::new(
        nonce,
        height,
        DateTime::from_timestamp(height as i64 * 6, 0).unwrap(),
        (1u8..=3)
            .zip(powers)
            .map(|(i, power)| BridgeValidator::new(signer(i).address(), power))
            .collect(),
    )
    .unwrap()
}

/// A=40, B=20, C=40 at nonce 1; A=50, B=30, C=20 at nonce 2; data commitment
/// over [1, 101) at nonce 3
fn seeded_chain() -> Arc<InMemoryChain> {
    let chain = Arc::new(InMemoryChain::new(&orchestrator(1)));
    chain.push_attestation(valset(1, 1, [40, 20, 40]));
    chain.push_attestation(valset(2, 50, [50, 30, 20]));
    chain.push_attestation(DataCommitment::new(
        3,
        1,
        101,
        DateTime::from_timestamp(606, 0).unwrap(),
    ));
    chain
}

fn confirm_valset(chain: &InMemoryChain, index: u8, new_valset: &Valset) {
    let signer = signer(index);
    let signature = signer
        .sign_digest(encoder().valset_digest(new_valset))
        .unwrap();
    chain.insert_valset_confirm(ValsetConfirm {
        nonce: new_valset.nonce,
        orchestrator: orchestrator(index),
        eth_address: signer.address().to_checksum(None),
        signature: signature.to_hex(),
    });
}

fn confirm_data_commitment(chain: &InMemoryChain, index: u8, nonce: u64, begin: u64, end: u64) {
    let signer = signer(index);
    let root = default_data_root(begin, end);
    let signature = signer
        .sign_digest(encoder().data_commitment_digest(nonce, root))
        .unwrap();
    chain.insert_data_commitment_confirm(DataCommitmentConfirm {
        nonce,
        begin_block: begin,
        end_block: end,
        validator_address: orchestrator(index),
        eth_address: signer.address().to_checksum(None),
        commitment: bytes32_to_hex(&root.0),
        signature: signature.to_hex(),
    });
}

fn settings() -> RelayerSettings {
    RelayerSettings {
        poll_interval: Duration::from_millis(10),
        confirm_query: ConfirmQuery {
            timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
        },
        nonce_wait_polls: 3,
        nonce_wait_interval: Duration::from_millis(5),
    }
}

struct Harness {
    relayer: Arc<Relayer>,
    stats: SharedStats,
    metrics: SharedMetrics,
}

fn harness(chain: &Arc<InMemoryChain>, contract: &Arc<MockContract>) -> Harness {
    let stats: SharedStats = Arc::new(RwLock::new(RelayerStats::default()));
    let metrics: SharedMetrics = Arc::new(Metrics::new());
    let relayer = Arc::new(Relayer::new(
        chain.clone(),
        contract.clone(),
        encoder(),
        settings(),
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        stats.clone(),
        metrics.clone(),
    ));
    Harness {
        relayer,
        stats,
        metrics,
    }
}

fn assert_signed_by_members(valset: &Valset, signatures: &[EthSignature], digest: B256) {
    assert_eq!(signatures.len(), valset.members.len());
    for (member, signature) in valset.members.iter().zip(signatures) {
        verify_signature(digest, signature, member.evm_address).unwrap();
    }
}

// ============================================================================
// Valset Relay
// ============================================================================

#[tokio::test]
async fn test_relays_valset_with_signatures_in_member_order() {
    let chain = seeded_chain();
    let contract = MockContract::deployed();
    let new_valset = valset(2, 50, [50, 30, 20]);
    for index in 1..=3 {
        confirm_valset(&chain, index, &new_valset);
    }
    let h = harness(&chain, &contract);

    let outcome = h
        .relayer
        .tick(AttestationKind::Valset, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        TickOutcome::Relayed {
            nonce: 2,
            tx_hash: B256::repeat_byte(2)
        }
    );

    let submissions = contract.submissions();
    assert_eq!(submissions.len(), 1);
    match &submissions[0] {
        Submission::Valset {
            nonce,
            current,
            signatures,
        } => {
            assert_eq!(*nonce, 2);
            // signed by the valset in effect before nonce 2
            assert_eq!(current, &valset(1, 1, [40, 20, 40]));
            assert_signed_by_members(current, signatures, encoder().valset_digest(&new_valset));
        }
        other => panic!("unexpected submission {:?}", other),
    }

    let stats = h.stats.read().await;
    assert_eq!(stats.valsets_relayed, 1);
    assert_eq!(stats.last_relayed_nonce, 2);
    assert_eq!(h.metrics.valsets_relayed_total.get(), 1);
    assert_eq!(h.metrics.last_relayed_nonce.get(), 2);
}

#[tokio::test]
async fn test_not_enough_confirms_times_out_without_submitting() {
    // A (40) + B (20) = 60 of 100, threshold 68
    let chain = seeded_chain();
    let contract = MockContract::deployed();
    let new_valset = valset(2, 50, [50, 30, 20]);
    confirm_valset(&chain, 1, &new_valset);
    confirm_valset(&chain, 2, &new_valset);
    let h = harness(&chain, &contract);

    let err = h
        .relayer
        .tick(AttestationKind::Valset, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("not enough confirms"), "{}", err);
    assert!(contract.submissions().is_empty());
    assert_eq!(contract.event_nonce(), 1);

    let stats = h.stats.read().await;
    assert_eq!(stats.quorum_timeouts, 1);
    assert_eq!(stats.relay_errors, 1);
    assert_eq!(h.metrics.quorum_timeouts_total.get(), 1);
}

#[tokio::test]
async fn test_missing_member_signature_blocks_submission() {
    // A (40) + C (40) reach the threshold but B has no confirm
    let chain = seeded_chain();
    let contract = MockContract::deployed();
    let new_valset = valset(2, 50, [50, 30, 20]);
    confirm_valset(&chain, 1, &new_valset);
    confirm_valset(&chain, 3, &new_valset);
    let h = harness(&chain, &contract);

    let err = h
        .relayer
        .tick(AttestationKind::Valset, &CancellationToken::new())
        .await
        .unwrap_err();

    let expected = format!("missing signature for member {}", signer(2).address());
    assert!(err.to_string().contains(&expected), "{}", err);
    assert!(contract.submissions().is_empty());

    let stats = h.stats.read().await;
    assert_eq!(stats.quorum_timeouts, 0);
    assert_eq!(stats.relay_errors, 1);
}

#[tokio::test]
async fn test_signature_over_wrong_digest_rejected() {
    let chain = seeded_chain();
    let contract = MockContract::deployed();
    let new_valset = valset(2, 50, [50, 30, 20]);
    confirm_valset(&chain, 1, &new_valset);
    confirm_valset(&chain, 3, &new_valset);
    // B signs a different valset
    confirm_valset(&chain, 2, &valset(2, 50, [10, 30, 20]));
    let h = harness(&chain, &contract);

    let err = h
        .relayer
        .tick(AttestationKind::Valset, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("invalid signature"), "{}", err);
    assert!(contract.submissions().is_empty());
}

#[tokio::test]
async fn test_transient_submission_failure_retried() {
    let chain = seeded_chain();
    let contract = MockContract::deployed();
    contract.fail_next_submissions(1);
    let new_valset = valset(2, 50, [50, 30, 20]);
    for index in 1..=3 {
        confirm_valset(&chain, index, &new_valset);
    }
    let h = harness(&chain, &contract);

    let outcome = h
        .relayer
        .tick(AttestationKind::Valset, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, TickOutcome::Relayed { nonce: 2, .. }));
    assert_eq!(contract.submissions().len(), 1);
}

// ============================================================================
// Data Commitment Relay
// ============================================================================

#[tokio::test]
async fn test_relays_data_commitment_under_previous_valset() {
    let chain = seeded_chain();
    let contract = MockContract::at_nonce(2);
    for index in 1..=3 {
        confirm_data_commitment(&chain, index, 3, 1, 101);
    }
    let h = harness(&chain, &contract);

    let outcome = h
        .relayer
        .tick(AttestationKind::DataCommitment, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, TickOutcome::Relayed { nonce: 3, .. }));

    match &contract.submissions()[0] {
        Submission::DataRoot {
            nonce,
            tuple_root,
            current,
            signatures,
        } => {
            assert_eq!(*nonce, 3);
            assert_eq!(*tuple_root, default_data_root(1, 101));
            assert_eq!(current, &valset(2, 50, [50, 30, 20]));
            assert_signed_by_members(
                current,
                signatures,
                encoder().data_commitment_digest(3, *tuple_root),
            );
        }
        other => panic!("unexpected submission {:?}", other),
    }

    assert_eq!(h.stats.read().await.data_commitments_relayed, 1);
}

#[tokio::test]
async fn test_confirms_for_other_root_not_counted() {
    let chain = seeded_chain();
    chain.set_data_root(1, 101, B256::repeat_byte(0x42));
    let contract = MockContract::at_nonce(2);
    // signed over the default root, not the one the chain now reports
    for index in 1..=3 {
        confirm_data_commitment(&chain, index, 3, 1, 101);
    }
    let h = harness(&chain, &contract);

    let err = h
        .relayer
        .tick(AttestationKind::DataCommitment, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not enough confirms"), "{}", err);
    assert!(contract.submissions().is_empty());
}

// ============================================================================
// Loop Coordination
// ============================================================================

#[tokio::test]
async fn test_other_kind_stays_idle() {
    let chain = seeded_chain();
    let contract = MockContract::deployed();
    let h = harness(&chain, &contract);

    let outcome = h
        .relayer
        .tick(AttestationKind::DataCommitment, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        TickOutcome::OtherKind {
            nonce: 2,
            kind: AttestationKind::Valset
        }
    );
    assert!(contract.submissions().is_empty());
}

#[tokio::test]
async fn test_caught_up_when_contract_has_latest() {
    let chain = seeded_chain();
    let contract = MockContract::at_nonce(3);
    let h = harness(&chain, &contract);

    for kind in [AttestationKind::Valset, AttestationKind::DataCommitment] {
        let outcome = h
            .relayer
            .tick(kind, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, TickOutcome::CaughtUp);
    }
    assert_eq!(h.stats.read().await.last_contract_nonce, 3);
}

#[tokio::test]
async fn test_run_relays_both_kinds_in_nonce_order() {
    let chain = seeded_chain();
    let contract = MockContract::deployed();
    let new_valset = valset(2, 50, [50, 30, 20]);
    for index in 1..=3 {
        confirm_valset(&chain, index, &new_valset);
        confirm_data_commitment(&chain, index, 3, 1, 101);
    }
    let h = harness(&chain, &contract);

    let shutdown = CancellationToken::new();
    let run = tokio::spawn(h.relayer.clone().run(shutdown.clone()));

    tokio::time::timeout(Duration::from_secs(5), async {
        while contract.event_nonce() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("relayer should reach nonce 3");

    shutdown.cancel();
    run.await.unwrap().unwrap();

    let nonces: Vec<u64> = contract
        .submissions()
        .iter()
        .map(|s| match s {
            Submission::Valset { nonce, .. } | Submission::DataRoot { nonce, .. } => *nonce,
        })
        .collect();
    assert_eq!(nonces, vec![2, 3]);

    let stats = h.stats.read().await;
    assert!(stats.started);
    assert_eq!(stats.valsets_relayed, 1);
    assert_eq!(stats.data_commitments_relayed, 1);
    assert_eq!(stats.last_relayed_nonce, 3);
}

#[tokio::test]
async fn test_shutdown_stops_idle_loops() {
    let chain = seeded_chain();
    let contract = MockContract::at_nonce(3);
    let h = harness(&chain, &contract);

    let shutdown = CancellationToken::new();
    let run = tokio::spawn(h.relayer.clone().run(shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("relayer should stop")
        .unwrap()
        .unwrap();
    assert!(contract.submissions().is_empty());
}

