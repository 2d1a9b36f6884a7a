//! Attestation relay loops
//!
//! One loop per attestation kind. Each tick reads the contract's event nonce
//! and, when the chain is ahead, looks at attestation `contract_nonce + 1`.
//! Only the loop of the matching kind relays it; the other stays idle.
//!
//! Relaying waits for two thirds of the power of the valset in effect to
//! confirm, orders the signatures as that valset's members, checks every one
//! recovers to its member and submits. The contract enforces a monotonic
//! nonce, so a failed tick is simply retried on the next one.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use eyre::{eyre, Result, WrapErr};
use qgb_rs::client::{query_two_thirds_confirms, AppQuerier, ConfirmQuery};
use qgb_rs::retry::{with_retry, RetryPolicy};
use qgb_rs::{
    AttestationKind, AttestationRequest, EthSignature, EvmEncoder, QuorumError, Valset,
};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::evm_client::BridgeContract;
use crate::server::{SharedMetrics, SharedStats};

/// Timing of the relay loops
#[derive(Debug, Clone)]
pub struct RelayerSettings {
    /// Pause between ticks that had nothing to relay
    pub poll_interval: Duration,
    pub confirm_query: ConfirmQuery,
    /// Contract nonce polls after a submission
    pub nonce_wait_polls: u32,
    pub nonce_wait_interval: Duration,
}

impl Default for RelayerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            confirm_query: ConfirmQuery::default(),
            nonce_wait_polls: 60,
            nonce_wait_interval: Duration::from_secs(10),
        }
    }
}

/// Result of one relay tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The contract has every attestation the chain produced
    CaughtUp,
    /// The next attestation belongs to the other loop
    OtherKind { nonce: u64, kind: AttestationKind },
    Relayed { nonce: u64, tx_hash: B256 },
}

pub struct Relayer {
    querier: Arc<dyn AppQuerier>,
    contract: Arc<dyn BridgeContract>,
    encoder: EvmEncoder,
    settings: RelayerSettings,
    retry: RetryPolicy,
    stats: SharedStats,
    metrics: SharedMetrics,
}

impl Relayer {
    pub fn new(
        querier: Arc<dyn AppQuerier>,
        contract: Arc<dyn BridgeContract>,
        encoder: EvmEncoder,
        settings: RelayerSettings,
        retry: RetryPolicy,
        stats: SharedStats,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            querier,
            contract,
            encoder,
            settings,
            retry,
            stats,
            metrics,
        }
    }

    /// Run both relay loops until `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        self.stats.write().await.started = true;
        info!("Relayer started");

        let mut tasks = JoinSet::new();
        for kind in [AttestationKind::Valset, AttestationKind::DataCommitment] {
            tasks.spawn(self.clone().relay_loop(kind, shutdown.clone()));
        }

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| eyre!("relay task panicked: {}", e))?;
            if let Err(e) = outcome {
                error!(error = %e, "Relay loop failed, shutting down");
                shutdown.cancel();
                result = Err(e);
            }
        }

        info!("Relayer stopped");
        result
    }

    async fn relay_loop(
        self: Arc<Self>,
        kind: AttestationKind,
        shutdown: CancellationToken,
    ) -> Result<()> {
        debug!(kind = %kind, "Relay loop started");
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let idle = match self.tick(kind, &shutdown).await {
                Ok(TickOutcome::Relayed { .. }) => false,
                Ok(TickOutcome::CaughtUp) => true,
                Ok(TickOutcome::OtherKind { nonce, kind: other }) => {
                    debug!(
                        kind = %kind,
                        nonce,
                        other = %other,
                        "Next attestation is for the other loop"
                    );
                    true
                }
                Err(e) => {
                    if shutdown.is_cancelled() {
                        return Ok(());
                    }
                    error!(kind = %kind, error = %format!("{:#}", e), "Relay tick failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = sleep(self.settings.poll_interval) => {}
                }
            }
        }
    }

    /// Relay the next attestation if it is of `kind`. Failures are counted
    /// before being returned.
    pub async fn tick(
        &self,
        kind: AttestationKind,
        shutdown: &CancellationToken,
    ) -> Result<TickOutcome> {
        let result = self.try_tick(kind, shutdown).await;
        if let Err(e) = &result {
            self.record_failure(e).await;
        }
        result
    }

    async fn try_tick(
        &self,
        kind: AttestationKind,
        shutdown: &CancellationToken,
    ) -> Result<TickOutcome> {
        let contract_nonce = with_retry(&self.retry, |_| self.contract.last_event_nonce())
            .await
            .wrap_err("Failed to read contract event nonce")?;
        self.stats.write().await.last_contract_nonce = contract_nonce;

        let latest = with_retry(&self.retry, |_| self.querier.latest_attestation_nonce())
            .await
            .wrap_err("Failed to read latest attestation nonce")?;

        if contract_nonce >= latest {
            return Ok(TickOutcome::CaughtUp);
        }

        let nonce = contract_nonce + 1;
        let attestation = with_retry(&self.retry, |_| self.querier.attestation_by_nonce(nonce))
            .await?
            .ok_or_else(|| eyre!("Attestation {} not found on chain", nonce))?;

        if attestation.kind() != kind {
            return Ok(TickOutcome::OtherKind {
                nonce,
                kind: attestation.kind(),
            });
        }

        let tx_hash = match &attestation {
            AttestationRequest::Valset(valset) => {
                self.relay_valset(&attestation, valset, shutdown).await?
            }
            AttestationRequest::DataCommitment(_) => {
                self.relay_data_commitment(&attestation, shutdown).await?
            }
        };

        self.record_relayed(kind, nonce).await;
        Ok(TickOutcome::Relayed { nonce, tx_hash })
    }

    async fn relay_valset(
        &self,
        attestation: &AttestationRequest,
        new_valset: &Valset,
        shutdown: &CancellationToken,
    ) -> Result<B256> {
        let nonce = new_valset.nonce;
        let quorum = query_two_thirds_confirms(
            self.querier.as_ref(),
            attestation,
            &self.settings.confirm_query,
            shutdown,
        )
        .await?;

        let signatures = quorum.confirms.ordered_signatures(&quorum.valset)?;
        verify_ordered(&quorum.valset, &signatures, self.encoder.valset_digest(new_valset))?;

        info!(
            nonce,
            members = new_valset.members.len(),
            signers = quorum.tally.signers.len(),
            "Relaying valset"
        );

        let tx_hash = with_retry(&self.retry, |_| {
            self.contract
                .update_validator_set(new_valset, &quorum.valset, &signatures)
        })
        .await
        .wrap_err_with(|| format!("Failed to submit valset {}", nonce))?;

        self.wait_for_contract_nonce(AttestationKind::Valset, nonce, shutdown)
            .await?;
        Ok(tx_hash)
    }

    async fn relay_data_commitment(
        &self,
        attestation: &AttestationRequest,
        shutdown: &CancellationToken,
    ) -> Result<B256> {
        let nonce = attestation.nonce();
        let quorum = query_two_thirds_confirms(
            self.querier.as_ref(),
            attestation,
            &self.settings.confirm_query,
            shutdown,
        )
        .await?;

        let tuple_root = quorum
            .data_root
            .ok_or_else(|| eyre!("No data root returned for data commitment {}", nonce))?;

        let signatures = quorum.confirms.ordered_signatures(&quorum.valset)?;
        verify_ordered(
            &quorum.valset,
            &signatures,
            self.encoder.data_commitment_digest(nonce, tuple_root),
        )?;

        info!(nonce, tuple_root = %tuple_root, "Relaying data commitment");

        let tx_hash = with_retry(&self.retry, |_| {
            self.contract
                .submit_data_root_tuple_root(nonce, tuple_root, &quorum.valset, &signatures)
        })
        .await
        .wrap_err_with(|| format!("Failed to submit data commitment {}", nonce))?;

        self.wait_for_contract_nonce(AttestationKind::DataCommitment, nonce, shutdown)
            .await?;
        Ok(tx_hash)
    }

    /// Poll the contract until its nonce for `kind` reaches `nonce`.
    async fn wait_for_contract_nonce(
        &self,
        kind: AttestationKind,
        nonce: u64,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        for poll in 0..self.settings.nonce_wait_polls {
            let current = match kind {
                AttestationKind::Valset => self.contract.last_valset_nonce().await?,
                AttestationKind::DataCommitment => {
                    self.contract.last_data_root_tuple_root_nonce().await?
                }
            };
            if current >= nonce {
                info!(kind = %kind, nonce, "Contract accepted attestation");
                return Ok(());
            }

            debug!(kind = %kind, nonce, current, poll, "Waiting for contract nonce");
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = sleep(self.settings.nonce_wait_interval) => {}
            }
        }

        warn!(
            kind = %kind,
            nonce,
            polls = self.settings.nonce_wait_polls,
            "Contract nonce did not reach relayed attestation"
        );
        Ok(())
    }

    async fn record_relayed(&self, kind: AttestationKind, nonce: u64) {
        let mut stats = self.stats.write().await;
        match kind {
            AttestationKind::Valset => {
                stats.valsets_relayed += 1;
                self.metrics.valsets_relayed_total.inc();
            }
            AttestationKind::DataCommitment => {
                stats.data_commitments_relayed += 1;
                self.metrics.data_commitments_relayed_total.inc();
            }
        }
        stats.last_relayed_nonce = stats.last_relayed_nonce.max(nonce);
        self.metrics
            .last_relayed_nonce
            .set(stats.last_relayed_nonce as i64);
    }

    async fn record_failure(&self, e: &eyre::Report) {
        let mut stats = self.stats.write().await;
        if let Some(QuorumError::NotEnoughConfirms { .. }) = e.downcast_ref::<QuorumError>() {
            stats.quorum_timeouts += 1;
            self.metrics.quorum_timeouts_total.inc();
        }
        stats.relay_errors += 1;
        self.metrics.relay_errors_total.inc();
    }
}

/// Check each signature recovers to the member at the same position.
fn verify_ordered(
    valset: &Valset,
    signatures: &[EthSignature],
    digest: B256,
) -> Result<(), QuorumError> {
    for (member, signature) in valset.members.iter().zip(signatures) {
        qgb_rs::verify_signature(digest, signature, member.evm_address).map_err(|e| {
            QuorumError::InvalidSignature {
                member: member.evm_address,
                reason: e.to_string(),
            }
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use qgb_rs::{BridgeValidator, EncoderConfig, EvmSigner};

    fn signer(byte: u8) -> EvmSigner {
        EvmSigner::from_bytes(&[byte; 32]).unwrap()
    }

    #[test]
    fn test_verify_ordered_detects_wrong_signer() {
        let a = signer(1);
        let b = signer(2);
        let valset = Valset::new(
            1,
            1,
            DateTime::from_timestamp(0, 0).unwrap(),
            vec![
                BridgeValidator::new(a.address(), 60),
                BridgeValidator::new(b.address(), 40),
            ],
        )
        .unwrap();
        let encoder = EvmEncoder::new(EncoderConfig::new(B256::repeat_byte(0xab)));
        let digest = encoder.valset_digest(&valset);

        let good = vec![
            a.sign_digest(digest).unwrap(),
            b.sign_digest(digest).unwrap(),
        ];
        assert!(verify_ordered(&valset, &good, digest).is_ok());

        let swapped = vec![good[1], good[0]];
        let err = verify_ordered(&valset, &swapped, digest).unwrap_err();
        assert!(matches!(
            err,
            QuorumError::InvalidSignature { member, .. } if member == a.address()
        ));
    }
}
