//! Waiting for two-thirds of the valset to confirm an attestation

use std::time::Duration;

use alloy::primitives::B256;
use eyre::{eyre, Result, WrapErr};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::AppQuerier;
use crate::quorum::{order_signatures, tally_confirms, QuorumError, QuorumTally};
use crate::signature::EthSignature;
use crate::types::{AttestationRequest, DataCommitmentConfirm, Valset, ValsetConfirm};

/// Timing for [`query_two_thirds_confirms`]
#[derive(Debug, Clone)]
pub struct ConfirmQuery {
    /// Give up after this long
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConfirmQuery {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Confirms gathered for one attestation, restricted to valset members
#[derive(Debug, Clone)]
pub enum ConfirmSet {
    Valset(Vec<ValsetConfirm>),
    DataCommitment(Vec<DataCommitmentConfirm>),
}

impl ConfirmSet {
    pub fn len(&self) -> usize {
        match self {
            ConfirmSet::Valset(c) => c.len(),
            ConfirmSet::DataCommitment(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tally(&self, valset: &Valset) -> QuorumTally {
        match self {
            ConfirmSet::Valset(c) => tally_confirms(valset, c),
            ConfirmSet::DataCommitment(c) => tally_confirms(valset, c),
        }
    }

    /// Signatures in `valset` member order
    pub fn ordered_signatures(&self, valset: &Valset) -> Result<Vec<EthSignature>, QuorumError> {
        match self {
            ConfirmSet::Valset(c) => order_signatures(valset, c),
            ConfirmSet::DataCommitment(c) => order_signatures(valset, c),
        }
    }
}

/// A quorum of confirms for one attestation
#[derive(Debug, Clone)]
pub struct QuorumConfirms {
    /// Valset the confirms were counted against
    pub valset: Valset,
    pub confirms: ConfirmSet,
    pub tally: QuorumTally,
    /// Tuple root the confirms signed, for data commitments
    pub data_root: Option<B256>,
}

fn is_member(valset: &Valset, eth_address: &str) -> bool {
    crate::signature::parse_evm_address(eth_address)
        .map(|addr| valset.member(&addr).is_some())
        .unwrap_or(false)
}

fn same_root(commitment: &str, root: &B256) -> bool {
    let stripped = commitment.strip_prefix("0x").unwrap_or(commitment);
    hex::decode(stripped)
        .map(|bytes| bytes.as_slice() == root.as_slice())
        .unwrap_or(false)
}

async fn collect_confirms(
    querier: &dyn AppQuerier,
    attestation: &AttestationRequest,
    valset: &Valset,
    data_root: Option<&B256>,
) -> Result<ConfirmSet> {
    let nonce = attestation.nonce();
    match attestation {
        AttestationRequest::Valset(_) => {
            let confirms = querier
                .valset_confirms(nonce)
                .await?
                .into_iter()
                .filter(|c| is_member(valset, &c.eth_address))
                .collect();
            Ok(ConfirmSet::Valset(confirms))
        }
        AttestationRequest::DataCommitment(dc) => {
            let confirms = querier
                .data_commitment_confirms(nonce)
                .await?
                .into_iter()
                .filter(|c| c.begin_block == dc.begin_block && c.end_block == dc.end_block)
                .filter(|c| data_root.map_or(true, |root| same_root(&c.commitment, root)))
                .filter(|c| is_member(valset, &c.eth_address))
                .collect();
            Ok(ConfirmSet::DataCommitment(confirms))
        }
    }
}

/// Poll confirms for `attestation` until members holding at least two thirds of
/// the power of the valset in effect for it have signed.
///
/// Confirms from non-members are discarded. Fails with
/// [`QuorumError::NotEnoughConfirms`] once `query.timeout` elapses.
pub async fn query_two_thirds_confirms(
    querier: &dyn AppQuerier,
    attestation: &AttestationRequest,
    query: &ConfirmQuery,
    shutdown: &CancellationToken,
) -> Result<QuorumConfirms> {
    let nonce = attestation.nonce();
    let valset = querier
        .last_valset_before_nonce(nonce)
        .await
        .wrap_err_with(|| format!("Failed to get valset in effect for nonce {}", nonce))?;

    let data_root = match attestation {
        AttestationRequest::DataCommitment(dc) => Some(
            querier
                .data_commitment_root(dc.begin_block, dc.end_block)
                .await?,
        ),
        AttestationRequest::Valset(_) => None,
    };

    let deadline = Instant::now() + query.timeout;

    loop {
        let confirms = collect_confirms(querier, attestation, &valset, data_root.as_ref()).await?;
        let tally = confirms.tally(&valset);

        if tally.reached() {
            info!(
                nonce,
                power = %tally.power,
                threshold = %tally.threshold,
                signers = tally.signers.len(),
                "Found two thirds of confirms"
            );
            return Ok(QuorumConfirms {
                valset,
                confirms,
                tally,
                data_root,
            });
        }

        debug!(
            nonce,
            power = %tally.power,
            threshold = %tally.threshold,
            confirms = confirms.len(),
            "Waiting for more confirms"
        );

        let now = Instant::now();
        if now >= deadline {
            return Err(QuorumError::NotEnoughConfirms {
                nonce,
                power: tally.power,
                threshold: tally.threshold,
            }
            .into());
        }
        let wait = query.poll_interval.min(deadline - now);

        tokio::select! {
            _ = shutdown.cancelled() => {
                return Err(eyre!("Shutdown while waiting for confirms of nonce {}", nonce));
            }
            _ = sleep(wait) => {}
        }
    }
}
