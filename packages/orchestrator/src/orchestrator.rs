//! Attestation confirm pipeline
//!
//! Nonces arrive on one channel, from the live subscription and from replay.
//! The dispatcher drops nonces it has already routed, fetches each
//! attestation and hands it to the bounded queue of its kind, parking it in
//! that kind's backlog while the queue is full. One worker per kind signs and
//! broadcasts the confirm, so the two kinds never wait on each other.
//!
//! ```text
//! subscription ─┐                      ┌─> valset backlog ─> valset queue ─> valset worker
//!               ├─> nonces ─> dispatch ┤
//! replay ───────┘                      └─> dc backlog ─────> dc queue ─────> data commitment worker
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use eyre::{eyre, Result, WrapErr};
use qgb_rs::client::{AppQuerier, TxBroadcaster};
use qgb_rs::retry::{is_skipped, with_retry, RetryPolicy};
use qgb_rs::{AttestationKind, AttestationRequest, DataCommitment, Valset};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::NonceCache;
use crate::server::{SharedMetrics, SharedStats};
use crate::signer::ConfirmSigner;

/// What handling one attestation amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// A confirm was broadcast in the given transaction
    Broadcast { tx_hash: String },
    /// This orchestrator's confirm is already on chain
    AlreadyConfirmed,
}

/// Signs every attestation it is handed and broadcasts the confirm
pub struct Orchestrator {
    querier: Arc<dyn AppQuerier>,
    broadcaster: Arc<dyn TxBroadcaster>,
    signer: ConfirmSigner,
    retry: RetryPolicy,
    queue_capacity: usize,
    seen: Mutex<NonceCache>,
    stats: SharedStats,
    metrics: SharedMetrics,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        querier: Arc<dyn AppQuerier>,
        broadcaster: Arc<dyn TxBroadcaster>,
        signer: ConfirmSigner,
        retry: RetryPolicy,
        queue_capacity: usize,
        seen: NonceCache,
        stats: SharedStats,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            querier,
            broadcaster,
            signer,
            retry,
            queue_capacity,
            seen: Mutex::new(seen),
            stats,
            metrics,
        }
    }

    /// Run the dispatcher and both workers until `shutdown` fires or `nonces`
    /// closes.
    pub async fn run(
        self: Arc<Self>,
        nonces: mpsc::Receiver<u64>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        {
            let mut stats = self.stats.write().await;
            stats.orchestrator_address = self.broadcaster.orchestrator_address();
            stats.evm_address = self.signer.evm_address().to_checksum(None);
            stats.started = true;
        }
        info!(
            orchestrator = %self.broadcaster.orchestrator_address(),
            evm_address = %self.signer.evm_address(),
            "Orchestrator started"
        );

        let (valset_tx, valset_rx) = mpsc::channel(self.queue_capacity);
        let (dc_tx, dc_rx) = mpsc::channel(self.queue_capacity);

        let mut tasks = JoinSet::new();
        tasks.spawn(self.clone().dispatch(nonces, valset_tx, dc_tx, shutdown.clone()));
        tasks.spawn(
            self.clone()
                .work(AttestationKind::Valset, valset_rx, shutdown.clone()),
        );
        tasks.spawn(
            self.clone()
                .work(AttestationKind::DataCommitment, dc_rx, shutdown.clone()),
        );

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| eyre!("orchestrator task panicked: {}", e))?;
            if let Err(e) = outcome {
                error!(error = %e, "Orchestrator task failed, shutting down");
                shutdown.cancel();
                result = Err(e);
            }
        }

        info!("Orchestrator stopped");
        result
    }

    /// Route each fetched attestation to its kind's queue.
    ///
    /// A full queue never blocks the dispatcher: attestations wait in a
    /// per-kind backlog until their worker has room, so a stalled valset
    /// worker cannot hold back data commitment confirms.
    async fn dispatch(
        self: Arc<Self>,
        mut nonces: mpsc::Receiver<u64>,
        valset_tx: mpsc::Sender<AttestationRequest>,
        dc_tx: mpsc::Sender<AttestationRequest>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut valset_backlog: VecDeque<AttestationRequest> = VecDeque::new();
        let mut dc_backlog: VecDeque<AttestationRequest> = VecDeque::new();
        let mut nonces_open = true;

        loop {
            if !nonces_open && valset_backlog.is_empty() && dc_backlog.is_empty() {
                debug!("Nonce channel closed, dispatcher stopping");
                return Ok(());
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                permit = valset_tx.reserve(), if !valset_backlog.is_empty() => {
                    let permit = permit.map_err(|_| eyre!("Valset worker stopped unexpectedly"))?;
                    if let Some(attestation) = valset_backlog.pop_front() {
                        permit.send(attestation);
                    }
                }
                permit = dc_tx.reserve(), if !dc_backlog.is_empty() => {
                    let permit = permit
                        .map_err(|_| eyre!("Data commitment worker stopped unexpectedly"))?;
                    if let Some(attestation) = dc_backlog.pop_front() {
                        permit.send(attestation);
                    }
                }
                next = nonces.recv(), if nonces_open => match next {
                    Some(nonce) => {
                        if let Some(attestation) = self.fetch(nonce).await {
                            match attestation.kind() {
                                AttestationKind::Valset => valset_backlog.push_back(attestation),
                                AttestationKind::DataCommitment => {
                                    dc_backlog.push_back(attestation)
                                }
                            }
                        }
                    }
                    None => nonces_open = false,
                },
            }
        }
    }

    /// Fetch the attestation behind a nonce not dispatched before.
    async fn fetch(&self, nonce: u64) -> Option<AttestationRequest> {
        if !self.mark_seen(nonce).await {
            debug!(nonce, "Nonce already dispatched, skipping");
            return None;
        }

        match with_retry(&self.retry, |_| self.querier.attestation_by_nonce(nonce)).await {
            Ok(Some(attestation)) => Some(attestation),
            Ok(None) => {
                warn!(nonce, "Attestation not found, it may have been pruned");
                None
            }
            Err(e) => {
                error!(nonce, error = %e, "Failed to fetch attestation");
                self.forget(nonce).await;
                None
            }
        }
    }

    async fn work(
        self: Arc<Self>,
        kind: AttestationKind,
        mut queue: mpsc::Receiver<AttestationRequest>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        debug!(kind = %kind, "Worker started");
        loop {
            let attestation = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                next = queue.recv() => match next {
                    Some(attestation) => attestation,
                    None => return Ok(()),
                },
            };
            // a broadcast stuck on the node must not outlive shutdown
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = self.handle(&attestation) => {}
            }
        }
    }

    /// Process one attestation and record the outcome. Failures are logged and
    /// do not stop the worker.
    async fn handle(&self, attestation: &AttestationRequest) {
        let nonce = attestation.nonce();
        let kind = attestation.kind();

        match self.process_attestation(attestation).await {
            Ok(ConfirmOutcome::Broadcast { tx_hash }) => {
                info!(nonce, kind = %kind, tx_hash = %tx_hash, "Confirm broadcast");
                self.metrics.confirms_broadcast_total.inc();
                let mut stats = self.stats.write().await;
                stats.confirms_broadcast += 1;
                stats.last_processed_nonce = stats.last_processed_nonce.max(nonce);
            }
            Ok(ConfirmOutcome::AlreadyConfirmed) => {
                debug!(nonce, kind = %kind, "Attestation already confirmed");
                self.metrics.confirms_skipped_total.inc();
                let mut stats = self.stats.write().await;
                stats.confirms_skipped += 1;
                stats.last_processed_nonce = stats.last_processed_nonce.max(nonce);
            }
            Err(e) => {
                error!(nonce, kind = %kind, error = %format!("{:#}", e), "Failed to confirm attestation");
                self.metrics.broadcast_failures_total.inc();
                self.stats.write().await.broadcast_failures += 1;
                self.forget(nonce).await;
            }
        }
    }

    /// Sign and broadcast the confirm for `attestation`, unless this
    /// orchestrator already confirmed it.
    pub async fn process_attestation(
        &self,
        attestation: &AttestationRequest,
    ) -> Result<ConfirmOutcome> {
        match attestation {
            AttestationRequest::Valset(valset) => self.confirm_valset(valset).await,
            AttestationRequest::DataCommitment(dc) => self.confirm_data_commitment(dc).await,
        }
    }

    async fn confirm_valset(&self, valset: &Valset) -> Result<ConfirmOutcome> {
        let nonce = valset.nonce;
        let orchestrator = self.broadcaster.orchestrator_address();

        let existing = with_retry(&self.retry, |_| {
            self.querier.valset_confirm(nonce, &orchestrator)
        })
        .await
        .wrap_err_with(|| format!("Failed to query valset confirm for nonce {}", nonce))?;
        if existing.is_some() {
            return Ok(ConfirmOutcome::AlreadyConfirmed);
        }

        let confirm = self
            .signer
            .sign_valset(valset, &orchestrator)
            .wrap_err_with(|| format!("Failed to sign valset {}", nonce))?;

        let result = with_retry(&self.retry, |attempt| {
            let confirm = confirm.clone();
            async move {
                debug!(nonce, attempt, "Broadcasting valset confirm");
                self.broadcaster.broadcast_valset_confirm(confirm).await
            }
        })
        .await;

        broadcast_outcome(nonce, result)
    }

    async fn confirm_data_commitment(&self, dc: &DataCommitment) -> Result<ConfirmOutcome> {
        let nonce = dc.nonce;
        let orchestrator = self.broadcaster.orchestrator_address();

        let existing = with_retry(&self.retry, |_| {
            self.querier
                .data_commitment_confirm(dc.begin_block, dc.end_block, &orchestrator)
        })
        .await
        .wrap_err_with(|| {
            format!(
                "Failed to query data commitment confirm for [{}, {})",
                dc.begin_block, dc.end_block
            )
        })?;
        if existing.is_some() {
            return Ok(ConfirmOutcome::AlreadyConfirmed);
        }

        let root = with_retry(&self.retry, |_| {
            self.querier
                .data_commitment_root(dc.begin_block, dc.end_block)
        })
        .await
        .wrap_err_with(|| {
            format!(
                "Failed to get data commitment root for [{}, {})",
                dc.begin_block, dc.end_block
            )
        })?;

        let confirm = self
            .signer
            .sign_data_commitment(dc, root, &orchestrator)
            .wrap_err_with(|| format!("Failed to sign data commitment {}", nonce))?;

        let result = with_retry(&self.retry, |attempt| {
            let confirm = confirm.clone();
            async move {
                debug!(nonce, attempt, "Broadcasting data commitment confirm");
                self.broadcaster
                    .broadcast_data_commitment_confirm(confirm)
                    .await
            }
        })
        .await;

        broadcast_outcome(nonce, result)
    }

    /// Returns false if the nonce was already dispatched recently.
    async fn mark_seen(&self, nonce: u64) -> bool {
        let mut seen = self.seen.lock().await;
        let fresh = seen.insert(nonce);
        self.metrics.dedupe_cache_size.set(seen.len() as i64);
        fresh
    }

    async fn forget(&self, nonce: u64) {
        let mut seen = self.seen.lock().await;
        seen.remove(nonce);
        self.metrics.dedupe_cache_size.set(seen.len() as i64);
    }
}

fn broadcast_outcome(nonce: u64, result: Result<String>) -> Result<ConfirmOutcome> {
    match result {
        Ok(tx_hash) => Ok(ConfirmOutcome::Broadcast { tx_hash }),
        // the chain already holds a confirm from us
        Err(e) if is_skipped(&e) => Ok(ConfirmOutcome::AlreadyConfirmed),
        Err(e) => Err(e.wrap_err(format!("Failed to broadcast confirm for nonce {}", nonce))),
    }
}
