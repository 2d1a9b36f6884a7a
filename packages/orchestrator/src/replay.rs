//! Startup replay of attestations created while the orchestrator was down

use eyre::{eyre, Result, WrapErr};
use qgb_rs::client::AppQuerier;
use qgb_rs::retry::{with_retry, RetryPolicy};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Enqueue every stored attestation nonce, newest first, for the dispatcher.
///
/// Walks from the latest nonce down to the earliest available one and stops
/// at the first attestation anchored below the last unbonding height: older
/// attestations can no longer be relayed, so confirming them is wasted work.
/// Already-confirmed nonces are filtered by the workers.
///
/// A pass that exhausts `retry` is logged and started over after a backoff,
/// until it completes or `shutdown` fires. The only error returned is the
/// nonce receiver going away.
///
/// Returns the number of nonces enqueued by the pass that completed.
pub async fn replay_missing_nonces(
    querier: &dyn AppQuerier,
    retry: &RetryPolicy,
    tx: &mpsc::Sender<u64>,
    shutdown: &CancellationToken,
) -> Result<u64> {
    let mut failed_passes = 0;
    loop {
        match replay_pass(querier, retry, tx, shutdown).await {
            Ok(enqueued) => return Ok(enqueued),
            Err(e) if tx.is_closed() => return Err(e),
            Err(e) => {
                let backoff = retry.backoff_for_attempt(failed_passes);
                failed_passes += 1;
                error!(
                    error = %format!("{:#}", e),
                    passes = failed_passes,
                    ?backoff,
                    "Replay failed, starting over"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(0),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }
}

async fn replay_pass(
    querier: &dyn AppQuerier,
    retry: &RetryPolicy,
    tx: &mpsc::Sender<u64>,
    shutdown: &CancellationToken,
) -> Result<u64> {
    let latest = with_retry(retry, |_| querier.latest_attestation_nonce())
        .await
        .wrap_err("Failed to get latest attestation nonce")?;
    if latest == 0 {
        info!("No attestations to replay");
        return Ok(0);
    }

    let earliest = with_retry(retry, |_| querier.earliest_attestation_nonce())
        .await
        .wrap_err("Failed to get earliest attestation nonce")?
        .max(1);
    let unbonding_height = with_retry(retry, |_| querier.last_unbonding_height())
        .await
        .wrap_err("Failed to get last unbonding height")?;

    info!(latest, earliest, unbonding_height, "Replaying attestations");

    let mut enqueued = 0;
    for nonce in (earliest..=latest).rev() {
        if shutdown.is_cancelled() {
            break;
        }

        let attestation = with_retry(retry, |_| querier.attestation_by_nonce(nonce))
            .await
            .wrap_err_with(|| format!("Failed to get attestation {}", nonce))?;
        let Some(attestation) = attestation else {
            debug!(nonce, "Attestation pruned during replay, stopping");
            break;
        };

        if attestation.height() < unbonding_height {
            debug!(
                nonce,
                height = attestation.height(),
                unbonding_height,
                "Reached attestations older than the last unbonding, stopping"
            );
            break;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            sent = tx.send(nonce) => {
                if sent.is_err() {
                    return Err(eyre!("Nonce receiver dropped during replay"));
                }
            }
        }
        enqueued += 1;
    }

    info!(enqueued, "Replay finished");
    Ok(enqueued)
}
