//! Attestation event subscription over the Tendermint websocket

use std::collections::HashMap;

use eyre::{eyre, Result};
use futures::StreamExt;
use tendermint_rpc::event::Event;
use tendermint_rpc::query::{EventType, Query};
use tendermint_rpc::{SubscriptionClient, WebSocketClient};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::retry::{with_retry, RetryPolicy};

/// Event attribute carrying the nonce of a newly stored attestation
pub const ATTESTATION_NONCE_KEY: &str = "attestation_request.nonce";

/// Human-readable form of the subscription query
pub const ATTESTATION_EVENT_QUERY: &str =
    "tm.event='NewBlock' AND attestation_request.nonce EXISTS";

fn attestation_query() -> Query {
    Query::from(EventType::NewBlock).and_exists(ATTESTATION_NONCE_KEY)
}

/// Pull attestation nonces out of a block's flattened event attributes,
/// in ascending order.
pub fn extract_nonces(events: &HashMap<String, Vec<String>>) -> Vec<u64> {
    let mut nonces: Vec<u64> = events
        .get(ATTESTATION_NONCE_KEY)
        .map(|values| {
            values
                .iter()
                .filter_map(|v| match v.parse() {
                    Ok(n) => Some(n),
                    Err(_) => {
                        warn!(value = %v, "Ignoring malformed attestation nonce attribute");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    nonces.sort_unstable();
    nonces.dedup();
    nonces
}

fn nonces_of(event: &Event) -> Vec<u64> {
    event
        .events
        .as_ref()
        .map(|events| {
            let events: HashMap<String, Vec<String>> =
                events.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            extract_nonces(&events)
        })
        .unwrap_or_default()
}

/// Forward the nonce of every new attestation to `tx` until `shutdown` fires.
///
/// Connection and subscription failures are retried under `policy`; a dropped
/// stream is re-established. When a round of reconnects exhausts the policy,
/// the failure is logged and another round starts after a backoff. Returns an
/// error only when the receiving side has gone away.
pub async fn subscribe_attestation_nonces(
    ws_url: String,
    policy: RetryPolicy,
    tx: mpsc::Sender<u64>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut failed_rounds = 0;
    loop {
        if shutdown.is_cancelled() {
            return Ok(());
        }

        let connect = with_retry(&policy, |attempt| {
            let url = ws_url.clone();
            async move {
                debug!(url = %url, attempt, "Connecting to Tendermint websocket");
                let (client, driver) = WebSocketClient::new(url.as_str())
                    .await
                    .map_err(|e| eyre!("websocket connection failed: {}", e))?;
                let driver_handle = tokio::spawn(async move { driver.run().await });
                let subscription = client
                    .subscribe(attestation_query())
                    .await
                    .map_err(|e| eyre!("subscription failed: {}", e))?;
                Ok((client, driver_handle, subscription))
            }
        });

        let connected = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            res = connect => res,
        };
        let (client, driver_handle, mut subscription) = match connected {
            Ok(connected) => {
                failed_rounds = 0;
                connected
            }
            Err(e) => {
                let backoff = policy.backoff_for_attempt(failed_rounds);
                failed_rounds += 1;
                error!(
                    error = %e,
                    rounds = failed_rounds,
                    ?backoff,
                    "Failed to subscribe to attestation events, retrying"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(backoff) => {}
                }
                continue;
            }
        };

        info!(query = ATTESTATION_EVENT_QUERY, "Subscribed to attestation events");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = client.close();
                    let _ = driver_handle.await;
                    return Ok(());
                }
                next = subscription.next() => match next {
                    Some(Ok(event)) => {
                        for nonce in nonces_of(&event) {
                            debug!(nonce, "Attestation event received");
                            if tx.send(nonce).await.is_err() {
                                let _ = client.close();
                                return Err(eyre!("Attestation nonce receiver dropped"));
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Attestation subscription error, reconnecting");
                        break;
                    }
                    None => {
                        warn!("Attestation subscription closed, reconnecting");
                        break;
                    }
                }
            }
        }

        let _ = client.close();
        let _ = driver_handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_nonces_sorted_and_deduplicated() {
        let mut events = HashMap::new();
        events.insert(
            ATTESTATION_NONCE_KEY.to_string(),
            vec!["7".to_string(), "5".to_string(), "7".to_string(), "x".to_string()],
        );
        events.insert("tm.event".to_string(), vec!["NewBlock".to_string()]);

        assert_eq!(extract_nonces(&events), vec![5, 7]);
    }

    #[test]
    fn test_extract_nonces_without_attribute() {
        let events = HashMap::new();
        assert!(extract_nonces(&events).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_node_keeps_retrying_until_shutdown() {
        let policy = RetryPolicy::new(
            1,
            std::time::Duration::from_millis(1),
            std::time::Duration::from_millis(5),
        );
        let (tx, _rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();

        // nothing listens on port 1
        let handle = tokio::spawn(subscribe_attestation_nonces(
            "ws://127.0.0.1:1/websocket".to_string(),
            policy,
            tx,
            shutdown.clone(),
        ));

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!handle.is_finished(), "exhausted reconnects must not end the subscription");

        shutdown.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("subscription should stop after cancellation")
            .unwrap();
        assert!(result.is_ok());
    }
}
