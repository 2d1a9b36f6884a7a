//! QGB Orchestrator
//!
//! Watches the chain for new attestation requests, signs each one with the
//! validator's EVM key and broadcasts the confirm back to the chain.
//!
//! # Modes
//!
//! Both run at startup and feed the same dispatcher:
//! - **Replay** - enqueue every stored attestation that may still need a
//!   confirm, newest first
//! - **Follow** - tail `attestation_request` events over the Tendermint
//!   websocket
//!
//! A confirm already on chain for this orchestrator is never re-broadcast, so
//! restarts are safe.

use std::sync::Arc;

use eyre::WrapErr;
use orchestrator::cache::NonceCache;
use orchestrator::config::Config;
use orchestrator::orchestrator::Orchestrator;
use orchestrator::replay::replay_missing_nonces;
use orchestrator::server::{start_server, Metrics, OrchestratorStats};
use orchestrator::signer::ConfirmSigner;
use qgb_rs::client::{
    subscribe_attestation_nonces, AppQuerier, CosmosBroadcaster, RestQuerier, TxBroadcaster,
};
use qgb_rs::{EvmEncoder, EvmSigner};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!("Starting QGB Orchestrator");

    let config = Config::load()?;
    info!(
        app_lcd = %config.app_lcd_url,
        tendermint_rpc = %config.tendermint_rpc_url,
        chain_id = %config.chain_id,
        "Configuration loaded"
    );

    let querier: Arc<dyn AppQuerier> = Arc::new(
        RestQuerier::new(&config.app_lcd_url, &config.tendermint_rpc_url)
            .wrap_err("Failed to create app querier")?,
    );
    let broadcaster: Arc<dyn TxBroadcaster> = Arc::new(
        CosmosBroadcaster::new(&config.broadcaster_config())
            .wrap_err("Failed to create transaction broadcaster")?,
    );
    let signer = ConfirmSigner::new(
        EvmSigner::from_hex(&config.evm_private_key).wrap_err("Invalid EVM_PRIVATE_KEY")?,
        EvmEncoder::new(config.encoder_config()?),
    );

    let stats = Arc::new(RwLock::new(OrchestratorStats::default()));
    let metrics = Arc::new(Metrics::new());
    let retry = config.retry_policy();

    let orchestrator = Arc::new(Orchestrator::new(
        querier.clone(),
        broadcaster,
        signer,
        retry.clone(),
        config.queue_capacity,
        NonceCache::new(config.dedupe_cache_size, config.dedupe_cache_ttl_secs),
        stats.clone(),
        metrics.clone(),
    ));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_token.cancel();
    });

    let (nonce_tx, nonce_rx) = mpsc::channel(config.queue_capacity);
    let mut tasks = JoinSet::new();

    // Health server
    {
        let token = shutdown.clone();
        let port = config.health_port;
        tasks.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => Ok(()),
                res = start_server("0.0.0.0", port, stats, metrics) => res,
            }
        });
    }

    // Follow
    tasks.spawn(subscribe_attestation_nonces(
        config.websocket_url(),
        retry.clone(),
        nonce_tx.clone(),
        shutdown.clone(),
    ));

    // Replay
    {
        let querier = querier.clone();
        let retry = retry.clone();
        let tx = nonce_tx;
        let token = shutdown.clone();
        tasks.spawn(async move {
            replay_missing_nonces(querier.as_ref(), &retry, &tx, &token)
                .await
                .map(|_| ())
        });
    }

    tasks.spawn(orchestrator.run(nonce_rx, shutdown.clone()));

    let mut result = Ok(());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %format!("{:#}", e), "Task failed, shutting down");
                shutdown.cancel();
                if result.is_ok() {
                    result = Err(e);
                }
            }
            Err(e) => {
                error!(error = %e, "Task panicked, shutting down");
                shutdown.cancel();
            }
        }
    }

    info!("QGB Orchestrator stopped");
    result
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,qgb_orchestrator=debug,orchestrator=debug"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
