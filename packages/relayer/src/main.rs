//! QGB Relayer
//!
//! Moves attestations from the chain to the QGB contract. Two loops run side
//! by side, one per attestation kind; each waits for two thirds of the valset
//! to confirm the next attestation the contract is missing and submits it with
//! the signatures in valset order.

use std::sync::Arc;

use eyre::WrapErr;
use qgb_rs::client::{AppQuerier, RestQuerier};
use qgb_rs::EvmEncoder;
use relayer::config::Config;
use relayer::evm_client::{connect, BridgeContract};
use relayer::relayer::Relayer;
use relayer::server::{start_server, Metrics, RelayerStats};
use tokio::sync::RwLock;
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

    info!("Starting QGB Relayer");

    let config = Config::load()?;
    info!(
        app_lcd = %config.app_lcd_url,
        evm_rpc = %config.evm_rpc_url,
        evm_chain_id = config.evm_chain_id,
        contract = %config.qgb_contract_address,
        "Configuration loaded"
    );

    let querier: Arc<dyn AppQuerier> = Arc::new(
        RestQuerier::new(&config.app_lcd_url, &config.tendermint_rpc_url)
            .wrap_err("Failed to create app querier")?,
    );

    let evm = connect(
        &config.evm_rpc_url,
        &config.qgb_contract_address,
        &config.evm_private_key,
    )?;
    evm.check_chain_id(config.evm_chain_id).await?;
    let relayer_address = evm.relayer_address();
    let contract: Arc<dyn BridgeContract> = Arc::new(evm);

    let stats = Arc::new(RwLock::new(RelayerStats {
        relayer_address: relayer_address.to_checksum(None),
        ..Default::default()
    }));
    let metrics = Arc::new(Metrics::new());

    let relayer = Arc::new(Relayer::new(
        querier,
        contract,
        EvmEncoder::new(config.encoder_config()?),
        config.relayer_settings(),
        config.retry_policy(),
        stats.clone(),
        metrics.clone(),
    ));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_token.cancel();
    });

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

    tasks.spawn(relayer.run(shutdown.clone()));

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

    info!("QGB Relayer stopped");
    result
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,qgb_relayer=debug,relayer=debug"));

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
