//! linkup - cross-chain token linker orchestrator
//!
//! Deploys a token and linker on every configured chain, wires the linkers
//! into a full mesh, then exercises the link with one cross-chain transfer
//! and watches the destination until it settles.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use linkup::chain::ChainManager;
use linkup::config::Settings;
use linkup::contracts::{load_wallet, ArtifactSet, ClientMap, EvmTokenClient, TokenChain};
use linkup::error::LinkupError;
use linkup::gas::oracle_from_settings;
use linkup::metrics::MetricsServer;
use linkup::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting linkup v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains",
        settings.chains.len()
    );

    let manager = Arc::new(ChainManager::new(&settings)?);
    for (chain, healthy) in manager.health_check().await {
        if !healthy {
            anyhow::bail!(
                "Chain {} is unreachable over all configured RPC URLs",
                chain
            );
        }
    }
    info!("All chain connections healthy");

    let wallet = load_wallet(&settings.wallet)?;
    let artifacts = ArtifactSet::load(&settings.artifacts)?;

    let mut clients = ClientMap::new();
    for handle in manager.handles() {
        let client = EvmTokenClient::connect(
            handle.clone(),
            wallet.clone(),
            artifacts.clone(),
            settings.fees.gas_limit,
        )
        .await?;
        clients.insert(
            handle.name().to_string(),
            Arc::new(client) as Arc<dyn TokenChain>,
        );
    }

    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let oracle = oracle_from_settings(&settings, manager.clone());
    let orchestrator = Arc::new(Orchestrator::new(settings, manager, clients, oracle)?);

    let mut runner = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run().await }
    });

    let outcome = tokio::select! {
        result = &mut runner => result?,
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping...");
            orchestrator.stop().await;
            runner.await?
        }
    };

    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    match outcome {
        Ok(report) => {
            info!(
                final_balance = %report.final_balance,
                polls = report.polls,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "linkup run complete"
            );
            Ok(())
        }
        Err(LinkupError::Cancelled { phase }) => {
            info!(phase, "linkup run cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,linkup=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
