//! TAC Courier - headless TON-to-EVM cross-chain submission client
//!
//! The courier connects a TON wallet session, submits an EVM-bound proxy
//! message through the external cross-chain relay service, and tracks the
//! resulting operation's lifecycle to a terminal state.

use anyhow::Result;
use std::env;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod api;
mod config;
mod error;
mod metrics;
mod proxy;
mod sdk;
mod session;
mod submit;
mod track;

use api::AppState;
use config::Settings;
use metrics::MetricsServer;
use sdk::{HttpSdkConnector, HttpTracker, SdkParams};
use session::{SessionManager, StaticWalletConnector};
use submit::SubmissionClient;
use track::{StatusTracker, TrackerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting TAC Courier v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(network = %settings.sdk.network, "Loaded configuration");

    // Wallet session
    let connector = Arc::new(StaticWalletConnector::new(settings.wallet.address.clone()));
    let session = Arc::new(SessionManager::new(connector));
    session.connect().await?;

    // Submission client over the cross-chain SDK
    let sdk_connector = Arc::new(HttpSdkConnector::new(settings.sdk.clone()));
    let submission = Arc::new(SubmissionClient::new(
        sdk_connector,
        SdkParams {
            network: settings.sdk.network,
        },
        session.clone(),
    ));
    submission.initialize().await?;

    // Status tracker
    let tracker_api = Arc::new(HttpTracker::new(&settings.sdk)?);
    let tracker = Arc::new(StatusTracker::new(
        tracker_api,
        TrackerConfig::from(&settings.courier),
    ));

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = AppState {
            session: session.clone(),
            submission: submission.clone(),
            tracker: tracker.clone(),
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Submit the configured message and track it to completion
    let message =
        env::var("TAC_COURIER_MESSAGE").unwrap_or_else(|_| "gm from TON".to_string());
    let proxy_msg = proxy::simple_message_call(&message);
    let linker = submission.submit(&proxy_msg, &[]).await?;
    let tracking = tracker.track(linker);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut updates = tracking.subscribe();
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping...");
                tracking.cancel();
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow().clone();
                info!(
                    status = ?snapshot.status,
                    attempt = snapshot.attempt,
                    operation_id = ?snapshot.operation_id,
                    "Tracking update"
                );
                if !snapshot.active {
                    match &snapshot.error {
                        Some(e) => warn!("Tracking halted: {}", e),
                        None => info!(status = ?snapshot.status, "Tracking complete"),
                    }
                    break;
                }
            }
        }
    }

    // Graceful shutdown
    tracker.cancel_all();
    submission.cleanup().await;
    if let Err(e) = session.disconnect().await {
        warn!("Wallet teardown failed: {}", e);
    }

    api_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("TAC Courier stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tac_courier=debug,hyper=warn"));

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
