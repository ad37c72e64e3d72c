//! Deprovision Relay - Main Entry Point
//!
//! Subscribes to community departures and forwards each one to the
//! deprovisioning endpoint.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use dpr_relay::config::Config;
use dpr_relay::gateway::GatewayClient;
use dpr_relay::handler::DeprovisionHandler;
use dpr_relay::notify::Notifier;

#[tokio::main]
async fn main() -> Result<()> {
    // rustls needs a process-wide crypto provider before the first wss:// connect
    let _ =
        rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider());

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dpr_relay=info,dpr_signing=info".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.endpoint,
        mode = %config.mode,
        dry_run = ?config.dry_run,
        "Starting Deprovision Relay"
    );

    for name in config.missing() {
        warn!(setting = name, "Required setting is not configured");
    }

    let handler = match (config.notifier_config(), config.dry_run) {
        (Some(notifier_config), Some(dry_run)) => {
            let notifier =
                Notifier::new(notifier_config).context("Failed to build deprovision notifier")?;
            DeprovisionHandler::new(notifier, config.mode, dry_run)
        }
        _ => {
            warn!(
                "Deprovision notices disabled: DISCORD_BOT_SECRET and DEPROVISION_DRY_RUN are both required"
            );
            DeprovisionHandler::disabled()
        }
    };

    let Some(token) = config.discord_token.clone() else {
        bail!("DISCORD_TOKEN must be set to connect to the gateway");
    };

    let client = GatewayClient::new(config.gateway_url.clone(), token, Arc::new(handler));

    // Graceful shutdown handler
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cleaning up...");
        }
        let _ = shutdown_tx.send(()).await;
    });

    client.run(shutdown_rx).await?;

    info!("Relay shutdown complete");

    Ok(())
}
