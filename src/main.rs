use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden::config::loader::load_config;
use warden::config::watcher::watch_config_file;
use warden::metrics_server::start_metrics_server;
use warden::sweeper::spawn_sweeper;
use warden::{start_server, PolicyRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Warden admission service starting...");

    let config = load_config().await?;
    let registry = Arc::new(PolicyRegistry::new(config.policies.clone()));

    let _sweeper = spawn_sweeper(
        registry.clone(),
        Duration::from_secs(config.server.sweep_interval_secs),
    );

    let watch_path = config.server.policy_config_path.clone();
    let watch_registry = registry.clone();
    tokio::spawn(async move {
        if let Err(e) = watch_config_file(watch_path, watch_registry).await {
            warn!("Policy hot reload disabled: {}", e);
        }
    });

    let metrics_port = config.server.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_port).await {
            error!("Metrics server stopped: {}", e);
        }
    });

    start_server(&config.server, registry).await?;

    Ok(())
}
