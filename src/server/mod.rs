pub mod handler;

use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::errors::{Result, WardenError};
use crate::registry::PolicyRegistry;

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub metrics_port: u16,
    /// Seconds between eviction sweeps
    pub sweep_interval_secs: u64,
    pub policy_config_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            metrics_port: 9090,
            sweep_interval_secs: 60,
            policy_config_path: PathBuf::from("config/policies.json"),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("WARDEN_HOST").unwrap_or(defaults.host),
            port: env_parse("WARDEN_PORT").unwrap_or(defaults.port),
            metrics_port: env_parse("WARDEN_METRICS_PORT").unwrap_or(defaults.metrics_port),
            sweep_interval_secs: env_parse("WARDEN_SWEEP_INTERVAL_SECS")
                .unwrap_or(defaults.sweep_interval_secs),
            policy_config_path: std::env::var("WARDEN_POLICY_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.policy_config_path),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Routes of the admission service
pub fn router(registry: Arc<PolicyRegistry>) -> Router {
    Router::new()
        .route("/v1/admit", post(handler::admit))
        .route("/v1/status/{policy}/{key}", get(handler::client_status))
        .route("/v1/config", get(handler::current_config))
        .route("/health", get(handler::health_check))
        .with_state(registry)
}

/// Start the admission service
pub async fn start_server(config: &ServerConfig, registry: Arc<PolicyRegistry>) -> Result<()> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| WardenError::InternalError(format!("Failed to bind {}: {}", addr, e)))?;

    info!("Admission service listening on http://{}", addr);

    axum::serve(listener, router(registry))
        .await
        .map_err(|e| WardenError::InternalError(format!("Server error: {}", e)))
}
